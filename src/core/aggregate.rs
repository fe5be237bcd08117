//! Debounce readiness and burst aggregation.
//!
//! A burst is a run of messages from one customer spaced closer than the
//! burst window. Every new member re-arms the debounce deadline of the whole
//! burst, so a burst becomes ready as one unit once the customer goes quiet.

use tokio::time::Instant;

use super::message::{Priority, QueuedMessage};

/// Messages taken off a customer's queue for one processor call.
#[derive(Debug, Clone)]
pub struct UnitOfWork {
    /// The message handed to the processor.
    pub carrier: QueuedMessage,
    /// Raw texts of every burst member, carrier first, in arrival order.
    pub member_texts: Vec<String>,
    /// Number of queue entries removed, typing indicators included.
    pub removed: usize,
}

impl UnitOfWork {
    pub fn was_aggregated(&self) -> bool {
        !self.carrier.aggregated_messages.is_empty()
    }

    pub fn aggregated_count(&self) -> usize {
        self.carrier.aggregated_messages.len()
    }
}

/// Stateless readiness and merge policy.
pub struct DebounceAggregator;

impl DebounceAggregator {
    /// Push the deadline of every pending, non-typing member of `group_id` out to `deadline`.
    pub fn rearm_burst(queue: &mut [QueuedMessage], group_id: &str, deadline: Instant) -> usize {
        let mut rearmed = 0;
        for message in queue
            .iter_mut()
            .filter(|m| !m.is_typing && m.burst_group_id == group_id)
        {
            message.debounce_deadline = Some(deadline);
            rearmed += 1;
        }
        rearmed
    }

    /// Flag messages seen inside their debounce window for the first time.
    /// Returns how many were newly flagged.
    pub fn mark_debounced(queue: &mut [QueuedMessage], now: Instant) -> usize {
        let mut marked = 0;
        for message in queue
            .iter_mut()
            .filter(|m| !m.is_typing && !m.debounce_counted && !m.is_ready(now))
        {
            message.debounce_counted = true;
            marked += 1;
        }
        marked
    }

    /// True when at least one message can be dispatched at `now`.
    pub fn has_ready(queue: &[QueuedMessage], now: Instant) -> bool {
        queue.iter().any(|m| m.is_ready(now))
    }

    /// Remove the next unit of work from a sorted queue, if anything is ready.
    ///
    /// The first ready message in dispatch order picks the burst group. All
    /// ready members of that group are merged into the earliest arrival;
    /// typing indicators of the group are discarded along with them.
    pub fn take_unit(queue: &mut Vec<QueuedMessage>, now: Instant) -> Option<UnitOfWork> {
        let group_id = queue.iter().find(|m| m.is_ready(now))?.burst_group_id.clone();

        let mut members = Vec::new();
        let mut removed = 0;
        let mut i = 0;
        while i < queue.len() {
            let in_group = queue[i].burst_group_id == group_id;
            if in_group && queue[i].is_ready(now) {
                members.push(queue.remove(i));
                removed += 1;
            } else if in_group && queue[i].is_typing {
                queue.remove(i);
                removed += 1;
            } else {
                i += 1;
            }
        }

        members.sort_by_key(|m| m.seq);
        let member_texts: Vec<String> = members.iter().map(|m| m.content.clone()).collect();

        let mut rest = members.into_iter();
        let mut carrier = rest.next()?;
        let others: Vec<QueuedMessage> = rest.collect();

        if !others.is_empty() {
            carrier.content = transcript(&member_texts);
            carrier.priority = others
                .iter()
                .map(|m| m.priority)
                .fold(carrier.priority, Priority::max);
            carrier.aggregated_messages = others.into_iter().map(|m| m.content).collect();
        }

        Some(UnitOfWork {
            carrier,
            member_texts,
            removed,
        })
    }
}

/// Deterministic transcript for a burst, messages in arrival order.
pub fn transcript(texts: &[String]) -> String {
    let mut out = format!(
        "[User sent {} messages in quick succession. Context below:]",
        texts.len()
    );
    for (i, text) in texts.iter().enumerate() {
        out.push_str(&format!("\n[Message {}]: {}", i + 1, text));
    }
    out
}
