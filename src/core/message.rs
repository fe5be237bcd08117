//! Message and result records flowing through the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Dispatch priority. Higher values are dispatched first.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    #[default]
    Normal = 0,
    High = 1,
    Urgent = 2,
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> Self {
        p as u8
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Priority::Normal),
            1 => Ok(Priority::High),
            2 => Ok(Priority::Urgent),
            _ => Err(format!("Priority must be 0, 1 or 2, got {}", value)),
        }
    }
}

/// A message waiting in a customer's queue.
#[derive(Clone, Debug)]
pub struct QueuedMessage {
    pub message_id: String,
    pub customer_id: String,
    /// Raw text, or the merged transcript once a burst has been aggregated.
    pub content: String,
    pub channel: String,
    /// Wall-clock enqueue time, for display.
    pub enqueue_timestamp: DateTime<Utc>,
    /// Monotonic enqueue time, used for timing.
    pub enqueued_at: Instant,
    /// Process-wide arrival order. Unique even when instants collide.
    pub seq: u64,
    pub priority: Priority,
    pub metadata: HashMap<String, serde_json::Value>,
    pub is_typing: bool,
    /// `None` for typing indicators, which never dispatch on their own.
    pub debounce_deadline: Option<Instant>,
    pub burst_group_id: String,
    /// Raw texts of the burst members folded into this carrier, excluding its own.
    pub aggregated_messages: Vec<String>,
    /// Set once a dispatch attempt has seen this message still debouncing.
    pub(crate) debounce_counted: bool,
}

impl QueuedMessage {
    /// True when the message may be dispatched at `now`.
    pub fn is_ready(&self, now: Instant) -> bool {
        !self.is_typing && self.debounce_deadline.is_some_and(|deadline| deadline <= now)
    }

    /// Ordering key: priority desc, then arrival order.
    pub(crate) fn dispatch_key(&self) -> (std::cmp::Reverse<Priority>, u64) {
        (std::cmp::Reverse(self.priority), self.seq)
    }

    pub fn summary(&self, now: Instant) -> MessageSummary {
        MessageSummary {
            message_id: self.message_id.clone(),
            channel: self.channel.clone(),
            content_preview: preview(&self.content, 80),
            priority: self.priority,
            is_typing: self.is_typing,
            burst_group_id: self.burst_group_id.clone(),
            enqueue_timestamp: self.enqueue_timestamp,
            debounce_remaining_ms: self
                .debounce_deadline
                .map(|deadline| deadline.saturating_duration_since(now).as_millis() as u64),
        }
    }
}

#[cfg(test)]
impl QueuedMessage {
    /// A ready, non-aggregated message for tests.
    pub(crate) fn sample(customer_id: &str, content: &str) -> Self {
        let now = Instant::now();
        Self {
            message_id: ulid::Ulid::new().to_string(),
            customer_id: customer_id.to_string(),
            content: content.to_string(),
            channel: "web".to_string(),
            enqueue_timestamp: Utc::now(),
            enqueued_at: now,
            seq: 0,
            priority: Priority::Normal,
            metadata: HashMap::new(),
            is_typing: false,
            debounce_deadline: Some(now),
            burst_group_id: format!("{}_test", customer_id),
            aggregated_messages: Vec::new(),
            debounce_counted: false,
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

/// Serializable view of a queued message for dashboards.
#[derive(Serialize, Clone, Debug)]
pub struct MessageSummary {
    pub message_id: String,
    pub channel: String,
    pub content_preview: String,
    pub priority: Priority,
    pub is_typing: bool,
    pub burst_group_id: String,
    pub enqueue_timestamp: DateTime<Utc>,
    pub debounce_remaining_ms: Option<u64>,
}

/// Outcome of one unit of work handed to the processor.
#[derive(Serialize, Clone, Debug)]
pub struct ProcessingResult {
    pub success: bool,
    pub message_id: String,
    pub customer_id: String,
    pub response: Option<String>,
    #[serde(with = "duration_secs")]
    pub processing_time: Duration,
    pub was_aggregated: bool,
    pub aggregated_count: usize,
    pub error: Option<String>,
}

/// Why an enqueue was refused.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Identical content was processed within the hash TTL.
    Duplicate,
    /// The global queue is at capacity.
    Full,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Duplicate => write!(f, "duplicate message"),
            RejectReason::Full => write!(f, "queue full"),
        }
    }
}

/// Structured result of an enqueue. Never an error for expected outcomes.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct EnqueueResult {
    pub accepted: bool,
    pub message_id: String,
    pub reason: Option<RejectReason>,
}

impl EnqueueResult {
    pub fn accepted(message_id: String) -> Self {
        Self {
            accepted: true,
            message_id,
            reason: None,
        }
    }

    pub fn rejected(message_id: String, reason: RejectReason) -> Self {
        Self {
            accepted: false,
            message_id,
            reason: Some(reason),
        }
    }
}

/// Parameters for [`MessageQueueService::enqueue`](super::MessageQueueService::enqueue).
#[derive(Clone, Debug, Default)]
pub struct NewMessage {
    pub customer_id: String,
    pub content: String,
    pub channel: String,
    pub message_id: Option<String>,
    pub priority: Priority,
    pub is_typing: bool,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl NewMessage {
    pub fn new(customer_id: &str, content: &str, channel: &str) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            content: content.to_string(),
            channel: channel.to_string(),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_message_id(mut self, message_id: &str) -> Self {
        self.message_id = Some(message_id.to_string());
        self
    }

    pub fn typing(mut self) -> Self {
        self.is_typing = true;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering_and_conversion() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert_eq!(Priority::try_from(2), Ok(Priority::Urgent));
        assert!(Priority::try_from(3).is_err());
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "1");
    }

    #[test]
    fn test_reject_reason_serializes_snake_case() {
        let result = EnqueueResult::rejected("m1".to_string(), RejectReason::Full);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["accepted"], false);
        assert_eq!(json["reason"], "full");
    }

    #[test]
    fn test_preview_truncates_long_content() {
        let long = "x".repeat(100);
        let p = preview(&long, 80);

        assert_eq!(p.chars().count(), 83);
        assert!(p.ends_with("..."));
        assert_eq!(preview("short", 80), "short");
    }
}
