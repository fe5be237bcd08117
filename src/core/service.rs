//! Message queue service: enqueue, debounce, aggregate and dispatch.
//!
//! Each customer has its own lock. All mutation of a customer's queue,
//! in-flight marker and burst state happens under that lock; the processor
//! is always invoked with the lock released so one slow reply never blocks
//! other customers.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{DedupScope, QueueSettings};
use crate::processors::Processor;

use super::aggregate::{DebounceAggregator, UnitOfWork};
use super::dedup::DuplicateFilter;
use super::message::{
    EnqueueResult, MessageSummary, NewMessage, ProcessingResult, QueuedMessage, RejectReason,
};
use super::stats::{QueueCounters, QueueStats};
use super::store::{BurstState, QueueStore};

/// Timing and capacity knobs for the queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub debounce_window: Duration,
    pub burst_window: Duration,
    /// Global cap across all customers.
    pub max_queue_size: usize,
    pub hash_ttl: Duration,
    pub dedup_scope: DedupScope,
    pub evict_idle_customers: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::from(&QueueSettings::default())
    }
}

impl From<&QueueSettings> for QueueConfig {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            debounce_window: settings.debounce_window(),
            burst_window: settings.burst_window(),
            max_queue_size: settings.max_queue_size,
            hash_ttl: settings.hash_ttl(),
            dedup_scope: settings.dedup_scope,
            evict_idle_customers: settings.evict_idle_customers,
        }
    }
}

/// What one cleanup pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub expired_hashes: usize,
    pub expired_bursts: usize,
    pub dropped_typing: usize,
    pub evicted_customers: usize,
}

/// Introspection view of one customer's queue.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerQueueStatus {
    pub customer_id: String,
    pub queue_size: usize,
    pub is_processing: bool,
    pub processing_message_id: Option<String>,
    pub burst_group_id: Option<String>,
    pub messages: Vec<MessageSummary>,
}

/// Queue service handle. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct MessageQueueService {
    config: Arc<QueueConfig>,
    store: Arc<QueueStore>,
    dedup: Arc<DuplicateFilter>,
    counters: Arc<QueueCounters>,
}

impl MessageQueueService {
    pub fn new(config: QueueConfig) -> Self {
        tracing::info!(
            debounce_ms = config.debounce_window.as_millis() as u64,
            burst_ms = config.burst_window.as_millis() as u64,
            max_queue_size = config.max_queue_size,
            "Message queue service created"
        );

        Self {
            dedup: Arc::new(DuplicateFilter::new(config.hash_ttl, config.dedup_scope)),
            config: Arc::new(config),
            store: Arc::new(QueueStore::new()),
            counters: Arc::new(QueueCounters::default()),
        }
    }

    /// Accept a message into its customer's queue.
    ///
    /// Duplicates and a full queue are reported in the result, never as errors.
    pub async fn enqueue(&self, new: NewMessage) -> EnqueueResult {
        let message_id = new
            .message_id
            .clone()
            .unwrap_or_else(|| ulid::Ulid::new().to_string());

        let mut state = self.store.lock(&new.customer_id).await;

        if !new.is_typing && self.dedup.is_duplicate(&new.customer_id, &new.content) {
            QueueCounters::incr(&self.counters.duplicates);
            tracing::debug!(
                customer_id = %new.customer_id,
                message_id = %message_id,
                "Rejected duplicate message"
            );
            return EnqueueResult::rejected(message_id, RejectReason::Duplicate);
        }

        if !self.store.try_reserve(self.config.max_queue_size) {
            QueueCounters::incr(&self.counters.rejected);
            tracing::warn!(
                customer_id = %new.customer_id,
                message_id = %message_id,
                max_queue_size = self.config.max_queue_size,
                "Queue full, rejecting message"
            );
            return EnqueueResult::rejected(message_id, RejectReason::Full);
        }

        let now = Instant::now();
        let group_id = match &state.burst {
            Some(burst) if now.duration_since(burst.last_message_at) < self.config.burst_window => {
                burst.group_id.clone()
            }
            _ => format!("{}_{}", new.customer_id, ulid::Ulid::new()),
        };
        state.burst = Some(BurstState {
            group_id: group_id.clone(),
            last_message_at: now,
        });

        let deadline = now + self.config.debounce_window;
        let rearmed = DebounceAggregator::rearm_burst(&mut state.queue, &group_id, deadline);

        let message = QueuedMessage {
            message_id: message_id.clone(),
            customer_id: new.customer_id.clone(),
            content: new.content,
            channel: new.channel,
            enqueue_timestamp: chrono::Utc::now(),
            enqueued_at: now,
            seq: self.store.next_seq(),
            priority: new.priority,
            metadata: new.metadata,
            is_typing: new.is_typing,
            debounce_deadline: (!new.is_typing).then_some(deadline),
            burst_group_id: group_id.clone(),
            aggregated_messages: Vec::new(),
            debounce_counted: false,
        };
        state.insert(message);
        QueueCounters::incr(&self.counters.enqueued);

        tracing::info!(
            customer_id = %new.customer_id,
            message_id = %message_id,
            burst_group = %group_id,
            rearmed,
            depth = state.queue.len(),
            "Enqueued message"
        );

        EnqueueResult::accepted(message_id)
    }

    /// Dispatch the next ready unit of work for one customer.
    ///
    /// Returns `None` when the customer is already being processed, when
    /// nothing is past its debounce deadline, or when the customer is unknown.
    /// Processor errors and panics come back as a failed result.
    pub async fn process_one(
        &self,
        customer_id: &str,
        processor: Arc<dyn Processor>,
    ) -> Option<ProcessingResult> {
        let unit = {
            let mut state = self.store.lock_existing(customer_id).await?;

            if state.is_processing() {
                tracing::trace!(customer_id, "Customer already in flight");
                return None;
            }

            let now = Instant::now();
            let held = DebounceAggregator::mark_debounced(&mut state.queue, now);
            QueueCounters::add(&self.counters.debounced, held);
            if !DebounceAggregator::has_ready(&state.queue, now) {
                return None;
            }
            let unit = DebounceAggregator::take_unit(&mut state.queue, now)?;

            state.in_flight = Some(unit.carrier.message_id.clone());
            self.store.release(unit.removed);
            self.store.mark_in_flight();
            unit
        };

        let message_id = unit.carrier.message_id.clone();
        let was_aggregated = unit.was_aggregated();
        let aggregated_count = unit.aggregated_count();

        tracing::info!(
            customer_id,
            message_id = %message_id,
            aggregated_count,
            processor = processor.name(),
            "Dispatching message"
        );

        // The unit runs in its own task so that dropping this future cannot
        // skip hash recording or leave the in-flight marker set.
        let service = self.clone();
        let handle = tokio::spawn(async move { service.run_unit(unit, processor).await });

        match handle.await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::error!(customer_id, message_id = %message_id, "Processing task failed: {}", e);
                Some(ProcessingResult {
                    success: false,
                    message_id,
                    customer_id: customer_id.to_string(),
                    response: None,
                    processing_time: Duration::ZERO,
                    was_aggregated,
                    aggregated_count,
                    error: Some(e.to_string()),
                })
            }
        }
    }

    async fn run_unit(self, unit: UnitOfWork, processor: Arc<dyn Processor>) -> ProcessingResult {
        let started = Instant::now();
        let carrier = unit.carrier.clone();
        let call = tokio::spawn(async move { processor.process(&carrier).await });

        let outcome = match call.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) if e.is_panic() => Err(format!("Processor panicked: {}", e)),
            Err(e) => Err(e.to_string()),
        };
        let processing_time = started.elapsed();

        let customer_id = unit.carrier.customer_id.clone();
        for text in &unit.member_texts {
            self.dedup.record(&customer_id, text);
        }

        {
            let mut state = self.store.lock(&customer_id).await;
            state.in_flight = None;
        }
        self.store.clear_in_flight();

        let was_aggregated = unit.was_aggregated();
        let aggregated_count = unit.aggregated_count();
        if was_aggregated {
            QueueCounters::incr(&self.counters.aggregated);
        }

        let (success, response, error) = match outcome {
            Ok(response) => {
                QueueCounters::incr(&self.counters.processed);
                tracing::info!(
                    customer_id = %customer_id,
                    message_id = %unit.carrier.message_id,
                    elapsed_ms = processing_time.as_millis() as u64,
                    "Processed message"
                );
                (true, Some(response), None)
            }
            Err(e) => {
                QueueCounters::incr(&self.counters.failed);
                tracing::error!(
                    customer_id = %customer_id,
                    message_id = %unit.carrier.message_id,
                    "Processing failed: {}",
                    e
                );
                (false, None, Some(e))
            }
        };

        ProcessingResult {
            success,
            message_id: unit.carrier.message_id,
            customer_id,
            response,
            processing_time,
            was_aggregated,
            aggregated_count,
            error,
        }
    }

    /// Purge expired duplicate hashes, stale burst state and abandoned typing
    /// indicators, then evict idle customers. Safe to run at any time.
    pub async fn cleanup_expired(&self) -> CleanupReport {
        let mut report = CleanupReport {
            expired_hashes: self.dedup.purge_expired(),
            ..Default::default()
        };

        let now = Instant::now();
        let burst_window = self.config.burst_window;
        let mut released = 0;
        self.store
            .for_each(|_, state| {
                if state
                    .burst
                    .as_ref()
                    .is_some_and(|b| now.duration_since(b.last_message_at) >= burst_window)
                {
                    state.burst = None;
                    report.expired_bursts += 1;
                }

                let before = state.queue.len();
                state
                    .queue
                    .retain(|m| !(m.is_typing && now.duration_since(m.enqueued_at) >= burst_window));
                let dropped = before - state.queue.len();
                report.dropped_typing += dropped;
                released += dropped;
            })
            .await;
        self.store.release(released);

        if self.config.evict_idle_customers {
            report.evicted_customers = self.store.evict_idle(burst_window);
        }

        if report != CleanupReport::default() {
            tracing::debug!(?report, "Queue cleanup");
        }
        report
    }

    /// Read-only snapshot of counters and queue depths.
    pub async fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::from_counters(&self.counters);
        stats.queued = self.store.total();
        stats.in_flight = self.store.in_flight();
        stats.customers = self.store.customer_count();
        stats.duplicate_cache_size = self.dedup.len();
        stats.per_customer = self.store.depths().await.into_iter().collect();
        stats
    }

    /// Customers with at least one queued message.
    pub async fn pending_customers(&self) -> Vec<String> {
        self.store.pending_customers().await
    }

    pub async fn get_customer_queue_status(&self, customer_id: &str) -> CustomerQueueStatus {
        let mut status = CustomerQueueStatus {
            customer_id: customer_id.to_string(),
            queue_size: 0,
            is_processing: false,
            processing_message_id: None,
            burst_group_id: None,
            messages: Vec::new(),
        };

        if let Some(state) = self.store.lock_existing(customer_id).await {
            let now = Instant::now();
            status.queue_size = state.queue.len();
            status.is_processing = state.is_processing();
            status.processing_message_id = state.in_flight.clone();
            status.burst_group_id = state.burst.as_ref().map(|b| b.group_id.clone());
            status.messages = state.queue.iter().map(|m| m.summary(now)).collect();
        }

        status
    }
}
