//! Queue counters and the read-only statistics snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative counters, updated lock-free from any customer's scope.
#[derive(Default, Debug)]
pub struct QueueCounters {
    pub enqueued: AtomicU64,
    pub processed: AtomicU64,
    pub failed: AtomicU64,
    pub debounced: AtomicU64,
    pub aggregated: AtomicU64,
    pub duplicates: AtomicU64,
    pub rejected: AtomicU64,
}

impl QueueCounters {
    pub fn incr(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    pub fn add(counter: &AtomicU64, n: usize) {
        if n > 0 {
            counter.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Queue statistics.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct QueueStats {
    /// Messages currently waiting across all customers.
    pub queued: usize,
    pub enqueued: u64,
    pub processed: u64,
    pub failed: u64,
    /// Messages seen at least once still inside their debounce window.
    pub debounced: u64,
    /// Units of work that merged more than one message.
    pub aggregated: u64,
    pub duplicates: u64,
    /// Enqueues refused because the queue was full.
    pub rejected: u64,
    pub in_flight: usize,
    pub customers: usize,
    pub duplicate_cache_size: usize,
    pub per_customer: BTreeMap<String, usize>,
}

impl QueueStats {
    pub(crate) fn from_counters(counters: &QueueCounters) -> Self {
        Self {
            enqueued: QueueCounters::get(&counters.enqueued),
            processed: QueueCounters::get(&counters.processed),
            failed: QueueCounters::get(&counters.failed),
            debounced: QueueCounters::get(&counters.debounced),
            aggregated: QueueCounters::get(&counters.aggregated),
            duplicates: QueueCounters::get(&counters.duplicates),
            rejected: QueueCounters::get(&counters.rejected),
            ..Default::default()
        }
    }
}

impl std::fmt::Display for QueueStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Queue Stats:")?;
        writeln!(f, "  Queued:      {}", self.queued)?;
        writeln!(f, "  In flight:   {}", self.in_flight)?;
        writeln!(f, "  Enqueued:    {}", self.enqueued)?;
        writeln!(f, "  Processed:   {}", self.processed)?;
        writeln!(f, "  Failed:      {}", self.failed)?;
        writeln!(f, "  Debounced:   {}", self.debounced)?;
        writeln!(f, "  Aggregated:  {}", self.aggregated)?;
        writeln!(f, "  Duplicates:  {}", self.duplicates)?;
        writeln!(f, "  Rejected:    {}", self.rejected)?;
        write!(f, "  Customers:   {}", self.customers)?;
        for (customer_id, depth) in &self.per_customer {
            write!(f, "\n    {}: {}", customer_id, depth)?;
        }
        Ok(())
    }
}
