//! Per-customer queue state and the lock table that guards it.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use super::message::QueuedMessage;

/// Burst bookkeeping for one customer.
#[derive(Debug, Clone)]
pub struct BurstState {
    pub group_id: String,
    pub last_message_at: Instant,
}

/// Everything owned by one customer. Only touched while holding its lock.
#[derive(Debug, Default)]
pub struct CustomerState {
    /// Sorted by priority desc, then arrival order.
    pub queue: Vec<QueuedMessage>,
    /// Id of the message currently handed to the processor.
    pub in_flight: Option<String>,
    pub burst: Option<BurstState>,
    /// Set once the entry is removed from the table; holders must re-fetch.
    evicted: bool,
}

impl CustomerState {
    pub fn insert(&mut self, message: QueuedMessage) {
        self.queue.push(message);
        self.queue.sort_by_key(|m| m.dispatch_key());
    }

    pub fn is_processing(&self) -> bool {
        self.in_flight.is_some()
    }

    fn is_idle(&self, now: Instant, burst_window: Duration) -> bool {
        self.queue.is_empty()
            && self.in_flight.is_none()
            && self
                .burst
                .as_ref()
                .map_or(true, |b| now.duration_since(b.last_message_at) >= burst_window)
    }
}

pub type CustomerGuard = OwnedMutexGuard<CustomerState>;

/// Table of customer states plus global counters.
#[derive(Default)]
pub struct QueueStore {
    customers: DashMap<String, Arc<Mutex<CustomerState>>>,
    total: AtomicUsize,
    in_flight: AtomicUsize,
    next_seq: AtomicU64,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a customer's state, creating it on first use.
    pub async fn lock(&self, customer_id: &str) -> CustomerGuard {
        loop {
            let entry = self
                .customers
                .entry(customer_id.to_string())
                .or_default()
                .clone();
            let guard = entry.lock_owned().await;
            if !guard.evicted {
                return guard;
            }
            // Evicted between lookup and lock; the next lookup creates a fresh entry.
        }
    }

    /// Lock a customer's state only if the customer is known.
    pub async fn lock_existing(&self, customer_id: &str) -> Option<CustomerGuard> {
        let entry = self.customers.get(customer_id).map(|e| e.value().clone())?;
        let guard = entry.lock_owned().await;
        if guard.evicted {
            return None;
        }
        Some(guard)
    }

    fn entries(&self) -> Vec<(String, Arc<Mutex<CustomerState>>)> {
        self.customers
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Customer ids whose queue is not empty.
    pub async fn pending_customers(&self) -> Vec<String> {
        let mut pending = Vec::new();
        for (customer_id, entry) in self.entries() {
            let state = entry.lock().await;
            if !state.evicted && !state.queue.is_empty() {
                pending.push(customer_id);
            }
        }
        pending
    }

    /// Visit every live customer state, one lock at a time.
    pub async fn for_each(&self, mut f: impl FnMut(&str, &mut CustomerState)) {
        for (customer_id, entry) in self.entries() {
            let mut state = entry.lock().await;
            if !state.evicted {
                f(&customer_id, &mut state);
            }
        }
    }

    /// Queue depth per customer with a non-empty queue.
    pub async fn depths(&self) -> Vec<(String, usize)> {
        let mut depths = Vec::new();
        for (customer_id, entry) in self.entries() {
            let state = entry.lock().await;
            if !state.evicted && !state.queue.is_empty() {
                depths.push((customer_id, state.queue.len()));
            }
        }
        depths.sort();
        depths
    }

    /// Remove customers with nothing queued, nothing in flight and no live burst.
    ///
    /// Entries that are locked right now are skipped; they are busy, not idle.
    pub fn evict_idle(&self, burst_window: Duration) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        for (customer_id, entry) in self.entries() {
            let Ok(mut state) = entry.clone().try_lock_owned() else {
                continue;
            };
            if state.evicted || !state.is_idle(now, burst_window) {
                continue;
            }
            state.evicted = true;
            self.customers
                .remove_if(&customer_id, |_, current| Arc::ptr_eq(current, &entry));
            evicted += 1;
        }
        evicted
    }

    /// Next arrival sequence number.
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Reserve one slot against the global capacity.
    pub fn try_reserve(&self, max: usize) -> bool {
        self.total
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .is_ok()
    }

    /// Give back slots for messages that left the queue.
    pub fn release(&self, count: usize) {
        if count == 0 {
            return;
        }
        let _ = self
            .total
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(count))
            });
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    pub fn mark_in_flight(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub fn clear_in_flight(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            });
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn customer_count(&self) -> usize {
        self.customers.len()
    }
}
