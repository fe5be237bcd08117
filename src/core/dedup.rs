//! Content-hash cache for rejecting resubmitted messages.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::DedupScope;

/// Content-hash cache with TTL. Shared by all customers.
pub struct DuplicateFilter {
    seen: DashMap<String, Instant>,
    ttl: Duration,
    scope: DedupScope,
}

/// Trim and lower-case text before hashing.
pub fn normalize(content: &str) -> String {
    content.trim().to_lowercase()
}

impl DuplicateFilter {
    pub fn new(ttl: Duration, scope: DedupScope) -> Self {
        Self {
            seen: DashMap::new(),
            ttl,
            scope,
        }
    }

    /// Hash of the normalized content, keyed by customer unless the scope is global.
    pub fn content_hash(&self, customer_id: &str, content: &str) -> String {
        let mut hasher = Sha256::new();
        if self.scope == DedupScope::Customer {
            hasher.update(customer_id.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(normalize(content).as_bytes());
        hex::encode(hasher.finalize())
    }

    /// True if this content was processed within the TTL.
    pub fn is_duplicate(&self, customer_id: &str, content: &str) -> bool {
        let hash = self.content_hash(customer_id, content);
        match self.seen.get(&hash) {
            Some(recorded) => recorded.elapsed() < self.ttl,
            None => false,
        }
    }

    /// Remember content as processed now.
    pub fn record(&self, customer_id: &str, content: &str) {
        let hash = self.content_hash(customer_id, content);
        self.seen.insert(hash, Instant::now());
    }

    /// Drop entries older than the TTL. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, recorded| recorded.elapsed() < self.ttl);
        before.saturating_sub(self.seen.len())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_ignores_case_and_padding() {
        let filter = DuplicateFilter::new(Duration::from_secs(300), DedupScope::Customer);

        assert_eq!(
            filter.content_hash("c1", "  Need A Refund "),
            filter.content_hash("c1", "need a refund")
        );
    }

    #[test]
    fn test_scope_controls_cross_customer_hashes() {
        let per_customer = DuplicateFilter::new(Duration::from_secs(300), DedupScope::Customer);
        let global = DuplicateFilter::new(Duration::from_secs(300), DedupScope::Global);

        assert_ne!(per_customer.content_hash("c1", "hi"), per_customer.content_hash("c2", "hi"));
        assert_eq!(global.content_hash("c1", "hi"), global.content_hash("c2", "hi"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let filter = DuplicateFilter::new(Duration::from_secs(300), DedupScope::Customer);
        filter.record("c1", "hello");

        assert!(filter.is_duplicate("c1", "HELLO"));
        assert!(!filter.is_duplicate("c2", "hello"));

        tokio::time::advance(Duration::from_secs(301)).await;

        assert!(!filter.is_duplicate("c1", "hello"));
        assert_eq!(filter.purge_expired(), 1);
        assert!(filter.is_empty());
    }
}
