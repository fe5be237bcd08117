//! Core module - the in-memory intake queue.
//!
//! - Per-customer queues and locks
//! - Duplicate suppression
//! - Debounce and burst aggregation
//! - The service that ties them together

pub mod aggregate;
pub mod dedup;
pub mod message;
pub mod service;
pub mod stats;
pub mod store;

pub use message::{
    EnqueueResult, MessageSummary, NewMessage, Priority, ProcessingResult, QueuedMessage,
    RejectReason,
};
pub use service::{CleanupReport, CustomerQueueStatus, MessageQueueService, QueueConfig};
pub use stats::QueueStats;
