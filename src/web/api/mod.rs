//! API endpoints module.

pub mod queue;

pub use queue::{customer_status, health, post_message, queue_stats};
