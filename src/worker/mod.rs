//! Background worker that drives the queue service.

pub mod daemon;

pub use daemon::{QueueWorker, WorkerConfig, WorkerHealth, WorkerState};
