//! intake library root.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod processors;
pub mod web;
pub mod worker;

pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use core::{EnqueueResult, MessageQueueService, NewMessage, ProcessingResult, QueueStats};
pub use error::{Error, Result};
pub use processors::Processor;
pub use web::{run_server, QueueMiddleware};
pub use worker::QueueWorker;
