//! Processor trait: the downstream handler for ready messages.

use async_trait::async_trait;
use thiserror::Error;

use crate::core::QueuedMessage;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Processor not available: {0}")]
    NotAvailable(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Handles one unit of work and returns the reply text.
///
/// Invoked at most once concurrently per customer. The queue imposes no
/// timeout; implementations that call slow backends should bound themselves.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Processor name, for logs.
    fn name(&self) -> &str;

    /// Produce a reply for a ready message (possibly an aggregated burst).
    async fn process(&self, message: &QueuedMessage) -> Result<String>;
}
