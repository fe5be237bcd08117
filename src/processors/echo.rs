//! Echo processor: replies with the text it was given.

use async_trait::async_trait;

use super::processor::{Processor, Result};
use crate::core::QueuedMessage;

/// Replies with the message content. Useful for wiring checks and demos.
pub struct EchoProcessor {
    prefix: String,
}

impl EchoProcessor {
    pub fn new() -> Self {
        Self {
            prefix: "echo: ".to_string(),
        }
    }
}

impl Default for EchoProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for EchoProcessor {
    fn name(&self) -> &str {
        "echo"
    }

    async fn process(&self, message: &QueuedMessage) -> Result<String> {
        Ok(format!("{}{}", self.prefix, message.content))
    }
}
