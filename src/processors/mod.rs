//! Processors: downstream handlers that turn a ready message into a reply.

use std::sync::Arc;

pub mod command;
pub mod echo;
pub mod ollama;
pub mod processor;

pub use processor::{Processor, ProcessorError, Result};

use crate::config::{ProcessorKind, ProcessorSettings};

/// Processor factory.
pub fn create_processor(settings: &ProcessorSettings) -> Result<Arc<dyn Processor>> {
    match settings.kind {
        ProcessorKind::Echo => Ok(Arc::new(echo::EchoProcessor::new())),
        ProcessorKind::Command => {
            let program = settings.command.clone().ok_or_else(|| {
                ProcessorError::NotAvailable("processor.command is not set".to_string())
            })?;
            Ok(Arc::new(command::CommandProcessor::new(
                program,
                settings.args.clone(),
            )))
        }
        ProcessorKind::Ollama => {
            let mut processor = ollama::OllamaProcessor::with_config(
                settings.base_url.clone(),
                settings.model.clone(),
            );
            if let Some(timeout) = settings.timeout() {
                processor = processor.with_timeout(timeout);
            }
            Ok(Arc::new(processor))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_picks_configured_processor() {
        let echo = create_processor(&ProcessorSettings::default()).unwrap();
        assert_eq!(echo.name(), "echo");

        let settings = ProcessorSettings {
            kind: ProcessorKind::Command,
            command: Some("my-agent".to_string()),
            ..Default::default()
        };
        assert_eq!(create_processor(&settings).unwrap().name(), "my-agent");

        let missing = ProcessorSettings {
            kind: ProcessorKind::Command,
            ..Default::default()
        };
        assert!(create_processor(&missing).is_err());
    }
}
