//! External command processor.
//!
//! Runs a CLI (typically an agent binary) once per unit of work with the
//! message text as the final argument and returns its stdout.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use super::processor::{Processor, ProcessorError, Result};
use crate::core::QueuedMessage;

pub struct CommandProcessor {
    program: String,
    args: Vec<String>,
}

impl CommandProcessor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Processor for CommandProcessor {
    fn name(&self) -> &str {
        &self.program
    }

    async fn process(&self, message: &QueuedMessage) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&message.content)
            .env("INTAKE_CUSTOMER_ID", &message.customer_id)
            .env("INTAKE_MESSAGE_ID", &message.message_id)
            .env("INTAKE_CHANNEL", &message.channel)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessorError::NotAvailable(format!("{} not found on PATH", self.program))
            } else {
                ProcessorError::IoError(e)
            }
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ProcessorError::ApiError(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stdout_becomes_response() {
        let processor = CommandProcessor::new("echo", vec!["reply:".to_string()]);
        let message = QueuedMessage::sample("c1", "hello there");

        let response = processor.process(&message).await.unwrap();
        assert_eq!(response, "reply: hello there");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_an_error() {
        let processor = CommandProcessor::new("false", Vec::new());
        let message = QueuedMessage::sample("c1", "anything");

        let err = processor.process(&message).await.unwrap_err();
        assert!(matches!(err, ProcessorError::ApiError(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_not_available() {
        let processor = CommandProcessor::new("intake-no-such-binary", Vec::new());
        let message = QueuedMessage::sample("c1", "anything");

        let err = processor.process(&message).await.unwrap_err();
        assert!(matches!(err, ProcessorError::NotAvailable(_)));
    }
}
