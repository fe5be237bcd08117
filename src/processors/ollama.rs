//! Ollama HTTP processor.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::processor::{Processor, ProcessorError, Result};
use crate::core::QueuedMessage;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// System prompt used when the carrier holds an aggregated burst.
const BURST_SYSTEM_PROMPT: &str = "The customer sent several messages in a row. \
Answer them together in a single reply.";

pub struct OllamaProcessor {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OllamaProcessor {
    pub fn new() -> Self {
        Self::with_config(None, None)
    }

    pub fn with_config(base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn map_error(&self, e: reqwest::Error) -> ProcessorError {
        if e.is_timeout() {
            ProcessorError::Timeout(self.timeout)
        } else {
            ProcessorError::HttpError(e)
        }
    }

    fn chat_request(&self, message: &QueuedMessage) -> ChatRequest {
        let mut messages = Vec::new();
        if !message.aggregated_messages.is_empty() {
            messages.push(Message {
                role: "system".to_string(),
                content: BURST_SYSTEM_PROMPT.to_string(),
            });
        }
        messages.push(Message {
            role: "user".to_string(),
            content: message.content.clone(),
        });

        ChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
        }
    }
}

impl Default for OllamaProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for OllamaProcessor {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn process(&self, message: &QueuedMessage) -> Result<String> {
        let request = self.chat_request(message);

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProcessorError::ApiError(format!("{}: {}", status, body)));
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| self.map_error(e))?;

        Ok(chat_response.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_trailing_slash() {
        let processor = OllamaProcessor::with_config(Some("http://gpu:11434/".to_string()), None);

        assert_eq!(processor.base_url, "http://gpu:11434");
        assert_eq!(processor.model, DEFAULT_MODEL);
        assert_eq!(processor.timeout, DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_unresponsive_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and never answer.
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let processor = OllamaProcessor::with_config(Some(format!("http://{}", addr)), None)
            .with_timeout(Duration::from_millis(200));
        let err = processor
            .process(&QueuedMessage::sample("c1", "hi"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessorError::Timeout(t) if t == Duration::from_millis(200)));
    }

    #[test]
    fn test_burst_gets_system_prompt() {
        let processor = OllamaProcessor::new();
        let mut message = QueuedMessage::sample("c1", "hi");

        let single = serde_json::to_value(processor.chat_request(&message)).unwrap();
        assert_eq!(single["messages"].as_array().unwrap().len(), 1);
        assert_eq!(single["stream"], false);

        message.aggregated_messages.push("need a refund".to_string());
        let burst = serde_json::to_value(processor.chat_request(&message)).unwrap();
        assert_eq!(burst["messages"][0]["role"], "system");
        assert_eq!(burst["messages"][1]["content"], "hi");
    }
}
