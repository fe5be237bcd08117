//! Intake middleware between the HTTP layer and the queue service.
//!
//! Enqueues and acknowledges immediately; processing happens later on the
//! worker. Text that looks urgent is escalated to the highest priority.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::{EnqueueResult, MessageQueueService, NewMessage, Priority, RejectReason};

const URGENT_PATTERN: &str = r"(?i)\b(urgent|asap|emergency|immediately|critical)\b";

/// Inbound message as received from a channel.
#[derive(Deserialize, Debug, Clone)]
pub struct InboundMessage {
    pub customer_id: String,
    pub content: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    pub message_id: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub is_typing: bool,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_channel() -> String {
    "web".to_string()
}

/// Acknowledgement status.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Queued,
    Duplicate,
    Rejected,
}

/// Immediate reply to the caller; never waits for processing.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Acknowledgement {
    pub status: AckStatus,
    pub queued: bool,
    pub message_id: Option<String>,
    pub priority: Option<u8>,
    pub reason: Option<String>,
}

impl Acknowledgement {
    fn from_result(result: EnqueueResult, priority: Priority) -> Self {
        match result.reason {
            None => Self {
                status: AckStatus::Queued,
                queued: true,
                message_id: Some(result.message_id),
                priority: Some(priority.into()),
                reason: None,
            },
            Some(RejectReason::Duplicate) => Self {
                status: AckStatus::Duplicate,
                queued: false,
                message_id: Some(result.message_id),
                priority: None,
                reason: Some(RejectReason::Duplicate.to_string()),
            },
            Some(RejectReason::Full) => Self {
                status: AckStatus::Rejected,
                queued: false,
                message_id: None,
                priority: None,
                reason: Some(RejectReason::Full.to_string()),
            },
        }
    }
}

/// Thin adapter used by the API layer.
#[derive(Clone)]
pub struct QueueMiddleware {
    service: MessageQueueService,
    urgent: Option<Regex>,
}

impl QueueMiddleware {
    pub fn new(service: MessageQueueService) -> Self {
        let urgent = Regex::new(URGENT_PATTERN).ok();
        if urgent.is_none() {
            tracing::warn!("Urgency pattern failed to compile, priority escalation disabled");
        }
        Self { service, urgent }
    }

    pub fn service(&self) -> &MessageQueueService {
        &self.service
    }

    /// Priority after applying the urgency heuristic.
    pub fn effective_priority(&self, content: &str, requested: Priority) -> Priority {
        match &self.urgent {
            Some(re) if re.is_match(content) => Priority::Urgent,
            _ => requested,
        }
    }

    /// Enqueue and return at once.
    pub async fn enqueue_and_acknowledge(&self, inbound: InboundMessage) -> Acknowledgement {
        let priority = self.effective_priority(&inbound.content, inbound.priority);
        if priority != inbound.priority {
            tracing::debug!(
                customer_id = %inbound.customer_id,
                "Escalated urgent-looking message to priority {}",
                u8::from(priority)
            );
        }

        let result = self
            .service
            .enqueue(NewMessage {
                customer_id: inbound.customer_id,
                content: inbound.content,
                channel: inbound.channel,
                message_id: inbound.message_id,
                priority,
                is_typing: inbound.is_typing,
                metadata: inbound.metadata,
            })
            .await;

        Acknowledgement::from_result(result, priority)
    }
}
