use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use leadflow_common::MessageChannel;

/// Delivery outcome of one outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Queued,
    #[default]
    Sent,
    Delivered,
    Read,
    Failed,
    Replied,
    OptedOut,
}

impl std::fmt::Display for SendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendStatus::Queued => write!(f, "queued"),
            SendStatus::Sent => write!(f, "sent"),
            SendStatus::Delivered => write!(f, "delivered"),
            SendStatus::Read => write!(f, "read"),
            SendStatus::Failed => write!(f, "failed"),
            SendStatus::Replied => write!(f, "replied"),
            SendStatus::OptedOut => write!(f, "opted_out"),
        }
    }
}

/// Result of one send attempt. Any status other than `Sent` is a non-fatal
/// failure the caller logs; the engine never retries transport-level sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    /// Provider message id, or a generated id when the provider never saw it.
    pub message_id: String,
    pub lead_id: String,
    pub channel: MessageChannel,
    pub status: SendStatus,
    pub content: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SendResult {
    pub fn sent(
        message_id: impl Into<String>,
        lead_id: impl Into<String>,
        channel: MessageChannel,
        content: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            lead_id: lead_id.into(),
            channel,
            status: SendStatus::Sent,
            content: Some(content.into()),
            sent_at: Some(Utc::now()),
            metadata: HashMap::new(),
        }
    }

    pub fn failed(
        lead_id: impl Into<String>,
        channel: MessageChannel,
        content: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("reason".to_string(), reason.into());
        Self {
            message_id: Uuid::new_v4().to_string(),
            lead_id: lead_id.into(),
            channel,
            status: SendStatus::Failed,
            content: Some(content.into()),
            sent_at: Some(Utc::now()),
            metadata,
        }
    }

    pub fn opted_out(
        lead_id: impl Into<String>,
        channel: MessageChannel,
        content: impl Into<String>,
    ) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("reason".to_string(), "opted_out".to_string());
        Self {
            message_id: Uuid::new_v4().to_string(),
            lead_id: lead_id.into(),
            channel,
            status: SendStatus::OptedOut,
            content: Some(content.into()),
            sent_at: Some(Utc::now()),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_status_and_reason() {
        let sent = SendResult::sent("SM1", "lead_1", MessageChannel::Sms, "hi");
        assert_eq!(sent.status, SendStatus::Sent);
        assert!(sent.metadata.is_empty());

        let failed = SendResult::failed("lead_1", MessageChannel::Sms, "hi", "rate_limited");
        assert_eq!(failed.status, SendStatus::Failed);
        assert_eq!(failed.metadata.get("reason").map(String::as_str), Some("rate_limited"));

        let opted = SendResult::opted_out("lead_1", MessageChannel::Whatsapp, "hi");
        assert_eq!(opted.status, SendStatus::OptedOut);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&SendStatus::OptedOut).unwrap();
        assert_eq!(json, "\"opted_out\"");
    }
}
