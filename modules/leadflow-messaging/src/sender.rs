//! Message sending collaborator.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use leadflow_common::MessageChannel;

use crate::types::{SendResult, SendStatus};

/// Outbound transport. Implementations never panic and never retry; every
/// failure mode is expressed as a non-`Sent` [`SendResult`] status.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_sms(&self, lead_id: &str, to_number: &str, body: &str) -> SendResult;

    async fn send_whatsapp(&self, lead_id: &str, to_number: &str, body: &str) -> SendResult;

    /// Email goes through the ESP integration; callers only learn accepted/not.
    async fn send_email(&self, lead_id: &str, to_email: &str, subject: &str, body: &str) -> bool;
}

#[async_trait]
impl<M: MessageSender + ?Sized> MessageSender for Arc<M> {
    async fn send_sms(&self, lead_id: &str, to_number: &str, body: &str) -> SendResult {
        (**self).send_sms(lead_id, to_number, body).await
    }

    async fn send_whatsapp(&self, lead_id: &str, to_number: &str, body: &str) -> SendResult {
        (**self).send_whatsapp(lead_id, to_number, body).await
    }

    async fn send_email(&self, lead_id: &str, to_email: &str, subject: &str, body: &str) -> bool {
        (**self).send_email(lead_id, to_email, subject, body).await
    }
}

// ---------------------------------------------------------------------------
// MockSender (tests — no provider required)
// ---------------------------------------------------------------------------

/// Recording sender for tests. Every send succeeds unless an outcome is
/// scripted with [`MockSender::set_outcome`].
#[derive(Default)]
pub struct MockSender {
    sends: Mutex<Vec<SendResult>>,
    outcome: Mutex<SendStatus>,
}

impl MockSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the status of all subsequent sends.
    pub fn set_outcome(&self, status: SendStatus) {
        *self.outcome.lock().unwrap() = status;
    }

    /// All recorded sends (for test assertions).
    pub fn sends(&self) -> Vec<SendResult> {
        self.sends.lock().unwrap().clone()
    }

    fn record(&self, lead_id: &str, channel: MessageChannel, to: &str, body: &str) -> SendResult {
        let status = *self.outcome.lock().unwrap();
        let mut result = match status {
            SendStatus::Sent => SendResult::sent(
                format!("mock-{}", self.sends.lock().unwrap().len() + 1),
                lead_id,
                channel,
                body,
            ),
            SendStatus::OptedOut => SendResult::opted_out(lead_id, channel, body),
            _ => SendResult::failed(lead_id, channel, body, "mock_failure"),
        };
        result.metadata.insert("to".to_string(), to.to_string());
        self.sends.lock().unwrap().push(result.clone());
        result
    }
}

#[async_trait]
impl MessageSender for MockSender {
    async fn send_sms(&self, lead_id: &str, to_number: &str, body: &str) -> SendResult {
        self.record(lead_id, MessageChannel::Sms, to_number, body)
    }

    async fn send_whatsapp(&self, lead_id: &str, to_number: &str, body: &str) -> SendResult {
        self.record(lead_id, MessageChannel::Whatsapp, to_number, body)
    }

    async fn send_email(&self, lead_id: &str, to_email: &str, _subject: &str, body: &str) -> bool {
        self.record(lead_id, MessageChannel::Email, to_email, body);
        true
    }
}
