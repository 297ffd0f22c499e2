//! Twilio-backed sms/whatsapp transport.
//!
//! One REST call per send against the Messages API. Every failure mode —
//! opt-out, local rate limit, HTTP error, provider rejection — comes back as
//! a non-`Sent` [`SendResult`]; nothing here returns an error to the engine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{error, info};

use leadflow_common::{Config, MessageChannel};

use crate::optout::OptOutRegistry;
use crate::ratelimit::RateLimiter;
use crate::sender::MessageSender;
use crate::types::SendResult;

pub struct TwilioSender {
    http: Client,
    account_sid: String,
    auth_token: String,
    sms_from: String,
    whatsapp_from: String,
    sms_limiter: RateLimiter,
    whatsapp_limiter: RateLimiter,
    opt_outs: Arc<OptOutRegistry>,
}

impl TwilioSender {
    pub fn new(config: &Config, opt_outs: Arc<OptOutRegistry>) -> Self {
        Self {
            http: Client::new(),
            account_sid: config.twilio_account_sid.clone(),
            auth_token: config.twilio_auth_token.clone(),
            sms_from: config.twilio_sms_from.clone(),
            whatsapp_from: config.twilio_whatsapp_from.clone(),
            sms_limiter: RateLimiter::new(config.sms_rate_per_minute),
            whatsapp_limiter: RateLimiter::new(config.whatsapp_rate_per_minute),
            opt_outs,
        }
    }

    /// Register an opt-out so later sends short-circuit to `OptedOut`.
    pub fn opt_out(&self, lead_id: &str) {
        self.opt_outs.opt_out(lead_id);
    }

    /// POST one message to the Twilio Messages API. Returns the provider
    /// message sid on success, an error description otherwise.
    async fn post_message(&self, to: &str, from: &str, body: &str) -> Result<String, String> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );

        let mut form: HashMap<&str, &str> = HashMap::new();
        form.insert("To", to);
        form.insert("From", from);
        form.insert("Body", body);

        let response = self
            .http
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| format!("unparseable response: {e}"))?;

        if !status.is_success() {
            let message = payload
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown provider error");
            return Err(format!("provider error ({status}): {message}"));
        }

        payload
            .get("sid")
            .and_then(|s| s.as_str())
            .map(str::to_string)
            .ok_or_else(|| "response missing message sid".to_string())
    }

    async fn send_mobile(
        &self,
        lead_id: &str,
        channel: MessageChannel,
        to: &str,
        from: &str,
        body: &str,
        limiter: &RateLimiter,
    ) -> SendResult {
        if self.opt_outs.is_opted_out(lead_id) {
            return SendResult::opted_out(lead_id, channel, body);
        }
        if !limiter.allow() {
            return SendResult::failed(lead_id, channel, body, "rate_limited");
        }

        match self.post_message(to, from, body).await {
            Ok(sid) => {
                info!(lead_id, message_id = sid.as_str(), %channel, "Message sent");
                SendResult::sent(sid, lead_id, channel, body)
            }
            Err(e) => {
                error!(lead_id, %channel, error = e.as_str(), "Message send failed");
                SendResult::failed(lead_id, channel, body, e)
            }
        }
    }
}

#[async_trait]
impl MessageSender for TwilioSender {
    async fn send_sms(&self, lead_id: &str, to_number: &str, body: &str) -> SendResult {
        self.send_mobile(
            lead_id,
            MessageChannel::Sms,
            to_number,
            &self.sms_from,
            body,
            &self.sms_limiter,
        )
        .await
    }

    async fn send_whatsapp(&self, lead_id: &str, to_number: &str, body: &str) -> SendResult {
        let to = format!("whatsapp:{to_number}");
        let from = format!("whatsapp:{}", self.whatsapp_from);
        self.send_mobile(
            lead_id,
            MessageChannel::Whatsapp,
            &to,
            &from,
            body,
            &self.whatsapp_limiter,
        )
        .await
    }

    async fn send_email(&self, lead_id: &str, to_email: &str, subject: &str, _body: &str) -> bool {
        // Email rides the ESP integration, not Twilio. Acknowledge and let
        // the delivery webhook feed engagement events back in.
        info!(lead_id, to_email, subject, "Email handed to ESP");
        true
    }
}
