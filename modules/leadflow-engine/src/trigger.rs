//! Reactive trigger rules.
//!
//! Rules run in a fixed, hand-authored priority order. The first rule whose
//! precondition holds decides the whole cycle — it either sends one message
//! or explicitly suppresses — and later rules are never consulted. A rule
//! whose precondition fails falls through silently. Every evaluation writes
//! exactly one audit entry, whatever the outcome.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{error, info, warn};

use leadflow_common::{
    LeadState, MessageChannel, MetricsRecorder, NoopMetrics, EMAIL_SENT_EVENT, REPLY_EVENT_TYPES,
    UNSUBSCRIBE_EVENT,
};
use leadflow_content::ContentRenderer;
use leadflow_messaging::{MessageSender, SendResult};
use leadflow_store::{AuditEntry, AuditLog, LeadStore};

use crate::cooldown::CooldownLedger;

const CART_ABANDON_MIN_AGE_MINUTES: i64 = 60;
const CART_COOLDOWN_MINUTES: i64 = 120;
const NUDGE_COOLDOWN_MINUTES: i64 = 180;
const COLD_SCORE_THRESHOLD: i32 = 3;
const COLD_MIN_EMAIL_SENDS: usize = 2;

const CART_RECOVERY_TEMPLATE: &str = "cart_recovery_whatsapp";
const COLD_NUDGE_TEMPLATE: &str = "cold_lead_sms";

pub struct TriggerEvaluator {
    renderer: Arc<dyn ContentRenderer>,
    sender: Arc<dyn MessageSender>,
    audit: Arc<dyn AuditLog>,
    cooldowns: CooldownLedger,
    metrics: Arc<dyn MetricsRecorder>,
}

impl TriggerEvaluator {
    pub fn new(
        renderer: Arc<dyn ContentRenderer>,
        sender: Arc<dyn MessageSender>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            renderer,
            sender,
            audit,
            cooldowns: CooldownLedger::new(),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Evaluate the rule chain against a lead's current state. Returns the
    /// send result when a rule fired, None when suppressed or nothing
    /// matched. Reads the state only; the single side effect beyond the send
    /// itself is one audit entry.
    pub async fn evaluate_and_trigger(&self, state: &LeadState) -> Result<Option<SendResult>> {
        let now = Utc::now();
        let lead_id = state.lead_id.as_str();

        // Rule 1: abandoned cart, recovered over whatsapp.
        if let Some(abandoned_at) = cart_abandoned_at(state) {
            if now - abandoned_at > Duration::minutes(CART_ABANDON_MIN_AGE_MINUTES) {
                let whatsapp = state.metadata.get("whatsapp");
                let reserved = whatsapp.is_some()
                    && self.cooldowns.check_and_reserve(
                        lead_id,
                        MessageChannel::Whatsapp,
                        Duration::minutes(CART_COOLDOWN_MINUTES),
                        now,
                    );
                return match (whatsapp, reserved) {
                    (Some(to), true) => {
                        let vars = personalization(
                            state,
                            &[
                                ("first_name", "first_name", "there"),
                                ("product", "cart_product", "our product"),
                                ("offer_code", "cart_offer_code", "WELCOME"),
                                ("short_url", "cart_url", "bit.ly/offer"),
                            ],
                        );
                        let result = self
                            .render_and_send(
                                state,
                                CART_RECOVERY_TEMPLATE,
                                "cart_recovery",
                                MessageChannel::Whatsapp,
                                to,
                                vars,
                            )
                            .await?;
                        Ok(Some(result))
                    }
                    _ => {
                        self.suppress(
                            lead_id,
                            "cart_recovery",
                            "whatsapp",
                            "cooldown_or_missing_whatsapp",
                        )
                        .await?;
                        Ok(None)
                    }
                };
            }
        }

        // Rule 2: cold lead after repeated email sends, nudged over sms.
        let email_sends = state
            .engagement_history
            .iter()
            .filter(|e| e.event_type == EMAIL_SENT_EVENT)
            .count();
        if state.engagement_score < COLD_SCORE_THRESHOLD && email_sends >= COLD_MIN_EMAIL_SENDS {
            let phone = state.metadata.get("phone");
            let reserved = phone.is_some()
                && self.cooldowns.check_and_reserve(
                    lead_id,
                    MessageChannel::Sms,
                    Duration::minutes(NUDGE_COOLDOWN_MINUTES),
                    now,
                );
            return match (phone, reserved) {
                (Some(to), true) => {
                    let vars = personalization(
                        state,
                        &[
                            ("first_name", "first_name", "there"),
                            ("product", "product", "our product"),
                            ("offer_code", "offer_code", "WELCOME"),
                            ("short_url", "short_url", "bit.ly/offer"),
                        ],
                    );
                    let result = self
                        .render_and_send(
                            state,
                            COLD_NUDGE_TEMPLATE,
                            "cold_lead_nudge",
                            MessageChannel::Sms,
                            to,
                            vars,
                        )
                        .await?;
                    Ok(Some(result))
                }
                _ => {
                    self.suppress(
                        lead_id,
                        "cold_lead_nudge",
                        "sms",
                        "cooldown_or_missing_phone",
                    )
                    .await?;
                    Ok(None)
                }
            };
        }

        // Rule 3: the lead replied somewhere — stop all reactive outreach.
        let replied = state
            .engagement_history
            .iter()
            .any(|e| REPLY_EVENT_TYPES.contains(&e.event_type.as_str()));
        if replied {
            self.suppress(lead_id, "reply_ack", "all", "reply_received")
                .await?;
            return Ok(None);
        }

        // Rule 4: unsubscribed.
        let unsubscribed = state
            .engagement_history
            .iter()
            .any(|e| e.event_type == UNSUBSCRIBE_EVENT);
        if unsubscribed {
            self.suppress(lead_id, "unsubscribe", "all", "unsubscribed")
                .await?;
            return Ok(None);
        }

        // No rule matched.
        self.audit
            .append(AuditEntry::new(
                lead_id,
                "no_trigger",
                "none",
                "skipped",
                json!({}),
            ))
            .await?;
        Ok(None)
    }

    /// Reload the lead's state and evaluate. All failures are logged and
    /// swallowed — callers mutating state must never be aborted by trigger
    /// evaluation.
    pub async fn evaluate_fresh(&self, store: &dyn LeadStore, lead_id: &str) {
        let state = match store.load(lead_id).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                warn!(lead_id, "Lead state missing for trigger evaluation");
                return;
            }
            Err(e) => {
                error!(lead_id, error = %e, "Failed to reload lead state for trigger evaluation");
                return;
            }
        };
        match self.evaluate_and_trigger(&state).await {
            Ok(Some(result)) => {
                info!(lead_id, status = %result.status, channel = %result.channel, "Trigger fired");
            }
            Ok(None) => {}
            Err(e) => {
                error!(lead_id, error = %e, "Trigger evaluation failed");
            }
        }
    }

    /// Render and send on the rule's channel. The cooldown slot is already
    /// reserved by the caller; a render failure is converted into a Failed
    /// send result rather than raised.
    async fn render_and_send(
        &self,
        state: &LeadState,
        template_id: &str,
        trigger_type: &str,
        channel: MessageChannel,
        to: &str,
        vars: HashMap<String, String>,
    ) -> Result<SendResult> {
        let lead_id = state.lead_id.as_str();
        let lang = state
            .metadata
            .get("lang")
            .map(String::as_str)
            .unwrap_or("en");

        let result = match self.renderer.render(template_id, &vars, channel, lang).await {
            Ok(content) => match channel {
                MessageChannel::Whatsapp => {
                    self.sender.send_whatsapp(lead_id, to, &content.body).await
                }
                MessageChannel::Sms => self.sender.send_sms(lead_id, to, &content.body).await,
                _ => SendResult::failed(lead_id, channel, content.body, "unsupported_channel"),
            },
            Err(e) => {
                warn!(lead_id, template_id, error = %e, "Trigger content render failed");
                SendResult::failed(lead_id, channel, "", "render_failed")
            }
        };

        self.metrics.incr_counter(
            "leadflow_triggers_fired_total",
            &[("type", trigger_type), ("channel", &channel.to_string())],
        );
        self.audit
            .append(AuditEntry::new(
                lead_id,
                trigger_type,
                channel.to_string(),
                result.status.to_string(),
                json!({ "content": result.content.clone() }),
            ))
            .await?;

        Ok(result)
    }

    async fn suppress(
        &self,
        lead_id: &str,
        trigger_type: &str,
        channel: &str,
        reason: &str,
    ) -> Result<()> {
        self.metrics
            .incr_counter("leadflow_triggers_suppressed_total", &[("reason", reason)]);
        self.audit
            .append(AuditEntry::new(
                lead_id,
                trigger_type,
                channel,
                "suppressed",
                json!({ "reason": reason }),
            ))
            .await
    }
}

/// Parse `metadata.cart_abandoned_at`. Accepts RFC 3339 or a bare ISO
/// datetime (assumed UTC). Unparseable values disable the rule.
fn cart_abandoned_at(state: &LeadState) -> Option<DateTime<Utc>> {
    let raw = state.metadata.get("cart_abandoned_at")?;
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    match chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Some(naive.and_utc()),
        Err(e) => {
            warn!(lead_id = state.lead_id.as_str(), error = %e, "Unparseable cart_abandoned_at");
            None
        }
    }
}

/// Build the personalization map from lead metadata with per-key defaults.
fn personalization(
    state: &LeadState,
    keys: &[(&str, &str, &str)],
) -> HashMap<String, String> {
    keys.iter()
        .map(|(out_key, meta_key, default)| {
            let value = state
                .metadata
                .get(*meta_key)
                .cloned()
                .unwrap_or_else(|| default.to_string());
            (out_key.to_string(), value)
        })
        .collect()
}
