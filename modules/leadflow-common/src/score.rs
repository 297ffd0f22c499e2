//! Engagement scoring rules.
//!
//! The table is fixed and hand-authored. Event types outside it contribute
//! zero so that new channel signals can flow through the history without
//! moving scores until a rule is added here.

/// Score delta for an engagement event type. Unknown types score 0.
pub fn score_delta(event_type: &str) -> i32 {
    match event_type {
        "email_open" => 1,
        "email_click" => 3,
        "email_reply" => 5,
        "unsubscribe" => -10,
        "bounce" => -5,
        "spam_report" => -15,
        _ => 0,
    }
}

/// Inbound reply tags across all channels. Any of these suppresses
/// reactive triggers for the lead.
pub const REPLY_EVENT_TYPES: &[&str] = &[
    "email_reply",
    "linkedin_reply",
    "sms_reply",
    "whatsapp_reply",
];

/// Outbound send marker counted by the cold-lead rule.
pub const EMAIL_SENT_EVENT: &str = "email_sent";

pub const UNSUBSCRIBE_EVENT: &str = "unsubscribe";
