//! Per-lead, per-channel trigger cooldowns.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use leadflow_common::MessageChannel;

/// Last-trigger timestamps keyed by (lead, channel). Process-local.
///
/// Checking and reserving are one atomic operation under the lock, so two
/// concurrent evaluations for the same pair can never both fire. The slot is
/// reserved *before* the send is attempted: a transient send failure still
/// burns the window for that pair. That trades a silenced retry for never
/// hammering a channel with rapid re-sends.
#[derive(Default)]
pub struct CooldownLedger {
    slots: Mutex<HashMap<(String, MessageChannel), DateTime<Utc>>>,
}

impl CooldownLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// If the pair is outside its cooldown window, reserve the slot at `now`
    /// and return true. Inside the window, return false without touching it.
    pub fn check_and_reserve(
        &self,
        lead_id: &str,
        channel: MessageChannel,
        window: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let mut slots = self.slots.lock().unwrap();
        let key = (lead_id.to_string(), channel);
        if let Some(last) = slots.get(&key) {
            if now - *last < window {
                return false;
            }
        }
        slots.insert(key, now);
        true
    }
}
