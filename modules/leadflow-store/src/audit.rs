//! Trigger audit log — append-only record of every trigger evaluation.
//!
//! The trigger evaluator writes exactly one entry per evaluation, whether a
//! message fired, a rule suppressed, or nothing matched. The log is separate
//! from lead state and never read back by the engine's decision paths.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One trigger evaluation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub ts: DateTime<Utc>,
    pub lead_id: String,
    /// Which rule decided the cycle (`cart_recovery`, `cold_lead_nudge`,
    /// `reply_ack`, `unsubscribe`, `no_trigger`).
    pub trigger_type: String,
    /// Channel the rule targets; `all` / `none` for suppression-only rules.
    pub channel: String,
    /// Resulting status: a send status, `suppressed`, or `skipped`.
    pub status: String,
    pub details: serde_json::Value,
}

impl AuditEntry {
    pub fn new(
        lead_id: impl Into<String>,
        trigger_type: impl Into<String>,
        channel: impl Into<String>,
        status: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ts: Utc::now(),
            lead_id: lead_id.into(),
            trigger_type: trigger_type.into(),
            channel: channel.into(),
            status: status.into(),
            details,
        }
    }
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append one entry. Implementations must not reorder entries for a lead.
    async fn append(&self, entry: AuditEntry) -> Result<()>;

    /// All entries for a lead, oldest first.
    async fn entries_for(&self, lead_id: &str) -> Result<Vec<AuditEntry>>;
}

// ---------------------------------------------------------------------------
// MemoryAuditLog (tests — no database required)
// ---------------------------------------------------------------------------

/// In-memory audit log. Thread-safe.
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read all entries (for test assertions).
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    async fn entries_for(&self, lead_id: &str) -> Result<Vec<AuditEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.lead_id == lead_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl<L: AuditLog + ?Sized> AuditLog for Arc<L> {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        (**self).append(entry).await
    }

    async fn entries_for(&self, lead_id: &str) -> Result<Vec<AuditEntry>> {
        (**self).entries_for(lead_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn append_preserves_order_and_filters_by_lead() {
        let log = MemoryAuditLog::new();
        log.append(AuditEntry::new(
            "lead_1",
            "cart_recovery",
            "whatsapp",
            "sent",
            json!({}),
        ))
        .await
        .unwrap();
        log.append(AuditEntry::new(
            "lead_2",
            "no_trigger",
            "none",
            "skipped",
            json!({}),
        ))
        .await
        .unwrap();
        log.append(AuditEntry::new(
            "lead_1",
            "cart_recovery",
            "whatsapp",
            "suppressed",
            json!({"reason": "cooldown or missing whatsapp"}),
        ))
        .await
        .unwrap();

        let entries = log.entries_for("lead_1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, "sent");
        assert_eq!(entries[1].status, "suppressed");
        assert_eq!(log.entries().len(), 3);
    }
}
