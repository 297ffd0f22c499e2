//! Postgres-backed store implementations.
//!
//! Lead and campaign state round-trip through JSONB columns keyed by their
//! ids; the audit log is an append-only table ordered by BIGSERIAL. Single
//! statements are atomic, but the engine's load/mutate/save cycle is not
//! serialized here — see the warning on [`crate::lead::LeadStore`].

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

use leadflow_common::{LeadState, StageDefinition};

use crate::audit::{AuditEntry, AuditLog};
use crate::campaign::CampaignStore;
use crate::lead::LeadStore;

/// Create the leadflow tables if they do not exist.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leads (
            lead_id TEXT PRIMARY KEY,
            campaign_id TEXT NOT NULL,
            state JSONB NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS campaigns (
            campaign_id TEXT PRIMARY KEY,
            stages JSONB NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trigger_audit (
            seq BIGSERIAL PRIMARY KEY,
            id UUID NOT NULL,
            ts TIMESTAMPTZ NOT NULL,
            lead_id TEXT NOT NULL,
            trigger_type TEXT NOT NULL,
            channel TEXT NOT NULL,
            status TEXT NOT NULL,
            details JSONB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS trigger_audit_lead_idx ON trigger_audit (lead_id, seq)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// PgLeadStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgLeadStore {
    pool: PgPool,
}

impl PgLeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn load(&self, lead_id: &str) -> Result<Option<LeadState>> {
        let row = sqlx::query_as::<_, (serde_json::Value,)>(
            "SELECT state FROM leads WHERE lead_id = $1",
        )
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((value,)) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, state: &LeadState) -> Result<()> {
        let value = serde_json::to_value(state)?;
        sqlx::query(
            r#"
            INSERT INTO leads (lead_id, campaign_id, state, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (lead_id)
            DO UPDATE SET state = EXCLUDED.state, updated_at = now()
            "#,
        )
        .bind(&state.lead_id)
        .bind(&state.campaign_id)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PgCampaignStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgCampaignStore {
    pool: PgPool,
}

impl PgCampaignStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignStore for PgCampaignStore {
    async fn load_stages(&self, campaign_id: &str) -> Result<Option<Vec<StageDefinition>>> {
        let row = sqlx::query_as::<_, (serde_json::Value,)>(
            "SELECT stages FROM campaigns WHERE campaign_id = $1",
        )
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((value,)) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn save_stages(&self, campaign_id: &str, stages: &[StageDefinition]) -> Result<()> {
        let value = serde_json::to_value(stages)?;
        sqlx::query(
            r#"
            INSERT INTO campaigns (campaign_id, stages, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (campaign_id)
            DO UPDATE SET stages = EXCLUDED.stages, updated_at = now()
            "#,
        )
        .bind(campaign_id)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PgAuditLog
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trigger_audit (id, ts, lead_id, trigger_type, channel, status, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.ts)
        .bind(&entry.lead_id)
        .bind(&entry.trigger_type)
        .bind(&entry.channel)
        .bind(&entry.status)
        .bind(&entry.details)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn entries_for(&self, lead_id: &str) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT id, ts, lead_id, trigger_type, channel, status, details
            FROM trigger_audit
            WHERE lead_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for AuditEntry {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(AuditEntry {
            id: row.try_get("id")?,
            ts: row.try_get("ts")?,
            lead_id: row.try_get("lead_id")?,
            trigger_type: row.try_get("trigger_type")?,
            channel: row.try_get("channel")?,
            status: row.try_get("status")?,
            details: row.try_get("details")?,
        })
    }
}
