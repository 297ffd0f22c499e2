//! Engagement scoring.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use leadflow_common::{score_delta, EngagementEvent, MetricsRecorder, NoopMetrics};
use leadflow_store::LeadStore;

use crate::trigger::TriggerEvaluator;

/// Leads at or above this score keep receiving scripted stages.
pub const DEFAULT_PAUSE_THRESHOLD: i32 = 0;

/// Converts inbound engagement events into score and history updates, then
/// hands the fresh state to the trigger evaluator.
pub struct EngagementScorer {
    store: Arc<dyn LeadStore>,
    trigger: Arc<TriggerEvaluator>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl EngagementScorer {
    pub fn new(store: Arc<dyn LeadStore>, trigger: Arc<TriggerEvaluator>) -> Self {
        Self {
            store,
            trigger,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Track one engagement event. Unknown leads are a logged no-op; trigger
    /// evaluation failures never reach the caller.
    pub async fn track_event(
        &self,
        lead_id: &str,
        event_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let Some(mut state) = self.store.load(lead_id).await? else {
            warn!(lead_id, event_type, "Lead state not found for event");
            return Ok(());
        };

        let delta = score_delta(event_type);
        state.record_event(event_type, delta, metadata, Utc::now());
        self.store.save(&state).await?;

        self.metrics.incr_counter(
            "leadflow_engagement_events_total",
            &[("event_type", event_type)],
        );
        self.metrics.set_gauge(
            "leadflow_lead_scores",
            &[("lead_id", lead_id), ("campaign_id", &state.campaign_id)],
            state.engagement_score as f64,
        );
        info!(
            lead_id,
            event_type,
            score_delta = delta,
            new_score = state.engagement_score,
            "Engagement event tracked"
        );

        // Evaluation must observe the persisted state and must never abort
        // event tracking; evaluate_fresh logs and swallows its own failures.
        self.trigger.evaluate_fresh(self.store.as_ref(), lead_id).await;

        Ok(())
    }

    /// Current engagement score; 0 for unknown leads.
    pub async fn get_lead_score(&self, lead_id: &str) -> Result<i32> {
        Ok(self
            .store
            .load(lead_id)
            .await?
            .map(|s| s.engagement_score)
            .unwrap_or(0))
    }

    /// True iff the lead's score has fallen below `min_score`.
    pub async fn should_pause_lead(&self, lead_id: &str, min_score: i32) -> Result<bool> {
        Ok(self
            .store
            .load(lead_id)
            .await?
            .map(|s| s.should_pause(min_score))
            .unwrap_or(false))
    }

    /// Full event history, oldest first; empty for unknown leads.
    pub async fn get_engagement_history(&self, lead_id: &str) -> Result<Vec<EngagementEvent>> {
        Ok(self
            .store
            .load(lead_id)
            .await?
            .map(|s| s.engagement_history)
            .unwrap_or_default())
    }

    /// Clear score and history. Status is left untouched.
    pub async fn reset_lead_score(&self, lead_id: &str) -> Result<()> {
        let Some(mut state) = self.store.load(lead_id).await? else {
            warn!(lead_id, "Lead state not found for score reset");
            return Ok(());
        };

        state.engagement_score = 0;
        state.engagement_history.clear();
        self.store.save(&state).await?;

        self.metrics.set_gauge(
            "leadflow_lead_scores",
            &[("lead_id", lead_id), ("campaign_id", &state.campaign_id)],
            0.0,
        );
        info!(lead_id, "Lead score reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_common::{LeadState, StageDefinition};
    use leadflow_content::TemplateCatalog;
    use leadflow_messaging::MockSender;
    use leadflow_store::{AuditLog, MemoryAuditLog, MemoryLeadStore};

    struct Harness {
        scorer: EngagementScorer,
        store: Arc<MemoryLeadStore>,
        audit: Arc<MemoryAuditLog>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryLeadStore::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let trigger = Arc::new(TriggerEvaluator::new(
            Arc::new(TemplateCatalog::new()),
            Arc::new(MockSender::new()),
            audit.clone(),
        ));
        Harness {
            scorer: EngagementScorer::new(store.clone(), trigger),
            store,
            audit,
        }
    }

    async fn seed_lead(store: &MemoryLeadStore, lead_id: &str) {
        let defs = vec![StageDefinition {
            stage_id: "intro".to_string(),
            template_id: "intro_email".to_string(),
            delay_hours: 24,
            max_attempts: Some(3),
        }];
        let state = LeadState::new(lead_id, "campaign_1", &defs, Utc::now());
        store.save(&state).await.unwrap();
    }

    #[tokio::test]
    async fn scores_accumulate_in_event_order() {
        let h = harness();
        seed_lead(&h.store, "lead_1").await;

        for event in ["email_open", "email_click", "email_reply"] {
            h.scorer
                .track_event("lead_1", event, HashMap::new())
                .await
                .unwrap();
        }

        assert_eq!(h.scorer.get_lead_score("lead_1").await.unwrap(), 9);
        let history = h.scorer.get_engagement_history("lead_1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].event_type, "email_open");
        assert_eq!(history[2].score_delta, 5);
    }

    #[tokio::test]
    async fn negative_events_drive_the_score_down() {
        let h = harness();
        seed_lead(&h.store, "lead_1").await;

        h.scorer
            .track_event("lead_1", "email_open", HashMap::new())
            .await
            .unwrap();
        h.scorer
            .track_event("lead_1", "unsubscribe", HashMap::new())
            .await
            .unwrap();

        assert_eq!(h.scorer.get_lead_score("lead_1").await.unwrap(), -9);
    }

    #[tokio::test]
    async fn unknown_event_types_contribute_zero() {
        let h = harness();
        seed_lead(&h.store, "lead_1").await;

        h.scorer
            .track_event("lead_1", "carrier_pigeon_arrived", HashMap::new())
            .await
            .unwrap();

        assert_eq!(h.scorer.get_lead_score("lead_1").await.unwrap(), 0);
        let history = h.scorer.get_engagement_history("lead_1").await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn unknown_lead_is_a_silent_noop() {
        let h = harness();
        h.scorer
            .track_event("ghost", "email_open", HashMap::new())
            .await
            .unwrap();
        assert_eq!(h.scorer.get_lead_score("ghost").await.unwrap(), 0);
        assert!(h
            .scorer
            .get_engagement_history("ghost")
            .await
            .unwrap()
            .is_empty());
        // No state, no evaluation, no audit entry.
        assert!(h.audit.entries().is_empty());
    }

    #[tokio::test]
    async fn every_tracked_event_is_followed_by_an_evaluation() {
        let h = harness();
        seed_lead(&h.store, "lead_1").await;

        h.scorer
            .track_event("lead_1", "email_open", HashMap::new())
            .await
            .unwrap();

        let entries = h.audit.entries_for("lead_1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].trigger_type, "no_trigger");
    }

    #[tokio::test]
    async fn pause_threshold_is_strictly_below() {
        let h = harness();
        seed_lead(&h.store, "lead_1").await;

        h.scorer
            .track_event("lead_1", "email_open", HashMap::new())
            .await
            .unwrap();
        assert!(!h.scorer.should_pause_lead("lead_1", 0).await.unwrap());

        h.scorer
            .track_event("lead_1", "spam_report", HashMap::new())
            .await
            .unwrap();
        assert!(h.scorer.should_pause_lead("lead_1", 0).await.unwrap());
        assert!(!h.scorer.should_pause_lead("ghost", 0).await.unwrap());
    }

    #[tokio::test]
    async fn reset_clears_score_and_history_but_not_status() {
        let h = harness();
        seed_lead(&h.store, "lead_1").await;
        h.scorer
            .track_event("lead_1", "spam_report", HashMap::new())
            .await
            .unwrap();

        h.scorer.reset_lead_score("lead_1").await.unwrap();

        let state = h.store.load("lead_1").await.unwrap().unwrap();
        assert_eq!(state.engagement_score, 0);
        assert!(state.engagement_history.is_empty());
        assert_eq!(state.status, leadflow_common::LeadStatus::Active);
    }
}
