//! Scripted sequence progression.
//!
//! `Active` is the only status that produces actions. Reading the next
//! action never advances the sequence — attempts and the stage index move
//! only through `complete_stage`, so repeated reads before a completion are
//! idempotent.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use leadflow_common::{LeadState, LeadStatus, MessageChannel, MetricsRecorder, NoopMetrics, StageDefinition};
use leadflow_content::{ContentRenderer, RenderedContent};
use leadflow_store::{CampaignStore, LeadStore};

use crate::scorer::{EngagementScorer, DEFAULT_PAUSE_THRESHOLD};
use crate::trigger::TriggerEvaluator;

/// The next scripted send for a lead, with rendered content.
#[derive(Debug, Clone)]
pub struct Action {
    pub stage_id: String,
    pub template_id: String,
    pub content: RenderedContent,
    pub context: ActionContext,
}

/// Dispatch context carried alongside the action.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub lead_id: String,
    pub campaign_id: String,
    pub stage: String,
    /// 1-based attempt number this action would be.
    pub attempt: u32,
}

pub struct SequenceProgressor {
    store: Arc<dyn LeadStore>,
    campaigns: Arc<dyn CampaignStore>,
    renderer: Arc<dyn ContentRenderer>,
    scorer: Arc<EngagementScorer>,
    trigger: Arc<TriggerEvaluator>,
    metrics: Arc<dyn MetricsRecorder>,
    pause_threshold: i32,
}

impl SequenceProgressor {
    pub fn new(
        store: Arc<dyn LeadStore>,
        campaigns: Arc<dyn CampaignStore>,
        renderer: Arc<dyn ContentRenderer>,
        scorer: Arc<EngagementScorer>,
        trigger: Arc<TriggerEvaluator>,
    ) -> Self {
        Self {
            store,
            campaigns,
            renderer,
            scorer,
            trigger,
            metrics: Arc::new(NoopMetrics),
            pause_threshold: DEFAULT_PAUSE_THRESHOLD,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_pause_threshold(mut self, threshold: i32) -> Self {
        self.pause_threshold = threshold;
        self
    }

    /// Create a lead's sequence state from the campaign's stage definitions
    /// and persist both. Store failures are the only errors surfaced.
    pub async fn initialize_lead_sequence(
        &self,
        lead_id: &str,
        campaign_id: &str,
        definitions: &[StageDefinition],
    ) -> Result<LeadState> {
        self.campaigns.save_stages(campaign_id, definitions).await?;

        let state = LeadState::new(lead_id, campaign_id, definitions, Utc::now());
        self.store.save(&state).await?;

        info!(
            lead_id,
            campaign_id,
            stages = definitions.len(),
            "Lead sequence initialized"
        );
        Ok(state)
    }

    /// Decide the next scripted action for a lead, or None when the lead is
    /// inactive, waiting out a stage delay, newly paused, or done. Pausing
    /// and completing happen here as side effects; nothing else mutates.
    pub async fn get_next_action(
        &self,
        lead_id: &str,
        campaign_id: &str,
    ) -> Result<Option<Action>> {
        let Some(mut state) = self.store.load(lead_id).await? else {
            return Ok(None);
        };
        if state.status != LeadStatus::Active {
            return Ok(None);
        }

        if state.sequence_exhausted() {
            state.complete();
            self.store.save(&state).await?;
            info!(lead_id, campaign_id, "Sequence complete");
            return Ok(None);
        }
        let stage = &state.sequence_stages[state.current_stage];
        let stage_id = stage.stage_id.clone();
        let template_id = stage.template_id.clone();
        let delay_hours = stage.delay_hours;
        let attempt = stage.attempts + 1;

        // Delay gate: the current stage may not fire until its delay has
        // elapsed since the predecessor completed.
        if let Some(completed_at) = state.previous_stage_ref().and_then(|p| p.completed_at) {
            let delay_until = completed_at + Duration::hours(delay_hours as i64);
            if Utc::now() < delay_until {
                return Ok(None);
            }
        }

        if self
            .scorer
            .should_pause_lead(lead_id, self.pause_threshold)
            .await?
        {
            state.pause()?;
            self.store.save(&state).await?;
            info!(lead_id, campaign_id, "Lead paused on low engagement");
            return Ok(None);
        }

        let content = self.render_stage_content(&state, &template_id).await;

        self.metrics.incr_counter(
            "leadflow_sequence_progress_total",
            &[("campaign_id", campaign_id), ("stage_id", &stage_id)],
        );

        Ok(Some(Action {
            stage_id: stage_id.clone(),
            template_id,
            content,
            context: ActionContext {
                lead_id: lead_id.to_string(),
                campaign_id: campaign_id.to_string(),
                stage: stage_id,
                attempt,
            },
        }))
    }

    /// Record the outcome of dispatching the current stage. Success advances
    /// the sequence; failure consumes an attempt and may fail the lead. The
    /// trigger evaluator always sees the persisted result.
    pub async fn complete_stage(
        &self,
        lead_id: &str,
        campaign_id: &str,
        success: bool,
    ) -> Result<()> {
        let Some(mut state) = self.store.load(lead_id).await? else {
            warn!(lead_id, campaign_id, "Lead state not found for stage completion");
            return Ok(());
        };

        if success {
            state.complete_current_stage(Utc::now());
            if state.sequence_exhausted() {
                state.complete();
            }
        } else {
            state.increment_attempts();
            if !state.stage_retryable() {
                state.fail();
            }
        }

        self.store.save(&state).await?;
        info!(
            lead_id,
            campaign_id,
            success,
            new_status = %state.status,
            stage = state.current_stage,
            "Stage completed"
        );

        self.trigger.evaluate_fresh(self.store.as_ref(), lead_id).await;
        Ok(())
    }

    /// Force a lead to Paused. A terminal lead stays put (logged).
    pub async fn pause_sequence(&self, lead_id: &str) -> Result<()> {
        let Some(mut state) = self.store.load(lead_id).await? else {
            warn!(lead_id, "Lead state not found for pause");
            return Ok(());
        };
        match state.pause() {
            Ok(()) => {
                self.store.save(&state).await?;
                info!(lead_id, campaign_id = state.campaign_id.as_str(), "Sequence paused");
            }
            Err(e) => warn!(lead_id, error = %e, "Pause rejected"),
        }
        Ok(())
    }

    /// Resume a paused lead. Any other status is a logged no-op.
    pub async fn resume_sequence(&self, lead_id: &str) -> Result<()> {
        let Some(mut state) = self.store.load(lead_id).await? else {
            warn!(lead_id, "Lead state not found for resume");
            return Ok(());
        };
        match state.resume() {
            Ok(()) => {
                self.store.save(&state).await?;
                info!(lead_id, campaign_id = state.campaign_id.as_str(), "Sequence resumed");
            }
            Err(e) => warn!(lead_id, error = %e, "Resume rejected"),
        }
        Ok(())
    }

    /// Unsubscribe the lead. Terminal, forced from any state.
    pub async fn terminate_sequence(&self, lead_id: &str, reason: &str) -> Result<()> {
        let Some(mut state) = self.store.load(lead_id).await? else {
            warn!(lead_id, "Lead state not found for termination");
            return Ok(());
        };
        state.terminate();
        self.store.save(&state).await?;
        info!(
            lead_id,
            campaign_id = state.campaign_id.as_str(),
            reason,
            "Sequence terminated"
        );
        Ok(())
    }

    /// Render the stage template, degrading instead of failing: a broken
    /// template must not stall the whole sequence.
    async fn render_stage_content(&self, state: &LeadState, template_id: &str) -> RenderedContent {
        let mut vars = state.metadata.clone();
        vars.insert("lead_id".to_string(), state.lead_id.clone());
        let lang = state
            .metadata
            .get("lang")
            .map(String::as_str)
            .unwrap_or("en");

        match self
            .renderer
            .render(template_id, &vars, MessageChannel::Email, lang)
            .await
        {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    lead_id = state.lead_id.as_str(),
                    template_id,
                    error = %e,
                    "Stage content render failed, using degraded fallback"
                );
                RenderedContent::degraded(template_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use leadflow_content::{TemplateCatalog, TemplateVariant};
    use leadflow_messaging::MockSender;
    use leadflow_store::{MemoryAuditLog, MemoryCampaignStore, MemoryLeadStore};

    struct Harness {
        progressor: SequenceProgressor,
        scorer: Arc<EngagementScorer>,
        store: Arc<MemoryLeadStore>,
    }

    fn catalog() -> TemplateCatalog {
        TemplateCatalog::new()
            .with_template(
                "intro_email",
                vec![TemplateVariant {
                    language: "en".to_string(),
                    subject: Some("Hello".to_string()),
                    body: "Hi {{lead_id}}".to_string(),
                }],
            )
            .with_template(
                "follow_up_email",
                vec![TemplateVariant {
                    language: "en".to_string(),
                    subject: Some("Still there?".to_string()),
                    body: "Ping {{lead_id}}".to_string(),
                }],
            )
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryLeadStore::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let renderer = Arc::new(catalog());
        let trigger = Arc::new(TriggerEvaluator::new(
            renderer.clone(),
            Arc::new(MockSender::new()),
            audit,
        ));
        let scorer = Arc::new(EngagementScorer::new(store.clone(), trigger.clone()));
        let progressor = SequenceProgressor::new(
            store.clone(),
            Arc::new(MemoryCampaignStore::new()),
            renderer,
            scorer.clone(),
            trigger,
        );
        Harness {
            progressor,
            scorer,
            store,
        }
    }

    fn definitions() -> Vec<StageDefinition> {
        vec![
            StageDefinition {
                stage_id: "intro".to_string(),
                template_id: "intro_email".to_string(),
                delay_hours: 24,
                max_attempts: Some(3),
            },
            StageDefinition {
                stage_id: "follow_up".to_string(),
                template_id: "follow_up_email".to_string(),
                delay_hours: 48,
                max_attempts: Some(2),
            },
        ]
    }

    #[tokio::test]
    async fn first_stage_fires_immediately() {
        let h = harness();
        h.progressor
            .initialize_lead_sequence("lead_1", "campaign_1", &definitions())
            .await
            .unwrap();

        let action = h
            .progressor
            .get_next_action("lead_1", "campaign_1")
            .await
            .unwrap()
            .expect("stage 0 has no delay gate");
        assert_eq!(action.stage_id, "intro");
        assert_eq!(action.context.attempt, 1);
        assert_eq!(action.content.body, "Hi lead_1");
    }

    #[tokio::test]
    async fn reading_an_action_does_not_advance_the_sequence() {
        let h = harness();
        h.progressor
            .initialize_lead_sequence("lead_1", "campaign_1", &definitions())
            .await
            .unwrap();

        let first = h
            .progressor
            .get_next_action("lead_1", "campaign_1")
            .await
            .unwrap()
            .unwrap();
        let second = h
            .progressor
            .get_next_action("lead_1", "campaign_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.stage_id, second.stage_id);
        assert_eq!(first.context.attempt, second.context.attempt);

        let state = h.store.load("lead_1").await.unwrap().unwrap();
        assert_eq!(state.current_stage, 0);
        assert_eq!(state.sequence_stages[0].attempts, 0);
    }

    #[tokio::test]
    async fn next_stage_waits_out_its_delay() {
        let h = harness();
        h.progressor
            .initialize_lead_sequence("lead_1", "campaign_1", &definitions())
            .await
            .unwrap();
        h.progressor
            .complete_stage("lead_1", "campaign_1", true)
            .await
            .unwrap();

        // Stage 0 just completed; follow_up carries a 48h delay.
        assert!(h
            .progressor
            .get_next_action("lead_1", "campaign_1")
            .await
            .unwrap()
            .is_none());

        // Backdate the completion past the delay and the stage fires.
        let mut state = h.store.load("lead_1").await.unwrap().unwrap();
        state.sequence_stages[0].completed_at = Some(Utc::now() - Duration::hours(49));
        h.store.save(&state).await.unwrap();

        let action = h
            .progressor
            .get_next_action("lead_1", "campaign_1")
            .await
            .unwrap()
            .expect("delay has elapsed");
        assert_eq!(action.stage_id, "follow_up");
    }

    #[tokio::test]
    async fn low_score_pauses_instead_of_acting() {
        let h = harness();
        h.progressor
            .initialize_lead_sequence("lead_1", "campaign_1", &definitions())
            .await
            .unwrap();
        h.scorer
            .track_event("lead_1", "spam_report", HashMap::new())
            .await
            .unwrap();

        assert!(h
            .progressor
            .get_next_action("lead_1", "campaign_1")
            .await
            .unwrap()
            .is_none());
        let state = h.store.load("lead_1").await.unwrap().unwrap();
        assert_eq!(state.status, LeadStatus::Paused);

        // Paused leads produce nothing until resumed.
        assert!(h
            .progressor
            .get_next_action("lead_1", "campaign_1")
            .await
            .unwrap()
            .is_none());
        h.progressor.resume_sequence("lead_1").await.unwrap();
        h.scorer.reset_lead_score("lead_1").await.unwrap();
        assert!(h
            .progressor
            .get_next_action("lead_1", "campaign_1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn completing_every_stage_ends_the_sequence() {
        let h = harness();
        h.progressor
            .initialize_lead_sequence("lead_1", "campaign_1", &definitions())
            .await
            .unwrap();

        h.progressor
            .complete_stage("lead_1", "campaign_1", true)
            .await
            .unwrap();
        h.progressor
            .complete_stage("lead_1", "campaign_1", true)
            .await
            .unwrap();

        let state = h.store.load("lead_1").await.unwrap().unwrap();
        assert_eq!(state.status, LeadStatus::Completed);

        for _ in 0..3 {
            assert!(h
                .progressor
                .get_next_action("lead_1", "campaign_1")
                .await
                .unwrap()
                .is_none());
        }
    }

    #[tokio::test]
    async fn empty_sequence_completes_on_first_read() {
        let h = harness();
        h.progressor
            .initialize_lead_sequence("lead_1", "campaign_1", &[])
            .await
            .unwrap();

        assert!(h
            .progressor
            .get_next_action("lead_1", "campaign_1")
            .await
            .unwrap()
            .is_none());
        let state = h.store.load("lead_1").await.unwrap().unwrap();
        assert_eq!(state.status, LeadStatus::Completed);
    }

    #[tokio::test]
    async fn repeated_failures_exhaust_attempts_and_fail_the_lead() {
        let h = harness();
        h.progressor
            .initialize_lead_sequence("lead_1", "campaign_1", &definitions())
            .await
            .unwrap();

        for expected_attempts in 1..=3u32 {
            h.progressor
                .complete_stage("lead_1", "campaign_1", false)
                .await
                .unwrap();
            let state = h.store.load("lead_1").await.unwrap().unwrap();
            assert_eq!(state.sequence_stages[0].attempts, expected_attempts);
            assert_eq!(state.current_stage, 0, "failed stage never advances");
        }

        let state = h.store.load("lead_1").await.unwrap().unwrap();
        assert_eq!(state.status, LeadStatus::Failed);
        assert!(h
            .progressor
            .get_next_action("lead_1", "campaign_1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn failed_attempts_surface_in_the_next_action() {
        let h = harness();
        h.progressor
            .initialize_lead_sequence("lead_1", "campaign_1", &definitions())
            .await
            .unwrap();

        h.progressor
            .complete_stage("lead_1", "campaign_1", false)
            .await
            .unwrap();

        let action = h
            .progressor
            .get_next_action("lead_1", "campaign_1")
            .await
            .unwrap()
            .expect("two attempts remain");
        assert_eq!(action.stage_id, "intro");
        assert_eq!(action.context.attempt, 2);
    }

    #[tokio::test]
    async fn terminate_is_terminal() {
        let h = harness();
        h.progressor
            .initialize_lead_sequence("lead_1", "campaign_1", &definitions())
            .await
            .unwrap();
        h.progressor
            .terminate_sequence("lead_1", "manual")
            .await
            .unwrap();

        let state = h.store.load("lead_1").await.unwrap().unwrap();
        assert_eq!(state.status, LeadStatus::Unsubscribed);

        // Neither resume nor pause moves a terminated lead.
        h.progressor.resume_sequence("lead_1").await.unwrap();
        h.progressor.pause_sequence("lead_1").await.unwrap();
        let state = h.store.load("lead_1").await.unwrap().unwrap();
        assert_eq!(state.status, LeadStatus::Unsubscribed);
    }

    #[tokio::test]
    async fn broken_template_degrades_instead_of_erroring() {
        let store = Arc::new(MemoryLeadStore::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let empty_renderer = Arc::new(TemplateCatalog::new());
        let trigger = Arc::new(TriggerEvaluator::new(
            empty_renderer.clone(),
            Arc::new(MockSender::new()),
            audit,
        ));
        let scorer = Arc::new(EngagementScorer::new(store.clone(), trigger.clone()));
        let progressor = SequenceProgressor::new(
            store,
            Arc::new(MemoryCampaignStore::new()),
            empty_renderer,
            scorer,
            trigger,
        );

        progressor
            .initialize_lead_sequence("lead_1", "campaign_1", &definitions())
            .await
            .unwrap();
        let action = progressor
            .get_next_action("lead_1", "campaign_1")
            .await
            .unwrap()
            .expect("degraded action is still an action");
        assert!(action.content.is_degraded());
    }
}
