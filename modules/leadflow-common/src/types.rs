use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LeadflowError;

// --- Enums ---

/// Lifecycle state of a lead within its campaign sequence.
///
/// Transitions happen only through the methods on [`LeadState`] so that
/// illegal moves (e.g. resuming a completed lead) are rejected at the type
/// boundary instead of scattered string comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Active,
    Paused,
    Completed,
    Failed,
    Unsubscribed,
}

impl LeadStatus {
    /// Terminal states never transition back to Active.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LeadStatus::Completed | LeadStatus::Failed | LeadStatus::Unsubscribed
        )
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadStatus::Active => write!(f, "active"),
            LeadStatus::Paused => write!(f, "paused"),
            LeadStatus::Completed => write!(f, "completed"),
            LeadStatus::Failed => write!(f, "failed"),
            LeadStatus::Unsubscribed => write!(f, "unsubscribed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Completed,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "pending"),
            StageStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Outbound channels a lead can be reached on. The metadata key holding the
/// address for each channel matches the Display form (`phone` for sms).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageChannel {
    Email,
    Linkedin,
    Sms,
    Whatsapp,
}

impl std::fmt::Display for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageChannel::Email => write!(f, "email"),
            MessageChannel::Linkedin => write!(f, "linkedin"),
            MessageChannel::Sms => write!(f, "sms"),
            MessageChannel::Whatsapp => write!(f, "whatsapp"),
        }
    }
}

impl MessageChannel {
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "linkedin" => Self::Linkedin,
            "sms" => Self::Sms,
            "whatsapp" => Self::Whatsapp,
            _ => Self::Email,
        }
    }
}

// --- Sequence definition ---

/// One stage as supplied by the sequence definition source. Used once at
/// initialization to build the lead's fixed stage list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    pub stage_id: String,
    pub template_id: String,
    pub delay_hours: u32,
    /// Defaults to 3 when the definition omits it.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

// --- Lead state ---

/// One scripted step of a lead's campaign sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStage {
    pub stage_id: String,
    pub template_id: String,
    /// Minimum wait after the previous stage completes before this one fires.
    pub delay_hours: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: StageStatus,
    /// Count of failed tries. The stage stays retryable while
    /// `attempts < max_attempts`.
    pub attempts: u32,
    pub max_attempts: u32,
}

impl SequenceStage {
    pub fn from_definition(def: &StageDefinition) -> Self {
        Self {
            stage_id: def.stage_id.clone(),
            template_id: def.template_id.clone(),
            delay_hours: def.delay_hours,
            completed_at: None,
            status: StageStatus::Pending,
            attempts: 0,
            max_attempts: def.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
        }
    }
}

/// An observed engagement signal (open, click, reply, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementEvent {
    /// Open tag from a fixed vocabulary; unknown tags score 0.
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub score_delta: i32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Canonical per-lead record. One owner: the lead store. Mutated only by the
/// engagement scorer (events, score) and the sequence progressor (stage,
/// status); the trigger evaluator reads it and writes a separate audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadState {
    pub lead_id: String,
    pub campaign_id: String,
    /// Index into `sequence_stages`. Never moves backward.
    pub current_stage: usize,
    pub status: LeadStatus,
    /// Running sum of all event score deltas.
    pub engagement_score: i32,
    /// Timestamp of the most recent engagement event.
    pub last_touch: DateTime<Utc>,
    /// Fixed-length stage list, set at initialization.
    pub sequence_stages: Vec<SequenceStage>,
    /// Append-only event history.
    #[serde(default)]
    pub engagement_history: Vec<EngagementEvent>,
    /// Channel addresses (`phone`, `whatsapp`, `email`), locale, persona,
    /// and ad-hoc signals such as `cart_abandoned_at`.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_platform: Option<String>,
}

impl LeadState {
    /// Fresh state at sequence initialization: stage 0, active, score 0.
    pub fn new(
        lead_id: impl Into<String>,
        campaign_id: impl Into<String>,
        definitions: &[StageDefinition],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            lead_id: lead_id.into(),
            campaign_id: campaign_id.into(),
            current_stage: 0,
            status: LeadStatus::Active,
            engagement_score: 0,
            last_touch: now,
            sequence_stages: definitions.iter().map(SequenceStage::from_definition).collect(),
            engagement_history: Vec::new(),
            metadata: HashMap::new(),
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            source_platform: None,
        }
    }

    /// Append an engagement event, apply its delta, and bump `last_touch`.
    pub fn record_event(
        &mut self,
        event_type: impl Into<String>,
        score_delta: i32,
        metadata: HashMap<String, String>,
        now: DateTime<Utc>,
    ) {
        self.engagement_history.push(EngagementEvent {
            event_type: event_type.into(),
            timestamp: now,
            score_delta,
            metadata,
        });
        self.engagement_score += score_delta;
        self.last_touch = now;
    }

    /// The stage that would fire next, or None when the sequence is exhausted.
    pub fn current_stage_ref(&self) -> Option<&SequenceStage> {
        self.sequence_stages.get(self.current_stage)
    }

    /// The stage completed immediately before the current one, if any.
    /// Its `completed_at` + the current stage's `delay_hours` gates firing.
    pub fn previous_stage_ref(&self) -> Option<&SequenceStage> {
        match self.current_stage {
            0 => None,
            n => self.sequence_stages.get(n - 1),
        }
    }

    /// Mark the current stage completed and advance the index.
    pub fn complete_current_stage(&mut self, now: DateTime<Utc>) {
        if let Some(stage) = self.sequence_stages.get_mut(self.current_stage) {
            stage.completed_at = Some(now);
            stage.status = StageStatus::Completed;
            self.current_stage += 1;
        }
    }

    /// True once every stage has been completed.
    pub fn sequence_exhausted(&self) -> bool {
        self.current_stage >= self.sequence_stages.len()
    }

    pub fn should_pause(&self, min_score: i32) -> bool {
        self.engagement_score < min_score
    }

    /// Whether the current stage may still be retried.
    pub fn stage_retryable(&self) -> bool {
        match self.current_stage_ref() {
            Some(stage) => stage.attempts < stage.max_attempts,
            None => false,
        }
    }

    pub fn increment_attempts(&mut self) {
        if let Some(stage) = self.sequence_stages.get_mut(self.current_stage) {
            stage.attempts += 1;
        }
    }

    // --- Status transitions ---

    /// Pause an active lead. Rejected for terminal states.
    pub fn pause(&mut self) -> Result<(), LeadflowError> {
        if self.status.is_terminal() {
            return Err(LeadflowError::Validation(format!(
                "cannot pause lead in terminal status {}",
                self.status
            )));
        }
        self.status = LeadStatus::Paused;
        Ok(())
    }

    /// Resume a paused lead. Valid only from Paused.
    pub fn resume(&mut self) -> Result<(), LeadflowError> {
        if self.status != LeadStatus::Paused {
            return Err(LeadflowError::Validation(format!(
                "cannot resume lead in status {}",
                self.status
            )));
        }
        self.status = LeadStatus::Active;
        Ok(())
    }

    /// All stages done. Terminal.
    pub fn complete(&mut self) {
        self.status = LeadStatus::Completed;
    }

    /// Max attempts exhausted on the current stage. Terminal.
    pub fn fail(&mut self) {
        self.status = LeadStatus::Failed;
    }

    /// Lead opted out. Terminal, forced from any state.
    pub fn terminate(&mut self) {
        self.status = LeadStatus::Unsubscribed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_definitions() -> Vec<StageDefinition> {
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
                max_attempts: None,
            },
        ]
    }

    fn test_state() -> LeadState {
        LeadState::new("lead_1", "campaign_1", &test_definitions(), Utc::now())
    }

    #[test]
    fn new_state_starts_active_at_stage_zero() {
        let state = test_state();
        assert_eq!(state.status, LeadStatus::Active);
        assert_eq!(state.current_stage, 0);
        assert_eq!(state.engagement_score, 0);
        assert_eq!(state.sequence_stages.len(), 2);
        assert_eq!(state.sequence_stages[1].max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn record_event_accumulates_score_and_touch() {
        let mut state = test_state();
        let now = Utc::now();
        state.record_event("email_open", 1, HashMap::new(), now);
        state.record_event("email_click", 3, HashMap::new(), now);
        assert_eq!(state.engagement_score, 4);
        assert_eq!(state.engagement_history.len(), 2);
        assert_eq!(state.last_touch, now);
    }

    #[test]
    fn complete_current_stage_advances_index() {
        let mut state = test_state();
        let now = Utc::now();
        state.complete_current_stage(now);
        assert_eq!(state.current_stage, 1);
        assert_eq!(state.sequence_stages[0].status, StageStatus::Completed);
        assert_eq!(state.sequence_stages[0].completed_at, Some(now));
        assert!(!state.sequence_exhausted());
        state.complete_current_stage(now);
        assert!(state.sequence_exhausted());
        assert!(state.current_stage_ref().is_none());
    }

    #[test]
    fn stage_retryable_until_max_attempts() {
        let mut state = test_state();
        assert!(state.stage_retryable());
        state.increment_attempts();
        state.increment_attempts();
        assert!(state.stage_retryable());
        state.increment_attempts();
        assert!(!state.stage_retryable());
        // Index did not advance across failures.
        assert_eq!(state.current_stage, 0);
    }

    #[test]
    fn resume_rejected_unless_paused() {
        let mut state = test_state();
        assert!(state.resume().is_err());
        state.pause().unwrap();
        assert_eq!(state.status, LeadStatus::Paused);
        state.resume().unwrap();
        assert_eq!(state.status, LeadStatus::Active);
    }

    #[test]
    fn pause_rejected_from_terminal() {
        let mut state = test_state();
        state.complete();
        assert!(state.pause().is_err());
        assert_eq!(state.status, LeadStatus::Completed);
    }

    #[test]
    fn terminate_forced_from_any_state() {
        let mut state = test_state();
        state.complete();
        state.terminate();
        assert_eq!(state.status, LeadStatus::Unsubscribed);
        assert!(state.status.is_terminal());
    }

    #[test]
    fn lead_state_round_trips_through_json() {
        let mut state = test_state();
        state.metadata.insert("phone".to_string(), "+15551234567".to_string());
        state.record_event("email_open", 1, HashMap::new(), Utc::now());
        let json = serde_json::to_string(&state).unwrap();
        let back: LeadState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.lead_id, state.lead_id);
        assert_eq!(back.engagement_score, state.engagement_score);
        assert_eq!(back.engagement_history.len(), 1);
        assert_eq!(back.metadata.get("phone"), state.metadata.get("phone"));
        assert_eq!(back.status, state.status);
    }
}
