//! Lead lifecycle automation engine.
//!
//! Three components share one persisted state object per lead:
//! the [`EngagementScorer`] turns inbound events into score and status
//! changes, the [`SequenceProgressor`] decides the next scripted campaign
//! step, and the [`TriggerEvaluator`] fires at most one out-of-band message
//! per evaluation, guarded by per-lead per-channel cooldowns. Every mutation
//! flows through the lead store before the trigger evaluator sees it.

pub mod cooldown;
pub mod scorer;
pub mod sequence;
pub mod trigger;

pub use cooldown::CooldownLedger;
pub use scorer::{EngagementScorer, DEFAULT_PAUSE_THRESHOLD};
pub use sequence::{Action, ActionContext, SequenceProgressor};
pub use trigger::TriggerEvaluator;
