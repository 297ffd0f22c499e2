pub mod types;
pub mod score;
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

pub use types::*;
pub use score::*;
pub use config::Config;
pub use error::LeadflowError;
pub use metrics::{MetricsRecorder, NoopMetrics};
pub use telemetry::init_tracing;
