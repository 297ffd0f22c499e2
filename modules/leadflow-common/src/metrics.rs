//! Injected observability surface.
//!
//! The engine records counters and gauges through this trait instead of
//! process-global statics. The hosting process owns the concrete recorder
//! (prometheus exporter, statsd, ...); tests and plain library use get
//! [`NoopMetrics`].

use std::sync::Arc;

pub trait MetricsRecorder: Send + Sync {
    /// Increment a named counter by one.
    fn incr_counter(&self, name: &str, labels: &[(&str, &str)]);

    /// Set a named gauge to an absolute value.
    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64);

    /// Record one observation of a named histogram.
    fn observe_histogram(&self, name: &str, labels: &[(&str, &str)], value: f64);
}

/// Recorder that drops everything. The default when no backend is wired up.
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    fn incr_counter(&self, _name: &str, _labels: &[(&str, &str)]) {}

    fn set_gauge(&self, _name: &str, _labels: &[(&str, &str)], _value: f64) {}

    fn observe_histogram(&self, _name: &str, _labels: &[(&str, &str)], _value: f64) {}
}

impl<M: MetricsRecorder + ?Sized> MetricsRecorder for Arc<M> {
    fn incr_counter(&self, name: &str, labels: &[(&str, &str)]) {
        (**self).incr_counter(name, labels);
    }

    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        (**self).set_gauge(name, labels, value);
    }

    fn observe_histogram(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        (**self).observe_histogram(name, labels, value);
    }
}
