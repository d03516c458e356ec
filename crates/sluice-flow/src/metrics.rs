//! Observability metrics for pipeline execution.
//!
//! Exposed via the `metrics` crate facade; install a recorder such as
//! `metrics-exporter-prometheus` in the host application to export them.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `sluice_flow_dispatches_total` | Counter | `factory` | Slot dispatches into factories |
//! | `sluice_flow_deliveries_collected_total` | Counter | `factory` | Outputs re-published as deliveries |
//! | `sluice_flow_registry_depth` | Gauge | - | Deliveries held by the dispatcher |
//! | `sluice_flow_factory_duration_seconds` | Histogram | `factory` | Factory lifecycle wall time |
//! | `sluice_flow_runs_total` | Counter | `status` | Run outcomes |

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Slot dispatches into factories.
    pub const DISPATCHES_TOTAL: &str = "sluice_flow_dispatches_total";
    /// Counter: Outputs re-published as deliveries.
    pub const DELIVERIES_COLLECTED_TOTAL: &str = "sluice_flow_deliveries_collected_total";
    /// Gauge: Deliveries held by the dispatcher.
    pub const REGISTRY_DEPTH: &str = "sluice_flow_registry_depth";
    /// Histogram: Factory lifecycle wall time in seconds.
    pub const FACTORY_DURATION_SECONDS: &str = "sluice_flow_factory_duration_seconds";
    /// Counter: Run outcomes.
    pub const RUNS_TOTAL: &str = "sluice_flow_runs_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Factory class short name.
    pub const FACTORY: &str = "factory";
    /// Run outcome (succeeded, failed, cancelled).
    pub const STATUS: &str = "status";
}

/// Recording helpers for the flow metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowMetrics;

impl FlowMetrics {
    /// Creates the metrics handle.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Records a slot dispatch into a factory.
    pub fn record_dispatch(&self, factory: &str) {
        counter!(names::DISPATCHES_TOTAL, labels::FACTORY => factory.to_string()).increment(1);
    }

    /// Records an output collected into the registry.
    pub fn record_collect(&self, factory: &str) {
        counter!(names::DELIVERIES_COLLECTED_TOTAL, labels::FACTORY => factory.to_string())
            .increment(1);
    }

    /// Updates the registry depth gauge.
    pub fn set_registry_depth(&self, depth: usize) {
        #[allow(clippy::cast_precision_loss)]
        gauge!(names::REGISTRY_DEPTH).set(depth as f64);
    }

    /// Records a factory's lifecycle wall time.
    pub fn observe_factory_duration(&self, factory: &str, seconds: f64) {
        histogram!(names::FACTORY_DURATION_SECONDS, labels::FACTORY => factory.to_string())
            .record(seconds);
    }

    /// Records a run outcome.
    pub fn record_run(&self, status: &'static str) {
        counter!(names::RUNS_TOTAL, labels::STATUS => status).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_recorder_is_a_noop() {
        let metrics = FlowMetrics::new();
        metrics.record_dispatch("SomeFactory");
        metrics.record_collect("SomeFactory");
        metrics.set_registry_depth(3);
        metrics.observe_factory_duration("SomeFactory", 0.25);
        metrics.record_run("succeeded");
    }
}
