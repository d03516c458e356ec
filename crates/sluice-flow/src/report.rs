//! Execution run reporting.
//!
//! A run report captures a single execution of a pipeline:
//!
//! - **State**: The terminal outcome (or current status)
//! - **Timing**: When the run was created, started, and completed
//! - **Benchmark rows**: Per-factory phase timings, when enabled

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sluice_core::RunId;

/// The state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Run is created but not yet started.
    Pending,
    /// Run is currently executing.
    Running,
    /// Run completed successfully.
    Succeeded,
    /// Run failed with an error.
    Failed,
    /// Run was cancelled cooperatively.
    Cancelled,
}

impl RunState {
    /// Returns true if the run is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-factory phase timings collected during a benchmarked run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRow {
    /// The stage the factory ran in.
    pub stage_id: usize,
    /// The factory's class short name.
    pub factory: String,
    /// Wall time of the `read` phase.
    pub read: Duration,
    /// Wall time of the `process` phase.
    pub process: Duration,
    /// Wall time of the `write` phase.
    pub write: Duration,
}

impl BenchmarkRow {
    /// Returns the factory's total lifecycle wall time.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.read + self.process + self.write
    }
}

/// A pipeline execution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique identifier for this run.
    pub id: RunId,

    /// Current state of the run.
    pub state: RunState,

    /// When the run was created.
    pub created_at: DateTime<Utc>,

    /// When the run started executing (if started).
    pub started_at: Option<DateTime<Utc>>,

    /// When the run completed (if completed).
    pub completed_at: Option<DateTime<Utc>>,

    /// Per-factory benchmark rows (empty unless benchmarking is enabled).
    pub rows: Vec<BenchmarkRow>,
}

impl RunReport {
    /// Creates a new pending report.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: RunId::generate(),
            state: RunState::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            rows: Vec::new(),
        }
    }

    /// Returns true if the run is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns the wall-clock duration of the run, if it completed.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some(completed - started),
            _ => None,
        }
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_report_is_pending() {
        let report = RunReport::new();
        assert_eq!(report.state, RunState::Pending);
        assert!(!report.is_terminal());
        assert!(report.duration().is_none());
        assert!(report.rows.is_empty());
    }

    #[test]
    fn terminal_states() {
        assert!(RunState::Succeeded.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(!RunState::Pending.is_terminal());
    }

    #[test]
    fn benchmark_row_total() {
        let row = BenchmarkRow {
            stage_id: 0,
            factory: "Echo".into(),
            read: Duration::from_millis(5),
            process: Duration::from_millis(10),
            write: Duration::from_millis(5),
        };
        assert_eq!(row.total(), Duration::from_millis(20));
    }

    #[test]
    fn run_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RunState::Succeeded).unwrap(),
            r#""succeeded""#
        );
    }
}
