//! Pipeline configuration.

use serde::{Deserialize, Serialize};

/// Knobs for a pipeline's execution behavior.
///
/// Deserializable so hosts can load it from their own configuration
/// sources; every field has a conservative default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Apply the default stage-merge optimizer before running.
    pub optimize: bool,
    /// Collect per-factory benchmark rows into the run report.
    pub benchmark: bool,
    /// Fixed worker-pool size for parallel stages.
    ///
    /// `None` uses the rayon default (one worker per core).
    pub parallel_workers: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            optimize: false,
            benchmark: false,
            parallel_workers: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let config = PipelineConfig::default();
        assert!(!config.optimize);
        assert!(!config.benchmark);
        assert!(config.parallel_workers.is_none());
    }

    #[test]
    fn partial_config_deserializes() {
        let config: PipelineConfig = serde_json::from_str(r#"{"optimize": true}"#).unwrap();
        assert!(config.optimize);
        assert!(!config.benchmark);
    }

    #[test]
    fn worker_count_roundtrips() {
        let config = PipelineConfig {
            parallel_workers: Some(4),
            ..PipelineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }
}
