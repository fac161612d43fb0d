//! Async Query Configuration
//!
//! Worker pool size, default retry policy, reconciliation mode, log level and
//! the simulation knobs used by convergence tests. Loaded from JSON; every
//! field has a default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{QueryError, QueryResult};
use super::reconciler::ReconcileMode;
use super::retry::RetryPolicy;
use crate::observability::{log_event_with_fields, Event, Logger, Severity};

/// Configuration of the asynchronous query subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncQueryConfig {
    /// Concurrent worker evaluations (default: 4)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Policy used by `OriginContext::query` (default: indefinite)
    #[serde(default)]
    pub default_retry_policy: RetryPolicy,

    /// Mismatch handling (default: strict)
    #[serde(default)]
    pub reconcile_mode: ReconcileMode,

    /// Minimum severity written to the log (default: INFO)
    #[serde(default = "default_log_level")]
    pub log_level: Severity,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Test-only knobs, passed in explicitly rather than toggled at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Run a request's background hook on at most this many attempts.
    /// `None` runs it on every attempt.
    #[serde(default)]
    pub max_background_hook_runs: Option<u32>,
}

fn default_max_workers() -> usize {
    4
}

fn default_log_level() -> Severity {
    Severity::Info
}

impl Default for AsyncQueryConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            default_retry_policy: RetryPolicy::default(),
            reconcile_mode: ReconcileMode::default(),
            log_level: default_log_level(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl AsyncQueryConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> QueryResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| QueryError::Config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load, parse and validate a JSON file
    pub fn from_json_file(path: &Path) -> QueryResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            QueryError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json_str(&contents)?;
        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("path", path.display().to_string().as_str()),
                ("max_workers", config.max_workers.to_string().as_str()),
                ("reconcile_mode", config.reconcile_mode.name()),
                ("retry_policy", config.default_retry_policy.name()),
            ],
        );
        Ok(config)
    }

    pub fn validate(&self) -> QueryResult<()> {
        if self.max_workers == 0 {
            return Err(QueryError::Config("max_workers must be greater than 0".into()));
        }
        Ok(())
    }

    /// Apply `log_level` to the process-wide logger.
    pub fn apply_logging(&self) {
        Logger::set_min_severity(self.log_level);
    }

    /// Set the simulation hook limit
    pub fn with_background_hook_runs(mut self, runs: u32) -> Self {
        self.simulation.max_background_hook_runs = Some(runs);
        self
    }

    pub fn with_reconcile_mode(mut self, mode: ReconcileMode) -> Self {
        self.reconcile_mode = mode;
        self
    }

    pub fn with_default_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_retry_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AsyncQueryConfig::default();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.default_retry_policy, RetryPolicy::Indefinite);
        assert_eq!(config.reconcile_mode, ReconcileMode::Strict);
        assert_eq!(config.log_level, Severity::Info);
        assert_eq!(config.simulation.max_background_hook_runs, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = AsyncQueryConfig::from_json_str("{}").unwrap();
        assert_eq!(config, AsyncQueryConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "max_workers": 2,
            "default_retry_policy": { "max_retry": 3 },
            "reconcile_mode": "rederive",
            "log_level": "WARN",
            "simulation": { "max_background_hook_runs": 5 }
        }"#;
        let config = AsyncQueryConfig::from_json_str(json).unwrap();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.default_retry_policy, RetryPolicy::MaxRetry(3));
        assert_eq!(config.reconcile_mode, ReconcileMode::Rederive);
        assert_eq!(config.log_level, Severity::Warn);
        assert_eq!(config.simulation.max_background_hook_runs, Some(5));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = AsyncQueryConfig::from_json_str(r#"{ "max_workers": 0 }"#).unwrap_err();
        assert_eq!(err.code(), "AERO_CONFIG_ERROR");
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(AsyncQueryConfig::from_json_str("{ not json").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "default_retry_policy": "no_retry" }}"#).unwrap();
        let config = AsyncQueryConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.default_retry_policy, RetryPolicy::NoRetry);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AsyncQueryConfig::from_json_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
