//! Engine configuration.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. an optional config file (TOML / YAML / JSON, by extension)
//! 3. `TRIAGE_*` environment variables, `__` between nested keys
//!    (e.g. `TRIAGE_ANALYSIS__BASE_URL`)

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, Map};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};
use crate::queue::{OverflowPolicy, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub max_retries: u32,
    /// Upper bound on how long an idle worker sleeps between queue checks.
    pub idle_poll_ms: u64,
    pub handler_timeout_secs: u64,
    /// Settled-task reports kept for lookup; the oldest are evicted first.
    pub ledger_capacity: usize,
    pub overflow: OverflowPolicy,
    pub analysis: AnalysisConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            worker_count: 3,
            max_retries: RetryPolicy::DEFAULT_MAX_RETRIES,
            idle_poll_ms: 100,
            handler_timeout_secs: 60,
            ledger_capacity: 1024,
            overflow: OverflowPolicy::Drop,
            analysis: AnalysisConfig::default(),
        }
    }
}

impl EngineConfig {
    pub const ENV_PREFIX: &'static str = "TRIAGE";

    /// Load defaults, then `path` (if given), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// `env` replaces the process environment when given.
    fn load_with_env(path: Option<&Path>, env: Option<Map<String, String>>) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&EngineConfig::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config: EngineConfig = builder
            .add_source(
                Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    // 文字列のままだと tagged enum の数値が通らない
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(TriageError::Config("queue_capacity must be at least 1".into()));
        }
        if self.ledger_capacity == 0 {
            return Err(TriageError::Config("ledger_capacity must be at least 1".into()));
        }
        if self.worker_count == 0 {
            return Err(TriageError::Config("worker_count must be at least 1".into()));
        }
        if self.analysis.base_url.trim().is_empty() {
            return Err(TriageError::Config("analysis.base_url must not be empty".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn defaults_match_local_deployment() {
        let c = EngineConfig::default();
        assert_eq!(c.queue_capacity, 10);
        assert_eq!(c.worker_count, 3);
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.overflow, OverflowPolicy::Drop);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("triage-config-{}.toml", ulid::Ulid::new()));
        {
            let mut f = std::fs::File::create(&path).unwrap();
            let toml = r#"
queue_capacity = 2
worker_count = 1

[overflow]
policy = "dead_letter"

[analysis]
base_url = "http://llm:9000"
"#;
            f.write_all(toml.as_bytes()).unwrap();
        }

        let c = EngineConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(c.queue_capacity, 2);
        assert_eq!(c.worker_count, 1);
        assert_eq!(c.overflow, OverflowPolicy::DeadLetter);
        assert_eq!(c.analysis.base_url, "http://llm:9000");
        // untouched keys keep their defaults
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.analysis.request_timeout_secs, 30);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let c = EngineConfig {
            worker_count: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(c.validate(), Err(TriageError::Config(_))));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let c = EngineConfig {
            queue_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(c.validate(), Err(TriageError::Config(_))));
    }

    fn env(vars: &[(&str, &str)]) -> Map<String, String> {
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn env_overrides_scalar_and_nested_keys() {
        let vars = env(&[
            ("TRIAGE_QUEUE_CAPACITY", "5"),
            ("TRIAGE_ANALYSIS__BASE_URL", "http://llm:9000"),
            ("TRIAGE_ANALYSIS__REQUEST_TIMEOUT_SECS", "7"),
            ("OTHER_WORKER_COUNT", "99"),
        ]);

        let c = EngineConfig::load_with_env(None, Some(vars)).unwrap();

        assert_eq!(c.queue_capacity, 5);
        assert_eq!(c.analysis.base_url, "http://llm:9000");
        assert_eq!(c.analysis.request_timeout_secs, 7);
        assert_eq!(c.worker_count, 3);
    }

    #[rstest]
    #[case(&[("TRIAGE_OVERFLOW__POLICY", "block"), ("TRIAGE_OVERFLOW__TIMEOUT_MS", "250")],
        OverflowPolicy::Block { timeout_ms: 250 })]
    #[case(&[("TRIAGE_OVERFLOW__POLICY", "dead_letter")], OverflowPolicy::DeadLetter)]
    #[case(&[], OverflowPolicy::Drop)]
    fn env_selects_overflow_policy(
        #[case] vars: &[(&str, &str)],
        #[case] expected: OverflowPolicy,
    ) {
        let c = EngineConfig::load_with_env(None, Some(env(vars))).unwrap();
        assert_eq!(c.overflow, expected);
    }

    #[test]
    fn env_rejects_invalid_values() {
        let vars = env(&[("TRIAGE_WORKER_COUNT", "0")]);
        let result = EngineConfig::load_with_env(None, Some(vars));
        assert!(matches!(result, Err(TriageError::Config(_))));
    }

    #[test]
    fn zero_ledger_capacity_is_rejected() {
        let c = EngineConfig {
            ledger_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(c.validate(), Err(TriageError::Config(_))));
    }
}
