//! # Orchestrator Configuration
//!
//! Every section has serde defaults, so an empty document yields a usable
//! configuration apart from the worker list.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use translation_orchestrator::config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = config::load()?;
//! let batch_size = config.batching.batch_size;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::{load, load_from_str, load_path};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,
    /// Secrets loaded into the in-memory credential store at startup
    #[serde(default)]
    pub credential_seeds: Vec<String>,
}

/// Batch sizing and the per-batch parameters forwarded to workers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub batch_size: u32,
    /// A trailing remainder within `batch_size + merge_threshold` folds into the last batch
    pub merge_threshold: u32,
    /// Lines per upstream call inside a worker
    pub internal_batch_size: u32,
    pub delay_between_batches_ms: u64,
    /// Retry budget the worker applies to its own upstream calls
    pub worker_max_retries: u32,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            merge_threshold: 10,
            internal_batch_size: 10,
            delay_between_batches_ms: 500,
            worker_max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub rpm_period_seconds: u64,
    pub selection_max_attempts: u32,
    pub selection_base_delay_ms: u64,
    pub selection_max_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rpm_period_seconds: 60,
            selection_max_attempts: 10,
            selection_base_delay_ms: 200,
            selection_max_delay_ms: 5_000,
        }
    }
}

impl SchedulerConfig {
    pub fn rpm_period(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.rpm_period_seconds).unwrap_or(i64::MAX))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub cooldown_seconds: u64,
    /// Consecutive failures before a credential cools down
    pub failure_threshold: u32,
    pub max_per_batch: u32,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 300,
            failure_threshold: 1,
            max_per_batch: 3,
        }
    }
}

impl CredentialsConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.cooldown_seconds).unwrap_or(i64::MAX))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2_000,
        }
    }
}

impl RetryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub request_timeout_seconds: u64,
    /// Public base URL workers use to reach `/callback/...`
    pub callback_base_url: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 30,
            callback_base_url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

impl DispatchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn callback_url(&self, session_id: &str, batch_index: u32) -> String {
        format!(
            "{}/callback/{}/{}",
            self.callback_base_url.trim_end_matches('/'),
            session_id,
            batch_index
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Unset means jobs never expire
    pub max_lifetime_seconds: Option<u64>,
    pub sweep_interval_seconds: u64,
    pub default_model: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_lifetime_seconds: None,
            sweep_interval_seconds: 30,
            default_model: "gemini-2.5-flash".to_string(),
        }
    }
}

impl JobsConfig {
    pub fn max_lifetime(&self) -> Option<chrono::Duration> {
        self.max_lifetime_seconds
            .map(|secs| chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind_address: String,
    pub request_timeout_seconds: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

impl WebConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// In-memory store when unset
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub id: String,
    pub url: String,
    /// Lower value wins ties
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_rpm_limit")]
    pub rpm_limit: u32,
}

fn default_rpm_limit() -> u32 {
    10
}

impl OrchestratorConfig {
    /// Reject zero sizes and limits and duplicate worker ids
    pub fn validate(&self) -> ConfigResult<()> {
        let non_zero = [
            ("batching.batch_size", u64::from(self.batching.batch_size)),
            (
                "batching.internal_batch_size",
                u64::from(self.batching.internal_batch_size),
            ),
            ("scheduler.rpm_period_seconds", self.scheduler.rpm_period_seconds),
            (
                "scheduler.selection_max_attempts",
                u64::from(self.scheduler.selection_max_attempts),
            ),
            (
                "credentials.max_per_batch",
                u64::from(self.credentials.max_per_batch),
            ),
            (
                "credentials.failure_threshold",
                u64::from(self.credentials.failure_threshold),
            ),
            (
                "dispatch.request_timeout_seconds",
                self.dispatch.request_timeout_seconds,
            ),
            ("jobs.sweep_interval_seconds", self.jobs.sweep_interval_seconds),
            ("web.request_timeout_seconds", self.web.request_timeout_seconds),
            (
                "database.max_connections",
                u64::from(self.database.max_connections),
            ),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    "0",
                    "must be greater than 0",
                ));
            }
        }

        if self.jobs.max_lifetime_seconds == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "jobs.max_lifetime_seconds",
                "0",
                "omit the field to disable job expiry",
            ));
        }

        if self.dispatch.callback_base_url.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "dispatch.callback_base_url",
                "dispatch configuration",
            ));
        }

        let mut seen = HashSet::new();
        for worker in &self.workers {
            if worker.id.trim().is_empty() || worker.url.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "workers[].id / workers[].url",
                    "worker configuration",
                ));
            }
            if worker.rpm_limit == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("workers.{}.rpm_limit", worker.id),
                    "0",
                    "must be greater than 0",
                ));
            }
            if !seen.insert(worker.id.as_str()) {
                return Err(ConfigurationError::invalid_value(
                    "workers.id",
                    worker.id.clone(),
                    "worker ids must be unique",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batching.batch_size, 50);
        assert_eq!(config.scheduler.rpm_period_seconds, 60);
        assert_eq!(config.credentials.cooldown_seconds, 300);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = OrchestratorConfig::default();
        config.batching.batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_callback_url_layout() {
        let dispatch = DispatchConfig {
            callback_base_url: "https://orchestrator.example/".into(),
            ..Default::default()
        };
        assert_eq!(
            dispatch.callback_url("abc", 3),
            "https://orchestrator.example/callback/abc/3"
        );
    }
}
