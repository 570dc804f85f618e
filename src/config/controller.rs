//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_BACKOFF_MAX_MS, DEFAULT_BACKOFF_START_MS, DEFAULT_CONTROLLER_NAME,
    DEFAULT_CONVERGENCE_REQUEUE_SECS, DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
    DEFAULT_RECONCILIATION_BACKOFF_MIN_SECS, DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
    DEFAULT_REENCRYPTION_JOB_IMAGE, DEFAULT_REENCRYPTION_JOB_TTL_SECS,
    DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS, DEFAULT_WATCH_RESTART_DELAY_SECS,
};
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl LogFormat {
    /// Parse a `LOG_FORMAT` value; anything but `text` selects JSON
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("text") {
            LogFormat::Text
        } else {
            LogFormat::Json
        }
    }
}

/// Controller-level configuration
///
/// All settings have defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Upper bound of the error backoff (seconds)
    pub reconciliation_error_requeue_secs: u64,
    /// First delay of the error backoff (seconds)
    pub reconciliation_backoff_min_secs: u64,
    /// Polling interval while waiting on the API server rollout or a running job (seconds)
    pub convergence_requeue_secs: u64,
    /// Watch stream backoff starting value (milliseconds)
    pub backoff_start_ms: u64,
    /// Watch stream backoff maximum value (milliseconds)
    pub backoff_max_ms: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Maximum number of clusters reconciled at the same time
    pub max_concurrent_reconciliations: u16,
    /// Image providing `kubectl` for re-encryption jobs
    pub reencryption_job_image: String,
    /// `ttlSecondsAfterFinished` of re-encryption jobs
    pub reencryption_job_ttl_secs: i32,
    /// Only clusters labelled `worker-name=<value>` are handled; unset
    /// selects clusters without the label
    pub worker_name: Option<String>,
    /// Field manager and Event reporter name
    pub controller_name: String,
    /// Log format (json, text)
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            reconciliation_error_requeue_secs: DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            reconciliation_backoff_min_secs: DEFAULT_RECONCILIATION_BACKOFF_MIN_SECS,
            convergence_requeue_secs: DEFAULT_CONVERGENCE_REQUEUE_SECS,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            reencryption_job_image: DEFAULT_REENCRYPTION_JOB_IMAGE.to_string(),
            reencryption_job_ttl_secs: DEFAULT_REENCRYPTION_JOB_TTL_SECS,
            worker_name: None,
            controller_name: DEFAULT_CONTROLLER_NAME.to_string(),
            log_format: LogFormat::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            reconciliation_error_requeue_secs: env_var_or_default(
                "RECONCILIATION_ERROR_REQUEUE_SECS",
                DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            ),
            reconciliation_backoff_min_secs: env_var_or_default(
                "RECONCILIATION_BACKOFF_MIN_SECS",
                DEFAULT_RECONCILIATION_BACKOFF_MIN_SECS,
            ),
            convergence_requeue_secs: env_var_or_default(
                "CONVERGENCE_REQUEUE_SECS",
                DEFAULT_CONVERGENCE_REQUEUE_SECS,
            ),
            backoff_start_ms: env_var_or_default("BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: env_var_or_default("BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            reencryption_job_image: env_var_or_default_str(
                "REENCRYPTION_JOB_IMAGE",
                DEFAULT_REENCRYPTION_JOB_IMAGE,
            ),
            reencryption_job_ttl_secs: env_var_or_default(
                "REENCRYPTION_JOB_TTL_SECS",
                DEFAULT_REENCRYPTION_JOB_TTL_SECS,
            ),
            worker_name: std::env::var("WORKER_NAME").ok().filter(|w| !w.is_empty()),
            controller_name: env_var_or_default_str("CONTROLLER_NAME", DEFAULT_CONTROLLER_NAME),
            log_format: LogFormat::parse(&env_var_or_default_str("LOG_FORMAT", "json")),
        }
    }

    /// Polling interval while waiting on external convergence
    #[must_use]
    pub fn convergence_requeue(&self) -> Duration {
        Duration::from_secs(self.convergence_requeue_secs)
    }

    /// Get watch restart delay after end duration
    #[must_use]
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
pub(crate) fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
