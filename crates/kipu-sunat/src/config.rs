//! # Submission Configuration
//!
//! Settings for the gateway client and the background scheduler.
//!
//! ## Configuration File Format
//! ```toml
//! # sunat.toml
//! [gateway]
//! base_url = "https://back.apisunat.com"
//! max_poll_attempts = 3
//! poll_delay_ms = 3000
//! request_timeout_secs = 30
//!
//! [scheduler]
//! poll_interval_secs = 1800     # re-check SUBMITTED documents every 30 min
//! retry_interval_secs = 300     # re-send SUBMIT_FAILED documents every 5 min
//! retry_batch_size = 10
//! retry_backoff_base_secs = 300
//! retry_backoff_cap_secs = 21600
//! ```
//!
//! The config path is supplied by the embedding application; there is no
//! global discovery. [`SunatConfig::default`] is a working production
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{SunatError, SunatResult};

// =============================================================================
// Gateway Settings
// =============================================================================

/// Settings for the HTTP exchange with the tax gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Gateway base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bounded number of status polls after a submit while the gateway
    /// reports PENDIENTE. The client NEVER polls past this; further checks
    /// belong to the scheduler.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Fixed delay between poll attempts (milliseconds).
    #[serde(default = "default_poll_delay_ms")]
    pub poll_delay_ms: u64,

    /// Per-request HTTP timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://back.apisunat.com".to_string()
}

fn default_max_poll_attempts() -> u32 {
    3
}

fn default_poll_delay_ms() -> u64 {
    3_000
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for GatewaySettings {
    fn default() -> Self {
        GatewaySettings {
            base_url: default_base_url(),
            max_poll_attempts: default_max_poll_attempts(),
            poll_delay_ms: default_poll_delay_ms(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl GatewaySettings {
    /// Poll delay as a Duration.
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    /// Request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Scheduler Settings
// =============================================================================

/// Settings for the two background jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Interval between poll-job runs (seconds). The poll job re-checks
    /// documents the gateway holds but SUNAT hasn't decided on.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Interval between retry-job runs (seconds). The retry job re-sends
    /// documents whose submission never reached the gateway.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Maximum documents the retry job re-sends per run. Keeps one run from
    /// monopolizing the process after a long outage.
    #[serde(default = "default_retry_batch_size")]
    pub retry_batch_size: u32,

    /// Maximum documents the poll job re-checks per run.
    #[serde(default = "default_poll_batch_size")]
    pub poll_batch_size: u32,

    /// First retry window after a failed submission (seconds). Doubles on
    /// every further failure.
    #[serde(default = "default_backoff_base")]
    pub retry_backoff_base_secs: u64,

    /// Ceiling for the retry window (seconds).
    #[serde(default = "default_backoff_cap")]
    pub retry_backoff_cap_secs: u64,
}

fn default_poll_interval() -> u64 {
    1_800 // 30 minutes
}

fn default_retry_interval() -> u64 {
    300 // 5 minutes
}

fn default_retry_batch_size() -> u32 {
    10
}

fn default_poll_batch_size() -> u32 {
    100
}

fn default_backoff_base() -> u64 {
    300 // 5 minutes
}

fn default_backoff_cap() -> u64 {
    21_600 // 6 hours
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            poll_interval_secs: default_poll_interval(),
            retry_interval_secs: default_retry_interval(),
            retry_batch_size: default_retry_batch_size(),
            poll_batch_size: default_poll_batch_size(),
            retry_backoff_base_secs: default_backoff_base(),
            retry_backoff_cap_secs: default_backoff_cap(),
        }
    }
}

// =============================================================================
// Top-Level Config
// =============================================================================

/// Full configuration for the submission engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SunatConfig {
    #[serde(default)]
    pub gateway: GatewaySettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

impl SunatConfig {
    /// Loads configuration from a TOML file, falling back to defaults for
    /// any field the file omits.
    pub fn load_from_path(path: &Path) -> SunatResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SunatError::InvalidConfig(format!("cannot read {}: {}", path.display(), e)))?;

        let config: SunatConfig = toml::from_str(&raw)
            .map_err(|e| SunatError::InvalidConfig(format!("cannot parse {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validates invariants the serde defaults can't express.
    pub fn validate(&self) -> SunatResult<()> {
        if self.gateway.base_url.is_empty() {
            return Err(SunatError::InvalidConfig("gateway.base_url is empty".into()));
        }
        if !self.gateway.base_url.starts_with("http") {
            return Err(SunatError::InvalidConfig(format!(
                "gateway.base_url '{}' is not an http(s) URL",
                self.gateway.base_url
            )));
        }
        if self.scheduler.retry_batch_size == 0 || self.scheduler.poll_batch_size == 0 {
            return Err(SunatError::InvalidConfig("scheduler batch sizes must be > 0".into()));
        }
        if self.scheduler.retry_backoff_base_secs == 0 {
            return Err(SunatError::InvalidConfig(
                "scheduler.retry_backoff_base_secs must be > 0".into(),
            ));
        }
        if self.scheduler.retry_backoff_cap_secs < self.scheduler.retry_backoff_base_secs {
            return Err(SunatError::InvalidConfig(
                "scheduler.retry_backoff_cap_secs must be >= retry_backoff_base_secs".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
