//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::request::BackupBudget;
use crate::retry::{ExponentialBackoff, Fixed, RetryEvents};

/// Root configuration for hedged calls.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct HedgeConfig {
    /// When backups are considered.
    pub events: EventsConfig,

    /// Whether a considered backup may start.
    pub admission: AdmissionConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Event policy selector.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventPolicy {
    #[default]
    Fixed,
    Exponential,
}

/// Event policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    /// Which generator to use.
    pub policy: EventPolicy,

    /// Tick interval for the fixed policy, in milliseconds.
    pub interval_ms: u64,

    /// Base delay for exponential backoff, in milliseconds.
    pub base_ms: u64,

    /// Upper bound of the uniform jitter, in milliseconds.
    pub jitter_ms: u64,

    /// Maximum delay for exponential backoff, in milliseconds.
    pub max_ms: u64,

    /// Optional jitter seed for reproducible schedules.
    pub seed: Option<u64>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            policy: EventPolicy::Fixed,
            interval_ms: 1000,
            base_ms: 10,
            jitter_ms: 5,
            max_ms: 1000,
            seed: None,
        }
    }
}

impl EventsConfig {
    /// Build the configured event policy.
    pub fn build(&self) -> Arc<dyn RetryEvents> {
        match self.policy {
            EventPolicy::Fixed => Arc::new(Fixed::new(Duration::from_millis(self.interval_ms))),
            EventPolicy::Exponential => {
                let backoff = ExponentialBackoff::new(
                    Duration::from_millis(self.base_ms),
                    Duration::from_millis(self.jitter_ms),
                    Duration::from_millis(self.max_ms),
                );
                match self.seed {
                    Some(seed) => Arc::new(backoff.with_seed(seed)),
                    None => Arc::new(backoff),
                }
            }
        }
    }
}

/// Admission configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Backups allowed per request. `None` leaves backups unbounded.
    pub max_backups: Option<u32>,
    /// Drop the budget entirely. TOML has no null, so this is how a config
    /// file asks for unbounded backups.
    pub unlimited: bool,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_backups: Some(3),
            unlimited: false,
        }
    }
}

impl AdmissionConfig {
    /// A fresh per-request budget, if one is configured.
    pub fn build(&self) -> Option<BackupBudget> {
        if self.unlimited {
            return None;
        }
        self.max_backups.map(BackupBudget::new)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
        }
    }
}
