//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, base <= max)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: HedgeConfig → Result<(), Vec<ValidationError>>
//! - Only the selected event policy's fields are checked

use thiserror::Error;

use crate::config::schema::{EventPolicy, HedgeConfig};
use crate::retry::backoff::MAX_CEILING;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("events.interval_ms must be greater than zero")]
    ZeroInterval,

    #[error("events.max_ms must be greater than zero")]
    ZeroMax,

    #[error("events.base_ms ({base_ms}) exceeds events.max_ms ({max_ms})")]
    BaseAboveMax { base_ms: u64, max_ms: u64 },

    #[error("events.max_ms ({0}) exceeds the 64s ceiling")]
    MaxAboveCeiling(u64),

    #[error("unknown log level: {0}")]
    UnknownLogLevel(String),
}

/// Check a parsed configuration.
pub fn validate_config(config: &HedgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let events = &config.events;

    match events.policy {
        EventPolicy::Fixed => {
            if events.interval_ms == 0 {
                errors.push(ValidationError::ZeroInterval);
            }
        }
        EventPolicy::Exponential => {
            if events.max_ms == 0 {
                errors.push(ValidationError::ZeroMax);
            } else if events.base_ms > events.max_ms {
                errors.push(ValidationError::BaseAboveMax {
                    base_ms: events.base_ms,
                    max_ms: events.max_ms,
                });
            }
            if u128::from(events.max_ms) > MAX_CEILING.as_millis() {
                errors.push(ValidationError::MaxAboveCeiling(events.max_ms));
            }
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
