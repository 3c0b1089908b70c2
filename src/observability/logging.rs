//! Structured logging setup.
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - Compact format by default, pretty format for local debugging
//! - Library code only emits events; installing a subscriber is up to binaries

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

fn fallback_directive(config: &ObservabilityConfig) -> String {
    format!("backup_request={}", config.log_level.to_ascii_lowercase())
}

/// Filter directives: the env value when set and non-blank, otherwise the
/// configured level for this crate.
fn directives(env: Option<String>, config: &ObservabilityConfig) -> String {
    env.filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| fallback_directive(config))
}

/// Build the env filter: `RUST_LOG` if set, otherwise the configured level.
///
/// An unparsable `RUST_LOG` also falls back to the configured level.
pub fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    EnvFilter::try_new(directives(env, config))
        .unwrap_or_else(|_| EnvFilter::new(fallback_directive(config)))
}

/// Install the global tracing subscriber.
///
/// Returns an error if a subscriber is already installed.
pub fn init(config: &ObservabilityConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    match config.log_format {
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    }
}
