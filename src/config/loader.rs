//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::HedgeConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<HedgeConfig, ConfigError> {
    let config: HedgeConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<HedgeConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    tracing::debug!(path = ?path, policy = ?config.events.policy, "Configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::EventPolicy;

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("backup_request_cfg_{}.toml", std::process::id()));
        fs::write(
            &path,
            "[events]\npolicy = \"fixed\"\ninterval_ms = 25\n\n[admission]\nmax_backups = 1\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.events.policy, EventPolicy::Fixed);
        assert_eq!(config.events.interval_ms, 25);
        assert_eq!(config.admission.max_backups, Some(1));

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_validation_errors_joined() {
        let err = parse_config("[events]\ninterval_ms = 0\n[observability]\nlog_level = \"x\"\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: events.interval_ms must be greater than zero, unknown log level: x"
        );
    }

    #[test]
    fn test_parse_error() {
        let err = parse_config("[events\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
