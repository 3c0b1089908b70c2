//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → HedgeConfig (validated, immutable)
//!     → EventsConfig::build() / AdmissionConfig::build() per request
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Admission budgets are built fresh for every request

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdmissionConfig, EventPolicy, EventsConfig, HedgeConfig, LogFormat, ObservabilityConfig,
};
pub use validation::{validate_config, ValidationError};
