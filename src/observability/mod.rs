//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! group / request / retry produce:
//!     → tracing events (attempt index, tick seq, decisions)
//!     → metrics.rs (counters, latency histogram)
//!
//! The embedding application decides where they go:
//!     → logging.rs installs a tracing-subscriber for binaries
//!     → any `metrics` recorder (none is installed by this crate)
//! ```
//!
//! # Design Decisions
//! - Per-attempt events are `debug`; decisions that end a call are `info`/`warn`
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
