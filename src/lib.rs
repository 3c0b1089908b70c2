//! Backup (hedged) requests for slow or flaky async operations.
//!
//! Launch a primary attempt; whenever the event policy ticks and the admission
//! policy agrees, launch another concurrent attempt of the same operation.
//! The first attempt to finish, success or failure, decides the outcome.
//!
//! ```text
//!   retry (ticks) ──▶ request (admission) ──▶ group (attempts, one winner)
//! ```
//!
//! ```no_run
//! use std::time::Duration;
//! use backup_request::{is_killed, Fixed, BackupBudget, Request, RetryGroup};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let parent = CancellationToken::new();
//! let group = RetryGroup::builder(&parent)
//!     .on_loser_failure(|err: std::io::Error| tracing::warn!(%err, "late failure"))
//!     .task(|| async { Ok::<_, std::io::Error>("pong") });
//!
//! let request = Request::builder(group)
//!     .events(Fixed::new(Duration::from_millis(10)))
//!     .admission(BackupBudget::new(3))
//!     .build();
//!
//! match request.execute().await {
//!     Ok(value) => println!("got {}", value),
//!     Err(err) if is_killed(&err) => println!("backup denied"),
//!     Err(err) => println!("failed: {}", err),
//! }
//! # }
//! ```
//!
//! The operation is invoked concurrently and possibly many times; making it
//! safe to repeat is the caller's job.

pub mod config;
pub mod error;
pub mod group;
pub mod observability;
pub mod request;
pub mod retry;

pub use config::HedgeConfig;
pub use error::{classify, is_killed, AlreadyDone, BackupError, BackupResult, Verdict};
pub use group::{GroupHandle, RetryGroup, RetryGroupBuilder};
pub use request::{Admission, BackupBudget, DenyAll, Request, RequestBuilder};
pub use retry::{ExponentialBackoff, Fixed, RetryEvents, Tick, Ticks};
