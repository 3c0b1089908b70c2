//! Admission control for backup attempts.
//!
//! # Responsibilities
//! - Decide, once per tick, whether another backup attempt may start
//! - Provide a counting budget as the stock safeguard against unbounded backups
//!
//! # Design Decisions
//! - Policies are caller-owned; the request never stores decisions
//! - Called synchronously on the tick task, so implementations must not block
//! - The first attempt is never subject to admission
//! - Ticks seen after cancellation never reach a policy, so the stock budget
//!   answers only about capacity

use std::sync::atomic::{AtomicU32, Ordering};

use tokio_util::sync::CancellationToken;

/// Decides whether a backup attempt may be launched.
pub trait Admission: Send + Sync {
    fn admit(&self, token: &CancellationToken) -> bool;
}

impl<F> Admission for F
where
    F: Fn(&CancellationToken) -> bool + Send + Sync,
{
    fn admit(&self, token: &CancellationToken) -> bool {
        self(token)
    }
}

/// Grants up to `max` backups, then denies every later tick.
///
/// Sharing one budget across requests caps backups globally; give each
/// request its own budget for a per-call cap.
#[derive(Debug)]
pub struct BackupBudget {
    max: u32,
    granted: AtomicU32,
}

impl BackupBudget {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            granted: AtomicU32::new(0),
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Backups granted so far.
    pub fn granted(&self) -> u32 {
        self.granted.load(Ordering::Acquire)
    }

    /// Backups still available.
    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.granted())
    }

    /// Try to take one grant.
    pub fn try_acquire(&self) -> bool {
        let mut prev = self.granted.load(Ordering::Relaxed);
        loop {
            if prev >= self.max {
                return false;
            }
            match self.granted.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(x) => prev = x,
            }
        }
    }
}

impl Admission for BackupBudget {
    fn admit(&self, _token: &CancellationToken) -> bool {
        self.try_acquire()
    }
}

/// Never grants a backup.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl Admission for DenyAll {
    fn admit(&self, _token: &CancellationToken) -> bool {
        false
    }
}
