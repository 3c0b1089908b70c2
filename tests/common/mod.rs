//! Shared helpers for the hedging integration tests.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Invocation counter shared between a test and its operation.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicU32>);

#[allow(dead_code)]
impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment and return the previous value.
    pub fn bump(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Build a programmable operation.
///
/// `script` receives the 0-based invocation index and returns how long the
/// attempt takes and what it reports. The returned counter tracks invocations.
pub fn scripted_op<F>(
    script: F,
) -> (
    impl Fn() -> std::pin::Pin<Box<dyn Future<Output = Result<u32, String>> + Send>> + Send + Sync + 'static,
    Counter,
)
where
    F: Fn(u32) -> (Duration, Result<u32, String>) + Send + Sync + 'static,
{
    let calls = Counter::new();
    let c = calls.clone();
    let op = move || {
        let n = c.bump();
        let (delay, outcome) = script(n);
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            outcome
        }) as std::pin::Pin<Box<dyn Future<Output = Result<u32, String>> + Send>>
    };
    (op, calls)
}

/// Cleanup callback that counts and records late failures.
#[allow(dead_code)]
pub fn recording_cleanup() -> (impl Fn(String) + Send + Sync + 'static, Arc<std::sync::Mutex<Vec<String>>>) {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let s = seen.clone();
    let handler = move |err: String| {
        s.lock().unwrap().push(err);
    };
    (handler, seen)
}

/// Wait long enough for abandoned attempts to report.
#[allow(dead_code)]
pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
