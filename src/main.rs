//! Hedged call simulator.
//!
//! Runs many backup requests against an in-process operation whose latency is
//! usually fast and occasionally slow, then reports how the configured event
//! and admission policies shaped the latency distribution.
//!
//! ```text
//! CLI args + optional TOML config
//!     → N workers, each running hedged calls in sequence
//!         → RetryGroup (simulated op) + Request (events, admission)
//!     → summary (counts, p50/p95/p99) as text or JSON
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use backup_request::config::{load_config, HedgeConfig};
use backup_request::observability::logging;
use backup_request::{classify, Request, RetryGroup, Verdict};

/// Upper bound for simulated latencies (one hour).
const MAX_LATENCY_MS: u64 = 3_600_000;

#[derive(Parser)]
#[command(name = "backup-request")]
#[command(about = "Simulate backup requests against a synthetic latency distribution", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Total number of hedged calls
    #[arg(short = 'n', long, default_value_t = 200)]
    requests: usize,

    /// Calls in flight at once
    #[arg(short = 'c', long, default_value_t = 16)]
    concurrency: usize,

    /// Typical latency of a fast attempt
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..=MAX_LATENCY_MS))]
    fast_ms: u64,

    /// Latency of a slow attempt
    #[arg(long, default_value_t = 200, value_parser = clap::value_parser!(u64).range(0..=MAX_LATENCY_MS))]
    slow_ms: u64,

    /// Probability that an attempt is slow
    #[arg(long, default_value_t = 0.1)]
    slow_ratio: f64,

    /// Probability that an attempt fails
    #[arg(long, default_value_t = 0.0)]
    fail_ratio: f64,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Error)]
#[error("simulated failure after {0:?}")]
struct SimulatedFailure(Duration);

/// Latency model for one simulated attempt.
#[derive(Debug, Clone, Copy)]
struct Profile {
    fast: Duration,
    slow: Duration,
    slow_ratio: f64,
    fail_ratio: f64,
}

impl Profile {
    fn sample(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let latency = if rng.gen_bool(self.slow_ratio) {
            self.slow
        } else {
            // +/- 50% around the fast latency
            let fast = u64::try_from(self.fast.as_micros()).unwrap_or(u64::MAX);
            Duration::from_micros(rng.gen_range(fast / 2..=fast.saturating_add(fast / 2)))
        };
        (latency, rng.gen_bool(self.fail_ratio))
    }
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    requests: usize,
    succeeded: usize,
    failed: usize,
    denied: usize,
    attempts: usize,
    late_failures: usize,
    elapsed_ms: u64,
    p50_ms: f64,
    p95_ms: f64,
    p99_ms: f64,
    max_ms: f64,
}

fn as_millis_f64(d: Duration) -> f64 {
    d.as_micros() as f64 / 1000.0
}

fn percentile(sorted: &[Duration], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    as_millis_f64(sorted[idx])
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => HedgeConfig::default(),
    };
    logging::init(&config.observability)?;

    if !(0.0..=1.0).contains(&cli.slow_ratio) || !(0.0..=1.0).contains(&cli.fail_ratio) {
        return Err("slow-ratio and fail-ratio must be within [0, 1]".into());
    }
    let concurrency = cli.concurrency.clamp(1, cli.requests.max(1));

    tracing::info!(
        requests = cli.requests,
        concurrency,
        policy = ?config.events.policy,
        max_backups = ?config.admission.max_backups,
        "backup-request simulation starting"
    );

    let root = CancellationToken::new();
    let on_signal = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, finishing in-flight calls");
            on_signal.cancel();
        }
    });

    let profile = Profile {
        fast: Duration::from_millis(cli.fast_ms),
        slow: Duration::from_millis(cli.slow_ms),
        slow_ratio: cli.slow_ratio,
        fail_ratio: cli.fail_ratio,
    };
    let config = Arc::new(config);
    let attempts = Arc::new(AtomicUsize::new(0));
    let late_failures = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut workers = Vec::new();
    for worker in 0..concurrency {
        let share = cli.requests / concurrency + usize::from(worker < cli.requests % concurrency);
        let root = root.clone();
        let config = config.clone();
        let attempts = attempts.clone();
        let late_failures = late_failures.clone();

        workers.push(tokio::spawn(async move {
            let mut results = Vec::with_capacity(share);
            for _ in 0..share {
                if root.is_cancelled() {
                    break;
                }

                let attempts = attempts.clone();
                let late_failures = late_failures.clone();
                let group = RetryGroup::builder(&root)
                    .on_loser_failure(move |err: SimulatedFailure| {
                        late_failures.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(error = %err, "Late attempt failed");
                    })
                    .task(move || {
                        attempts.fetch_add(1, Ordering::Relaxed);
                        let (latency, fail) = profile.sample();
                        async move {
                            tokio::time::sleep(latency).await;
                            if fail {
                                Err(SimulatedFailure(latency))
                            } else {
                                Ok(latency)
                            }
                        }
                    });

                let call_start = Instant::now();
                let result = Request::from_config(group, &config).execute().await;
                results.push((classify(&result), call_start.elapsed()));
            }
            results
        }));
    }

    let mut summary = Summary::default();
    let mut latencies = Vec::with_capacity(cli.requests);
    for worker in workers {
        for (verdict, latency) in worker.await? {
            summary.requests += 1;
            match verdict {
                Verdict::Success => {
                    summary.succeeded += 1;
                    latencies.push(latency);
                }
                Verdict::Denied => summary.denied += 1,
                Verdict::Failed => summary.failed += 1,
            }
        }
    }

    // Let stragglers report before counting late failures.
    tokio::time::sleep(profile.slow).await;

    latencies.sort();
    summary.attempts = attempts.load(Ordering::Relaxed);
    summary.late_failures = late_failures.load(Ordering::Relaxed);
    summary.elapsed_ms = start.elapsed().as_millis() as u64;
    summary.p50_ms = percentile(&latencies, 0.50);
    summary.p95_ms = percentile(&latencies, 0.95);
    summary.p99_ms = percentile(&latencies, 0.99);
    summary.max_ms = latencies.last().copied().map(as_millis_f64).unwrap_or(0.0);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("\n--- Backup Request Simulation ---");
        println!("Requests:       {}", summary.requests);
        println!("Succeeded:      {}", summary.succeeded);
        println!("Failed:         {}", summary.failed);
        println!("Denied:         {}", summary.denied);
        println!("Attempts:       {}", summary.attempts);
        println!("Late failures:  {}", summary.late_failures);
        println!("Total Duration: {}ms", summary.elapsed_ms);
        println!("P50 Latency:    {:.2}ms", summary.p50_ms);
        println!("P95 Latency:    {:.2}ms", summary.p95_ms);
        println!("P99 Latency:    {:.2}ms", summary.p99_ms);
        println!("Max Latency:    {:.2}ms", summary.max_ms);
        println!("---------------------------------\n");
    }

    Ok(())
}
