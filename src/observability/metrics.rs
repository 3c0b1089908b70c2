//! Metrics for hedged calls.
//!
//! # Metrics
//! - `backup_request_attempts_total` (counter): every launched attempt, labelled `kind=primary|backup`
//! - `backup_request_denied_total` (counter): ticks refused by admission
//! - `backup_request_killed_total` (counter): groups closed without a winner
//! - `backup_request_loser_failures_total` (counter): failures routed to cleanup
//! - `backup_request_duration_seconds` (histogram): `Request::execute` latency by verdict

use std::time::Instant;

use crate::error::Verdict;

pub fn record_attempt(backup: bool) {
    let kind = if backup { "backup" } else { "primary" };
    ::metrics::counter!("backup_request_attempts_total", "kind" => kind).increment(1);
}

pub fn record_denied() {
    ::metrics::counter!("backup_request_denied_total").increment(1);
}

pub fn record_killed() {
    ::metrics::counter!("backup_request_killed_total").increment(1);
}

pub fn record_loser_failure() {
    ::metrics::counter!("backup_request_loser_failures_total").increment(1);
}

pub fn record_call(verdict: Verdict, start: Instant) {
    ::metrics::histogram!("backup_request_duration_seconds", "verdict" => verdict.as_str())
        .record(start.elapsed().as_secs_f64());
}
