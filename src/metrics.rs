//! Metrics instrumentation for security-group-fqdn.
//!
//! All metrics are prefixed with `sg_fqdn.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

use crate::policy::Direction;

/// Record a hostname resolution attempt.
pub fn record_resolution(success: bool, duration: std::time::Duration) {
    let result = if success { "success" } else { "error" };

    counter!("sg_fqdn.resolve.count", "result" => result).increment(1);
    histogram!("sg_fqdn.resolve.duration.seconds").record(duration.as_secs_f64());
}

/// Kind of rule change sent to the cloud API.
#[derive(Debug, Clone, Copy)]
pub enum ChangeKind {
    /// Rules added.
    Authorize,
    /// Rules removed.
    Revoke,
}

impl ChangeKind {
    fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Authorize => "authorize",
            ChangeKind::Revoke => "revoke",
        }
    }
}

/// Record rule entries applied for one direction.
pub fn record_rule_changes(direction: Direction, kind: ChangeKind, entries: usize) {
    counter!(
        "sg_fqdn.rules.changed.count",
        "direction" => direction.as_str(),
        "change" => kind.as_str()
    )
    .increment(entries as u64);
}

/// Record a failed cloud API call.
pub fn record_api_error(direction: Direction, kind: ChangeKind) {
    counter!(
        "sg_fqdn.api.error.count",
        "direction" => direction.as_str(),
        "change" => kind.as_str()
    )
    .increment(1);
}

/// How a direction ended up in a cycle.
#[derive(Debug, Clone, Copy)]
pub enum DirectionOutcome {
    /// No hostname tag.
    Skipped,
    /// Rules already matched.
    Unchanged,
    /// Changes were applied (or logged in dry-run mode).
    Changed,
    /// A cloud API call failed.
    Failed,
}

/// Record the outcome of one direction of one group.
pub fn record_direction(direction: Direction, outcome: DirectionOutcome) {
    let outcome_str = match outcome {
        DirectionOutcome::Skipped => "skipped",
        DirectionOutcome::Unchanged => "unchanged",
        DirectionOutcome::Changed => "changed",
        DirectionOutcome::Failed => "failed",
    };

    counter!("sg_fqdn.direction.count", "direction" => direction.as_str(), "outcome" => outcome_str)
        .increment(1);
}

/// Record a completed reconciliation cycle.
pub fn record_cycle(groups: usize, failures: usize, duration: std::time::Duration) {
    counter!("sg_fqdn.cycle.count").increment(1);
    gauge!("sg_fqdn.cycle.groups").set(groups as f64);
    gauge!("sg_fqdn.cycle.failures").set(failures as f64);
    histogram!("sg_fqdn.cycle.duration.seconds").record(duration.as_secs_f64());
}

/// Record a cycle that could not list security groups.
pub fn record_cycle_error() {
    counter!("sg_fqdn.cycle.error.count").increment(1);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
