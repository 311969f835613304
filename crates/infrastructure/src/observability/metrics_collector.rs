//! Metrics collector for the schedule processor
//!
//! Thin wrapper over the `metrics` facade. Without an installed recorder
//! every call is a no-op.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use scheduler_domain::outcomes::{BatchSummary, RunOutcome, TaskOutcome};

/// Metrics collector for the schedule processor
pub struct MetricsCollector {
    driver_ticks_throttled: Counter,
    driver_failures_total: Counter,
    due_schedules: Gauge,
    batch_duration: Histogram,
    schedule_run_duration: Histogram,
    stuck_locks_released: Counter,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            driver_ticks_throttled: counter!("scheduler_driver_ticks_throttled_total"),
            driver_failures_total: counter!("scheduler_driver_failures_total"),
            due_schedules: gauge!("scheduler_due_schedules"),
            batch_duration: histogram!("scheduler_batch_duration_seconds"),
            schedule_run_duration: histogram!("scheduler_schedule_run_duration_seconds"),
            stuck_locks_released: counter!("scheduler_stuck_locks_released_total"),
        }
    }

    /// Record a tick rejected by the throttle
    pub fn record_throttled(&self) {
        self.driver_ticks_throttled.increment(1);
    }

    /// Record a driver-level failure
    pub fn record_driver_failure(&self) {
        self.driver_failures_total.increment(1);
    }

    /// Record the outcome of a completed batch
    pub fn record_batch(&self, summary: &BatchSummary, duration_seconds: f64) {
        self.due_schedules.set(summary.due as f64);
        self.batch_duration.record(duration_seconds);
    }

    /// Record the outcome of one schedule run
    pub fn record_schedule_run(&self, outcome: &RunOutcome, duration_seconds: f64) {
        counter!("scheduler_schedule_runs_total", "outcome" => outcome.label()).increment(1);
        self.schedule_run_duration.record(duration_seconds);
    }

    /// Record the outcome of one task
    pub fn record_task_outcome(&self, action: &'static str, outcome: &TaskOutcome) {
        counter!(
            "scheduler_task_outcomes_total",
            "action" => action,
            "outcome" => outcome.label()
        )
        .increment(1);
    }

    /// Record a remote agent call
    pub fn record_agent_request(&self, operation: &'static str, success: bool, duration_seconds: f64) {
        let status = if success { "success" } else { "failure" };
        counter!("scheduler_agent_requests_total", "operation" => operation, "status" => status)
            .increment(1);
        histogram!("scheduler_agent_request_duration_seconds", "operation" => operation)
            .record(duration_seconds);
    }

    /// Record schedules released by the stale-lock recovery
    pub fn record_stuck_locks_released(&self, count: u64) {
        self.stuck_locks_released.increment(count);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
