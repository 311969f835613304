//! Structured logging utilities
//!
//! Stable `event` names for every scheduler milestone, so logs can be
//! filtered and aggregated without parsing messages.

use chrono::{DateTime, Utc};
use scheduler_domain::{
    outcomes::{BatchSummary, ExecutionSummary, RunSkipReason, TaskOutcome},
    Schedule, Task,
};
use tracing::{debug, error, info, warn};

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    /// Log the start of a driver batch
    pub fn log_batch_started(job_name: &str, due_schedules: usize) {
        info!(
            event = "schedule_batch_started",
            job.name = job_name,
            batch.due = due_schedules,
            "Processing due schedules"
        );
    }

    /// Log the end of a driver batch
    pub fn log_batch_finished(job_name: &str, summary: &BatchSummary, duration_ms: u64) {
        info!(
            event = "schedule_batch_finished",
            job.name = job_name,
            batch.due = summary.due,
            batch.succeeded = summary.succeeded,
            batch.skipped = summary.skipped,
            batch.failed = summary.failed,
            batch.duration_ms = duration_ms,
            "Finished processing due schedules"
        );
    }

    /// Log a schedule that acquired its processing lock
    pub fn log_schedule_started(schedule: &Schedule) {
        info!(
            event = "schedule_started",
            schedule.id = schedule.id,
            schedule.name = %schedule.name,
            server.id = schedule.server_id,
            schedule.cron = %schedule.cron,
            "Schedule execution started"
        );
    }

    /// Log a schedule that ran no tasks
    pub fn log_schedule_skipped(schedule: &Schedule, reason: &RunSkipReason) {
        match reason {
            RunSkipReason::LockHeld => debug!(
                event = "schedule_lock_held",
                schedule.id = schedule.id,
                "Schedule is already being processed"
            ),
            RunSkipReason::ServerOffline { next_run_at } => info!(
                event = "schedule_skipped_offline",
                schedule.id = schedule.id,
                server.id = schedule.server_id,
                schedule.next_run_at = %next_run_at,
                "Server offline, schedule skipped"
            ),
            RunSkipReason::ServerNotFound { server_id } => warn!(
                event = "schedule_server_missing",
                schedule.id = schedule.id,
                server.id = server_id,
                "Server not found, schedule skipped"
            ),
        }
    }

    /// Log a schedule run that attempted all of its tasks
    pub fn log_schedule_completed(
        schedule: &Schedule,
        summary: &ExecutionSummary,
        next_run_at: DateTime<Utc>,
    ) {
        info!(
            event = "schedule_completed",
            schedule.id = schedule.id,
            schedule.name = %schedule.name,
            tasks.executed = summary.executed,
            tasks.failed = summary.failed,
            tasks.skipped = summary.skipped,
            tasks.total = summary.total,
            schedule.duration_ms = summary.duration_ms,
            schedule.next_run_at = %next_run_at,
            "Schedule execution completed"
        );
    }

    /// Log a schedule run aborted by an unexpected error
    pub fn log_schedule_failed(schedule: &Schedule, error_message: &str) {
        error!(
            event = "schedule_failed",
            schedule.id = schedule.id,
            schedule.name = %schedule.name,
            error = error_message,
            "Schedule execution failed, processing lock released"
        );
    }

    /// Log the outcome of a single task
    pub fn log_task_outcome(task: &Task, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Succeeded => info!(
                event = "task_succeeded",
                task.id = task.id,
                task.action = %task.action,
                task.sequence_id = task.sequence_id,
                "Task executed"
            ),
            TaskOutcome::Skipped(reason) => info!(
                event = "task_skipped",
                task.id = task.id,
                task.action = %task.action,
                task.sequence_id = task.sequence_id,
                reason = %reason,
                "Task skipped"
            ),
            TaskOutcome::Failed(message) => warn!(
                event = "task_failed",
                task.id = task.id,
                task.action = %task.action,
                task.sequence_id = task.sequence_id,
                error = %message,
                "Task failed"
            ),
        }
    }

    /// Log the driver heartbeat
    pub fn log_heartbeat(job_name: &str, success: bool, message: &str) {
        if success {
            debug!(event = "heartbeat", job.name = job_name, message = message, "Heartbeat recorded");
        } else {
            error!(
                event = "heartbeat",
                job.name = job_name,
                success = success,
                message = message,
                "Driver run failed"
            );
        }
    }
}
