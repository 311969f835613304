use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::SchedulerResult;
use scheduler_domain::{entities::TimedTask, repositories::TimedTaskRepository};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use crate::error_handling::{
    EntityKind, OperationContext, RepositoryErrorHelpers, RepositoryOperation,
};

pub struct SqliteTimedTaskRepository {
    pool: SqlitePool,
}

impl SqliteTimedTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn context(operation: RepositoryOperation, task_name: &str) -> OperationContext {
        OperationContext::new(operation, EntityKind::TimedTask).with_name(task_name)
    }
}

#[async_trait]
impl TimedTaskRepository for SqliteTimedTaskRepository {
    #[instrument(skip(self))]
    async fn get_timed_task(&self, task_name: &str) -> SchedulerResult<Option<TimedTask>> {
        let row = sqlx::query(
            "SELECT task_name, last_triggered_at, last_run_at, last_run_success, last_run_message \
             FROM timed_tasks WHERE task_name = ?",
        )
        .bind(task_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                Self::context(RepositoryOperation::Read, task_name),
                e,
            )
        })?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(TimedTask {
            task_name: row.try_get("task_name")?,
            last_triggered_at: row.try_get("last_triggered_at")?,
            last_run_at: row.try_get("last_run_at")?,
            last_run_success: row.try_get("last_run_success")?,
            last_run_message: row.try_get("last_run_message")?,
        }))
    }

    #[instrument(skip(self))]
    async fn record_trigger(
        &self,
        task_name: &str,
        at: DateTime<Utc>,
        not_after: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool> {
        let query = match not_after {
            Some(not_after) => sqlx::query(
                "INSERT INTO timed_tasks (task_name, last_triggered_at) VALUES (?, ?) \
                 ON CONFLICT(task_name) DO UPDATE SET last_triggered_at = excluded.last_triggered_at \
                 WHERE timed_tasks.last_triggered_at IS NULL OR timed_tasks.last_triggered_at <= ?",
            )
            .bind(task_name)
            .bind(at)
            .bind(not_after),
            None => sqlx::query(
                "INSERT INTO timed_tasks (task_name, last_triggered_at) VALUES (?, ?) \
                 ON CONFLICT(task_name) DO UPDATE SET last_triggered_at = excluded.last_triggered_at",
            )
            .bind(task_name)
            .bind(at),
        };

        let result = query.execute(&self.pool).await.map_err(|e| {
            RepositoryErrorHelpers::database_error(
                Self::context(RepositoryOperation::Upsert, task_name),
                e,
            )
        })?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn mark_run(&self, task_name: &str, success: bool, message: &str) -> SchedulerResult<()> {
        sqlx::query(
            "INSERT INTO timed_tasks (task_name, last_run_at, last_run_success, last_run_message) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(task_name) DO UPDATE SET \
             last_run_at = excluded.last_run_at, \
             last_run_success = excluded.last_run_success, \
             last_run_message = excluded.last_run_message",
        )
        .bind(task_name)
        .bind(Utc::now())
        .bind(success)
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                Self::context(RepositoryOperation::Upsert, task_name),
                e,
            )
        })?;

        Ok(())
    }
}
