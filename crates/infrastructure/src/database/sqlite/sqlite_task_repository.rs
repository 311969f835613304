use async_trait::async_trait;
use scheduler_core::SchedulerResult;
use scheduler_domain::{entities::Task, repositories::TaskRepository};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::instrument;

use crate::error_handling::{
    EntityKind, OperationContext, RepositoryErrorHelpers, RepositoryOperation,
};

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &SqliteRow) -> SchedulerResult<Task> {
        Ok(Task {
            id: row.try_get("id")?,
            schedule_id: row.try_get("schedule_id")?,
            sequence_id: row.try_get("sequence_id")?,
            action: row.try_get("action")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self), fields(schedule.id = schedule_id))]
    async fn get_tasks_by_schedule_id(&self, schedule_id: i64) -> SchedulerResult<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT id, schedule_id, sequence_id, action, payload, created_at \
             FROM schedule_tasks WHERE schedule_id = ? ORDER BY sequence_id ASC, id ASC",
        )
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                OperationContext::new(RepositoryOperation::Query, EntityKind::Task)
                    .with_additional_info(format!("调度计划 {schedule_id} 的任务")),
                e,
            )
        })?;

        rows.iter().map(Self::row_to_task).collect()
    }
}
