use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::SchedulerResult;
use scheduler_domain::{
    entities::{CronFields, Schedule, ScheduleUpdate},
    repositories::ScheduleRepository,
};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};

use crate::error_handling::{
    EntityKind, OperationContext, RepositoryErrorHelpers, RepositoryOperation,
};

const SCHEDULE_COLUMNS: &str = "id, server_id, name, cron_minute, cron_hour, cron_day_of_month, \
     cron_month, cron_day_of_week, is_active, is_processing, only_when_online, next_run_at, \
     last_run_at, created_at, updated_at";

pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn context(operation: RepositoryOperation) -> OperationContext {
        OperationContext::new(operation, EntityKind::Schedule)
    }

    fn row_to_schedule(row: &SqliteRow) -> SchedulerResult<Schedule> {
        Ok(Schedule {
            id: row.try_get("id")?,
            server_id: row.try_get("server_id")?,
            name: row.try_get("name")?,
            cron: CronFields {
                minute: row.try_get("cron_minute")?,
                hour: row.try_get("cron_hour")?,
                day_of_month: row.try_get("cron_day_of_month")?,
                month: row.try_get("cron_month")?,
                day_of_week: row.try_get("cron_day_of_week")?,
            },
            is_active: row.try_get("is_active")?,
            is_processing: row.try_get("is_processing")?,
            only_when_online: row.try_get("only_when_online")?,
            next_run_at: row.try_get("next_run_at")?,
            last_run_at: row.try_get("last_run_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    #[instrument(skip(self), fields(schedule.id = id))]
    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<Schedule>> {
        let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::database_error(
                    Self::context(RepositoryOperation::Read).with_id(id),
                    e,
                )
            })?;

        row.as_ref().map(Self::row_to_schedule).transpose()
    }

    #[instrument(skip(self), fields(now = %now))]
    async fn get_due_schedules(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<Schedule>> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules \
             WHERE is_active = 1 AND is_processing = 0 \
             AND next_run_at IS NOT NULL AND next_run_at <= ? \
             ORDER BY next_run_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::database_error(
                    Self::context(RepositoryOperation::Query)
                        .with_additional_info("查询到期的调度计划"),
                    e,
                )
            })?;

        let schedules = rows
            .iter()
            .map(Self::row_to_schedule)
            .collect::<SchedulerResult<Vec<_>>>()?;
        debug!("Found {} due schedules", schedules.len());
        Ok(schedules)
    }

    #[instrument(skip(self), fields(schedule.id = id))]
    async fn try_mark_processing(&self, id: i64) -> SchedulerResult<bool> {
        let context = Self::context(RepositoryOperation::Lock).with_id(id);
        let result = sqlx::query(
            "UPDATE schedules SET is_processing = 1, updated_at = ? \
             WHERE id = ? AND is_processing = 0",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        RepositoryErrorHelpers::log_operation_success(&context, result.rows_affected());
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self, update), fields(schedule.id = id))]
    async fn update_schedule(&self, id: i64, update: &ScheduleUpdate) -> SchedulerResult<bool> {
        let context = Self::context(RepositoryOperation::Update).with_id(id);

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE schedules SET updated_at = ");
        builder.push_bind(Utc::now());
        if let Some(is_processing) = update.is_processing {
            builder.push(", is_processing = ").push_bind(is_processing);
        }
        if let Some(next_run_at) = update.next_run_at {
            builder.push(", next_run_at = ").push_bind(next_run_at);
        }
        if let Some(last_run_at) = update.last_run_at {
            builder.push(", last_run_at = ").push_bind(last_run_at);
        }
        builder.push(" WHERE id = ").push_bind(id);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        RepositoryErrorHelpers::log_operation_success(&context, result.rows_affected());
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(stuck_before = %stuck_before))]
    async fn reset_stuck_processing(&self, stuck_before: DateTime<Utc>) -> SchedulerResult<u64> {
        let context = Self::context(RepositoryOperation::Update)
            .with_additional_info("释放长时间未完成的调度计划");
        let result = sqlx::query(
            "UPDATE schedules SET is_processing = 0, updated_at = ? \
             WHERE is_processing = 1 AND updated_at < ?",
        )
        .bind(Utc::now())
        .bind(stuck_before)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        RepositoryErrorHelpers::log_operation_success(&context, result.rows_affected());
        Ok(result.rows_affected())
    }
}
