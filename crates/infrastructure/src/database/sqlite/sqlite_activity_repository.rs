use async_trait::async_trait;
use chrono::Utc;
use scheduler_core::SchedulerResult;
use scheduler_domain::{entities::NewActivity, repositories::ActivityRepository};
use sqlx::SqlitePool;
use tracing::instrument;

use crate::error_handling::{
    EntityKind, OperationContext, RepositoryErrorHelpers, RepositoryOperation,
};

pub struct SqliteActivityRepository {
    pool: SqlitePool,
}

impl SqliteActivityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityRepository for SqliteActivityRepository {
    #[instrument(skip(self, activity), fields(server.id = activity.server_id, event = %activity.event))]
    async fn create_activity(&self, activity: &NewActivity) -> SchedulerResult<i64> {
        let result = sqlx::query(
            "INSERT INTO server_activities (server_id, node_id, event, metadata, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(activity.server_id)
        .bind(activity.node_id)
        .bind(activity.event.as_str())
        .bind(activity.metadata.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                OperationContext::new(RepositoryOperation::Create, EntityKind::Activity)
                    .with_name(activity.event.as_str()),
                e,
            )
        })?;

        Ok(result.last_insert_rowid())
    }
}
