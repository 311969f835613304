use async_trait::async_trait;
use scheduler_core::SchedulerResult;
use scheduler_domain::repositories::SettingsRepository;
use sqlx::SqlitePool;
use tracing::instrument;

use crate::error_handling::{
    EntityKind, OperationContext, RepositoryErrorHelpers, RepositoryOperation,
};

pub struct SqliteSettingsRepository {
    pool: SqlitePool,
}

impl SqliteSettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for SqliteSettingsRepository {
    #[instrument(skip(self))]
    async fn get_setting(&self, name: &str) -> SchedulerResult<Option<String>> {
        let value: Option<Option<String>> =
            sqlx::query_scalar("SELECT value FROM settings WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    RepositoryErrorHelpers::database_error(
                        OperationContext::new(RepositoryOperation::Read, EntityKind::Setting)
                            .with_name(name),
                        e,
                    )
                })?;

        Ok(value.flatten())
    }
}
