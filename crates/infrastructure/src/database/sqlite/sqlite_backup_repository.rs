use async_trait::async_trait;
use chrono::Utc;
use scheduler_core::SchedulerResult;
use scheduler_domain::{
    entities::{Backup, NewBackup},
    repositories::BackupRepository,
};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};

use crate::error_handling::{
    EntityKind, OperationContext, RepositoryErrorHelpers, RepositoryOperation,
};

pub struct SqliteBackupRepository {
    pool: SqlitePool,
}

impl SqliteBackupRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_backup(row: &SqliteRow) -> SchedulerResult<Backup> {
        Ok(Backup {
            id: row.try_get("id")?,
            server_id: row.try_get("server_id")?,
            uuid: row.try_get("uuid")?,
            name: row.try_get("name")?,
            ignored_files: row.try_get("ignored_files")?,
            disk: row.try_get("disk")?,
            is_successful: row.try_get("is_successful")?,
            is_locked: row.try_get("is_locked")?,
            created_at: row.try_get("created_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

#[async_trait]
impl BackupRepository for SqliteBackupRepository {
    #[instrument(skip(self, backup), fields(server.id = backup.server_id, backup.uuid = %backup.uuid))]
    async fn create_backup(&self, backup: &NewBackup) -> SchedulerResult<i64> {
        let result = sqlx::query(
            "INSERT INTO backups \
             (server_id, uuid, name, ignored_files, disk, is_successful, is_locked, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(backup.server_id)
        .bind(&backup.uuid)
        .bind(&backup.name)
        .bind(&backup.ignored_files)
        .bind(&backup.disk)
        .bind(backup.is_successful)
        .bind(backup.is_locked)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                OperationContext::new(RepositoryOperation::Create, EntityKind::Backup)
                    .with_name(backup.name.clone()),
                e,
            )
        })?;

        let id = result.last_insert_rowid();
        debug!("Created backup record {} for server {}", id, backup.server_id);
        Ok(id)
    }

    #[instrument(skip(self), fields(backup.id = id))]
    async fn delete_backup(&self, id: i64) -> SchedulerResult<bool> {
        let result = sqlx::query(
            "UPDATE backups SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                OperationContext::new(RepositoryOperation::Delete, EntityKind::Backup).with_id(id),
                e,
            )
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(server.id = server_id))]
    async fn get_backups_by_server_id(&self, server_id: i64) -> SchedulerResult<Vec<Backup>> {
        let rows = sqlx::query(
            "SELECT id, server_id, uuid, name, ignored_files, disk, is_successful, is_locked, \
             created_at, deleted_at FROM backups \
             WHERE server_id = ? AND deleted_at IS NULL ORDER BY id ASC",
        )
        .bind(server_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                OperationContext::new(RepositoryOperation::Query, EntityKind::Backup)
                    .with_additional_info(format!("服务器 {server_id} 的备份")),
                e,
            )
        })?;

        rows.iter().map(Self::row_to_backup).collect()
    }
}
