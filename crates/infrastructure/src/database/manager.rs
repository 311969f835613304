use std::sync::Arc;
use std::time::Duration;

use scheduler_core::{DatabaseConfig, SchedulerResult};
use scheduler_domain::Repositories;
use sqlx::{Pool, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::database::sqlite::{
    SqliteActivityRepository, SqliteBackupRepository, SqliteNodeRepository,
    SqliteScheduleRepository, SqliteServerRepository, SqliteSettingsRepository,
    SqliteTaskRepository, SqliteTimedTaskRepository,
};
use crate::error_handling::{EntityKind, OperationContext, RepositoryErrorHelpers, RepositoryOperation};

pub type DbPool = Pool<Sqlite>;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS nodes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        fqdn TEXT NOT NULL,
        scheme TEXT NOT NULL DEFAULT 'https',
        daemon_listen INTEGER NOT NULL DEFAULT 8080,
        daemon_token TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS servers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        node_id INTEGER NOT NULL,
        status TEXT,
        backup_limit INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS schedules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        server_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        cron_minute TEXT NOT NULL DEFAULT '*',
        cron_hour TEXT NOT NULL DEFAULT '*',
        cron_day_of_month TEXT NOT NULL DEFAULT '*',
        cron_month TEXT NOT NULL DEFAULT '*',
        cron_day_of_week TEXT NOT NULL DEFAULT '*',
        is_active INTEGER NOT NULL DEFAULT 1,
        is_processing INTEGER NOT NULL DEFAULT 0,
        only_when_online INTEGER NOT NULL DEFAULT 0,
        next_run_at TEXT,
        last_run_at TEXT,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%S+00:00', 'now')),
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%S+00:00', 'now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS schedule_tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        schedule_id INTEGER NOT NULL,
        sequence_id INTEGER NOT NULL DEFAULT 1,
        action TEXT NOT NULL,
        payload TEXT,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%S+00:00', 'now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS backups (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        server_id INTEGER NOT NULL,
        uuid TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        ignored_files TEXT NOT NULL DEFAULT '[]',
        disk TEXT NOT NULL,
        is_successful INTEGER NOT NULL DEFAULT 0,
        is_locked INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%S+00:00', 'now')),
        deleted_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS server_activities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        server_id INTEGER NOT NULL,
        node_id INTEGER NOT NULL,
        event TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%S+00:00', 'now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS timed_tasks (
        task_name TEXT PRIMARY KEY,
        last_triggered_at TEXT,
        last_run_at TEXT,
        last_run_success INTEGER,
        last_run_message TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        name TEXT PRIMARY KEY,
        value TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_schedules_due ON schedules(is_active, is_processing, next_run_at)",
    "CREATE INDEX IF NOT EXISTS idx_schedule_tasks_schedule ON schedule_tasks(schedule_id, sequence_id)",
    "CREATE INDEX IF NOT EXISTS idx_backups_server ON backups(server_id, deleted_at)",
    "CREATE INDEX IF NOT EXISTS idx_server_activities_server ON server_activities(server_id)",
];

pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let mut options = sqlx::sqlite::SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds));

        // 内存数据库每个连接各自独立，必须固定为单个常驻连接
        options = if config.is_in_memory() {
            options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
                .max_lifetime(Duration::from_secs(1800))
        };

        let pool = options.connect(&config.url).await?;
        info!("Connected to SQLite database: {}", config.url);

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create every table the scheduler stores need
    pub async fn migrate(&self) -> SchedulerResult<()> {
        debug!("Running SQLite database migrations");

        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    RepositoryErrorHelpers::database_error(
                        OperationContext::new(RepositoryOperation::Migrate, EntityKind::Schema),
                        e,
                    )
                })?;
        }

        debug!("Successfully completed SQLite database migrations");
        Ok(())
    }

    /// Every store backed by this pool
    pub fn repositories(&self) -> Repositories {
        Repositories {
            schedules: Arc::new(SqliteScheduleRepository::new(self.pool.clone())),
            tasks: Arc::new(SqliteTaskRepository::new(self.pool.clone())),
            servers: Arc::new(SqliteServerRepository::new(self.pool.clone())),
            nodes: Arc::new(SqliteNodeRepository::new(self.pool.clone())),
            backups: Arc::new(SqliteBackupRepository::new(self.pool.clone())),
            activities: Arc::new(SqliteActivityRepository::new(self.pool.clone())),
            timed_tasks: Arc::new(SqliteTimedTaskRepository::new(self.pool.clone())),
            settings: Arc::new(SqliteSettingsRepository::new(self.pool.clone())),
        }
    }

    pub async fn health_check(&self) -> SchedulerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
