pub mod sqlite_activity_repository;
pub mod sqlite_backup_repository;
pub mod sqlite_schedule_repository;
pub mod sqlite_server_repository;
pub mod sqlite_settings_repository;
pub mod sqlite_task_repository;
pub mod sqlite_timed_task_repository;

pub use sqlite_activity_repository::SqliteActivityRepository;
pub use sqlite_backup_repository::SqliteBackupRepository;
pub use sqlite_schedule_repository::SqliteScheduleRepository;
pub use sqlite_server_repository::{SqliteNodeRepository, SqliteServerRepository};
pub use sqlite_settings_repository::SqliteSettingsRepository;
pub use sqlite_task_repository::SqliteTaskRepository;
pub use sqlite_timed_task_repository::SqliteTimedTaskRepository;
