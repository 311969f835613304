pub mod manager;
pub mod sqlite;

pub use manager::{DatabaseManager, DbPool};
pub use sqlite::{
    SqliteActivityRepository, SqliteBackupRepository, SqliteNodeRepository,
    SqliteScheduleRepository, SqliteServerRepository, SqliteSettingsRepository,
    SqliteTaskRepository, SqliteTimedTaskRepository,
};
