pub mod agent;
pub mod app_config;
pub mod database;
pub mod observability;
pub mod scheduler;

// Re-export main types for easier imports
pub use agent::AgentConfig;
pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use observability::ObservabilityConfig;
pub use scheduler::{parse_interval, SchedulerConfig};
