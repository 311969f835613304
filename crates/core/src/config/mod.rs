pub mod models;

pub use models::{AgentConfig, AppConfig, DatabaseConfig, ObservabilityConfig, SchedulerConfig};
