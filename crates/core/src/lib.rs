pub mod config;
pub mod errors;
pub mod logging;

pub use config::{AgentConfig, AppConfig, DatabaseConfig, ObservabilityConfig, SchedulerConfig};
pub use errors::{SchedulerError, SchedulerResult};
pub use logging::{init_logging, LogFormat};
