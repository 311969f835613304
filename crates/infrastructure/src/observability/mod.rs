//! Observability module
//!
//! Structured logging and metrics for the schedule processor.

pub mod metrics_collector;
pub mod structured_logger;

pub use metrics_collector::MetricsCollector;
pub use structured_logger::StructuredLogger;
