pub mod app;
pub mod shutdown;

pub use app::{install_metrics_exporter, Application, RunMode};
pub use shutdown::{wait_for_shutdown_signal, ShutdownManager};
