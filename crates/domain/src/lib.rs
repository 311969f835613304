pub mod entities;
pub mod outcomes;
pub mod ports;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use entities::*;
pub use outcomes::*;
pub use ports::*;
pub use repositories::*;
pub use scheduler_core::{SchedulerError, SchedulerResult};
pub use services::*;
pub use value_objects::*;
