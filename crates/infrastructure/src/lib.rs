pub mod database;
pub mod error_handling;
pub mod observability;

pub use database::*;
pub use error_handling::{EntityKind, OperationContext, RepositoryErrorHelpers, RepositoryOperation};
pub use observability::*;
