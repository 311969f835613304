//! # Scheduler Testing Utils
//!
//! Shared testing utilities for the schedule processor crates.
//!
//! - **Mock Repositories**: in-memory implementations of every store trait, with failure injection
//! - **Mock Agent**: a recording agent client and factory
//! - **Mock Executor**: scripted task outcomes
//! - **Test Data Builders**: schedules, tasks, servers, nodes and backups
//!
//! ```rust
//! use scheduler_testing_utils::{MockRepositories, ScheduleBuilder};
//! ```

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
