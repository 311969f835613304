pub mod agent;
pub mod executor;

pub use agent::{AgentClient, AgentClientFactory, AgentHandle, AgentResponse};
pub use executor::TaskExecutor;
