//! 任务执行与远程代理访问
//!
//! - `executor`: 将任务动作分派到远程代理，处理备份配额与失败清理
//! - `agent_client`: 远程代理的HTTP实现

pub mod agent_client;
pub mod executor;

pub use agent_client::{HttpAgentClient, HttpAgentClientFactory};
pub use executor::AgentTaskExecutor;
