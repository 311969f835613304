//! 远程代理端口
//!
//! 调度器只依赖这里定义的契约，协议细节由实现方负责。

use std::sync::Arc;

use async_trait::async_trait;
use scheduler_core::{SchedulerError, SchedulerResult};

use crate::entities::{Node, PowerAction};

/// 代理调用的响应
///
/// 传输错误与超时也以失败响应的形式返回，调用方不会收到 panic 或原始传输错误。
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
    pub status: u16,
    pub body: serde_json::Value,
    error: Option<String>,
}

impl AgentResponse {
    pub fn success(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body,
            error: None,
        }
    }

    /// `status` 为 0 表示请求未得到HTTP响应
    pub fn failure(status: u16, error: impl Into<String>) -> Self {
        Self {
            status,
            body: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }

    /// 将失败响应转换为携带远程错误信息的错误
    pub fn into_result(self) -> SchedulerResult<Self> {
        match self.error {
            None => Ok(self),
            Some(message) => Err(SchedulerError::Agent(message)),
        }
    }
}

/// 远程代理客户端
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn power(&self, server_uuid: &str, action: PowerAction) -> AgentResponse;

    async fn send_commands(&self, server_uuid: &str, commands: &[String]) -> AgentResponse;

    async fn install_server(&self, server_uuid: &str) -> AgentResponse;

    async fn reinstall_server(&self, server_uuid: &str) -> AgentResponse;

    async fn create_backup(
        &self,
        server_uuid: &str,
        adapter: &str,
        backup_uuid: &str,
        ignored_files_json: &str,
    ) -> AgentResponse;

    async fn start_server(&self, server_uuid: &str) -> AgentResponse {
        self.power(server_uuid, PowerAction::Start).await
    }

    async fn stop_server(&self, server_uuid: &str) -> AgentResponse {
        self.power(server_uuid, PowerAction::Stop).await
    }

    async fn restart_server(&self, server_uuid: &str) -> AgentResponse {
        self.power(server_uuid, PowerAction::Restart).await
    }

    async fn kill_server(&self, server_uuid: &str) -> AgentResponse {
        self.power(server_uuid, PowerAction::Kill).await
    }
}

/// 根据节点信息构建代理客户端
pub trait AgentClientFactory: Send + Sync {
    fn connect(&self, node: &Node) -> SchedulerResult<Arc<dyn AgentClient>>;
}

/// 一次调度计划执行期间使用的代理连接
///
/// 节点缺失或客户端构建失败时为 `Unavailable`，依赖代理的任务会因此失败。
#[derive(Clone)]
pub enum AgentHandle {
    Connected(Arc<dyn AgentClient>),
    Unavailable(String),
}

impl AgentHandle {
    pub fn client(&self) -> SchedulerResult<&dyn AgentClient> {
        match self {
            AgentHandle::Connected(client) => Ok(client.as_ref()),
            AgentHandle::Unavailable(reason) => {
                Err(SchedulerError::AgentUnavailable(reason.clone()))
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, AgentHandle::Connected(_))
    }
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentHandle::Connected(_) => f.write_str("AgentHandle::Connected"),
            AgentHandle::Unavailable(reason) => {
                f.debug_tuple("AgentHandle::Unavailable").field(reason).finish()
            }
        }
    }
}
