use async_trait::async_trait;

use crate::entities::{Server, Task};
use crate::outcomes::TaskOutcome;
use crate::ports::agent::AgentHandle;

/// 任务执行器
///
/// 执行单个任务并返回结果，不向调用方抛出错误：
/// 远程失败返回 `Failed`，预期的跳过返回 `Skipped`。
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task, server: &Server, agent: &AgentHandle) -> TaskOutcome;
}
