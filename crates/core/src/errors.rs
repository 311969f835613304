use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("调度计划未找到: {id}")]
    ScheduleNotFound { id: i64 },

    #[error("服务器未找到: {id}")]
    ServerNotFound { id: i64 },

    #[error("节点未找到: {id}")]
    NodeNotFound { id: i64 },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),

    #[error("远程代理不可用: {0}")]
    AgentUnavailable(String),

    #[error("远程代理调用失败: {0}")]
    Agent(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        SchedulerError::DatabaseOperation(msg.into())
    }

    pub fn agent_error<S: Into<String>>(msg: S) -> Self {
        SchedulerError::Agent(msg.into())
    }

    /// 远程代理返回的错误（调用失败或代理不可用）
    pub fn is_agent_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::Agent(_) | SchedulerError::AgentUnavailable(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
