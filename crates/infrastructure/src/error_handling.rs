//! Error handling for repository operations with rich context
//!
//! Every store adapter wraps `sqlx` failures with the operation and the
//! entity involved before handing them to the scheduler.

use chrono::{DateTime, Utc};
use scheduler_core::SchedulerError;
use sqlx::Error as SqlxError;
use std::fmt;
use tracing::{debug, error};

/// Operation context for repository operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryOperation {
    Create,
    Read,
    Update,
    Delete,
    Query,
    Lock,
    Upsert,
    Migrate,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryOperation::Create => write!(f, "创建"),
            RepositoryOperation::Read => write!(f, "查询"),
            RepositoryOperation::Update => write!(f, "更新"),
            RepositoryOperation::Delete => write!(f, "删除"),
            RepositoryOperation::Query => write!(f, "查询"),
            RepositoryOperation::Lock => write!(f, "加锁"),
            RepositoryOperation::Upsert => write!(f, "写入"),
            RepositoryOperation::Migrate => write!(f, "迁移"),
        }
    }
}

/// Entity kinds persisted by the scheduler stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Schedule,
    Task,
    Server,
    Node,
    Backup,
    Activity,
    TimedTask,
    Setting,
    Schema,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Schedule => write!(f, "调度计划"),
            EntityKind::Task => write!(f, "任务"),
            EntityKind::Server => write!(f, "服务器"),
            EntityKind::Node => write!(f, "节点"),
            EntityKind::Backup => write!(f, "备份"),
            EntityKind::Activity => write!(f, "活动日志"),
            EntityKind::TimedTask => write!(f, "定时作业"),
            EntityKind::Setting => write!(f, "系统设置"),
            EntityKind::Schema => write!(f, "数据库结构"),
        }
    }
}

/// Context information for a repository operation
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub operation: RepositoryOperation,
    pub entity: EntityKind,
    pub entity_id: Option<i64>,
    pub entity_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub additional_info: Option<String>,
}

impl OperationContext {
    pub fn new(operation: RepositoryOperation, entity: EntityKind) -> Self {
        Self {
            operation,
            entity,
            entity_id: None,
            entity_name: None,
            timestamp: Utc::now(),
            additional_info: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.entity_id = Some(id);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.entity_name = Some(name.into());
        self
    }

    pub fn with_additional_info(mut self, info: impl Into<String>) -> Self {
        self.additional_info = Some(info.into());
        self
    }

    pub fn entity_description(&self) -> String {
        match (&self.entity_id, &self.entity_name) {
            (Some(id), Some(name)) => format!("{} '{}' (ID: {})", self.entity, name, id),
            (Some(id), None) => format!("{} (ID: {})", self.entity, id),
            (None, Some(name)) => format!("{} '{}'", self.entity, name),
            (None, None) => self.entity.to_string(),
        }
    }
}

/// Repository error helpers
pub struct RepositoryErrorHelpers;

impl RepositoryErrorHelpers {
    /// Convert a sqlx error into a scheduler error carrying the operation context
    pub fn database_error(context: OperationContext, error: SqlxError) -> SchedulerError {
        let entity_desc = context.entity_description();
        let operation_desc = context.operation.to_string();

        let error_msg = match &error {
            SqlxError::Database(db_error) => match db_error.constraint() {
                Some(constraint) => format!(
                    "{operation_desc}{entity_desc}时发生数据库约束冲突: {constraint}"
                ),
                None => format!("{operation_desc}{entity_desc}时发生数据库错误: {db_error}"),
            },
            SqlxError::PoolClosed => format!("{operation_desc}{entity_desc}时数据库连接池已关闭"),
            SqlxError::PoolTimedOut => format!("{operation_desc}{entity_desc}时数据库连接池超时"),
            SqlxError::Io(io_error) => {
                format!("{operation_desc}{entity_desc}时发生I/O错误: {io_error}")
            }
            SqlxError::ColumnDecode { index, source } => {
                format!("{operation_desc}{entity_desc}时解析列 {index} 失败: {source}")
            }
            _ => format!("{operation_desc}{entity_desc}时发生未知数据库错误: {error}"),
        };

        error!(
            error = %error,
            operation = %context.operation,
            entity = %context.entity,
            entity.id = ?context.entity_id,
            additional_info = ?context.additional_info,
            "{}",
            error_msg
        );

        SchedulerError::database_error(error_msg)
    }

    /// A stored row could not be mapped onto a domain entity
    pub fn mapping_error(context: OperationContext, message: impl fmt::Display) -> SchedulerError {
        let error_msg = format!(
            "{}{}时数据映射失败: {}",
            context.operation,
            context.entity_description(),
            message
        );
        error!(entity = %context.entity, entity.id = ?context.entity_id, "{}", error_msg);
        SchedulerError::database_error(error_msg)
    }

    pub fn log_operation_success(context: &OperationContext, affected: u64) {
        debug!(
            operation = %context.operation,
            entity = %context.entity,
            entity.id = ?context.entity_id,
            affected = affected,
            "{}{}成功",
            context.operation,
            context.entity_description()
        );
    }
}
