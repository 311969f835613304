//! 领域仓储抽象
//!
//! 定义调度器所需的数据访问接口，具体存储由基础设施层实现

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::SchedulerResult;

use crate::entities::{
    Backup, NewActivity, NewBackup, Node, Schedule, ScheduleUpdate, Server, Task, TimedTask,
};

/// 调度计划仓储
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<Schedule>>;

    /// 获取到期的调度计划：`is_active AND NOT is_processing AND next_run_at <= now`
    async fn get_due_schedules(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<Schedule>>;

    /// 原子地将 `is_processing` 从 false 置为 true
    ///
    /// 只有本次调用完成了状态切换才返回 `true`；标记已为 true 或计划不存在时返回 `false`。
    async fn try_mark_processing(&self, id: i64) -> SchedulerResult<bool>;

    /// 部分更新调度计划，返回是否命中记录
    async fn update_schedule(&self, id: i64, update: &ScheduleUpdate) -> SchedulerResult<bool>;

    /// 释放在 `stuck_before` 之前就已加锁且未再更新的调度计划，返回释放数量
    async fn reset_stuck_processing(&self, stuck_before: DateTime<Utc>) -> SchedulerResult<u64>;
}

/// 任务仓储
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn get_tasks_by_schedule_id(&self, schedule_id: i64) -> SchedulerResult<Vec<Task>>;
}

/// 服务器仓储
#[async_trait]
pub trait ServerRepository: Send + Sync {
    async fn get_server_by_id(&self, id: i64) -> SchedulerResult<Option<Server>>;
}

/// 节点仓储
#[async_trait]
pub trait NodeRepository: Send + Sync {
    async fn get_node_by_id(&self, id: i64) -> SchedulerResult<Option<Node>>;
}

/// 备份仓储
#[async_trait]
pub trait BackupRepository: Send + Sync {
    /// 创建备份记录，返回新记录ID
    async fn create_backup(&self, backup: &NewBackup) -> SchedulerResult<i64>;

    /// 软删除备份记录
    async fn delete_backup(&self, id: i64) -> SchedulerResult<bool>;

    /// 获取服务器未删除的备份
    async fn get_backups_by_server_id(&self, server_id: i64) -> SchedulerResult<Vec<Backup>>;
}

/// 服务器活动日志仓储
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn create_activity(&self, activity: &NewActivity) -> SchedulerResult<i64>;
}

/// 定时作业记录仓储，用于驱动节流与心跳
#[async_trait]
pub trait TimedTaskRepository: Send + Sync {
    async fn get_timed_task(&self, task_name: &str) -> SchedulerResult<Option<TimedTask>>;

    /// 记录触发时间
    ///
    /// `not_after` 为 `Some` 时是条件写入：只有尚无触发记录或上次触发不晚于该时间才写入，
    /// 多个进程同时触发时只有一个成功。返回是否写入。
    async fn record_trigger(
        &self,
        task_name: &str,
        at: DateTime<Utc>,
        not_after: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool>;

    /// 记录一次运行结果（心跳）
    async fn mark_run(&self, task_name: &str, success: bool, message: &str)
        -> SchedulerResult<()>;
}

/// 系统设置仓储
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get_setting(&self, name: &str) -> SchedulerResult<Option<String>>;
}

/// 调度器使用的全部仓储，以依赖注入的方式传给各组件
#[derive(Clone)]
pub struct Repositories {
    pub schedules: Arc<dyn ScheduleRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub servers: Arc<dyn ServerRepository>,
    pub nodes: Arc<dyn NodeRepository>,
    pub backups: Arc<dyn BackupRepository>,
    pub activities: Arc<dyn ActivityRepository>,
    pub timed_tasks: Arc<dyn TimedTaskRepository>,
    pub settings: Arc<dyn SettingsRepository>,
}
