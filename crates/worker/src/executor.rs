//! 任务执行器
//!
//! 将解析后的任务动作分派到远程代理。每个任务的结果独立，
//! 不会抛出错误到调度计划层面。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use scheduler_core::SchedulerResult;
use scheduler_domain::{
    ActionParseError, ActivityEvent, ActivityRecorder, ActivityRepository, AgentHandle,
    BackupRepository, IgnoredFiles, NewBackup, Server, SkipReason, Task, TaskAction,
    TaskExecutor, TaskOutcome,
};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 通过远程代理执行任务的执行器
pub struct AgentTaskExecutor {
    backups: Arc<dyn BackupRepository>,
    activity: ActivityRecorder,
    backup_adapter: String,
}

impl AgentTaskExecutor {
    pub fn new(
        backups: Arc<dyn BackupRepository>,
        activities: Arc<dyn ActivityRepository>,
        backup_adapter: impl Into<String>,
    ) -> Self {
        Self {
            backups,
            activity: ActivityRecorder::new(activities),
            backup_adapter: backup_adapter.into(),
        }
    }

    async fn dispatch(
        &self,
        action: TaskAction,
        server: &Server,
        agent: &AgentHandle,
    ) -> SchedulerResult<TaskOutcome> {
        match action {
            TaskAction::Power(power) => {
                agent.client()?.power(&server.uuid, power).await.into_result()?;
            }
            TaskAction::Command(command) => {
                agent
                    .client()?
                    .send_commands(&server.uuid, &[command])
                    .await
                    .into_result()?;
            }
            TaskAction::Install => {
                agent.client()?.install_server(&server.uuid).await.into_result()?;
            }
            TaskAction::Update => {
                agent.client()?.reinstall_server(&server.uuid).await.into_result()?;
            }
            TaskAction::Backup { ignored_files } => {
                return self.create_backup(server, agent, &ignored_files).await;
            }
        }

        Ok(TaskOutcome::Succeeded)
    }

    /// 检查备份配额后创建本地记录并请求代理开始备份
    ///
    /// 代理拒绝时软删除本地记录，避免留下永远不会完成的备份。
    async fn create_backup(
        &self,
        server: &Server,
        agent: &AgentHandle,
        ignored_files: &IgnoredFiles,
    ) -> SchedulerResult<TaskOutcome> {
        let current = self.backups.get_backups_by_server_id(server.id).await?.len();

        if server.backup_limit > 0 && current >= server.backup_limit as usize {
            info!(
                "服务器 {} 的备份数量已达上限 ({}/{})，跳过备份任务",
                server.id, current, server.backup_limit
            );
            self.activity
                .record(
                    server,
                    ActivityEvent::ScheduleBackupSkippedLimit,
                    json!({
                        "current_backups": current,
                        "backup_limit": server.backup_limit,
                    }),
                )
                .await;
            return Ok(TaskOutcome::Skipped(SkipReason::BackupLimitReached {
                current,
                limit: server.backup_limit,
            }));
        }

        let client = agent.client()?;
        let ignored_json = ignored_files.to_json();
        let backup = NewBackup {
            server_id: server.id,
            uuid: Uuid::new_v4().to_string(),
            name: format!("Scheduled backup at {}", Utc::now().format("%Y-%m-%d %H:%M:%S")),
            ignored_files: ignored_json.clone(),
            disk: self.backup_adapter.clone(),
            is_successful: false,
            is_locked: false,
        };
        let backup_id = self.backups.create_backup(&backup).await?;
        debug!("已创建备份记录 {} ({})", backup_id, backup.uuid);

        let response = client
            .create_backup(&server.uuid, &self.backup_adapter, &backup.uuid, &ignored_json)
            .await;

        if let Err(e) = response.into_result() {
            match self.backups.delete_backup(backup_id).await {
                Ok(_) => debug!("已删除失败的备份记录 {}", backup_id),
                Err(delete_err) => warn!("删除失败的备份记录 {} 时出错: {}", backup_id, delete_err),
            }
            return Err(e);
        }

        self.activity
            .record(
                server,
                ActivityEvent::ScheduleBackupStarted,
                json!({
                    "backup_uuid": backup.uuid,
                    "backup_id": backup_id,
                    "schedule_triggered": true,
                }),
            )
            .await;

        Ok(TaskOutcome::Succeeded)
    }
}

#[async_trait]
impl TaskExecutor for AgentTaskExecutor {
    async fn execute(&self, task: &Task, server: &Server, agent: &AgentHandle) -> TaskOutcome {
        self.activity
            .record(
                server,
                ActivityEvent::TaskExecuted,
                json!({
                    "task_id": task.id,
                    "action": task.action,
                    "sequence_id": task.sequence_id,
                    "execution_time": Utc::now().to_rfc3339(),
                }),
            )
            .await;

        let action = match task.parse_action() {
            Ok(action) => action,
            Err(ActionParseError::Unknown(action)) => {
                warn!("任务 {} 的动作 '{}' 无法识别，跳过", task.id, action);
                return TaskOutcome::Skipped(SkipReason::UnknownAction(action));
            }
            Err(e) => return TaskOutcome::Failed(e.to_string()),
        };

        match self.dispatch(action, server, agent).await {
            Ok(outcome) => outcome,
            Err(e) => TaskOutcome::Failed(e.to_string()),
        }
    }
}
