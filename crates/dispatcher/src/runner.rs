//! 单个调度计划的执行状态机
//!
//! 空闲 → 已加锁 → (服务器离线跳过 | 执行任务) → 空闲。
//! 处理锁 `is_processing` 通过存储层的条件更新获取，这是唯一的并发保护。
//! 加锁成功后，无论成功、跳过还是出错，返回前都会释放锁。

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::{
    ActivityEvent, ActivityRecorder, AgentClientFactory, AgentHandle, ExecutionSummary,
    Repositories, RunOutcome, RunSkipReason, Schedule, ScheduleUpdate, Server, TaskExecutor,
};
use scheduler_infrastructure::{MetricsCollector, StructuredLogger};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use crate::cron_utils::next_run_after;

pub struct ScheduleRunner {
    repositories: Repositories,
    agent_factory: Arc<dyn AgentClientFactory>,
    executor: Arc<dyn TaskExecutor>,
    activity: ActivityRecorder,
    metrics: Arc<MetricsCollector>,
}

impl ScheduleRunner {
    pub fn new(
        repositories: Repositories,
        agent_factory: Arc<dyn AgentClientFactory>,
        executor: Arc<dyn TaskExecutor>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let activity = ActivityRecorder::new(repositories.activities.clone());

        Self {
            repositories,
            agent_factory,
            executor,
            activity,
            metrics,
        }
    }

    /// 以当前时间执行一个到期的调度计划
    pub async fn run(&self, schedule: &Schedule) -> RunOutcome {
        self.run_at(schedule, Utc::now()).await
    }

    /// 执行一个到期的调度计划，错误不会向外传播
    #[instrument(skip(self, schedule), fields(schedule.id = schedule.id, server.id = schedule.server_id))]
    pub async fn run_at(&self, schedule: &Schedule, now: DateTime<Utc>) -> RunOutcome {
        let started = Instant::now();
        let outcome = self.run_locked(schedule, now).await;

        match &outcome {
            RunOutcome::Succeeded {
                summary,
                next_run_at,
            } => StructuredLogger::log_schedule_completed(schedule, summary, *next_run_at),
            RunOutcome::Skipped(reason) => StructuredLogger::log_schedule_skipped(schedule, reason),
            RunOutcome::Failed(message) => StructuredLogger::log_schedule_failed(schedule, message),
        }
        self.metrics
            .record_schedule_run(&outcome, started.elapsed().as_secs_f64());

        outcome
    }

    async fn run_locked(&self, schedule: &Schedule, now: DateTime<Utc>) -> RunOutcome {
        match self.repositories.schedules.try_mark_processing(schedule.id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("调度计划 {} 正在被其他执行器处理，跳过", schedule.id);
                return RunOutcome::Skipped(RunSkipReason::LockHeld);
            }
            Err(e) => {
                // 未能确认加锁结果，不能释放可能属于其他执行器的锁
                warn!("获取调度计划 {} 的处理锁失败: {}", schedule.id, e);
                return RunOutcome::Skipped(RunSkipReason::LockHeld);
            }
        }

        StructuredLogger::log_schedule_started(schedule);

        match self.process(schedule, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("处理调度计划 {} 时发生错误: {}", schedule.id, e);
                self.force_release(schedule.id).await;
                RunOutcome::Failed(e.to_string())
            }
        }
    }

    async fn process(&self, schedule: &Schedule, now: DateTime<Utc>) -> SchedulerResult<RunOutcome> {
        let Some(server) = self
            .repositories
            .servers
            .get_server_by_id(schedule.server_id)
            .await?
        else {
            warn!(
                "调度计划 {} 关联的服务器 {} 不存在",
                schedule.id, schedule.server_id
            );
            self.persist(schedule.id, &ScheduleUpdate::release()).await?;
            return Ok(RunOutcome::Skipped(RunSkipReason::ServerNotFound {
                server_id: schedule.server_id,
            }));
        };

        // 无效或永不匹配的表达式必须在派发任何任务之前失败
        let next_run_at = next_run_after(&schedule.cron, schedule.next_run_at, now)?;

        if schedule.only_when_online && !server.is_online() {
            return self.skip_offline(schedule, &server, next_run_at).await;
        }

        let started = Instant::now();
        let mut summary = self.execute_tasks(schedule, &server).await?;
        summary.duration_ms = started.elapsed().as_millis() as u64;

        if summary.total > 0 {
            self.activity
                .record(
                    &server,
                    ActivityEvent::ScheduleExecuted,
                    json!({
                        "schedule_id": schedule.id,
                        "schedule_name": schedule.name,
                        "executed_tasks": summary.executed,
                        "failed_tasks": summary.failed,
                        "skipped_tasks": summary.skipped,
                        "total_tasks": summary.total,
                        "execution_time": now.to_rfc3339(),
                        "duration_ms": summary.duration_ms,
                    }),
                )
                .await;
        }

        self.persist(schedule.id, &ScheduleUpdate::completed(next_run_at, now))
            .await?;

        Ok(RunOutcome::Succeeded {
            summary,
            next_run_at,
        })
    }

    async fn skip_offline(
        &self,
        schedule: &Schedule,
        server: &Server,
        next_run_at: DateTime<Utc>,
    ) -> SchedulerResult<RunOutcome> {
        info!(
            "服务器 {} 不在线 (状态: {})，跳过调度计划 {}",
            server.id,
            server.status.as_deref().unwrap_or("unknown"),
            schedule.id
        );

        self.persist(schedule.id, &ScheduleUpdate::skipped(next_run_at))
            .await?;

        self.activity
            .record(
                server,
                ActivityEvent::ScheduleSkippedOffline,
                json!({
                    "schedule_id": schedule.id,
                    "schedule_name": schedule.name,
                    "reason": "server_offline",
                    "next_run_at": next_run_at.to_rfc3339(),
                }),
            )
            .await;

        Ok(RunOutcome::Skipped(RunSkipReason::ServerOffline { next_run_at }))
    }

    /// 按 sequence_id 升序依次执行全部任务，单个任务失败不影响后续任务
    async fn execute_tasks(
        &self,
        schedule: &Schedule,
        server: &Server,
    ) -> SchedulerResult<ExecutionSummary> {
        let mut tasks = self
            .repositories
            .tasks
            .get_tasks_by_schedule_id(schedule.id)
            .await?;
        // 稳定排序，sequence_id 相同的任务保持存储返回的顺序
        tasks.sort_by_key(|task| task.sequence_id);

        let mut summary = ExecutionSummary::default();
        if tasks.is_empty() {
            info!("调度计划 {} 没有任务", schedule.id);
            return Ok(summary);
        }

        let agent = self.connect_agent(server).await;

        for task in &tasks {
            let outcome = self.executor.execute(task, server, &agent).await;

            StructuredLogger::log_task_outcome(task, &outcome);
            let action_kind = task
                .parse_action()
                .map(|action| action.kind())
                .unwrap_or("unknown");
            self.metrics.record_task_outcome(action_kind, &outcome);

            summary.record(&outcome);
        }

        Ok(summary)
    }

    async fn connect_agent(&self, server: &Server) -> AgentHandle {
        let node = match self.repositories.nodes.get_node_by_id(server.node_id).await {
            Ok(Some(node)) => node,
            Ok(None) => {
                let err = SchedulerError::NodeNotFound { id: server.node_id };
                warn!("服务器 {} 的节点不可用: {}", server.id, err);
                return AgentHandle::Unavailable(err.to_string());
            }
            Err(e) => {
                warn!("查询服务器 {} 的节点失败: {}", server.id, e);
                return AgentHandle::Unavailable(e.to_string());
            }
        };

        match self.agent_factory.connect(&node) {
            Ok(client) => AgentHandle::Connected(client),
            Err(e) => {
                warn!("无法连接节点 {} 的远程代理: {}", node.id, e);
                AgentHandle::Unavailable(e.to_string())
            }
        }
    }

    async fn persist(&self, schedule_id: i64, update: &ScheduleUpdate) -> SchedulerResult<()> {
        let updated = self
            .repositories
            .schedules
            .update_schedule(schedule_id, update)
            .await?;

        if !updated {
            return Err(SchedulerError::ScheduleNotFound { id: schedule_id });
        }
        Ok(())
    }

    async fn force_release(&self, schedule_id: i64) {
        match self
            .repositories
            .schedules
            .update_schedule(schedule_id, &ScheduleUpdate::release())
            .await
        {
            Ok(_) => debug!("已释放调度计划 {} 的处理锁", schedule_id),
            Err(e) => error!("释放调度计划 {} 的处理锁失败: {}", schedule_id, e),
        }
    }
}
