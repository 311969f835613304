//! 调度驱动
//!
//! 每次触发先经过节流与功能开关，再依次处理所有到期的调度计划，
//! 最后写入心跳。单个调度计划的结果不影响心跳，只有驱动自身的错误才记为失败。

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use scheduler_core::{SchedulerConfig, SchedulerResult};
use scheduler_domain::{BatchSummary, DriverOutcome, Repositories};
use scheduler_infrastructure::{MetricsCollector, StructuredLogger};
use tracing::{debug, error, info, warn};

use crate::runner::ScheduleRunner;
use crate::throttle::CronThrottle;

/// 管理员关闭调度功能的设置项
pub const ALLOW_SCHEDULES_SETTING: &str = "server_allow_schedules";

/// 驱动成功时写入的心跳消息
pub const HEARTBEAT_MESSAGE: &str = "Processed schedules heartbeat";

pub struct ScheduleProcessor {
    repositories: Repositories,
    runner: Arc<ScheduleRunner>,
    throttle: CronThrottle,
    config: SchedulerConfig,
    metrics: Arc<MetricsCollector>,
}

impl ScheduleProcessor {
    pub fn new(
        repositories: Repositories,
        runner: Arc<ScheduleRunner>,
        config: SchedulerConfig,
        metrics: Arc<MetricsCollector>,
    ) -> SchedulerResult<Self> {
        let throttle = CronThrottle::new(
            config.job_name.clone(),
            &config.min_interval,
            repositories.timed_tasks.clone(),
        )?;

        Ok(Self {
            repositories,
            runner,
            throttle,
            config,
            metrics,
        })
    }

    pub fn job_name(&self) -> &str {
        self.throttle.job_name()
    }

    pub async fn run(&self, force: bool) -> DriverOutcome {
        self.run_at(Utc::now(), force).await
    }

    /// 执行一次驱动触发
    pub async fn run_at(&self, now: DateTime<Utc>, force: bool) -> DriverOutcome {
        match self.throttle.try_acquire(now, force).await {
            Ok(true) => {}
            Ok(false) => {
                self.metrics.record_throttled();
                return DriverOutcome::Throttled;
            }
            Err(e) => return self.fail(e.to_string()).await,
        }

        if force {
            info!("强制运行作业 {}，已跳过节流检查", self.job_name());
        }

        match self.process_batch(now).await {
            Ok(outcome) => {
                self.heartbeat(true, HEARTBEAT_MESSAGE).await;
                outcome
            }
            Err(e) => self.fail(e.to_string()).await,
        }
    }

    async fn process_batch(&self, now: DateTime<Utc>) -> SchedulerResult<DriverOutcome> {
        if !self.schedules_enabled().await? {
            info!("调度功能已关闭，跳过本次触发");
            return Ok(DriverOutcome::Disabled);
        }

        self.release_stuck_locks(now).await?;

        let due = self.repositories.schedules.get_due_schedules(now).await?;
        StructuredLogger::log_batch_started(self.job_name(), due.len());

        let started = Instant::now();
        let mut summary = BatchSummary {
            due: due.len(),
            ..Default::default()
        };

        // 逐个执行，单个调度计划的错误已在 runner 内部收敛为结果
        for schedule in &due {
            let outcome = self.runner.run(schedule).await;
            summary.record(&outcome);
        }

        let elapsed = started.elapsed();
        StructuredLogger::log_batch_finished(
            self.job_name(),
            &summary,
            elapsed.as_millis() as u64,
        );
        self.metrics.record_batch(&summary, elapsed.as_secs_f64());

        Ok(DriverOutcome::Completed(summary))
    }

    async fn schedules_enabled(&self) -> SchedulerResult<bool> {
        if !self.config.enabled {
            return Ok(false);
        }

        let setting = self
            .repositories
            .settings
            .get_setting(ALLOW_SCHEDULES_SETTING)
            .await?;

        Ok(!setting.is_some_and(|value| value.trim().eq_ignore_ascii_case("false")))
    }

    async fn release_stuck_locks(&self, now: DateTime<Utc>) -> SchedulerResult<()> {
        if self.config.stuck_processing_minutes == 0 {
            return Ok(());
        }

        let stuck_before = now - Duration::minutes(self.config.stuck_processing_minutes as i64);
        let released = self
            .repositories
            .schedules
            .reset_stuck_processing(stuck_before)
            .await?;

        if released > 0 {
            warn!(
                "释放了 {} 个超过 {} 分钟未更新的处理锁",
                released, self.config.stuck_processing_minutes
            );
            self.metrics.record_stuck_locks_released(released);
        }
        Ok(())
    }

    async fn fail(&self, message: String) -> DriverOutcome {
        error!("作业 {} 执行失败: {}", self.job_name(), message);
        self.metrics.record_driver_failure();
        self.heartbeat(false, &message).await;
        DriverOutcome::Failed(message)
    }

    async fn heartbeat(&self, success: bool, message: &str) {
        StructuredLogger::log_heartbeat(self.job_name(), success, message);

        match self
            .repositories
            .timed_tasks
            .mark_run(self.job_name(), success, message)
            .await
        {
            Ok(()) => debug!("已记录作业 {} 的心跳", self.job_name()),
            Err(e) => error!("记录作业 {} 的心跳失败: {}", self.job_name(), e),
        }
    }
}
