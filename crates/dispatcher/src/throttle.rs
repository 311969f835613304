use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use scheduler_core::{config::models::parse_interval, SchedulerError, SchedulerResult};
use scheduler_domain::TimedTaskRepository;
use tracing::debug;

/// 环境变量为 `1` 或 `true` 时跳过节流
pub const FORCE_ENV_VAR: &str = "SCHEDULER_CRON_FORCE";

/// 外部调用方启动抖动的容差
const TRIGGER_JITTER_ALLOWANCE_SECONDS: i64 = 5;

/// 检查环境变量是否要求强制运行
pub fn force_requested_by_env() -> bool {
    std::env::var(FORCE_ENV_VAR)
        .map(|value| matches!(value.trim().to_lowercase().as_str(), "1" | "true"))
        .unwrap_or(false)
}

/// 基于持久化触发记录的节流器
///
/// 触发记录跨进程共享，进程重启后节流依然有效。
pub struct CronThrottle {
    job_name: String,
    interval: Duration,
    store: Arc<dyn TimedTaskRepository>,
}

impl CronThrottle {
    pub fn new(
        job_name: impl Into<String>,
        interval_spec: &str,
        store: Arc<dyn TimedTaskRepository>,
    ) -> SchedulerResult<Self> {
        let interval = parse_interval(interval_spec)?;
        let interval = Duration::from_std(interval).map_err(|e| {
            SchedulerError::Configuration(format!("无效的时间间隔 '{interval_spec}': {e}"))
        })?;

        Ok(Self {
            job_name: job_name.into(),
            interval,
            store,
        })
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 尝试获取一次触发机会，成功时记录触发时间
    ///
    /// 检查与记录是存储层的一次条件写入，多个进程同时触发时只有一个成功。
    pub async fn try_acquire(&self, now: DateTime<Utc>, force: bool) -> SchedulerResult<bool> {
        let not_after = (!force).then(|| self.latest_accepted_trigger(now));

        let acquired = self
            .store
            .record_trigger(&self.job_name, now, not_after)
            .await?;

        if !acquired {
            debug!(
                "作业 {} 距上次触发未满 {} 秒，跳过",
                self.job_name,
                self.interval.num_seconds()
            );
        }
        Ok(acquired)
    }

    /// 上次触发不晚于该时间时允许本次触发
    fn latest_accepted_trigger(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let allowance = Duration::seconds(TRIGGER_JITTER_ALLOWANCE_SECONDS).min(self.interval / 2);
        now - (self.interval - allowance)
    }
}
