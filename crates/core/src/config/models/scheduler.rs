use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

/// 调度驱动配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 配置级开关，关闭后驱动不再处理任何调度计划
    pub enabled: bool,
    /// 节流记录与心跳使用的任务名
    pub job_name: String,
    /// 两次触发之间的最小间隔，例如 `1M`、`30S`、`2H`
    pub min_interval: String,
    /// 守护模式下的触发周期
    pub tick_interval_seconds: u64,
    /// 超过该分钟数仍处于处理中的调度计划会被解锁，0 表示不启用
    pub stuck_processing_minutes: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            job_name: "server-schedule-processor".to_string(),
            min_interval: "1M".to_string(),
            tick_interval_seconds: 60,
            stuck_processing_minutes: 0,
        }
    }
}

impl SchedulerConfig {
    pub fn min_interval_duration(&self) -> SchedulerResult<Duration> {
        parse_interval(&self.min_interval)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.job_name.trim().is_empty() {
            return Err(anyhow::anyhow!("调度任务名不能为空"));
        }

        self.min_interval_duration()?;

        if self.tick_interval_seconds == 0 {
            return Err(anyhow::anyhow!("触发周期必须大于0"));
        }

        Ok(())
    }
}

/// 解析间隔表达式: 数字加单位，单位为 S(秒) M(分) H(时) D(天) W(周)
pub fn parse_interval(spec: &str) -> SchedulerResult<Duration> {
    let spec = spec.trim();
    let invalid = |reason: &str| {
        SchedulerError::Configuration(format!("无效的时间间隔 '{spec}': {reason}"))
    };

    let Some(unit) = spec.chars().last() else {
        return Err(invalid("不能为空"));
    };
    let amount: u64 = spec[..spec.len() - unit.len_utf8()]
        .trim()
        .parse()
        .map_err(|_| invalid("数量必须是正整数"))?;
    if amount == 0 {
        return Err(invalid("数量必须大于0"));
    }

    let unit_seconds = match unit.to_ascii_uppercase() {
        'S' => 1,
        'M' => 60,
        'H' => 3_600,
        'D' => 86_400,
        'W' => 604_800,
        _ => return Err(invalid("单位必须是 S/M/H/D/W 之一")),
    };

    amount
        .checked_mul(unit_seconds)
        .map(Duration::from_secs)
        .ok_or_else(|| invalid("数值溢出"))
}
