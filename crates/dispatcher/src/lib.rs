//! 调度计划的触发与执行
//!
//! - `cron_utils`: 根据 cron 字段计算下一次执行时间
//! - `throttle`: 基于持久化记录的驱动节流
//! - `runner`: 单个调度计划的加锁、在线检查与任务执行
//! - `processor`: 驱动入口，处理一批到期的调度计划并写入心跳

pub mod cron_utils;
pub mod processor;
pub mod runner;
pub mod throttle;

pub use cron_utils::{next_run_after, next_run_at, CronScheduler};
pub use processor::{ScheduleProcessor, ALLOW_SCHEDULES_SETTING, HEARTBEAT_MESSAGE};
pub use runner::ScheduleRunner;
pub use throttle::{force_requested_by_env, CronThrottle, FORCE_ENV_VAR};
