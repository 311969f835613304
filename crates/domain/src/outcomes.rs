//! 任务、调度计划与驱动三个层级的执行结果
//!
//! 跳过与失败是两种不同的结果：跳过是预期行为，不计入失败。

use chrono::{DateTime, Utc};

/// 任务被跳过的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    BackupLimitReached { current: usize, limit: i32 },
    UnknownAction(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::BackupLimitReached { current, limit } => {
                write!(f, "备份数量已达上限 ({current}/{limit})")
            }
            SkipReason::UnknownAction(action) => write!(f, "未知的任务动作: {action}"),
        }
    }
}

/// 单个任务的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Skipped(SkipReason),
    Failed(String),
}

impl TaskOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Succeeded => "succeeded",
            TaskOutcome::Skipped(_) => "skipped",
            TaskOutcome::Failed(_) => "failed",
        }
    }
}

/// 一次调度计划执行的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub executed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total: usize,
    pub duration_ms: u64,
}

impl ExecutionSummary {
    pub fn record(&mut self, outcome: &TaskOutcome) {
        self.total += 1;
        match outcome {
            TaskOutcome::Succeeded => self.executed += 1,
            TaskOutcome::Skipped(_) => self.skipped += 1,
            TaskOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// 调度计划未执行任务的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunSkipReason {
    /// 处理锁已被其他执行持有（或加锁时存储出错）
    LockHeld,
    ServerOffline { next_run_at: DateTime<Utc> },
    ServerNotFound { server_id: i64 },
}

/// 一次调度计划执行的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded {
        summary: ExecutionSummary,
        next_run_at: DateTime<Utc>,
    },
    Skipped(RunSkipReason),
    Failed(String),
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded { .. } => "succeeded",
            RunOutcome::Skipped(RunSkipReason::LockHeld) => "lock_held",
            RunOutcome::Skipped(RunSkipReason::ServerOffline { .. }) => "server_offline",
            RunOutcome::Skipped(RunSkipReason::ServerNotFound { .. }) => "server_not_found",
            RunOutcome::Failed(_) => "failed",
        }
    }
}

/// 一批到期调度计划的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub due: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Succeeded { .. } => self.succeeded += 1,
            RunOutcome::Skipped(_) => self.skipped += 1,
            RunOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// 驱动一次触发的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverOutcome {
    /// 距上次触发未满最小间隔
    Throttled,
    /// 调度功能已被管理员关闭
    Disabled,
    Completed(BatchSummary),
    Failed(String),
}

impl DriverOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, DriverOutcome::Failed(_))
    }
}
