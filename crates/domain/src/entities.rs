use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::IgnoredFiles;

/// 五段式CRON字段：分 时 日 月 周
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronFields {
    pub minute: String,
    pub hour: String,
    pub day_of_month: String,
    pub month: String,
    pub day_of_week: String,
}

impl CronFields {
    pub fn new(
        minute: impl Into<String>,
        hour: impl Into<String>,
        day_of_month: impl Into<String>,
        month: impl Into<String>,
        day_of_week: impl Into<String>,
    ) -> Self {
        Self {
            minute: minute.into(),
            hour: hour.into(),
            day_of_month: day_of_month.into(),
            month: month.into(),
            day_of_week: day_of_week.into(),
        }
    }

    /// 以空白分隔的五段式表达式
    pub fn expression(&self) -> String {
        self.to_string()
    }
}

impl Default for CronFields {
    fn default() -> Self {
        Self::new("*", "*", "*", "*", "*")
    }
}

impl fmt::Display for CronFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.month, self.day_of_week
        )
    }
}

/// 服务器计划任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: i64,
    pub server_id: i64,
    pub name: String,
    pub cron: CronFields,
    pub is_active: bool,
    /// 互斥标记，执行期间为 true
    pub is_processing: bool,
    pub only_when_online: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// 活跃、未在处理中，且下次执行时间已到
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_processing && self.next_run_at.is_some_and(|at| at <= now)
    }
}

/// 调度计划的部分更新，None 字段保持不变
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleUpdate {
    pub is_processing: Option<bool>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl ScheduleUpdate {
    /// 仅释放处理锁
    pub fn release() -> Self {
        Self {
            is_processing: Some(false),
            ..Self::default()
        }
    }

    /// 跳过执行：推进下次执行时间并释放锁
    pub fn skipped(next_run_at: DateTime<Utc>) -> Self {
        Self {
            is_processing: Some(false),
            next_run_at: Some(next_run_at),
            last_run_at: None,
        }
    }

    /// 执行完成：记录执行时间、推进下次执行时间并释放锁
    pub fn completed(next_run_at: DateTime<Utc>, last_run_at: DateTime<Utc>) -> Self {
        Self {
            is_processing: Some(false),
            next_run_at: Some(next_run_at),
            last_run_at: Some(last_run_at),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.is_processing.is_none() && self.next_run_at.is_none() && self.last_run_at.is_none()
    }
}

/// 调度计划中的单个任务，按 sequence_id 顺序执行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub schedule_id: i64,
    pub sequence_id: i32,
    pub action: String,
    pub payload: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// 将存储的动作名与载荷解析为类型化的动作
    pub fn parse_action(&self) -> Result<TaskAction, ActionParseError> {
        TaskAction::parse(&self.action, self.payload.as_deref())
    }
}

/// 电源动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    Start,
    Stop,
    Restart,
    Kill,
}

impl PowerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerAction::Start => "start",
            PowerAction::Stop => "stop",
            PowerAction::Restart => "restart",
            PowerAction::Kill => "kill",
        }
    }

    /// 代理端等待电源状态切换的秒数
    pub fn wait_seconds(&self) -> u64 {
        match self {
            PowerAction::Kill => 60,
            _ => 30,
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerAction {
    type Err = ActionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "start" => Ok(PowerAction::Start),
            "stop" => Ok(PowerAction::Stop),
            "restart" => Ok(PowerAction::Restart),
            "kill" => Ok(PowerAction::Kill),
            other => Err(ActionParseError::InvalidPayload {
                action: "power".to_string(),
                reason: format!("无效的电源动作: '{other}'"),
            }),
        }
    }
}

/// 任务动作及其类型化载荷
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAction {
    Power(PowerAction),
    Backup { ignored_files: IgnoredFiles },
    Command(String),
    Install,
    Update,
}

impl TaskAction {
    /// 解析动作名与载荷
    ///
    /// `start`/`stop`/`restart`/`kill` 是 `power` 的别名，无需载荷。
    pub fn parse(action: &str, payload: Option<&str>) -> Result<Self, ActionParseError> {
        let payload = payload.unwrap_or_default();

        match action.trim().to_lowercase().as_str() {
            "power" => Ok(TaskAction::Power(payload.parse()?)),
            alias @ ("start" | "stop" | "restart" | "kill") => {
                Ok(TaskAction::Power(alias.parse()?))
            }
            "backup" => Ok(TaskAction::Backup {
                ignored_files: IgnoredFiles::from_payload(payload),
            }),
            "command" => {
                if payload.trim().is_empty() {
                    return Err(ActionParseError::InvalidPayload {
                        action: "command".to_string(),
                        reason: "命令不能为空".to_string(),
                    });
                }
                Ok(TaskAction::Command(payload.to_string()))
            }
            "install" => Ok(TaskAction::Install),
            "update" => Ok(TaskAction::Update),
            _ => Err(ActionParseError::Unknown(action.to_string())),
        }
    }

    /// 指标与日志使用的动作类别
    pub fn kind(&self) -> &'static str {
        match self {
            TaskAction::Power(_) => "power",
            TaskAction::Backup { .. } => "backup",
            TaskAction::Command(_) => "command",
            TaskAction::Install => "install",
            TaskAction::Update => "update",
        }
    }
}

/// 动作解析错误：未知动作属于跳过，载荷错误属于失败
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionParseError {
    #[error("未知的任务动作: {0}")]
    Unknown(String),

    #[error("任务动作 {action} 的载荷无效: {reason}")]
    InvalidPayload { action: String, reason: String },
}

/// 远程托管的服务器实例
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub node_id: i64,
    pub status: Option<String>,
    /// 允许保留的备份数量，0 表示不限制
    pub backup_limit: i32,
}

impl Server {
    pub const ONLINE_STATUS: &'static str = "running";

    pub fn is_online(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case(Self::ONLINE_STATUS))
    }
}

/// 运行远程代理的节点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub name: String,
    pub fqdn: String,
    pub scheme: String,
    pub daemon_listen: u16,
    pub daemon_token: String,
}

impl Node {
    /// 代理API根地址，例如 `https://node1.example.com:8080`
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}",
            self.scheme.trim_end_matches("://"),
            self.fqdn.trim_end_matches('/'),
            self.daemon_listen
        )
    }
}

/// 已存储的备份记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backup {
    pub id: i64,
    pub server_id: i64,
    pub uuid: String,
    pub name: String,
    pub ignored_files: String,
    pub disk: String,
    pub is_successful: bool,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// 新建备份记录的字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBackup {
    pub server_id: i64,
    pub uuid: String,
    pub name: String,
    pub ignored_files: String,
    pub disk: String,
    pub is_successful: bool,
    pub is_locked: bool,
}

/// 服务器活动日志事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityEvent {
    TaskExecuted,
    ScheduleExecuted,
    ScheduleSkippedOffline,
    ScheduleBackupSkippedLimit,
    ScheduleBackupStarted,
}

impl ActivityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityEvent::TaskExecuted => "task_executed",
            ActivityEvent::ScheduleExecuted => "schedule_executed",
            ActivityEvent::ScheduleSkippedOffline => "schedule_skipped_offline",
            ActivityEvent::ScheduleBackupSkippedLimit => "schedule_backup_skipped_limit",
            ActivityEvent::ScheduleBackupStarted => "schedule_backup_started",
        }
    }
}

impl fmt::Display for ActivityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 待写入的活动日志
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub server_id: i64,
    pub node_id: i64,
    pub event: ActivityEvent,
    pub metadata: serde_json::Value,
}

/// 已存储的活动日志
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerActivity {
    pub id: i64,
    pub server_id: i64,
    pub node_id: i64,
    pub event: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// 定时作业的节流与心跳记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedTask {
    pub task_name: String,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_success: Option<bool>,
    pub last_run_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schedule(next_run_at: Option<DateTime<Utc>>) -> Schedule {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Schedule {
            id: 1,
            server_id: 1,
            name: "nightly".to_string(),
            cron: CronFields::default(),
            is_active: true,
            is_processing: false,
            only_when_online: false,
            next_run_at,
            last_run_at: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_schedule_is_due() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap();

        assert!(schedule(Some(now)).is_due(now));
        assert!(!schedule(Some(now + chrono::Duration::minutes(1))).is_due(now));
        assert!(!schedule(None).is_due(now));

        let mut locked = schedule(Some(now));
        locked.is_processing = true;
        assert!(!locked.is_due(now));

        let mut inactive = schedule(Some(now));
        inactive.is_active = false;
        assert!(!inactive.is_due(now));
    }

    #[test]
    fn test_parse_power_actions() {
        assert_eq!(
            TaskAction::parse("power", Some("restart")).unwrap(),
            TaskAction::Power(PowerAction::Restart)
        );
        assert_eq!(
            TaskAction::parse("kill", None).unwrap(),
            TaskAction::Power(PowerAction::Kill)
        );
        assert_eq!(
            TaskAction::parse("Start", Some("ignored")).unwrap(),
            TaskAction::Power(PowerAction::Start)
        );
        assert!(matches!(
            TaskAction::parse("power", Some("explode")),
            Err(ActionParseError::InvalidPayload { .. })
        ));
        assert!(matches!(
            TaskAction::parse("power", None),
            Err(ActionParseError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_parse_other_actions() {
        assert_eq!(
            TaskAction::parse("command", Some("say hello")).unwrap(),
            TaskAction::Command("say hello".to_string())
        );
        assert!(matches!(
            TaskAction::parse("command", Some("   ")),
            Err(ActionParseError::InvalidPayload { .. })
        ));
        assert_eq!(TaskAction::parse("install", None).unwrap(), TaskAction::Install);
        assert_eq!(TaskAction::parse("update", None).unwrap(), TaskAction::Update);
        assert_eq!(
            TaskAction::parse("backup", Some("a.txt\nb.txt")).unwrap().kind(),
            "backup"
        );
        assert_eq!(
            TaskAction::parse("teleport", None),
            Err(ActionParseError::Unknown("teleport".to_string()))
        );
    }

    #[test]
    fn test_server_online_status() {
        let mut server = Server {
            id: 1,
            uuid: "uuid".to_string(),
            name: "srv".to_string(),
            node_id: 1,
            status: Some("RUNNING".to_string()),
            backup_limit: 0,
        };
        assert!(server.is_online());

        server.status = Some("offline".to_string());
        assert!(!server.is_online());

        server.status = None;
        assert!(!server.is_online());
    }

    #[test]
    fn test_node_base_url() {
        let node = Node {
            id: 1,
            name: "node-1".to_string(),
            fqdn: "node1.example.com".to_string(),
            scheme: "https".to_string(),
            daemon_listen: 8080,
            daemon_token: "secret".to_string(),
        };
        assert_eq!(node.base_url(), "https://node1.example.com:8080");
    }

    #[test]
    fn test_power_wait_seconds() {
        assert_eq!(PowerAction::Kill.wait_seconds(), 60);
        assert_eq!(PowerAction::Restart.wait_seconds(), 30);
    }
}
