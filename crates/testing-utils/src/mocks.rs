//! Mock implementations for all repository and agent traits
//!
//! In-memory doubles for unit testing without a database or a live agent.
//! Every store can be told to fail so error paths can be exercised.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::entities::{
    Backup, NewActivity, NewBackup, Node, PowerAction, Schedule, ScheduleUpdate, Server, Task,
    TimedTask,
};
use scheduler_domain::ports::{AgentClient, AgentClientFactory, AgentHandle, AgentResponse, TaskExecutor};
use scheduler_domain::repositories::{
    ActivityRepository, BackupRepository, NodeRepository, Repositories, ScheduleRepository,
    ServerRepository, SettingsRepository, TaskRepository, TimedTaskRepository,
};
use scheduler_domain::{ActivityEvent, TaskOutcome};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn injected(operation: &str) -> SchedulerError {
    SchedulerError::DatabaseOperation(format!("injected failure: {operation}"))
}

#[derive(Debug, Default)]
struct ScheduleFailures {
    lock: bool,
    due_query: bool,
    completion_update: bool,
}

/// Mock implementation of ScheduleRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockScheduleRepository {
    schedules: Arc<Mutex<HashMap<i64, Schedule>>>,
    updates: Arc<Mutex<Vec<(i64, ScheduleUpdate)>>>,
    failures: Arc<Mutex<ScheduleFailures>>,
}

impl MockScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedules(schedules: Vec<Schedule>) -> Self {
        let repo = Self::new();
        for schedule in schedules {
            repo.insert(schedule);
        }
        repo
    }

    pub fn insert(&self, schedule: Schedule) {
        self.schedules.lock().unwrap().insert(schedule.id, schedule);
    }

    pub fn get(&self, id: i64) -> Option<Schedule> {
        self.schedules.lock().unwrap().get(&id).cloned()
    }

    /// Every update applied through `update_schedule`, in call order
    pub fn updates(&self) -> Vec<(i64, ScheduleUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    /// `try_mark_processing` returns an error
    pub fn fail_lock_acquisition(&self) {
        self.failures.lock().unwrap().lock = true;
    }

    /// `get_due_schedules` returns an error
    pub fn fail_due_query(&self) {
        self.failures.lock().unwrap().due_query = true;
    }

    /// Updates that move `next_run_at` fail; a plain lock release still succeeds
    pub fn fail_completion_updates(&self) {
        self.failures.lock().unwrap().completion_update = true;
    }
}

#[async_trait]
impl ScheduleRepository for MockScheduleRepository {
    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<Schedule>> {
        Ok(self.get(id))
    }

    async fn get_due_schedules(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<Schedule>> {
        if self.failures.lock().unwrap().due_query {
            return Err(injected("get_due_schedules"));
        }

        let schedules = self.schedules.lock().unwrap();
        let mut due: Vec<Schedule> = schedules
            .values()
            .filter(|schedule| schedule.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|schedule| (schedule.next_run_at, schedule.id));
        Ok(due)
    }

    async fn try_mark_processing(&self, id: i64) -> SchedulerResult<bool> {
        if self.failures.lock().unwrap().lock {
            return Err(injected("try_mark_processing"));
        }

        let mut schedules = self.schedules.lock().unwrap();
        match schedules.get_mut(&id) {
            Some(schedule) if !schedule.is_processing => {
                schedule.is_processing = true;
                schedule.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_schedule(&self, id: i64, update: &ScheduleUpdate) -> SchedulerResult<bool> {
        if update.next_run_at.is_some() && self.failures.lock().unwrap().completion_update {
            return Err(injected("update_schedule"));
        }

        self.updates.lock().unwrap().push((id, update.clone()));

        let mut schedules = self.schedules.lock().unwrap();
        let Some(schedule) = schedules.get_mut(&id) else {
            return Ok(false);
        };

        if let Some(is_processing) = update.is_processing {
            schedule.is_processing = is_processing;
        }
        if let Some(next_run_at) = update.next_run_at {
            schedule.next_run_at = Some(next_run_at);
        }
        if let Some(last_run_at) = update.last_run_at {
            schedule.last_run_at = Some(last_run_at);
        }
        schedule.updated_at = Utc::now();
        Ok(true)
    }

    async fn reset_stuck_processing(&self, stuck_before: DateTime<Utc>) -> SchedulerResult<u64> {
        let mut schedules = self.schedules.lock().unwrap();
        let mut released = 0;
        for schedule in schedules.values_mut() {
            if schedule.is_processing && schedule.updated_at < stuck_before {
                schedule.is_processing = false;
                released += 1;
            }
        }
        Ok(released)
    }
}

/// Mock implementation of TaskRepository for testing
///
/// Tasks are returned in insertion order; ordering by sequence is the caller's job.
#[derive(Debug, Clone, Default)]
pub struct MockTaskRepository {
    tasks: Arc<Mutex<Vec<Task>>>,
    fail: Arc<Mutex<bool>>,
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let repo = Self::new();
        repo.tasks.lock().unwrap().extend(tasks);
        repo
    }

    pub fn insert(&self, task: Task) {
        self.tasks.lock().unwrap().push(task);
    }

    pub fn fail_queries(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn get_tasks_by_schedule_id(&self, schedule_id: i64) -> SchedulerResult<Vec<Task>> {
        if *self.fail.lock().unwrap() {
            return Err(injected("get_tasks_by_schedule_id"));
        }

        let tasks = self.tasks.lock().unwrap();
        Ok(tasks
            .iter()
            .filter(|task| task.schedule_id == schedule_id)
            .cloned()
            .collect())
    }
}

/// Mock implementation of ServerRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockServerRepository {
    servers: Arc<Mutex<HashMap<i64, Server>>>,
    fail: Arc<Mutex<bool>>,
}

impl MockServerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_servers(servers: Vec<Server>) -> Self {
        let repo = Self::new();
        for server in servers {
            repo.insert(server);
        }
        repo
    }

    pub fn insert(&self, server: Server) {
        self.servers.lock().unwrap().insert(server.id, server);
    }

    pub fn fail_queries(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl ServerRepository for MockServerRepository {
    async fn get_server_by_id(&self, id: i64) -> SchedulerResult<Option<Server>> {
        if *self.fail.lock().unwrap() {
            return Err(injected("get_server_by_id"));
        }
        Ok(self.servers.lock().unwrap().get(&id).cloned())
    }
}

/// Mock implementation of NodeRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockNodeRepository {
    nodes: Arc<Mutex<HashMap<i64, Node>>>,
    fail: Arc<Mutex<bool>>,
}

impl MockNodeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(nodes: Vec<Node>) -> Self {
        let repo = Self::new();
        for node in nodes {
            repo.insert(node);
        }
        repo
    }

    pub fn insert(&self, node: Node) {
        self.nodes.lock().unwrap().insert(node.id, node);
    }

    pub fn fail_queries(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl NodeRepository for MockNodeRepository {
    async fn get_node_by_id(&self, id: i64) -> SchedulerResult<Option<Node>> {
        if *self.fail.lock().unwrap() {
            return Err(injected("get_node_by_id"));
        }
        Ok(self.nodes.lock().unwrap().get(&id).cloned())
    }
}

/// Mock implementation of BackupRepository for testing
#[derive(Debug, Clone)]
pub struct MockBackupRepository {
    backups: Arc<Mutex<Vec<Backup>>>,
    next_id: Arc<Mutex<i64>>,
    fail_create: Arc<Mutex<bool>>,
}

impl MockBackupRepository {
    pub fn new() -> Self {
        Self {
            backups: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(Mutex::new(1)),
            fail_create: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_backups(backups: Vec<Backup>) -> Self {
        let max_id = backups.iter().map(|backup| backup.id).max().unwrap_or(0);
        let repo = Self::new();
        *repo.next_id.lock().unwrap() = max_id + 1;
        repo.backups.lock().unwrap().extend(backups);
        repo
    }

    /// All records, soft-deleted ones included
    pub fn all_backups(&self) -> Vec<Backup> {
        self.backups.lock().unwrap().clone()
    }

    pub fn active_count(&self) -> usize {
        self.backups
            .lock()
            .unwrap()
            .iter()
            .filter(|backup| backup.deleted_at.is_none())
            .count()
    }

    pub fn fail_creates(&self) {
        *self.fail_create.lock().unwrap() = true;
    }
}

impl Default for MockBackupRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackupRepository for MockBackupRepository {
    async fn create_backup(&self, backup: &NewBackup) -> SchedulerResult<i64> {
        if *self.fail_create.lock().unwrap() {
            return Err(injected("create_backup"));
        }

        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;

        self.backups.lock().unwrap().push(Backup {
            id,
            server_id: backup.server_id,
            uuid: backup.uuid.clone(),
            name: backup.name.clone(),
            ignored_files: backup.ignored_files.clone(),
            disk: backup.disk.clone(),
            is_successful: backup.is_successful,
            is_locked: backup.is_locked,
            created_at: Utc::now(),
            deleted_at: None,
        });
        Ok(id)
    }

    async fn delete_backup(&self, id: i64) -> SchedulerResult<bool> {
        let mut backups = self.backups.lock().unwrap();
        match backups
            .iter_mut()
            .find(|backup| backup.id == id && backup.deleted_at.is_none())
        {
            Some(backup) => {
                backup.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_backups_by_server_id(&self, server_id: i64) -> SchedulerResult<Vec<Backup>> {
        let backups = self.backups.lock().unwrap();
        Ok(backups
            .iter()
            .filter(|backup| backup.server_id == server_id && backup.deleted_at.is_none())
            .cloned()
            .collect())
    }
}

/// Mock implementation of ActivityRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockActivityRepository {
    activities: Arc<Mutex<Vec<NewActivity>>>,
    fail: Arc<Mutex<bool>>,
}

impl MockActivityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activities(&self) -> Vec<NewActivity> {
        self.activities.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<ActivityEvent> {
        self.activities
            .lock()
            .unwrap()
            .iter()
            .map(|activity| activity.event)
            .collect()
    }

    /// First recorded activity of the given kind
    pub fn find(&self, event: ActivityEvent) -> Option<NewActivity> {
        self.activities
            .lock()
            .unwrap()
            .iter()
            .find(|activity| activity.event == event)
            .cloned()
    }

    pub fn fail_writes(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl ActivityRepository for MockActivityRepository {
    async fn create_activity(&self, activity: &NewActivity) -> SchedulerResult<i64> {
        if *self.fail.lock().unwrap() {
            return Err(injected("create_activity"));
        }

        let mut activities = self.activities.lock().unwrap();
        activities.push(activity.clone());
        Ok(activities.len() as i64)
    }
}

/// Mock implementation of TimedTaskRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockTimedTaskRepository {
    records: Arc<Mutex<HashMap<String, TimedTask>>>,
    fail: Arc<Mutex<bool>>,
}

impl MockTimedTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_last_trigger(task_name: &str, at: DateTime<Utc>) -> Self {
        let repo = Self::new();
        repo.records
            .lock()
            .unwrap()
            .insert(task_name.to_string(), empty_record(task_name, Some(at)));
        repo
    }

    pub fn get(&self, task_name: &str) -> Option<TimedTask> {
        self.records.lock().unwrap().get(task_name).cloned()
    }

    pub fn fail_queries(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

fn empty_record(task_name: &str, last_triggered_at: Option<DateTime<Utc>>) -> TimedTask {
    TimedTask {
        task_name: task_name.to_string(),
        last_triggered_at,
        last_run_at: None,
        last_run_success: None,
        last_run_message: None,
    }
}

#[async_trait]
impl TimedTaskRepository for MockTimedTaskRepository {
    async fn get_timed_task(&self, task_name: &str) -> SchedulerResult<Option<TimedTask>> {
        if *self.fail.lock().unwrap() {
            return Err(injected("get_timed_task"));
        }
        Ok(self.get(task_name))
    }

    async fn record_trigger(
        &self,
        task_name: &str,
        at: DateTime<Utc>,
        not_after: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool> {
        if *self.fail.lock().unwrap() {
            return Err(injected("record_trigger"));
        }

        let mut records = self.records.lock().unwrap();
        let record = records
            .entry(task_name.to_string())
            .or_insert_with(|| empty_record(task_name, None));
        let allowed = match (not_after, record.last_triggered_at) {
            (Some(not_after), Some(last)) => last <= not_after,
            _ => true,
        };
        if allowed {
            record.last_triggered_at = Some(at);
        }
        Ok(allowed)
    }

    async fn mark_run(&self, task_name: &str, success: bool, message: &str) -> SchedulerResult<()> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .entry(task_name.to_string())
            .or_insert_with(|| empty_record(task_name, None));
        record.last_run_at = Some(Utc::now());
        record.last_run_success = Some(success);
        record.last_run_message = Some(message.to_string());
        Ok(())
    }
}

/// Mock implementation of SettingsRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockSettingsRepository {
    settings: Arc<Mutex<HashMap<String, String>>>,
}

impl MockSettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, value: &str) {
        self.settings
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }
}

#[async_trait]
impl SettingsRepository for MockSettingsRepository {
    async fn get_setting(&self, name: &str) -> SchedulerResult<Option<String>> {
        Ok(self.settings.lock().unwrap().get(name).cloned())
    }
}

/// Every in-memory store, with handles kept for assertions
#[derive(Debug, Clone, Default)]
pub struct MockRepositories {
    pub schedules: MockScheduleRepository,
    pub tasks: MockTaskRepository,
    pub servers: MockServerRepository,
    pub nodes: MockNodeRepository,
    pub backups: MockBackupRepository,
    pub activities: MockActivityRepository,
    pub timed_tasks: MockTimedTaskRepository,
    pub settings: MockSettingsRepository,
}

impl MockRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repositories(&self) -> Repositories {
        Repositories {
            schedules: Arc::new(self.schedules.clone()),
            tasks: Arc::new(self.tasks.clone()),
            servers: Arc::new(self.servers.clone()),
            nodes: Arc::new(self.nodes.clone()),
            backups: Arc::new(self.backups.clone()),
            activities: Arc::new(self.activities.clone()),
            timed_tasks: Arc::new(self.timed_tasks.clone()),
            settings: Arc::new(self.settings.clone()),
        }
    }
}

/// A call received by [`MockAgentClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCall {
    Power {
        server_uuid: String,
        action: PowerAction,
    },
    Commands {
        server_uuid: String,
        commands: Vec<String>,
    },
    Install {
        server_uuid: String,
    },
    Reinstall {
        server_uuid: String,
    },
    Backup {
        server_uuid: String,
        adapter: String,
        backup_uuid: String,
        ignored_files: String,
    },
}

impl AgentCall {
    pub fn operation(&self) -> &'static str {
        match self {
            AgentCall::Power { .. } => "power",
            AgentCall::Commands { .. } => "commands",
            AgentCall::Install { .. } => "install",
            AgentCall::Reinstall { .. } => "reinstall",
            AgentCall::Backup { .. } => "backup",
        }
    }
}

/// Mock agent that records calls and answers with scripted failures
#[derive(Debug, Clone, Default)]
pub struct MockAgentClient {
    calls: Arc<Mutex<Vec<AgentCall>>>,
    failures: Arc<Mutex<HashMap<&'static str, String>>>,
    delay: Option<Duration>,
}

impl MockAgentClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call of `operation` (`power`, `commands`, `install`, `reinstall`, `backup`)
    pub fn with_failure(self, operation: &'static str, error: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(operation, error.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<AgentCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn respond(&self, call: AgentCall) -> AgentResponse {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let operation = call.operation();
        self.calls.lock().unwrap().push(call);

        match self.failures.lock().unwrap().get(operation) {
            Some(error) => AgentResponse::failure(500, error.clone()),
            None => AgentResponse::success(204, serde_json::Value::Null),
        }
    }
}

#[async_trait]
impl AgentClient for MockAgentClient {
    async fn power(&self, server_uuid: &str, action: PowerAction) -> AgentResponse {
        self.respond(AgentCall::Power {
            server_uuid: server_uuid.to_string(),
            action,
        })
        .await
    }

    async fn send_commands(&self, server_uuid: &str, commands: &[String]) -> AgentResponse {
        self.respond(AgentCall::Commands {
            server_uuid: server_uuid.to_string(),
            commands: commands.to_vec(),
        })
        .await
    }

    async fn install_server(&self, server_uuid: &str) -> AgentResponse {
        self.respond(AgentCall::Install {
            server_uuid: server_uuid.to_string(),
        })
        .await
    }

    async fn reinstall_server(&self, server_uuid: &str) -> AgentResponse {
        self.respond(AgentCall::Reinstall {
            server_uuid: server_uuid.to_string(),
        })
        .await
    }

    async fn create_backup(
        &self,
        server_uuid: &str,
        adapter: &str,
        backup_uuid: &str,
        ignored_files_json: &str,
    ) -> AgentResponse {
        self.respond(AgentCall::Backup {
            server_uuid: server_uuid.to_string(),
            adapter: adapter.to_string(),
            backup_uuid: backup_uuid.to_string(),
            ignored_files: ignored_files_json.to_string(),
        })
        .await
    }
}

/// Factory handing out a shared [`MockAgentClient`]
#[derive(Debug, Clone, Default)]
pub struct MockAgentClientFactory {
    client: MockAgentClient,
    connect_error: Option<String>,
    connected_nodes: Arc<Mutex<Vec<i64>>>,
}

impl MockAgentClientFactory {
    pub fn new(client: MockAgentClient) -> Self {
        Self {
            client,
            ..Self::default()
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            connect_error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn connected_nodes(&self) -> Vec<i64> {
        self.connected_nodes.lock().unwrap().clone()
    }
}

impl AgentClientFactory for MockAgentClientFactory {
    fn connect(&self, node: &Node) -> SchedulerResult<Arc<dyn AgentClient>> {
        self.connected_nodes.lock().unwrap().push(node.id);

        match &self.connect_error {
            Some(error) => Err(SchedulerError::AgentUnavailable(error.clone())),
            None => Ok(Arc::new(self.client.clone())),
        }
    }
}

/// Task executor returning scripted outcomes per task id
#[derive(Debug, Clone, Default)]
pub struct MockTaskExecutor {
    outcomes: Arc<Mutex<HashMap<i64, TaskOutcome>>>,
    executed: Arc<Mutex<Vec<i64>>>,
    agent_connected: Arc<Mutex<Vec<bool>>>,
    delay: Option<Duration>,
}

impl MockTaskExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unscripted tasks succeed
    pub fn with_outcome(self, task_id: i64, outcome: TaskOutcome) -> Self {
        self.outcomes.lock().unwrap().insert(task_id, outcome);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Task ids in execution order
    pub fn executed_task_ids(&self) -> Vec<i64> {
        self.executed.lock().unwrap().clone()
    }

    /// Whether an agent was connected, per executed task
    pub fn agent_states(&self) -> Vec<bool> {
        self.agent_connected.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskExecutor for MockTaskExecutor {
    async fn execute(&self, task: &Task, _server: &Server, agent: &AgentHandle) -> TaskOutcome {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.executed.lock().unwrap().push(task.id);
        self.agent_connected
            .lock()
            .unwrap()
            .push(agent.is_connected());

        self.outcomes
            .lock()
            .unwrap()
            .get(&task.id)
            .cloned()
            .unwrap_or(TaskOutcome::Succeeded)
    }
}
