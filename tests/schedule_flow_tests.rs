use std::sync::Arc;

use chrono::{Duration, Utc};
use fleet_scheduler::Application;
use scheduler_core::{AppConfig, DatabaseConfig};
use scheduler_dispatcher::HEARTBEAT_MESSAGE;
use scheduler_domain::{ActivityEvent, DriverOutcome};
use scheduler_infrastructure::{DatabaseManager, MetricsCollector};
use scheduler_testing_utils::{
    AgentCall, MockAgentClient, MockAgentClientFactory, MockRepositories, NodeBuilder,
    ScheduleBuilder, ServerBuilder, TaskBuilder,
};
use scheduler_worker::HttpAgentClientFactory;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SERVER_UUID: &str = "1a7ce997-259b-452e-8b4e-cecc464142ca";

#[tokio::test]
async fn test_due_schedule_runs_all_tasks_end_to_end() {
    let stores = MockRepositories::new();
    stores
        .servers
        .insert(ServerBuilder::new().with_backup_limit(1).build());
    stores.nodes.insert(NodeBuilder::new().build());
    stores.schedules.insert(ScheduleBuilder::new().build());
    stores.tasks.insert(
        TaskBuilder::new()
            .with_id(1)
            .with_sequence_id(1)
            .with_action("command")
            .with_payload("say backup starting")
            .build(),
    );
    stores.tasks.insert(
        TaskBuilder::new()
            .with_id(2)
            .with_sequence_id(2)
            .with_action("backup")
            .with_payload("*.log")
            .build(),
    );
    stores.tasks.insert(
        TaskBuilder::new()
            .with_id(3)
            .with_sequence_id(3)
            .with_action("backup")
            .without_payload()
            .build(),
    );
    stores.tasks.insert(
        TaskBuilder::new()
            .with_id(4)
            .with_sequence_id(4)
            .with_action("restart")
            .without_payload()
            .build(),
    );

    let agent = MockAgentClient::new();
    let app = Application::with_components(
        AppConfig::default(),
        stores.repositories(),
        Arc::new(MockAgentClientFactory::new(agent.clone())),
        Arc::new(MetricsCollector::new()),
    )
    .unwrap();

    let outcome = app.run_once(false).await;

    let DriverOutcome::Completed(summary) = outcome else {
        panic!("expected completed batch, got {outcome:?}");
    };
    assert_eq!(summary.due, 1);
    assert_eq!(summary.succeeded, 1);

    let operations: Vec<_> = agent.calls().iter().map(AgentCall::operation).collect();
    assert_eq!(operations, vec!["commands", "backup", "power"]);

    // 第二个备份任务因配额已满被跳过
    assert_eq!(stores.backups.active_count(), 1);
    assert_eq!(
        stores.activities.events(),
        vec![
            ActivityEvent::TaskExecuted,
            ActivityEvent::TaskExecuted,
            ActivityEvent::ScheduleBackupStarted,
            ActivityEvent::TaskExecuted,
            ActivityEvent::ScheduleBackupSkippedLimit,
            ActivityEvent::TaskExecuted,
            ActivityEvent::ScheduleExecuted,
        ]
    );
    let executed = stores
        .activities
        .find(ActivityEvent::ScheduleExecuted)
        .unwrap();
    assert_eq!(executed.metadata["executed_tasks"], 3);
    assert_eq!(executed.metadata["skipped_tasks"], 1);
    assert_eq!(executed.metadata["failed_tasks"], 0);
    assert_eq!(executed.metadata["total_tasks"], 4);

    let schedule = stores.schedules.get(1).unwrap();
    assert!(!schedule.is_processing);
    assert!(schedule.next_run_at.unwrap() > Utc::now());
    assert!(schedule.last_run_at.is_some());

    let heartbeat = stores.timed_tasks.get("server-schedule-processor").unwrap();
    assert_eq!(heartbeat.last_run_success, Some(true));
    assert_eq!(heartbeat.last_run_message.as_deref(), Some(HEARTBEAT_MESSAGE));

    // 同一分钟内的再次触发被节流，不会重复执行
    assert_eq!(app.run_once(false).await, DriverOutcome::Throttled);
    assert_eq!(agent.call_count(), 3);
}

#[tokio::test]
async fn test_offline_server_defers_schedule_end_to_end() {
    let stores = MockRepositories::new();
    stores.servers.insert(ServerBuilder::new().offline().build());
    stores.nodes.insert(NodeBuilder::new().build());
    stores
        .schedules
        .insert(ScheduleBuilder::new().only_when_online().build());
    stores.tasks.insert(TaskBuilder::new().build());

    let agent = MockAgentClient::new();
    let app = Application::with_components(
        AppConfig::default(),
        stores.repositories(),
        Arc::new(MockAgentClientFactory::new(agent.clone())),
        Arc::new(MetricsCollector::new()),
    )
    .unwrap();

    let DriverOutcome::Completed(summary) = app.run_once(false).await else {
        panic!("expected completed batch");
    };
    assert_eq!(summary.skipped, 1);
    assert_eq!(agent.call_count(), 0);
    assert_eq!(
        stores.activities.events(),
        vec![ActivityEvent::ScheduleSkippedOffline]
    );

    let schedule = stores.schedules.get(1).unwrap();
    assert!(!schedule.is_processing);
    assert!(schedule.next_run_at.unwrap() > Utc::now());
    assert!(schedule.last_run_at.is_none());
}

async fn setup_database() -> DatabaseManager {
    let manager = DatabaseManager::new(&DatabaseConfig::in_memory())
        .await
        .unwrap();
    manager.migrate().await.unwrap();
    manager
}

async fn seed_server(pool: &SqlitePool, agent: &MockServer) {
    let address = agent.address();
    sqlx::query(
        "INSERT INTO nodes (id, name, fqdn, scheme, daemon_listen, daemon_token) \
         VALUES (1, 'node-1', ?, 'http', ?, 'node-secret')",
    )
    .bind(address.ip().to_string())
    .bind(address.port() as i64)
    .execute(pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO servers (id, uuid, name, node_id, status, backup_limit) \
         VALUES (1, ?, 'survival', 1, 'running', 3)",
    )
    .bind(SERVER_UUID)
    .execute(pool)
    .await
    .unwrap();
}

async fn seed_schedule(pool: &SqlitePool) {
    sqlx::query(
        "INSERT INTO schedules (id, server_id, name, cron_minute, cron_hour, next_run_at) \
         VALUES (1, 1, 'nightly', '*/5', '*', ?)",
    )
    .bind(Utc::now() - Duration::minutes(1))
    .execute(pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO schedule_tasks (schedule_id, sequence_id, action, payload) \
         VALUES (1, 2, 'backup', 'logs/'), (1, 1, 'power', 'start')",
    )
    .execute(pool)
    .await
    .unwrap();
}

fn sqlite_app(manager: &DatabaseManager) -> Application {
    let config = AppConfig::default();
    let metrics = Arc::new(MetricsCollector::new());
    let factory = HttpAgentClientFactory::new(config.agent.clone(), metrics.clone());
    Application::with_components(config, manager.repositories(), Arc::new(factory), metrics)
        .unwrap()
}

#[tokio::test]
async fn test_sqlite_flow_with_http_agent() {
    let agent = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/api/servers/{SERVER_UUID}/power")))
        .and(body_json(json!({ "action": "start", "wait_seconds": 30 })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&agent)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/api/servers/{SERVER_UUID}/backup")))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "disk full" })))
        .expect(1)
        .mount(&agent)
        .await;

    let manager = setup_database().await;
    let pool = manager.pool().clone();
    seed_server(&pool, &agent).await;
    seed_schedule(&pool).await;

    let app = sqlite_app(&manager);
    let outcome = app.run_once(false).await;

    let DriverOutcome::Completed(summary) = outcome else {
        panic!("expected completed batch, got {outcome:?}");
    };
    assert_eq!(summary.due, 1);
    assert_eq!(summary.succeeded, 1);

    let (is_processing, next_run_at, last_run_at): (
        bool,
        Option<chrono::DateTime<Utc>>,
        Option<chrono::DateTime<Utc>>,
    ) = sqlx::query_as("SELECT is_processing, next_run_at, last_run_at FROM schedules WHERE id = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!(!is_processing);
    assert!(next_run_at.unwrap() > Utc::now());
    assert!(last_run_at.is_some());

    // 代理拒绝备份后本地记录被软删除
    let backups: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT ignored_files, deleted_at FROM backups WHERE server_id = 1")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].0, r#"["logs/"]"#);
    assert!(backups[0].1.is_some());

    let events: Vec<(String,)> =
        sqlx::query_as("SELECT event FROM server_activities ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
    let events: Vec<_> = events.into_iter().map(|(event,)| event).collect();
    assert_eq!(
        events,
        vec!["task_executed", "task_executed", "schedule_executed"]
    );

    let (metadata,): (String,) = sqlx::query_as(
        "SELECT metadata FROM server_activities WHERE event = 'schedule_executed'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    let metadata: Value = serde_json::from_str(&metadata).unwrap();
    assert_eq!(metadata["executed_tasks"], 1);
    assert_eq!(metadata["failed_tasks"], 1);
    assert_eq!(metadata["total_tasks"], 2);

    let (success, message): (Option<bool>, Option<String>) = sqlx::query_as(
        "SELECT last_run_success, last_run_message FROM timed_tasks WHERE task_name = ?",
    )
    .bind("server-schedule-processor")
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(success, Some(true));
    assert_eq!(message.as_deref(), Some(HEARTBEAT_MESSAGE));

    manager.close().await;
}

#[tokio::test]
async fn test_sqlite_setting_disables_processing() {
    let agent = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&agent)
        .await;

    let manager = setup_database().await;
    let pool = manager.pool().clone();
    seed_server(&pool, &agent).await;
    seed_schedule(&pool).await;
    sqlx::query("INSERT INTO settings (name, value) VALUES ('server_allow_schedules', 'false')")
        .execute(&pool)
        .await
        .unwrap();

    let app = sqlite_app(&manager);

    assert_eq!(app.run_once(true).await, DriverOutcome::Disabled);

    let (is_processing, last_run_at): (bool, Option<chrono::DateTime<Utc>>) =
        sqlx::query_as("SELECT is_processing, last_run_at FROM schedules WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(!is_processing);
    assert!(last_run_at.is_none());

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM server_activities")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);

    manager.close().await;
}
