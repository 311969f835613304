use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use scheduler_dispatcher::ScheduleRunner;
use scheduler_domain::{
    ActivityEvent, RunOutcome, RunSkipReason, SkipReason, TaskOutcome,
};
use scheduler_infrastructure::MetricsCollector;
use scheduler_testing_utils::{
    MockAgentClient, MockAgentClientFactory, MockRepositories, MockTaskExecutor, NodeBuilder,
    ScheduleBuilder, ServerBuilder, TaskBuilder,
};

fn at(h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, h, mi, s).unwrap()
}

fn create_runner(stores: &MockRepositories, executor: &MockTaskExecutor) -> ScheduleRunner {
    create_runner_with_factory(stores, executor, MockAgentClientFactory::new(MockAgentClient::new()))
}

fn create_runner_with_factory(
    stores: &MockRepositories,
    executor: &MockTaskExecutor,
    factory: MockAgentClientFactory,
) -> ScheduleRunner {
    ScheduleRunner::new(
        stores.repositories(),
        Arc::new(factory),
        Arc::new(executor.clone()),
        Arc::new(MetricsCollector::new()),
    )
}

/// 服务器1在线、节点1存在、调度计划1在 03:00 到期
fn seeded_stores() -> MockRepositories {
    let stores = MockRepositories::new();
    stores.servers.insert(ServerBuilder::new().build());
    stores.nodes.insert(NodeBuilder::new().build());
    stores.schedules.insert(
        ScheduleBuilder::new()
            .with_cron("0 3 * * *")
            .due_at(at(3, 0, 0))
            .build(),
    );
    stores
}

fn assert_released(stores: &MockRepositories, schedule_id: i64) {
    let schedule = stores.schedules.get(schedule_id).unwrap();
    assert!(!schedule.is_processing, "processing lock must be released");
}

#[tokio::test]
async fn test_run_executes_tasks_and_advances_schedule() {
    let stores = seeded_stores();
    stores.tasks.insert(TaskBuilder::new().with_id(1).with_sequence_id(1).build());
    stores.tasks.insert(TaskBuilder::new().with_id(2).with_sequence_id(2).build());
    let executor = MockTaskExecutor::new();
    let runner = create_runner(&stores, &executor);
    let now = at(3, 0, 30);

    let schedule = stores.schedules.get(1).unwrap();
    let outcome = runner.run_at(&schedule, now).await;

    let RunOutcome::Succeeded { summary, next_run_at } = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    assert_eq!(summary.executed, 2);
    assert_eq!(summary.total, 2);
    assert_eq!(next_run_at, Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap());

    let stored = stores.schedules.get(1).unwrap();
    assert!(!stored.is_processing);
    assert_eq!(stored.last_run_at, Some(now));
    assert_eq!(stored.next_run_at, Some(next_run_at));

    let activity = stores.activities.find(ActivityEvent::ScheduleExecuted).unwrap();
    assert_eq!(activity.server_id, 1);
    assert_eq!(activity.node_id, 1);
    assert_eq!(activity.metadata["schedule_id"], 1);
    assert_eq!(activity.metadata["executed_tasks"], 2);
    assert_eq!(activity.metadata["failed_tasks"], 0);
    assert_eq!(activity.metadata["total_tasks"], 2);
}

#[tokio::test]
async fn test_second_invocation_while_locked_is_noop() {
    let stores = seeded_stores();
    stores.tasks.insert(TaskBuilder::new().build());
    let executor = MockTaskExecutor::new();
    let runner = create_runner(&stores, &executor);
    let schedule = stores.schedules.get(1).unwrap();

    // 模拟第一次执行仍持有锁
    stores.schedules.insert(
        ScheduleBuilder::new()
            .with_cron("0 3 * * *")
            .due_at(at(3, 0, 0))
            .processing()
            .build(),
    );

    let outcome = runner.run_at(&schedule, at(3, 0, 30)).await;

    assert_eq!(outcome, RunOutcome::Skipped(RunSkipReason::LockHeld));
    assert!(executor.executed_task_ids().is_empty());
    assert!(stores.schedules.updates().is_empty());
    // 锁属于另一次执行，不能被释放
    assert!(stores.schedules.get(1).unwrap().is_processing);
}

#[tokio::test]
async fn test_overlapping_invocations_execute_once() {
    let stores = seeded_stores();
    stores.tasks.insert(TaskBuilder::new().with_id(7).build());
    let executor = MockTaskExecutor::new().with_delay(Duration::from_millis(50));
    let runner = create_runner(&stores, &executor);
    let schedule = stores.schedules.get(1).unwrap();
    let now = at(3, 0, 30);

    let (first, second) = tokio::join!(runner.run_at(&schedule, now), runner.run_at(&schedule, now));

    let outcomes = [first, second];
    let succeeded = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, RunOutcome::Succeeded { .. }))
        .count();
    let lock_held = outcomes
        .iter()
        .filter(|outcome| **outcome == RunOutcome::Skipped(RunSkipReason::LockHeld))
        .count();

    assert_eq!(succeeded, 1);
    assert_eq!(lock_held, 1);
    assert_eq!(executor.executed_task_ids(), vec![7]);
    assert_released(&stores, 1);
}

#[tokio::test]
async fn test_lock_store_error_skips_without_release() {
    let stores = seeded_stores();
    stores.schedules.fail_lock_acquisition();
    let executor = MockTaskExecutor::new();
    let runner = create_runner(&stores, &executor);
    let schedule = stores.schedules.get(1).unwrap();

    let outcome = runner.run_at(&schedule, at(3, 0, 30)).await;

    assert_eq!(outcome, RunOutcome::Skipped(RunSkipReason::LockHeld));
    assert!(stores.schedules.updates().is_empty());
    assert!(executor.executed_task_ids().is_empty());
}

#[tokio::test]
async fn test_missing_server_releases_lock_without_advancing() {
    let stores = MockRepositories::new();
    stores
        .schedules
        .insert(ScheduleBuilder::new().with_server_id(42).due_at(at(3, 0, 0)).build());
    let executor = MockTaskExecutor::new();
    let runner = create_runner(&stores, &executor);
    let schedule = stores.schedules.get(1).unwrap();

    let outcome = runner.run_at(&schedule, at(3, 0, 30)).await;

    assert_eq!(
        outcome,
        RunOutcome::Skipped(RunSkipReason::ServerNotFound { server_id: 42 })
    );
    assert_released(&stores, 1);
    assert_eq!(stores.schedules.get(1).unwrap().next_run_at, Some(at(3, 0, 0)));
    assert!(stores.activities.activities().is_empty());
}

#[tokio::test]
async fn test_server_lookup_error_releases_lock() {
    let stores = seeded_stores();
    stores.servers.fail_queries();
    let executor = MockTaskExecutor::new();
    let runner = create_runner(&stores, &executor);
    let schedule = stores.schedules.get(1).unwrap();

    let outcome = runner.run_at(&schedule, at(3, 0, 30)).await;

    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert_released(&stores, 1);
}

#[tokio::test]
async fn test_task_query_error_releases_lock() {
    let stores = seeded_stores();
    stores.tasks.fail_queries();
    let executor = MockTaskExecutor::new();
    let runner = create_runner(&stores, &executor);
    let schedule = stores.schedules.get(1).unwrap();

    let outcome = runner.run_at(&schedule, at(3, 0, 30)).await;

    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert_released(&stores, 1);
}

#[tokio::test]
async fn test_store_write_error_releases_lock() {
    let stores = seeded_stores();
    stores.tasks.insert(TaskBuilder::new().build());
    stores.schedules.fail_completion_updates();
    let executor = MockTaskExecutor::new();
    let runner = create_runner(&stores, &executor);
    let schedule = stores.schedules.get(1).unwrap();

    let outcome = runner.run_at(&schedule, at(3, 0, 30)).await;

    let RunOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(message.contains("injected failure"));
    assert_eq!(executor.executed_task_ids(), vec![1]);
    assert_released(&stores, 1);
}

#[tokio::test]
async fn test_invalid_cron_fails_before_any_task_runs() {
    // 无法解析的表达式与永不匹配的表达式
    for expression in ["0 25 * * *", "0 0 30 2 *"] {
        let stores = seeded_stores();
        stores.schedules.insert(
            ScheduleBuilder::new()
                .with_cron(expression)
                .due_at(at(3, 0, 0))
                .build(),
        );
        stores.tasks.insert(TaskBuilder::new().with_action("kill").without_payload().build());
        let executor = MockTaskExecutor::new();
        let runner = create_runner(&stores, &executor);
        let schedule = stores.schedules.get(1).unwrap();

        for minute in 1..=3 {
            let outcome = runner.run_at(&schedule, at(3, minute, 0)).await;
            assert!(
                matches!(outcome, RunOutcome::Failed(_)),
                "{expression}: expected failure, got {outcome:?}"
            );
        }

        assert!(executor.executed_task_ids().is_empty(), "{expression}: tasks were dispatched");
        assert!(stores.activities.events().is_empty());
        assert_released(&stores, 1);
        assert_eq!(stores.schedules.get(1).unwrap().last_run_at, None);
    }
}

#[tokio::test]
async fn test_invalid_cron_on_offline_server_is_failure() {
    let stores = MockRepositories::new();
    stores.servers.insert(ServerBuilder::new().offline().build());
    stores.schedules.insert(
        ScheduleBuilder::new()
            .with_cron("0 0 30 2 *")
            .due_at(at(3, 0, 0))
            .only_when_online()
            .build(),
    );
    let executor = MockTaskExecutor::new();
    let runner = create_runner(&stores, &executor);
    let schedule = stores.schedules.get(1).unwrap();

    let outcome = runner.run_at(&schedule, at(3, 0, 30)).await;

    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert!(stores
        .activities
        .find(ActivityEvent::ScheduleSkippedOffline)
        .is_none());
    assert_released(&stores, 1);
}

#[tokio::test]
async fn test_offline_server_skips_tasks_and_advances_schedule() {
    let stores = MockRepositories::new();
    stores.servers.insert(ServerBuilder::new().offline().build());
    stores.schedules.insert(
        ScheduleBuilder::new()
            .with_cron("0 3 * * *")
            .due_at(at(3, 0, 0))
            .only_when_online()
            .build(),
    );
    stores.tasks.insert(TaskBuilder::new().build());
    let executor = MockTaskExecutor::new();
    let runner = create_runner(&stores, &executor);
    let schedule = stores.schedules.get(1).unwrap();

    let outcome = runner.run_at(&schedule, at(3, 0, 30)).await;

    let next = Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Skipped(RunSkipReason::ServerOffline { next_run_at: next })
    );
    assert!(executor.executed_task_ids().is_empty());

    let stored = stores.schedules.get(1).unwrap();
    assert!(!stored.is_processing);
    assert!(stored.next_run_at.unwrap() > schedule.next_run_at.unwrap());
    assert_eq!(stored.last_run_at, None);

    let activity = stores.activities.find(ActivityEvent::ScheduleSkippedOffline).unwrap();
    assert_eq!(activity.metadata["reason"], "server_offline");
    assert_eq!(activity.metadata["schedule_id"], 1);
    assert!(stores.activities.find(ActivityEvent::ScheduleExecuted).is_none());
}

#[tokio::test]
async fn test_online_check_is_case_insensitive() {
    let stores = MockRepositories::new();
    stores.servers.insert(ServerBuilder::new().with_status("RUNNING").build());
    stores
        .schedules
        .insert(ScheduleBuilder::new().due_at(at(3, 0, 0)).only_when_online().build());
    stores.tasks.insert(TaskBuilder::new().build());
    let executor = MockTaskExecutor::new();
    let runner = create_runner(&stores, &executor);
    let schedule = stores.schedules.get(1).unwrap();

    let outcome = runner.run_at(&schedule, at(3, 0, 30)).await;

    assert!(matches!(outcome, RunOutcome::Succeeded { .. }));
    assert_eq!(executor.executed_task_ids(), vec![1]);
}

#[tokio::test]
async fn test_unknown_status_counts_as_offline() {
    let stores = MockRepositories::new();
    stores.servers.insert(ServerBuilder::new().without_status().build());
    stores
        .schedules
        .insert(ScheduleBuilder::new().due_at(at(3, 0, 0)).only_when_online().build());
    stores.tasks.insert(TaskBuilder::new().build());
    let executor = MockTaskExecutor::new();
    let runner = create_runner(&stores, &executor);
    let schedule = stores.schedules.get(1).unwrap();

    let outcome = runner.run_at(&schedule, at(3, 0, 30)).await;

    assert!(matches!(
        outcome,
        RunOutcome::Skipped(RunSkipReason::ServerOffline { .. })
    ));
    assert!(executor.executed_task_ids().is_empty());
}

#[tokio::test]
async fn test_partial_task_failure_does_not_abort_sequence() {
    let stores = seeded_stores();
    stores.tasks.insert(TaskBuilder::new().with_id(2).with_sequence_id(2).build());
    stores.tasks.insert(TaskBuilder::new().with_id(1).with_sequence_id(1).build());
    let executor =
        MockTaskExecutor::new().with_outcome(1, TaskOutcome::Failed("remote error".to_string()));
    let runner = create_runner(&stores, &executor);
    let schedule = stores.schedules.get(1).unwrap();

    let outcome = runner.run_at(&schedule, at(3, 0, 30)).await;

    let RunOutcome::Succeeded { summary, .. } = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    assert_eq!(executor.executed_task_ids(), vec![1, 2]);
    assert_eq!(summary.executed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.total, 2);
    assert_released(&stores, 1);
}

#[tokio::test]
async fn test_skipped_tasks_are_counted_separately() {
    let stores = seeded_stores();
    stores.tasks.insert(TaskBuilder::new().with_id(1).build());
    let executor = MockTaskExecutor::new().with_outcome(
        1,
        TaskOutcome::Skipped(SkipReason::BackupLimitReached { current: 2, limit: 2 }),
    );
    let runner = create_runner(&stores, &executor);
    let schedule = stores.schedules.get(1).unwrap();

    let outcome = runner.run_at(&schedule, at(3, 0, 30)).await;

    let RunOutcome::Succeeded { summary, .. } = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.executed, 0);
}

#[tokio::test]
async fn test_duplicate_sequence_ids_keep_store_order() {
    let stores = seeded_stores();
    stores.tasks.insert(TaskBuilder::new().with_id(10).with_sequence_id(2).build());
    stores.tasks.insert(TaskBuilder::new().with_id(11).with_sequence_id(1).build());
    stores.tasks.insert(TaskBuilder::new().with_id(12).with_sequence_id(2).build());
    stores.tasks.insert(TaskBuilder::new().with_id(13).with_sequence_id(0).build());

    for _ in 0..2 {
        let executor = MockTaskExecutor::new();
        let runner = create_runner(&stores, &executor);
        let schedule = stores.schedules.get(1).unwrap();

        runner.run_at(&schedule, at(3, 0, 30)).await;

        assert_eq!(executor.executed_task_ids(), vec![13, 11, 10, 12]);
    }
}

#[tokio::test]
async fn test_agent_resolved_once_per_run() {
    let stores = seeded_stores();
    for id in 1..=3 {
        stores.tasks.insert(TaskBuilder::new().with_id(id).with_sequence_id(id as i32).build());
    }
    let factory = MockAgentClientFactory::new(MockAgentClient::new());
    let executor = MockTaskExecutor::new();
    let runner = create_runner_with_factory(&stores, &executor, factory.clone());
    let schedule = stores.schedules.get(1).unwrap();

    runner.run_at(&schedule, at(3, 0, 30)).await;

    assert_eq!(factory.connected_nodes(), vec![1]);
    assert_eq!(executor.agent_states(), vec![true, true, true]);
}

#[tokio::test]
async fn test_missing_node_leaves_agent_unavailable() {
    let stores = MockRepositories::new();
    stores.servers.insert(ServerBuilder::new().with_node_id(9).build());
    stores.schedules.insert(ScheduleBuilder::new().due_at(at(3, 0, 0)).build());
    stores.tasks.insert(TaskBuilder::new().build());
    let executor = MockTaskExecutor::new();
    let runner = create_runner(&stores, &executor);
    let schedule = stores.schedules.get(1).unwrap();

    let outcome = runner.run_at(&schedule, at(3, 0, 30)).await;

    assert!(matches!(outcome, RunOutcome::Succeeded { .. }));
    assert_eq!(executor.agent_states(), vec![false]);
    assert_released(&stores, 1);
}

#[tokio::test]
async fn test_agent_connect_failure_leaves_agent_unavailable() {
    let stores = seeded_stores();
    stores.tasks.insert(TaskBuilder::new().build());
    let executor = MockTaskExecutor::new();
    let runner =
        create_runner_with_factory(&stores, &executor, MockAgentClientFactory::failing("tls error"));
    let schedule = stores.schedules.get(1).unwrap();

    let outcome = runner.run_at(&schedule, at(3, 0, 30)).await;

    assert!(matches!(outcome, RunOutcome::Succeeded { .. }));
    assert_eq!(executor.agent_states(), vec![false]);
}

#[tokio::test]
async fn test_overdue_schedule_catches_up_to_future() {
    let stores = MockRepositories::new();
    stores.servers.insert(ServerBuilder::new().build());
    stores.schedules.insert(
        ScheduleBuilder::new()
            .with_cron("*/5 * * * *")
            .due_at(at(0, 0, 0))
            .build(),
    );
    let executor = MockTaskExecutor::new();
    let runner = create_runner(&stores, &executor);
    let schedule = stores.schedules.get(1).unwrap();

    let outcome = runner.run_at(&schedule, at(1, 2, 0)).await;

    let RunOutcome::Succeeded { next_run_at, .. } = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    assert_eq!(next_run_at, at(1, 5, 0));
}

#[tokio::test]
async fn test_schedule_without_tasks_writes_no_activity() {
    let stores = seeded_stores();
    let executor = MockTaskExecutor::new();
    let runner = create_runner(&stores, &executor);
    let schedule = stores.schedules.get(1).unwrap();

    let outcome = runner.run_at(&schedule, at(3, 0, 30)).await;

    let RunOutcome::Succeeded { summary, .. } = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    assert_eq!(summary.total, 0);
    assert!(stores.activities.activities().is_empty());
    assert_eq!(
        stores.schedules.get(1).unwrap().next_run_at,
        Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_activity_write_failure_does_not_abort_run() {
    let stores = seeded_stores();
    stores.tasks.insert(TaskBuilder::new().build());
    stores.activities.fail_writes();
    let executor = MockTaskExecutor::new();
    let runner = create_runner(&stores, &executor);
    let schedule = stores.schedules.get(1).unwrap();

    let outcome = runner.run_at(&schedule, at(3, 0, 30)).await;

    assert!(matches!(outcome, RunOutcome::Succeeded { .. }));
    assert_released(&stores, 1);
}
