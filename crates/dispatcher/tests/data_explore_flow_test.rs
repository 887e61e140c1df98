mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::broadcast;

use explore_core::{
    ExecutionStatus, ExploreError, ExploreKind, ExploreNowMessage, ExploreTarget,
    ExploreTaskRepository, ExploreTaskStatus, JobRefRepository, Message, MessageQueue, Page,
    TaskFilter,
};
use explore_dispatcher::{CreateTaskRequest, DISPATCH_FAILURE_REASON};
use explore_infrastructure::InMemoryMessageQueue;
use explore_testing_utils::{test_credential, TaskBuilder, TestEnv};

use common::Harness;

fn data_request(target: ExploreTarget) -> CreateTaskRequest {
    CreateTaskRequest::new(ExploreKind::DataExplore, target)
}

fn view(id: &str) -> ExploreTarget {
    ExploreTarget::View(id.to_string())
}

async fn seeded(harness: &Harness, views: &[&str]) {
    harness.world.seed_datasource("ds-1", "hive", "ods").await;
    harness.world.seed_views("ds-1", views).await;
}

#[tokio::test]
async fn test_view_task_lifecycle_through_engine() {
    let harness = Harness::new();
    seeded(&harness, &["v1"]).await;

    let task = harness
        .tasks
        .create_task(&test_credential(), data_request(view("v1")))
        .await
        .unwrap();
    assert_eq!(task.status, ExploreTaskStatus::Queued);

    assert_eq!(harness.handler.poll_once().await.unwrap(), 1);
    assert_eq!(harness.world.queue.in_flight_count().await, 0);

    let running = harness.tasks.get_task(&task.id).await.unwrap();
    assert_eq!(running.status, ExploreTaskStatus::Running);
    let job = running.external_job.clone().unwrap();
    assert_eq!(job.version, 1);
    assert_eq!(harness.world.engine.job_count().await, 1);
    assert_eq!(harness.world.engine.last_caller().await.as_deref(), Some("u-test"));

    harness
        .world
        .engine
        .report(&task.id, "v1", ExecutionStatus::Finished, None)
        .await
        .unwrap();
    let finished = harness.tasks.get_task(&task.id).await.unwrap();
    assert_eq!(finished.status, ExploreTaskStatus::Finished);
    assert!(finished.finished_at.is_some());
    assert!(finished.remark.is_none());
}

#[tokio::test]
async fn test_active_task_on_same_target_conflicts() {
    let harness = Harness::new();
    seeded(&harness, &["v1"]).await;
    let credential = test_credential();

    harness
        .tasks
        .create_task(&credential, data_request(view("v1")))
        .await
        .unwrap();
    let err = harness
        .tasks
        .create_task(&credential, data_request(view("v1")))
        .await
        .unwrap_err();
    assert!(matches!(err, ExploreError::Conflict(_)));

    // 其他类型不冲突
    harness
        .tasks
        .create_task(
            &credential,
            CreateTaskRequest::new(ExploreKind::TimestampExplore, view("v1")),
        )
        .await
        .unwrap();

    let err = harness
        .tasks
        .create_task(&credential, data_request(view("missing")))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_datasource_partial_dispatch_failure() {
    let harness = Harness::with_flaky_engine();
    seeded(&harness, &["v1", "v2", "v3"]).await;
    harness.world.flaky_engine.fail_on("v2");

    let task = harness
        .tasks
        .create_task(
            &test_credential(),
            data_request(ExploreTarget::Datasource("ds-1".to_string())),
        )
        .await
        .unwrap();
    harness.handler.poll_once().await.unwrap();

    let stored = harness.world.tasks.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExploreTaskStatus::Running);
    let remark = stored.remark.unwrap();
    assert_eq!(remark.total_count, 1);
    assert_eq!(remark.bucket(DISPATCH_FAILURE_REASON).unwrap().view_ids, vec!["v2"]);
    assert_eq!(harness.world.engine.job_count().await, 2);

    for view_id in ["v1", "v3"] {
        harness
            .world
            .engine
            .report(&task.id, view_id, ExecutionStatus::Finished, None)
            .await
            .unwrap();
    }
    let settled = harness.tasks.get_task(&task.id).await.unwrap();
    assert_eq!(settled.status, ExploreTaskStatus::Failed);
    let remark = settled.remark.unwrap();
    assert_eq!(remark.total_count, 1);
    assert_eq!(remark.bucket(DISPATCH_FAILURE_REASON).unwrap().view_ids, vec!["v2"]);
}

#[tokio::test]
async fn test_datasource_all_dispatch_failures_fail_task() {
    let harness = Harness::with_flaky_engine();
    seeded(&harness, &["v1", "v2"]).await;
    harness.world.flaky_engine.fail_on("v1");
    harness.world.flaky_engine.fail_on("v2");

    let task = harness
        .tasks
        .create_task(
            &test_credential(),
            data_request(ExploreTarget::Datasource("ds-1".to_string())),
        )
        .await
        .unwrap();
    harness.handler.poll_once().await.unwrap();

    let stored = harness.world.tasks.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExploreTaskStatus::Failed);
    assert_eq!(stored.remark.unwrap().total_count, 2);
}

#[tokio::test]
async fn test_view_dispatch_failure_is_retried_then_fails_task() {
    let harness = Harness::with_flaky_engine();
    seeded(&harness, &["v1"]).await;
    harness.world.flaky_engine.fail_on("v1");

    let task = harness
        .tasks
        .create_task(&test_credential(), data_request(view("v1")))
        .await
        .unwrap();

    // 首次投递加两次重试
    for _ in 0..3 {
        assert_eq!(harness.handler.poll_once().await.unwrap(), 1);
    }
    assert_eq!(harness.handler.poll_once().await.unwrap(), 0);

    let stored = harness.world.tasks.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExploreTaskStatus::Failed);
    assert!(stored.remark.unwrap().description.unwrap().contains("v1"));
}

#[tokio::test]
async fn test_redelivery_updates_the_same_job() {
    let harness = Harness::new();
    seeded(&harness, &["v1"]).await;

    let task = harness
        .tasks
        .create_task(&test_credential(), data_request(view("v1")))
        .await
        .unwrap();
    harness.handler.poll_once().await.unwrap();

    let message = Message::explore_now(ExploreNowMessage {
        task_id: task.id.clone(),
        user_id: "u-test".to_string(),
        user_name: "tester".to_string(),
    });
    harness
        .world
        .queue
        .publish_message(&harness.queue_config.explore_queue, &message)
        .await
        .unwrap();
    harness.handler.poll_once().await.unwrap();

    let job_ref = harness
        .world
        .job_refs
        .get("v1", ExploreKind::DataExplore)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job_ref.version, 2);
    assert_eq!(harness.world.engine.job_count().await, 1);

    let stored = harness.world.tasks.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExploreTaskStatus::Running);
    assert_eq!(stored.external_job.unwrap().version, 2);
}

#[tokio::test]
async fn test_message_for_missing_or_finished_task_is_acked() {
    let harness = Harness::new();
    seeded(&harness, &["v1"]).await;
    let finished = harness
        .world
        .tasks
        .create(
            &TaskBuilder::data()
                .on_view("v1")
                .with_status(ExploreTaskStatus::Finished)
                .build(),
        )
        .await
        .unwrap();

    for task_id in ["ghost", finished.id.as_str()] {
        let message = Message::explore_now(ExploreNowMessage {
            task_id: task_id.to_string(),
            user_id: "u-test".to_string(),
            user_name: "tester".to_string(),
        });
        harness
            .world
            .queue
            .publish_message(&harness.queue_config.explore_queue, &message)
            .await
            .unwrap();
    }

    assert_eq!(harness.handler.poll_once().await.unwrap(), 2);
    assert_eq!(harness.handler.poll_once().await.unwrap(), 0);
    assert_eq!(harness.world.queue.in_flight_count().await, 0);
    assert_eq!(harness.world.engine.job_count().await, 0);
}

#[tokio::test]
async fn test_cancel_deletes_engine_jobs() {
    let harness = Harness::with_flaky_engine();
    seeded(&harness, &["v1", "v2"]).await;

    let task = harness
        .tasks
        .create_task(
            &test_credential(),
            data_request(ExploreTarget::Datasource("ds-1".to_string())),
        )
        .await
        .unwrap();
    harness.handler.poll_once().await.unwrap();
    assert_eq!(harness.world.engine.job_count().await, 2);

    let canceled = harness.tasks.cancel_task(&task.id).await.unwrap();
    assert_eq!(canceled.status, ExploreTaskStatus::Canceled);
    assert_eq!(harness.world.flaky_engine.deleted_jobs().len(), 2);
    assert_eq!(harness.world.engine.job_count().await, 0);
    assert!(harness
        .world
        .job_refs
        .get("v1", ExploreKind::DataExplore)
        .await
        .unwrap()
        .is_none());

    let err = harness.tasks.cancel_task(&task.id).await.unwrap_err();
    assert!(matches!(err, ExploreError::Validation(_)));

    harness.tasks.delete_task(&task.id).await.unwrap();
    assert!(harness.tasks.get_task(&task.id).await.unwrap_err().is_not_found());
}

/// 作业到达执行引擎时由运维取消任务
fn cancel_on_create(harness: &Harness, view_id: &str, task_id: &str) {
    let tasks = Arc::clone(&harness.tasks);
    let task_id = task_id.to_string();
    harness.world.flaky_engine.on_create(
        view_id,
        Arc::new(move || {
            let tasks = Arc::clone(&tasks);
            let task_id = task_id.clone();
            async move {
                tasks.cancel_task(&task_id).await.unwrap();
            }
            .boxed()
        }),
    );
}

#[tokio::test]
async fn test_cancel_during_dispatch_stays_canceled() {
    let harness = Harness::with_flaky_engine();
    seeded(&harness, &["v1"]).await;

    let task = harness
        .tasks
        .create_task(&test_credential(), data_request(view("v1")))
        .await
        .unwrap();
    cancel_on_create(&harness, "v1", &task.id);

    assert_eq!(harness.handler.poll_once().await.unwrap(), 1);

    let stored = harness.world.tasks.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExploreTaskStatus::Canceled);
    assert_eq!(harness.world.engine.job_count().await, 0);
    assert_eq!(harness.world.flaky_engine.deleted_jobs().len(), 1);
    assert!(harness
        .world
        .job_refs
        .get("v1", ExploreKind::DataExplore)
        .await
        .unwrap()
        .is_none());
    assert_eq!(harness.world.queue.in_flight_count().await, 0);
}

#[tokio::test]
async fn test_cancel_during_datasource_dispatch_stops_remaining_views() {
    let harness = Harness::with_flaky_engine();
    seeded(&harness, &["v1", "v2", "v3"]).await;

    let task = harness
        .tasks
        .create_task(
            &test_credential(),
            data_request(ExploreTarget::Datasource("ds-1".to_string())),
        )
        .await
        .unwrap();
    cancel_on_create(&harness, "v1", &task.id);

    harness.handler.poll_once().await.unwrap();

    let stored = harness.tasks.get_task(&task.id).await.unwrap();
    assert_eq!(stored.status, ExploreTaskStatus::Canceled);
    assert_eq!(harness.world.engine.job_count().await, 0);
    assert_eq!(harness.world.job_refs.count().await, 0);
}

#[tokio::test]
async fn test_publish_failure_marks_task_failed() {
    let queue = Arc::new(InMemoryMessageQueue::with_capacity(1));
    let harness = Harness::with_queue(queue.clone());
    seeded(&harness, &["v1", "v2"]).await;

    harness
        .tasks
        .create_task(&test_credential(), data_request(view("v1")))
        .await
        .unwrap();
    let err = harness
        .tasks
        .create_task(&test_credential(), data_request(view("v2")))
        .await
        .unwrap_err();
    assert!(matches!(err, ExploreError::MessageQueue(_)));

    let failed = harness
        .tasks
        .list_tasks(
            &TaskFilter {
                status: Some(ExploreTaskStatus::Failed),
                ..Default::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(failed.entries.len(), 1);
    assert_eq!(failed.entries[0].target, view("v2"));
    assert!(failed.entries[0].remark.as_ref().unwrap().description.is_some());
}

#[tokio::test]
async fn test_batch_create_reports_each_request() {
    let harness = Harness::new();
    seeded(&harness, &["v1", "v2"]).await;

    let results = harness
        .tasks
        .batch_create_tasks(
            &test_credential(),
            "wo-1",
            vec![
                data_request(view("v1")),
                data_request(view("v2")),
                data_request(view("missing")),
            ],
        )
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().target, view("v1"));
    assert_eq!(results[1].as_ref().unwrap().target, view("v2"));
    assert!(results[2].as_ref().unwrap_err().is_not_found());

    let listed = harness
        .tasks
        .list_tasks(
            &TaskFilter {
                work_order_id: Some("wo-1".to_string()),
                ..Default::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(listed.entries.len(), 2);
}

#[tokio::test]
async fn test_handler_loop_dispatches_until_shutdown() {
    let harness = Arc::new(Harness::new());
    seeded(&harness, &["v1"]).await;
    let task = harness
        .tasks
        .create_task(&test_credential(), data_request(view("v1")))
        .await
        .unwrap();

    let (tx, rx) = broadcast::channel(1);
    let runner = harness.clone();
    let handle = tokio::spawn(async move { runner.handler.run(rx).await });

    let tasks = harness.world.tasks.clone();
    let task_id = task.id.clone();
    let dispatched = TestEnv::wait_for(
        || {
            let tasks = tasks.clone();
            let task_id = task_id.clone();
            async move {
                tasks
                    .get_by_id(&task_id)
                    .await
                    .ok()
                    .flatten()
                    .is_some_and(|t| t.status == ExploreTaskStatus::Running)
            }
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(dispatched);

    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}
