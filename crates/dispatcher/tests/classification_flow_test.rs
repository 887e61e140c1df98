mod common;

use std::sync::Arc;

use futures::FutureExt;
use serde_json::json;

use explore_core::{
    ExploreKind, ExploreTarget, ExploreTaskRepository, ExploreTaskStatus, MetadataRepository,
    SubTaskRepository,
};
use explore_dispatcher::CreateTaskRequest;
use explore_testing_utils::{grade_rule, test_credential};

use common::Harness;

async fn seeded(harness: &Harness, views: &[&str]) {
    harness.world.seed_datasource("ds-1", "hive", "ods").await;
    harness.world.seed_views("ds-1", views).await;
}

#[tokio::test]
async fn test_datasource_with_one_failing_view_fails_with_single_bucket() {
    let harness = Harness::new();
    seeded(&harness, &["v1", "v2", "v3"]).await;
    harness.world.classifier.fail_on("v2");

    let task = harness
        .tasks
        .create_task(
            &test_credential(),
            CreateTaskRequest::new(
                ExploreKind::ClassificationExplore,
                ExploreTarget::Datasource("ds-1".to_string()),
            ),
        )
        .await
        .unwrap();
    assert_eq!(task.status, ExploreTaskStatus::Queued);
    // 分类探查不经消息队列
    assert_eq!(harness.world.queue.in_flight_count().await, 0);

    let processed = harness.scheduler.run_cycle().await.unwrap();
    assert_eq!(processed.as_deref(), Some(task.id.as_str()));

    let stored = harness.world.tasks.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExploreTaskStatus::Failed);
    assert!(stored.finished_at.is_some());
    let remark = stored.remark.unwrap();
    assert_eq!(remark.total_count, 1);
    assert_eq!(remark.details.len(), 1);
    assert_eq!(remark.bucket("explore").unwrap().view_ids, vec!["v2"]);

    assert_eq!(harness.world.classifier.classified_views(), vec!["v1", "v2", "v3"]);
    let sub_tasks = harness.world.sub_tasks.list_by_parent(&task.id).await.unwrap();
    let failed: Vec<_> = sub_tasks
        .iter()
        .filter(|s| s.status == ExploreTaskStatus::Failed)
        .map(|s| s.view_id.as_str())
        .collect();
    assert_eq!(sub_tasks.len(), 3);
    assert_eq!(failed, vec!["v2"]);
}

#[tokio::test]
async fn test_sub_task_canceled_mid_run_stops_remaining_views() {
    let harness = Harness::new();
    seeded(&harness, &["v1", "v2", "v3"]).await;

    let task = harness
        .tasks
        .create_task(
            &test_credential(),
            CreateTaskRequest::new(
                ExploreKind::ClassificationExplore,
                ExploreTarget::Datasource("ds-1".to_string()),
            ),
        )
        .await
        .unwrap();

    let sub_tasks = harness.world.sub_tasks.clone();
    let parent_id = task.id.clone();
    harness.world.classifier.on_classify(
        "v1",
        Arc::new(move || {
            let sub_tasks = sub_tasks.clone();
            let parent_id = parent_id.clone();
            async move {
                let mut v2 = sub_tasks
                    .list_by_parent(&parent_id)
                    .await
                    .unwrap()
                    .into_iter()
                    .find(|s| s.view_id == "v2")
                    .unwrap();
                v2.mark(ExploreTaskStatus::Canceled, None);
                sub_tasks.update(&v2).await.unwrap();
            }
            .boxed()
        }),
    );

    harness.scheduler.run_cycle().await.unwrap();

    assert_eq!(harness.world.classifier.classified_views(), vec!["v1"]);
    let stored = harness.world.tasks.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExploreTaskStatus::Canceled);

    let sub_tasks = harness.world.sub_tasks.list_by_parent(&task.id).await.unwrap();
    let status_of = |view: &str| {
        sub_tasks
            .iter()
            .find(|s| s.view_id == view)
            .map(|s| s.status)
            .unwrap()
    };
    assert_eq!(status_of("v1"), ExploreTaskStatus::Finished);
    assert_eq!(status_of("v2"), ExploreTaskStatus::Canceled);
    assert_ne!(status_of("v3"), ExploreTaskStatus::Finished);
}

#[tokio::test]
async fn test_cancel_before_schedule_cancels_sub_tasks() {
    let harness = Harness::new();
    seeded(&harness, &["v1"]).await;

    let task = harness
        .tasks
        .create_task(
            &test_credential(),
            CreateTaskRequest::new(
                ExploreKind::ClassificationExplore,
                ExploreTarget::View("v1".to_string()),
            ),
        )
        .await
        .unwrap();

    let canceled = harness.tasks.cancel_task(&task.id).await.unwrap();
    assert_eq!(canceled.status, ExploreTaskStatus::Canceled);

    assert_eq!(harness.scheduler.run_cycle().await.unwrap(), None);
    assert!(harness.world.classifier.classified_views().is_empty());
}

#[tokio::test]
async fn test_grade_task_writes_subjects_and_grades() {
    let harness = Harness::new();
    seeded(&harness, &["v1"]).await;
    harness.world.classifier.assign("v1-f1", "subject-name");
    harness
        .world
        .grade_rules
        .insert(grade_rule(
            "g-1",
            "subject-name",
            "label-sensitive",
            1,
            json!({
                "operate": "and",
                "conditions": [{ "operate": "or", "subject_ids": ["subject-name"] }]
            }),
        ))
        .await;

    let mut request = CreateTaskRequest::new(
        ExploreKind::ClassificationGradeExplore,
        ExploreTarget::View("v1".to_string()),
    );
    request.subject_ids = vec!["subject-name".to_string()];
    let task = harness
        .tasks
        .create_task(&test_credential(), request)
        .await
        .unwrap();

    harness.scheduler.run_cycle().await.unwrap();

    let stored = harness.world.tasks.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExploreTaskStatus::Finished);
    let field = harness
        .world
        .metadata
        .list_fields("v1")
        .await
        .unwrap()
        .into_iter()
        .find(|f| f.id == "v1-f1")
        .unwrap();
    assert_eq!(field.subject_id.as_deref(), Some("subject-name"));
    assert_eq!(field.grade_label_id.as_deref(), Some("label-sensitive"));
}
