//! 数据探查、时间戳探查的作业下发
//!
//! 每个 (视图, 任务类型) 在执行引擎上只保留一个作业：已有引用时更新作业
//! （引擎侧版本号递增），否则创建新作业并保存引用。

use std::sync::Arc;

use tracing::{debug, warn};

use explore_core::{
    ExecutionEngine, ExploreResult, ExploreTask, ExploreTaskRepository, JobRef, JobRefRepository,
    MetadataRepository, StructuredLogger, ViewMeta,
};
use explore_infrastructure::ExploreMetrics;

use crate::rule_resolver::RuleResolver;
use crate::targets::target_views;

pub struct JobDispatcher {
    resolver: Arc<RuleResolver>,
    engine: Arc<dyn ExecutionEngine>,
    job_refs: Arc<dyn JobRefRepository>,
    task_repo: Arc<dyn ExploreTaskRepository>,
    metadata_repo: Arc<dyn MetadataRepository>,
    metrics: Arc<ExploreMetrics>,
}

impl JobDispatcher {
    pub fn new(
        resolver: Arc<RuleResolver>,
        engine: Arc<dyn ExecutionEngine>,
        job_refs: Arc<dyn JobRefRepository>,
        task_repo: Arc<dyn ExploreTaskRepository>,
        metadata_repo: Arc<dyn MetadataRepository>,
        metrics: Arc<ExploreMetrics>,
    ) -> Self {
        Self {
            resolver,
            engine,
            job_refs,
            task_repo,
            metadata_repo,
            metrics,
        }
    }

    pub fn metadata_repo(&self) -> &dyn MetadataRepository {
        self.metadata_repo.as_ref()
    }

    /// 解析规则并创建或更新视图上的作业
    pub async fn dispatch(&self, task: &mut ExploreTask, view: &ViewMeta) -> ExploreResult<JobRef> {
        let spec = self.resolver.resolve(task, view).await?;

        let existing = self.job_refs.get(&view.id, task.kind).await?;
        let created = existing.is_none();
        let job = match existing {
            Some(existing) => {
                self.engine
                    .update_job(&task.credential, &existing.job_id, &spec)
                    .await?
            }
            None => self.engine.create_job(&task.credential, &spec).await?,
        };
        self.job_refs.save(&view.id, task.kind, &job).await?;

        // 只回写作业引用，任务状态由调用方按条件更新
        if !task.target.is_datasource() {
            self.task_repo.set_external_job(&task.id, &job).await?;
            task.external_job = Some(job.clone());
        }

        StructuredLogger::log_job_dispatched(&task.id, &view.id, &job.job_id, job.version, created);
        self.metrics.record_job_dispatched(created);
        Ok(job)
    }

    /// 删除任务目标上全部视图的作业；单个视图删除失败不影响其余视图
    pub async fn cancel_jobs(&self, task: &ExploreTask) -> ExploreResult<usize> {
        let views = target_views(self.metadata_repo.as_ref(), &task.target).await?;
        let mut deleted = 0;

        for view in views {
            let Some(job) = self.job_refs.get(&view.id, task.kind).await? else {
                continue;
            };
            match self.engine.delete_job(&task.credential, &job.job_id).await {
                Ok(()) => {
                    self.job_refs.delete(&view.id, task.kind).await?;
                    deleted += 1;
                    debug!("任务 {} 在视图 {} 上的作业 {} 已删除", task.id, view.id, job.job_id);
                }
                Err(e) => {
                    warn!("删除视图 {} 的作业 {} 失败: {}", view.id, job.job_id, e);
                }
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use explore_config::ResolverConfig;
    use explore_core::{DimensionType, ExploreKind, RuleRepository};
    use explore_testing_utils::{FieldBuilder, RuleBuilder, TaskBuilder, TestWorld};
    use serde_json::json;

    fn dispatcher(world: &TestWorld) -> JobDispatcher {
        let resolver = Arc::new(RuleResolver::new(
            world.rules.clone(),
            world.metadata.clone(),
            world.standards.clone(),
            ResolverConfig::default(),
        ));
        JobDispatcher::new(
            resolver,
            world.flaky_engine.clone(),
            world.job_refs.clone(),
            world.tasks.clone(),
            world.metadata.clone(),
            Arc::new(ExploreMetrics::new()),
        )
    }

    #[tokio::test]
    async fn test_redispatch_updates_same_job() {
        let world = TestWorld::new();
        world.seed_datasource("ds-1", "hive", "ods").await;
        let views = world.seed_views("ds-1", &["v1"]).await;
        world
            .seed_field(
                FieldBuilder::new("f-age", "v1", "age")
                    .with_type("int", None, None)
                    .build(),
            )
            .await;
        world
            .rules
            .create(&RuleBuilder::field_rule("r1", "v1", "f-age", DimensionType::Null).build())
            .await
            .unwrap();

        let dispatcher = dispatcher(&world);
        let mut first = TaskBuilder::data().on_view("v1").build();
        world.tasks.create(&first).await.unwrap();
        let job1 = dispatcher.dispatch(&mut first, &views[0]).await.unwrap();
        assert_eq!(job1.version, 1);

        let (spec, _) = world.engine.job(&job1.job_id).await.unwrap();
        assert_eq!(
            spec.field("age").unwrap().rules[0].config,
            json!({ "null": ["0", "NULL"] })
        );

        let mut second = TaskBuilder::data().on_view("v1").build();
        world.tasks.create(&second).await.unwrap();
        let job2 = dispatcher.dispatch(&mut second, &views[0]).await.unwrap();
        assert_eq!(job2.job_id, job1.job_id);
        assert_eq!(job2.version, 2);
        assert_eq!(world.engine.job_count().await, 1);

        let stored = world.tasks.get_by_id(&second.id).await.unwrap().unwrap();
        assert_eq!(stored.external_job, Some(job2));
    }

    #[tokio::test]
    async fn test_dispatch_does_not_revive_canceled_task() {
        let world = TestWorld::new();
        world.seed_datasource("ds-1", "hive", "ods").await;
        let views = world.seed_views("ds-1", &["v1"]).await;

        let mut task = TaskBuilder::data().on_view("v1").build();
        world.tasks.create(&task).await.unwrap();
        let mut canceled = task.clone();
        canceled
            .transition_to(explore_core::ExploreTaskStatus::Canceled)
            .unwrap();
        world.tasks.update(&canceled).await.unwrap();

        let job = dispatcher(&world).dispatch(&mut task, &views[0]).await.unwrap();

        let stored = world.tasks.get_by_id(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, explore_core::ExploreTaskStatus::Canceled);
        assert_eq!(stored.external_job, Some(job));
    }

    #[tokio::test]
    async fn test_job_refs_are_per_kind() {
        let world = TestWorld::new();
        world.seed_datasource("ds-1", "hive", "ods").await;
        let views = world.seed_views("ds-1", &["v1"]).await;
        let dispatcher = dispatcher(&world);

        let mut data = TaskBuilder::data().on_view("v1").build();
        let mut timestamp = TaskBuilder::new(ExploreKind::TimestampExplore)
            .on_view("v1")
            .build();
        world.tasks.create(&data).await.unwrap();
        world.tasks.create(&timestamp).await.unwrap();

        let a = dispatcher.dispatch(&mut data, &views[0]).await.unwrap();
        let b = dispatcher.dispatch(&mut timestamp, &views[0]).await.unwrap();
        assert_ne!(a.job_id, b.job_id);
        assert_eq!(world.job_refs.count().await, 2);
    }

    #[tokio::test]
    async fn test_engine_receives_task_credential() {
        let world = TestWorld::new();
        world.seed_datasource("ds-1", "hive", "ods").await;
        let views = world.seed_views("ds-1", &["v1"]).await;

        let mut task = TaskBuilder::data()
            .on_view("v1")
            .with_credential(explore_core::Credential::new("u-42", "bob", "tok"))
            .build();
        world.tasks.create(&task).await.unwrap();
        dispatcher(&world).dispatch(&mut task, &views[0]).await.unwrap();

        assert_eq!(world.engine.last_caller().await.as_deref(), Some("u-42"));
    }

    #[tokio::test]
    async fn test_cancel_jobs_deletes_every_view_job() {
        let world = TestWorld::new();
        world.seed_datasource("ds-1", "hive", "ods").await;
        let views = world.seed_views("ds-1", &["v1", "v2"]).await;
        let dispatcher = dispatcher(&world);

        let mut task = TaskBuilder::data().on_datasource("ds-1").build();
        world.tasks.create(&task).await.unwrap();
        for view in &views {
            dispatcher.dispatch(&mut task, view).await.unwrap();
        }
        assert!(task.external_job.is_none());

        let deleted = dispatcher.cancel_jobs(&task).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(world.engine.job_count().await, 0);
        assert_eq!(world.job_refs.count().await, 0);
        assert_eq!(world.flaky_engine.deleted_jobs().len(), 2);
    }
}
