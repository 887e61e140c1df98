use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use explore_config::AppConfig;
use explore_core::{
    ClassificationService, DistributedLock, ExecutionEngine, ExploreTaskRepository,
    GradeRuleRepository, JobRefRepository, MessageQueue, MetadataRepository, RuleRepository,
    StandardsService, SubTaskRepository, TemplateRuleRepository,
};
use explore_dispatcher::{
    BatchExecutor, ExploreMessageHandler, ExploreScheduler, FanOutController, JobDispatcher,
    RuleResolver, RuleService, TaskService, TaskStatusRefresher, ViewExplorer,
};
use explore_infrastructure::{
    ExploreMetrics, InMemoryClassificationService, InMemoryExecutionEngine,
    InMemoryGradeRuleStore, InMemoryJobRefStore, InMemoryMessageQueue, InMemoryMetadataStore,
    InMemoryRuleStore, InMemoryStandardsService, InMemorySubTaskStore, InMemoryTaskStore,
    InMemoryTemplateCatalog, LockFactory,
};

use crate::shutdown::ShutdownManager;

/// 服务依赖的存储与外部协作方
pub struct Collaborators {
    pub tasks: Arc<dyn ExploreTaskRepository>,
    pub sub_tasks: Arc<dyn SubTaskRepository>,
    pub rules: Arc<dyn RuleRepository>,
    pub templates: Arc<dyn TemplateRuleRepository>,
    pub metadata: Arc<dyn MetadataRepository>,
    pub grade_rules: Arc<dyn GradeRuleRepository>,
    pub job_refs: Arc<dyn JobRefRepository>,
    pub engine: Arc<dyn ExecutionEngine>,
    pub standards: Arc<dyn StandardsService>,
    pub classification: Arc<dyn ClassificationService>,
    pub queue: Arc<dyn MessageQueue>,
    pub lock: Arc<dyn DistributedLock>,
}

impl Collaborators {
    /// 单实例部署：除分布式锁外全部使用内存实现
    pub async fn in_memory(config: &AppConfig) -> Result<Self> {
        let lock = LockFactory::create(&config.lock)
            .await
            .context("创建分布式锁失败")?;

        Ok(Self {
            tasks: Arc::new(InMemoryTaskStore::new()),
            sub_tasks: Arc::new(InMemorySubTaskStore::new()),
            rules: Arc::new(InMemoryRuleStore::new()),
            templates: Arc::new(InMemoryTemplateCatalog::default()),
            metadata: Arc::new(InMemoryMetadataStore::new()),
            grade_rules: Arc::new(InMemoryGradeRuleStore::default()),
            job_refs: Arc::new(InMemoryJobRefStore::new()),
            engine: Arc::new(InMemoryExecutionEngine::new()),
            standards: Arc::new(InMemoryStandardsService::new()),
            classification: Arc::new(InMemoryClassificationService::new()),
            queue: Arc::new(InMemoryMessageQueue::with_capacity(
                config.message_queue.max_queue_size,
            )),
            lock,
        })
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    scheduler: Arc<ExploreScheduler>,
    handler: Arc<ExploreMessageHandler>,
    task_service: Arc<TaskService>,
    rule_service: Arc<RuleService>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let collaborators = Collaborators::in_memory(&config).await?;
        Ok(Self::with_collaborators(config, collaborators))
    }

    pub fn with_collaborators(config: AppConfig, c: Collaborators) -> Self {
        info!("初始化探查服务组件");
        let metrics = Arc::new(ExploreMetrics::new());

        let resolver = Arc::new(RuleResolver::new(
            c.rules.clone(),
            c.metadata.clone(),
            c.standards.clone(),
            config.resolver.clone(),
        ));
        let dispatcher = Arc::new(JobDispatcher::new(
            resolver,
            c.engine.clone(),
            c.job_refs.clone(),
            c.tasks.clone(),
            c.metadata.clone(),
            metrics.clone(),
        ));
        let refresher = Arc::new(TaskStatusRefresher::new(
            c.engine.clone(),
            c.tasks.clone(),
            c.metadata.clone(),
        ));
        let explorer = Arc::new(ViewExplorer::new(
            c.metadata.clone(),
            c.classification.clone(),
            c.grade_rules.clone(),
        ));
        let fan_out = Arc::new(FanOutController::new(
            c.tasks.clone(),
            c.sub_tasks.clone(),
            c.metadata.clone(),
            explorer,
            config.scheduler.view_timeout_seconds.map(Duration::from_secs),
            metrics.clone(),
        ));

        let scheduler = Arc::new(ExploreScheduler::new(
            c.tasks.clone(),
            c.sub_tasks.clone(),
            c.lock.clone(),
            fan_out,
            config.scheduler.clone(),
            metrics.clone(),
        ));
        let handler = Arc::new(ExploreMessageHandler::new(
            c.queue.clone(),
            c.tasks.clone(),
            dispatcher.clone(),
            config.message_queue.clone(),
            metrics.clone(),
        ));
        let task_service = Arc::new(TaskService::new(
            c.tasks.clone(),
            c.sub_tasks.clone(),
            c.metadata.clone(),
            c.queue.clone(),
            dispatcher,
            refresher,
            BatchExecutor::new(config.batch.workers),
            config.message_queue.explore_queue.clone(),
            metrics,
        ));
        let rule_service = Arc::new(RuleService::new(c.rules, c.templates, c.metadata));

        Self {
            config,
            scheduler,
            handler,
            task_service,
            rule_service,
        }
    }

    pub fn task_service(&self) -> Arc<TaskService> {
        Arc::clone(&self.task_service)
    }

    pub fn rule_service(&self) -> Arc<RuleService> {
        Arc::clone(&self.rule_service)
    }

    /// 启动后台循环并登记到关闭管理器
    pub async fn start(&self, shutdown: &ShutdownManager) {
        if self.config.scheduler.enabled {
            let scheduler = Arc::clone(&self.scheduler);
            let shutdown_rx = shutdown.subscribe();
            let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });
            shutdown.track("scheduler", handle).await;
        } else {
            info!("分类探查调度器已禁用");
        }

        let handler = Arc::clone(&self.handler);
        let shutdown_rx = shutdown.subscribe();
        let handle = tokio::spawn(async move { handler.run(shutdown_rx).await });
        shutdown.track("explore_handler", handle).await;

        info!("探查服务已启动");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use explore_core::{
        Credential, ExploreKind, ExploreTarget, ExploreTaskStatus, ViewKind, ViewMeta,
    };
    use explore_dispatcher::CreateTaskRequest;

    #[tokio::test]
    async fn test_application_runs_classification_until_shutdown() {
        let mut config = AppConfig::default();
        config.scheduler.interval_seconds = 1;
        config.scheduler.lock_retry_millis = 10;

        let metadata = Arc::new(InMemoryMetadataStore::new());
        metadata
            .insert_view(ViewMeta {
                id: "v1".to_string(),
                technical_name: "t_v1".to_string(),
                business_name: "视图".to_string(),
                description: String::new(),
                kind: ViewKind::Custom,
                datasource_id: None,
            })
            .await;

        let mut collaborators = Collaborators::in_memory(&config).await.unwrap();
        collaborators.metadata = metadata;
        let app = Application::with_collaborators(config, collaborators);

        let task = app
            .task_service()
            .create_task(
                &Credential::new("u-1", "tester", "token"),
                CreateTaskRequest::new(
                    ExploreKind::ClassificationExplore,
                    ExploreTarget::View("v1".to_string()),
                ),
            )
            .await
            .unwrap();

        let shutdown = ShutdownManager::new();
        app.start(&shutdown).await;

        let mut finished = false;
        for _ in 0..100 {
            let current = app.task_service().get_task(&task.id).await.unwrap();
            if current.status == ExploreTaskStatus::Finished {
                finished = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(finished);
        assert_eq!(shutdown.shutdown(Duration::from_secs(2)).await, 0);
    }
}
