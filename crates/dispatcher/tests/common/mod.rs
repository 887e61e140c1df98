#![allow(dead_code)]

use std::sync::Arc;

use explore_config::{MessageQueueConfig, ResolverConfig, SchedulerConfig};
use explore_core::{ExecutionEngine, MessageQueue};
use explore_dispatcher::{
    BatchExecutor, ExploreMessageHandler, ExploreScheduler, FanOutController, JobDispatcher,
    RuleResolver, TaskService, TaskStatusRefresher, ViewExplorer,
};
use explore_infrastructure::ExploreMetrics;
use explore_testing_utils::TestWorld;

/// 按生产装配方式把各组件接到同一个 [`TestWorld`] 上
pub struct Harness {
    pub world: TestWorld,
    pub scheduler: ExploreScheduler,
    pub handler: ExploreMessageHandler,
    pub tasks: Arc<TaskService>,
    pub queue_config: MessageQueueConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(TestWorld::new(), None, false)
    }

    /// 执行引擎换成可注入失败的版本
    pub fn with_flaky_engine() -> Self {
        Self::build(TestWorld::new(), None, true)
    }

    /// 使用指定的消息队列
    pub fn with_queue(queue: Arc<dyn MessageQueue>) -> Self {
        Self::build(TestWorld::new(), Some(queue), false)
    }

    fn build(world: TestWorld, queue: Option<Arc<dyn MessageQueue>>, flaky: bool) -> Self {
        let metrics = Arc::new(ExploreMetrics::new());
        let queue: Arc<dyn MessageQueue> = queue.unwrap_or_else(|| world.queue.clone());
        let engine: Arc<dyn ExecutionEngine> = if flaky {
            world.flaky_engine.clone()
        } else {
            world.engine.clone()
        };
        let queue_config = MessageQueueConfig {
            poll_interval_millis: 10,
            max_retries: 2,
            ..Default::default()
        };

        let resolver = Arc::new(RuleResolver::new(
            world.rules.clone(),
            world.metadata.clone(),
            world.standards.clone(),
            ResolverConfig::default(),
        ));
        let dispatcher = Arc::new(JobDispatcher::new(
            resolver,
            engine.clone(),
            world.job_refs.clone(),
            world.tasks.clone(),
            world.metadata.clone(),
            metrics.clone(),
        ));
        let refresher = Arc::new(TaskStatusRefresher::new(
            engine,
            world.tasks.clone(),
            world.metadata.clone(),
        ));
        let explorer = Arc::new(ViewExplorer::new(
            world.metadata.clone(),
            world.classifier.clone(),
            world.grade_rules.clone(),
        ));
        let fan_out = Arc::new(FanOutController::new(
            world.tasks.clone(),
            world.sub_tasks.clone(),
            world.metadata.clone(),
            explorer,
            None,
            metrics.clone(),
        ));

        let scheduler = ExploreScheduler::new(
            world.tasks.clone(),
            world.sub_tasks.clone(),
            world.lock.clone(),
            fan_out,
            SchedulerConfig {
                lock_retry_millis: 10,
                ..Default::default()
            },
            metrics.clone(),
        );
        let handler = ExploreMessageHandler::new(
            queue.clone(),
            world.tasks.clone(),
            dispatcher.clone(),
            queue_config.clone(),
            metrics.clone(),
        );
        let tasks = Arc::new(TaskService::new(
            world.tasks.clone(),
            world.sub_tasks.clone(),
            world.metadata.clone(),
            queue,
            dispatcher,
            refresher,
            BatchExecutor::new(4),
            queue_config.explore_queue.clone(),
            metrics,
        ));

        Self {
            world,
            scheduler,
            handler,
            tasks,
            queue_config,
        }
    }
}
