//! 探查任务的创建、取消、查询与删除
//!
//! 数据探查和时间戳探查在创建后立即投递“立即探查”消息，由消息处理器下发作业；
//! 分类探查只落库，由调度器在持锁周期中执行。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use explore_core::{
    Credential, ExploreError, ExploreKind, ExploreNowMessage, ExploreResult, ExploreTarget,
    ExploreTask, ExploreTaskRepository, ExploreTaskStatus, Message, MessageQueue,
    MetadataRepository, Page, Paged, StructuredLogger, SubTaskRepository, TaskFilter, TaskRemark,
};
use explore_infrastructure::ExploreMetrics;

use crate::batch_executor::BatchExecutor;
use crate::job_dispatcher::JobDispatcher;
use crate::status_aggregator::TaskStatusRefresher;
use crate::targets::target_exists;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub kind: ExploreKind,
    pub target: ExploreTarget,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub subject_ids: Vec<String>,
    #[serde(default)]
    pub work_order_id: Option<String>,
}

impl CreateTaskRequest {
    pub fn new(kind: ExploreKind, target: ExploreTarget) -> Self {
        Self {
            kind,
            target,
            config: serde_json::Value::Null,
            subject_ids: Vec::new(),
            work_order_id: None,
        }
    }

    fn validate(&self) -> ExploreResult<()> {
        if self.target.id().trim().is_empty() {
            return Err(ExploreError::validation("探查目标ID不能为空"));
        }
        if !self.subject_ids.is_empty() && !self.kind.is_classification() {
            return Err(ExploreError::validation(format!(
                "{} 类型的任务不支持指定分类主题",
                self.kind
            )));
        }
        Ok(())
    }
}

pub struct TaskService {
    task_repo: Arc<dyn ExploreTaskRepository>,
    sub_task_repo: Arc<dyn SubTaskRepository>,
    metadata_repo: Arc<dyn MetadataRepository>,
    queue: Arc<dyn MessageQueue>,
    dispatcher: Arc<JobDispatcher>,
    refresher: Arc<TaskStatusRefresher>,
    batch: BatchExecutor,
    explore_queue: String,
    metrics: Arc<ExploreMetrics>,
}

impl TaskService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_repo: Arc<dyn ExploreTaskRepository>,
        sub_task_repo: Arc<dyn SubTaskRepository>,
        metadata_repo: Arc<dyn MetadataRepository>,
        queue: Arc<dyn MessageQueue>,
        dispatcher: Arc<JobDispatcher>,
        refresher: Arc<TaskStatusRefresher>,
        batch: BatchExecutor,
        explore_queue: impl Into<String>,
        metrics: Arc<ExploreMetrics>,
    ) -> Self {
        Self {
            task_repo,
            sub_task_repo,
            metadata_repo,
            queue,
            dispatcher,
            refresher,
            batch,
            explore_queue: explore_queue.into(),
            metrics,
        }
    }

    /// 创建任务
    ///
    /// 同一目标上同类型的进行中任务只允许一个。检查与写入之间没有原子性保证，
    /// 并发创建仍可能产生重复任务。
    pub async fn create_task(
        &self,
        credential: &Credential,
        request: CreateTaskRequest,
    ) -> ExploreResult<ExploreTask> {
        request.validate()?;

        if !target_exists(self.metadata_repo.as_ref(), &request.target).await? {
            return Err(match &request.target {
                ExploreTarget::View(id) => ExploreError::view_not_found(id),
                ExploreTarget::Datasource(id) => ExploreError::datasource_not_found(id),
            });
        }
        if let Some(active) = self
            .task_repo
            .find_active(&request.target, request.kind)
            .await?
        {
            return Err(ExploreError::conflict(format!(
                "目标 {} 上已有进行中的 {} 任务 {}",
                request.target, request.kind, active.id
            )));
        }

        let mut task = ExploreTask::new(request.kind, request.target, credential.clone());
        task.config = request.config;
        task.subject_ids = request.subject_ids;
        task.work_order_id = request.work_order_id;
        let mut task = self.task_repo.create(&task).await?;

        StructuredLogger::log_task_created(&task.id, task.kind, &task.target, task.created_by());
        self.metrics.record_task_created(task.kind);

        if task.kind.uses_execution_engine() {
            let message = Message::explore_now(ExploreNowMessage {
                task_id: task.id.clone(),
                user_id: credential.user_id.clone(),
                user_name: credential.user_name.clone(),
            });
            if let Err(e) = self.queue.publish_message(&self.explore_queue, &message).await {
                StructuredLogger::log_system_error("task_service", "publish_explore_now", &e);
                task.finish_with(
                    ExploreTaskStatus::Failed,
                    None,
                    Some(TaskRemark::with_description(e.to_string())),
                )?;
                if self
                    .task_repo
                    .update_if_status(&task, ExploreTaskStatus::Queued)
                    .await?
                {
                    self.metrics.record_task_completed(task.kind, task.status);
                }
                return Err(e);
            }
        }

        Ok(task)
    }

    /// 同一工单下批量创建任务，每个请求独立成败，结果顺序与请求一致
    pub async fn batch_create_tasks(
        self: &Arc<Self>,
        credential: &Credential,
        work_order_id: &str,
        requests: Vec<CreateTaskRequest>,
    ) -> Vec<ExploreResult<ExploreTask>> {
        let total = requests.len();
        let service = Arc::clone(self);
        let credential = credential.clone();
        let order_id = work_order_id.to_string();

        let results = self
            .batch
            .run(requests, move |mut request| {
                let service = Arc::clone(&service);
                let credential = credential.clone();
                request.work_order_id = Some(order_id.clone());
                async move { service.create_task(&credential, request).await }
            })
            .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        self.metrics.record_batch(total, failed);
        info!("工单 {} 批量创建任务: {} 个, 失败 {} 个", work_order_id, total, failed);
        results
    }

    /// 取消任务
    ///
    /// 先按条件写入取消状态，再清理执行引擎作业或子任务；与调度器、消息处理器
    /// 的并发写入由条件更新裁决，输掉竞争时返回冲突错误。
    pub async fn cancel_task(&self, task_id: &str) -> ExploreResult<ExploreTask> {
        let mut task = self.load(task_id).await?;
        if !task.is_active() {
            return Err(ExploreError::validation(format!(
                "任务 {} 已处于 {} 状态，无法取消",
                task.id, task.status
            )));
        }

        let previous = task.status;
        task.transition_to(ExploreTaskStatus::Canceled)?;
        if !self.task_repo.update_if_status(&task, previous).await? {
            return Err(ExploreError::conflict(format!(
                "任务 {} 的状态已被并发修改，请刷新后重试",
                task.id
            )));
        }
        StructuredLogger::log_status_change(&task.id, previous, task.status);
        self.metrics.record_task_completed(task.kind, task.status);

        if task.kind.uses_execution_engine() {
            let deleted = self.dispatcher.cancel_jobs(&task).await?;
            info!("任务 {} 取消，删除 {} 个执行引擎作业", task.id, deleted);
        } else {
            let affected = self
                .sub_task_repo
                .update_active_status(&task.id, ExploreTaskStatus::Canceled)
                .await?;
            info!("任务 {} 取消，{} 个子任务标记为取消", task.id, affected);
        }
        Ok(task)
    }

    /// 查询任务；进行中的数据探查任务会先按执行引擎的记录刷新状态
    pub async fn get_task(&self, task_id: &str) -> ExploreResult<ExploreTask> {
        let mut task = self.load(task_id).await?;
        if task.is_active() && task.kind.uses_execution_engine() {
            if let Err(e) = self.refresher.refresh(&mut task).await {
                warn!("刷新任务 {} 的执行状态失败: {}", task.id, e);
                return self.load(task_id).await;
            }
        }
        Ok(task)
    }

    pub async fn list_tasks(&self, filter: &TaskFilter, page: Page) -> ExploreResult<Paged<ExploreTask>> {
        self.task_repo.list(filter, page).await
    }

    /// 删除已结束的任务及其子任务
    pub async fn delete_task(&self, task_id: &str) -> ExploreResult<()> {
        let task = self.load(task_id).await?;
        if task.is_active() {
            return Err(ExploreError::validation(format!(
                "任务 {} 仍在进行中，请先取消",
                task.id
            )));
        }
        self.sub_task_repo.delete_by_parent(&task.id).await?;
        self.task_repo.delete(&task.id).await?;
        info!("任务 {} 已删除", task.id);
        Ok(())
    }

    async fn load(&self, task_id: &str) -> ExploreResult<ExploreTask> {
        self.task_repo
            .get_by_id(task_id)
            .await?
            .ok_or_else(|| ExploreError::task_not_found(task_id))
    }
}
