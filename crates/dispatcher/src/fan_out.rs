//! 分类探查的扇出执行
//!
//! 数据源级任务为每个视图派生一个子任务并顺序执行；每个视图开始前检查
//! 子任务与父任务是否已被取消，取消后停止后续视图，已完成的视图保持不变。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use explore_core::{
    ExploreError, ExploreResult, ExploreTarget, ExploreTask, ExploreTaskRepository,
    ExploreTaskStatus, MetadataRepository, StructuredLogger, SubTask, SubTaskRepository,
    TaskRemark,
};
use explore_infrastructure::ExploreMetrics;

use crate::targets::target_views;
use crate::view_explorer::{FailureBucket, ViewExplorer, ViewFailure, ViewOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOutOutcome {
    Finished,
    Canceled,
}

pub struct FanOutController {
    task_repo: Arc<dyn ExploreTaskRepository>,
    sub_task_repo: Arc<dyn SubTaskRepository>,
    metadata_repo: Arc<dyn MetadataRepository>,
    explorer: Arc<ViewExplorer>,
    view_timeout: Option<Duration>,
    metrics: Arc<ExploreMetrics>,
}

impl FanOutController {
    pub fn new(
        task_repo: Arc<dyn ExploreTaskRepository>,
        sub_task_repo: Arc<dyn SubTaskRepository>,
        metadata_repo: Arc<dyn MetadataRepository>,
        explorer: Arc<ViewExplorer>,
        view_timeout: Option<Duration>,
        metrics: Arc<ExploreMetrics>,
    ) -> Self {
        Self {
            task_repo,
            sub_task_repo,
            metadata_repo,
            explorer,
            view_timeout,
            metrics,
        }
    }

    /// 执行任务；存在失败视图时返回 `ExploreError::PartialFailure`，备注按失败原因分桶
    pub async fn execute(&self, task: &ExploreTask) -> ExploreResult<FanOutOutcome> {
        match &task.target {
            ExploreTarget::View(view_id) => {
                let result = self.run_view(task, view_id).await;
                self.record_view(task, view_id, &result);
                match result {
                    Ok(_) => Ok(FanOutOutcome::Finished),
                    Err(failure) => Err(ExploreError::PartialFailure {
                        remark: TaskRemark::from_failures([(failure.bucket.as_str(), view_id.clone())]),
                    }),
                }
            }
            ExploreTarget::Datasource(_) => self.execute_datasource(task).await,
        }
    }

    async fn execute_datasource(&self, task: &ExploreTask) -> ExploreResult<FanOutOutcome> {
        let started = Instant::now();
        let views = target_views(self.metadata_repo.as_ref(), &task.target).await?;
        let sub_tasks: Vec<SubTask> = views.iter().map(|v| SubTask::new(&task.id, &v.id)).collect();
        self.sub_task_repo.create_batch(&sub_tasks).await?;
        info!("任务 {} 派生 {} 个视图子任务", task.id, sub_tasks.len());

        let mut failures: Vec<(FailureBucket, String)> = Vec::new();
        let mut aborted = false;

        for mut sub_task in sub_tasks {
            if self.cancellation_requested(&task.id).await? {
                info!("任务 {} 已被取消，停止剩余视图", task.id);
                aborted = true;
                break;
            }

            sub_task.mark(ExploreTaskStatus::Running, None);
            if !self
                .sub_task_repo
                .update_if_status(&sub_task, ExploreTaskStatus::Queued)
                .await?
            {
                info!("子任务 {} 在开始前已被取消，停止剩余视图", sub_task.id);
                aborted = true;
                break;
            }

            let result = self.run_view(task, &sub_task.view_id).await;
            self.record_view(task, &sub_task.view_id, &result);

            let (status, remark) = match &result {
                Ok(_) => (ExploreTaskStatus::Finished, None),
                Err(failure) => {
                    failures.push((failure.bucket, sub_task.view_id.clone()));
                    (ExploreTaskStatus::Failed, Some(failure.bucket.remark().to_string()))
                }
            };
            sub_task.mark(status, remark);
            if !self
                .sub_task_repo
                .update_if_status(&sub_task, ExploreTaskStatus::Running)
                .await?
            {
                debug!("子任务 {} 执行期间被取消，保留取消状态", sub_task.id);
            }
        }

        self.metrics.record_fan_out(
            views.len(),
            failures.len(),
            started.elapsed().as_secs_f64(),
        );

        if aborted {
            return Ok(FanOutOutcome::Canceled);
        }
        if !failures.is_empty() {
            return Err(ExploreError::PartialFailure {
                remark: TaskRemark::from_failures(
                    failures
                        .into_iter()
                        .map(|(bucket, view_id)| (bucket.as_str(), view_id)),
                ),
            });
        }
        Ok(FanOutOutcome::Finished)
    }

    async fn run_view(&self, task: &ExploreTask, view_id: &str) -> Result<ViewOutcome, ViewFailure> {
        let Some(limit) = self.view_timeout else {
            return self.explorer.explore(task, view_id).await;
        };
        match tokio::time::timeout(limit, self.explorer.explore(task, view_id)).await {
            Ok(result) => result,
            Err(_) => Err(ViewFailure {
                bucket: FailureBucket::Timeout,
                error: ExploreError::Timeout(format!(
                    "视图 {} 探查超过 {} 秒",
                    view_id,
                    limit.as_secs_f64()
                )),
            }),
        }
    }

    fn record_view(&self, task: &ExploreTask, view_id: &str, result: &Result<ViewOutcome, ViewFailure>) {
        match result {
            Ok(_) => {
                StructuredLogger::log_view_explored(&task.id, view_id, true, None);
                self.metrics.record_view_explored("finished");
            }
            Err(failure) => {
                let reason = failure.to_string();
                StructuredLogger::log_view_explored(&task.id, view_id, false, Some(&reason));
                self.metrics.record_view_explored(failure.bucket.as_str());
            }
        }
    }

    /// 检查点：任一子任务或父任务被取消
    async fn cancellation_requested(&self, task_id: &str) -> ExploreResult<bool> {
        let sub_tasks = self.sub_task_repo.list_by_parent(task_id).await?;
        if sub_tasks.iter().any(SubTask::is_canceled) {
            return Ok(true);
        }
        let parent = self.task_repo.get_by_id(task_id).await?;
        Ok(parent.map_or(true, |p| p.status == ExploreTaskStatus::Canceled))
    }
}
