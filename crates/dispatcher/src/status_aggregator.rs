//! 汇总执行引擎上报的各视图执行记录，推导数据探查任务的状态
//!
//! 汇总规则按顺序生效：
//! 1. 没有记录或全部排队中 → Queued
//! 2. 任一视图被取消 → Canceled
//! 3. 全部完成 → Finished，完成时间取最晚的更新时间
//! 4. 失败数 + 完成数 = 总数且存在失败 → Failed
//! 5. 其余情况 → Running

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use explore_core::{
    ExecutionEngine, ExecutionFilter, ExecutionRecord, ExecutionStatus, ExploreError,
    ExploreResult, ExploreTarget, ExploreTask, ExploreTaskRepository, ExploreTaskStatus,
    MetadataRepository, StructuredLogger, TaskRemark,
};

/// 执行失败原因分类，按原因文本前缀（不区分大小写）识别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    EngineFailure,
    Timeout,
    BadRuleConfig,
    BadRequest,
    Other,
}

impl FailureCategory {
    pub fn from_reason(reason: Option<&str>) -> Self {
        let Some(reason) = reason else {
            return FailureCategory::Other;
        };
        let reason = reason.trim_start().to_ascii_lowercase();
        if reason.starts_with("execute failed") {
            FailureCategory::EngineFailure
        } else if reason.starts_with("timeout") {
            FailureCategory::Timeout
        } else if reason.starts_with("rule config") {
            FailureCategory::BadRuleConfig
        } else if reason.starts_with("bad request") {
            FailureCategory::BadRequest
        } else {
            FailureCategory::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::EngineFailure => "engine_failure",
            FailureCategory::Timeout => "timeout",
            FailureCategory::BadRuleConfig => "bad_rule_config",
            FailureCategory::BadRequest => "bad_request",
            FailureCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedStatus {
    pub status: ExploreTaskStatus,
    pub finished_at: Option<DateTime<Utc>>,
    pub remark: Option<TaskRemark>,
}

pub fn aggregate(records: &[ExecutionRecord]) -> AggregatedStatus {
    let count = |status: ExecutionStatus| records.iter().filter(|r| r.status == status).count();
    let total = records.len();
    let queued = count(ExecutionStatus::Queued);
    let finished = count(ExecutionStatus::Finished);
    let failed = count(ExecutionStatus::Failed);

    let status = if total == queued {
        ExploreTaskStatus::Queued
    } else if count(ExecutionStatus::Canceled) > 0 {
        ExploreTaskStatus::Canceled
    } else if finished == total {
        ExploreTaskStatus::Finished
    } else if failed > 0 && failed + finished == total {
        ExploreTaskStatus::Failed
    } else {
        ExploreTaskStatus::Running
    };

    let finished_at = match status {
        ExploreTaskStatus::Finished | ExploreTaskStatus::Failed => {
            records.iter().map(|r| r.updated_at).max()
        }
        _ => None,
    };

    let remark = (failed > 0).then(|| {
        TaskRemark::from_failures(
            records
                .iter()
                .filter(|r| r.status == ExecutionStatus::Failed)
                .map(|r| {
                    (
                        FailureCategory::from_reason(r.reason.as_deref()).as_str(),
                        r.view_id.clone(),
                    )
                }),
        )
    });

    AggregatedStatus {
        status,
        finished_at,
        remark,
    }
}

/// 查询执行引擎并把汇总结果写回数据探查任务
pub struct TaskStatusRefresher {
    engine: Arc<dyn ExecutionEngine>,
    task_repo: Arc<dyn ExploreTaskRepository>,
    metadata_repo: Arc<dyn MetadataRepository>,
}

impl TaskStatusRefresher {
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        task_repo: Arc<dyn ExploreTaskRepository>,
        metadata_repo: Arc<dyn MetadataRepository>,
    ) -> Self {
        Self {
            engine,
            task_repo,
            metadata_repo,
        }
    }

    pub async fn refresh(&self, task: &mut ExploreTask) -> ExploreResult<()> {
        if !task.kind.uses_execution_engine() || !task.is_active() {
            return Ok(());
        }

        let records = self.records_for(task).await?;
        let mut aggregated = aggregate(&records);
        let previous = task.status;

        // 下发阶段失败的视图没有执行记录，任务结束时并入备注并判为失败
        if let Some(dispatch_failures) = task.remark.as_ref().filter(|r| r.total_count > 0) {
            if aggregated.status.is_terminal() && aggregated.status != ExploreTaskStatus::Canceled {
                let mut remark = aggregated.remark.take().unwrap_or_default();
                for bucket in &dispatch_failures.details {
                    for view_id in &bucket.view_ids {
                        remark.push(bucket.reason.as_str(), view_id.as_str());
                    }
                }
                aggregated.status = ExploreTaskStatus::Failed;
                aggregated.remark = Some(remark);
            }
        }

        // 任务侧已推进（例如下发阶段记录了失败视图）时，引擎侧的排队状态不回退任务
        if aggregated.status == previous
            || (aggregated.status == ExploreTaskStatus::Queued
                && previous == ExploreTaskStatus::Running)
        {
            return Ok(());
        }

        match aggregated.status {
            ExploreTaskStatus::Running | ExploreTaskStatus::Canceled => {
                task.transition_to(aggregated.status)?;
            }
            ExploreTaskStatus::Finished | ExploreTaskStatus::Failed => {
                task.finish_with(aggregated.status, aggregated.finished_at, aggregated.remark)?;
            }
            ExploreTaskStatus::Queued => return Ok(()),
        }
        if !self.task_repo.update_if_status(task, previous).await? {
            // 并发写入（例如取消）优先，返回存储中的最新状态
            if let Some(current) = self.task_repo.get_by_id(&task.id).await? {
                *task = current;
            }
            return Ok(());
        }

        StructuredLogger::log_status_change(&task.id, previous, task.status);
        if task.status.is_terminal() {
            StructuredLogger::log_task_completed(&task.id, task.status, task.remark.as_ref());
        }
        Ok(())
    }

    async fn records_for(&self, task: &ExploreTask) -> ExploreResult<Vec<ExecutionRecord>> {
        match &task.target {
            ExploreTarget::View(_) => {
                self.engine
                    .get_status(&task.credential, &ExecutionFilter::Task(task.id.clone()))
                    .await
            }
            ExploreTarget::Datasource(datasource_id) => {
                let datasource = self
                    .metadata_repo
                    .get_datasource(datasource_id)
                    .await?
                    .ok_or_else(|| ExploreError::datasource_not_found(datasource_id))?;
                let filter = ExecutionFilter::Location {
                    catalog: datasource.catalog_name,
                    schema: datasource.schema_name,
                };
                let mut records = self.engine.get_status(&task.credential, &filter).await?;
                records.retain(|r| r.task_id == task.id);
                debug!("任务 {} 在数据源 {} 上有 {} 条执行记录", task.id, datasource_id, records.len());
                Ok(records)
            }
        }
    }
}
