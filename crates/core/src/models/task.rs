use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{JobRef, TaskRemark};
use crate::{ExploreError, ExploreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExploreKind {
    #[serde(rename = "DATA_EXPLORE")]
    DataExplore,
    #[serde(rename = "TIMESTAMP_EXPLORE")]
    TimestampExplore,
    #[serde(rename = "CLASSIFICATION_EXPLORE")]
    ClassificationExplore,
    #[serde(rename = "CLASSIFICATION_GRADE_EXPLORE")]
    ClassificationGradeExplore,
}

impl ExploreKind {
    /// 由调度器持锁执行的类型
    pub const SCHEDULED: [ExploreKind; 2] = [
        ExploreKind::ClassificationExplore,
        ExploreKind::ClassificationGradeExplore,
    ];

    /// 是否通过执行引擎作业完成（数据探查、时间戳探查）
    pub fn uses_execution_engine(&self) -> bool {
        matches!(self, ExploreKind::DataExplore | ExploreKind::TimestampExplore)
    }

    pub fn is_classification(&self) -> bool {
        matches!(
            self,
            ExploreKind::ClassificationExplore | ExploreKind::ClassificationGradeExplore
        )
    }

    pub fn grading_enabled(&self) -> bool {
        matches!(self, ExploreKind::ClassificationGradeExplore)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExploreKind::DataExplore => "data_explore",
            ExploreKind::TimestampExplore => "timestamp_explore",
            ExploreKind::ClassificationExplore => "classification_explore",
            ExploreKind::ClassificationGradeExplore => "classification_grade_explore",
        }
    }
}

impl fmt::Display for ExploreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 探查目标：单个视图或数据源下的全部视图
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ExploreTarget {
    View(String),
    Datasource(String),
}

impl ExploreTarget {
    pub fn id(&self) -> &str {
        match self {
            ExploreTarget::View(id) | ExploreTarget::Datasource(id) => id,
        }
    }

    pub fn is_datasource(&self) -> bool {
        matches!(self, ExploreTarget::Datasource(_))
    }
}

impl fmt::Display for ExploreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExploreTarget::View(id) => write!(f, "view:{id}"),
            ExploreTarget::Datasource(id) => write!(f, "datasource:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExploreTaskStatus {
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "FINISHED")]
    Finished,
    #[serde(rename = "CANCELED")]
    Canceled,
    #[serde(rename = "FAILED")]
    Failed,
}

impl ExploreTaskStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, ExploreTaskStatus::Queued | ExploreTaskStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// 合法的状态流转：Queued→Running→{Finished,Failed}，{Queued,Running}→Canceled
    pub fn can_transition_to(&self, next: ExploreTaskStatus) -> bool {
        use ExploreTaskStatus::*;
        matches!(
            (*self, next),
            (Queued, Running)
                | (Running, Finished)
                | (Running, Failed)
                | (Queued, Canceled)
                | (Running, Canceled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExploreTaskStatus::Queued => "QUEUED",
            ExploreTaskStatus::Running => "RUNNING",
            ExploreTaskStatus::Finished => "FINISHED",
            ExploreTaskStatus::Canceled => "CANCELED",
            ExploreTaskStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ExploreTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 创建任务时捕获的调用者凭证，随任务持久化并显式传递给下游调用
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub user_id: String,
    pub user_name: String,
    #[serde(default)]
    pub token: String,
}

impl Credential {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            token: token.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploreTask {
    pub id: String,
    pub kind: ExploreKind,
    pub target: ExploreTarget,
    pub status: ExploreTaskStatus,
    pub config: serde_json::Value,
    pub credential: Credential,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub remark: Option<TaskRemark>,
    pub subject_ids: Vec<String>,
    pub work_order_id: Option<String>,
    pub external_job: Option<JobRef>,
}

impl ExploreTask {
    pub fn new(kind: ExploreKind, target: ExploreTarget, credential: Credential) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            target,
            status: ExploreTaskStatus::Queued,
            config: serde_json::Value::Null,
            credential,
            created_at: now,
            updated_at: now,
            finished_at: None,
            remark: None,
            subject_ids: Vec::new(),
            work_order_id: None,
            external_job: None,
        }
    }

    pub fn created_by(&self) -> &str {
        &self.credential.user_id
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// 按状态机推进任务状态；同状态为空操作，离开终态视为非法
    pub fn transition_to(&mut self, next: ExploreTaskStatus) -> ExploreResult<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(ExploreError::validation(format!(
                "任务 {} 的状态转换无效: {} -> {}",
                self.id, self.status, next
            )));
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() && self.finished_at.is_none() {
            self.finished_at = Some(now);
        }
        Ok(())
    }

    /// 推进到终态，必要时先经过 Running（执行引擎侧可能直接报告终态）
    pub fn finish_with(
        &mut self,
        next: ExploreTaskStatus,
        finished_at: Option<DateTime<Utc>>,
        remark: Option<TaskRemark>,
    ) -> ExploreResult<()> {
        if self.status == ExploreTaskStatus::Queued
            && matches!(next, ExploreTaskStatus::Finished | ExploreTaskStatus::Failed)
        {
            self.transition_to(ExploreTaskStatus::Running)?;
        }
        self.transition_to(next)?;
        if let Some(at) = finished_at {
            self.finished_at = Some(at);
        }
        self.remark = remark;
        Ok(())
    }
}

/// 任务列表查询条件
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub kind: Option<ExploreKind>,
    pub status: Option<ExploreTaskStatus>,
    pub target: Option<ExploreTarget>,
    pub work_order_id: Option<String>,
    pub created_by: Option<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &ExploreTask) -> bool {
        self.kind.map_or(true, |k| task.kind == k)
            && self.status.map_or(true, |s| task.status == s)
            && self.target.as_ref().map_or(true, |t| &task.target == t)
            && self
                .work_order_id
                .as_ref()
                .map_or(true, |w| task.work_order_id.as_ref() == Some(w))
            && self
                .created_by
                .as_ref()
                .map_or(true, |u| task.created_by() == u)
    }
}

/// 分页参数，offset 从 0 开始
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self { offset: 0, limit: 20 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paged<T> {
    pub entries: Vec<T>,
    pub total_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued_task() -> ExploreTask {
        ExploreTask::new(
            ExploreKind::DataExplore,
            ExploreTarget::View("v-1".to_string()),
            Credential::new("u-1", "alice", "token"),
        )
    }

    #[test]
    fn test_valid_transitions() {
        let mut task = queued_task();
        task.transition_to(ExploreTaskStatus::Running).unwrap();
        task.transition_to(ExploreTaskStatus::Finished).unwrap();
        assert_eq!(task.status, ExploreTaskStatus::Finished);
        assert!(task.finished_at.is_some());

        let mut task = queued_task();
        task.transition_to(ExploreTaskStatus::Canceled).unwrap();
        assert_eq!(task.status, ExploreTaskStatus::Canceled);
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            ExploreTaskStatus::Finished,
            ExploreTaskStatus::Failed,
            ExploreTaskStatus::Canceled,
        ] {
            for next in [
                ExploreTaskStatus::Queued,
                ExploreTaskStatus::Running,
                ExploreTaskStatus::Finished,
                ExploreTaskStatus::Failed,
                ExploreTaskStatus::Canceled,
            ] {
                if next != terminal {
                    assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
                }
            }
        }
    }

    #[test]
    fn test_queued_cannot_skip_running() {
        let mut task = queued_task();
        assert!(task.transition_to(ExploreTaskStatus::Finished).is_err());
        assert_eq!(task.status, ExploreTaskStatus::Queued);

        task.finish_with(ExploreTaskStatus::Finished, None, None).unwrap();
        assert_eq!(task.status, ExploreTaskStatus::Finished);
    }

    #[test]
    fn test_target_serialization() {
        let json = serde_json::to_string(&ExploreTarget::Datasource("ds-1".to_string())).unwrap();
        assert_eq!(json, r#"{"type":"datasource","id":"ds-1"}"#);
    }

    #[test]
    fn test_filter_matches() {
        let mut task = queued_task();
        task.work_order_id = Some("wo-1".to_string());

        let filter = TaskFilter {
            kind: Some(ExploreKind::DataExplore),
            work_order_id: Some("wo-1".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&task));

        let filter = TaskFilter {
            status: Some(ExploreTaskStatus::Running),
            ..Default::default()
        };
        assert!(!filter.matches(&task));
    }
}
