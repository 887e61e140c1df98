use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ExploreTaskStatus;

/// 数据源级任务在一次调度周期内按视图派生的子任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub parent_task_id: String,
    pub view_id: String,
    pub status: ExploreTaskStatus,
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SubTask {
    pub fn new(parent_task_id: impl Into<String>, view_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_task_id: parent_task_id.into(),
            view_id: view_id.into(),
            status: ExploreTaskStatus::Queued,
            remark: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.status == ExploreTaskStatus::Canceled
    }

    pub fn mark(&mut self, status: ExploreTaskStatus, remark: Option<String>) {
        self.status = status;
        self.remark = remark;
        if status.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }
}
