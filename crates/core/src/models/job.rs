use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Dimension, DimensionType, ExploreKind};

/// 执行引擎作业引用
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobRef {
    pub job_id: String,
    pub version: i64,
}

/// 视图在查询引擎中的物理位置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableLocation {
    pub catalog: String,
    pub schema: String,
    pub table: String,
}

/// 面向执行引擎的声明式作业描述
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSpec {
    pub task_id: String,
    pub kind: ExploreKind,
    pub view_id: String,
    pub location: TableLocation,
    pub metadata_rules: Vec<ResolvedRule>,
    pub fields: Vec<FieldJobEntry>,
    pub row_rules: Vec<ResolvedRule>,
    pub view_rules: Vec<ResolvedRule>,
    pub timestamp_fields: Vec<String>,
}

impl JobSpec {
    pub fn rule_count(&self) -> usize {
        self.metadata_rules.len()
            + self.row_rules.len()
            + self.view_rules.len()
            + self.fields.iter().map(|f| f.rules.len()).sum::<usize>()
    }

    pub fn field(&self, field_name: &str) -> Option<&FieldJobEntry> {
        self.fields.iter().find(|f| f.field_name == field_name)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldJobEntry {
    pub field_id: String,
    pub field_name: String,
    pub field_type: String,
    pub rules: Vec<ResolvedRule>,
}

impl FieldJobEntry {
    pub fn rule(&self, dimension_type: DimensionType) -> Option<&ResolvedRule> {
        self.rules.iter().find(|r| r.dimension_type == dimension_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedRule {
    pub rule_id: String,
    pub rule_name: String,
    pub dimension: Dimension,
    pub dimension_type: DimensionType,
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
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

/// 执行引擎返回的单视图执行记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
    pub task_id: String,
    pub view_id: String,
    pub status: ExecutionStatus,
    pub reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// 执行状态查询条件：按任务或按 (catalog, schema)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionFilter {
    Task(String),
    Location { catalog: String, schema: String },
}
