use serde::{Deserialize, Serialize};

/// 分级规则：字段分类主题命中 `subject_id` 且视图主题集合满足逻辑表达式时打上标签
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradeRule {
    pub id: String,
    pub name: String,
    pub subject_id: String,
    pub label_id: String,
    pub label_sort_weight: i32,
    pub logical_expression: String,
    pub enabled: bool,
}

/// 字段最终获得的分级标签
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GradeAssignment {
    pub field_id: String,
    pub label_id: String,
    pub sort_weight: i32,
    pub rule_id: String,
}
