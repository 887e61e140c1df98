//! Test data builders for creating test entities
//!
//! This module provides builder patterns for creating test data with
//! sensible defaults and easy customization.

use chrono::{Duration, Utc};
use explore_core::{
    Credential, DatasourceMeta, Dimension, DimensionType, ExploreKind, ExploreTarget, ExploreTask,
    ExploreTaskStatus, FieldMeta, GradeRule, RuleConfig, RuleLevel, ViewKind, ViewMeta,
};

pub fn test_credential() -> Credential {
    Credential::new("u-test", "tester", "test-token")
}

/// Builder for creating test ExploreTask entities
pub struct TaskBuilder {
    task: ExploreTask,
}

impl TaskBuilder {
    pub fn new(kind: ExploreKind) -> Self {
        Self {
            task: ExploreTask::new(
                kind,
                ExploreTarget::View("v-1".to_string()),
                test_credential(),
            ),
        }
    }

    pub fn classification() -> Self {
        Self::new(ExploreKind::ClassificationExplore)
    }

    pub fn data() -> Self {
        Self::new(ExploreKind::DataExplore)
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.task.id = id.to_string();
        self
    }

    pub fn on_view(mut self, view_id: &str) -> Self {
        self.task.target = ExploreTarget::View(view_id.to_string());
        self
    }

    pub fn on_datasource(mut self, datasource_id: &str) -> Self {
        self.task.target = ExploreTarget::Datasource(datasource_id.to_string());
        self
    }

    pub fn with_status(mut self, status: ExploreTaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_subjects(mut self, subject_ids: &[&str]) -> Self {
        self.task.subject_ids = subject_ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.task.credential = credential;
        self
    }

    /// 创建时间前移，便于构造“最早创建”的顺序
    pub fn created_secs_ago(mut self, secs: i64) -> Self {
        self.task.created_at = Utc::now() - Duration::seconds(secs);
        self.task.updated_at = self.task.created_at;
        self
    }

    pub fn build(self) -> ExploreTask {
        self.task
    }
}

pub struct ViewBuilder {
    view: ViewMeta,
}

impl ViewBuilder {
    pub fn new(id: &str, technical_name: &str) -> Self {
        Self {
            view: ViewMeta {
                id: id.to_string(),
                technical_name: technical_name.to_string(),
                business_name: technical_name.to_string(),
                description: String::new(),
                kind: ViewKind::Datasource,
                datasource_id: None,
            },
        }
    }

    pub fn in_datasource(mut self, datasource_id: &str) -> Self {
        self.view.kind = ViewKind::Datasource;
        self.view.datasource_id = Some(datasource_id.to_string());
        self
    }

    pub fn with_kind(mut self, kind: ViewKind) -> Self {
        self.view.kind = kind;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.view.description = description.to_string();
        self
    }

    pub fn build(self) -> ViewMeta {
        self.view
    }
}

pub fn datasource(id: &str, catalog: &str, schema: &str) -> DatasourceMeta {
    DatasourceMeta {
        id: id.to_string(),
        name: id.to_string(),
        catalog_name: catalog.to_string(),
        schema_name: schema.to_string(),
    }
}

pub struct FieldBuilder {
    field: FieldMeta,
}

impl FieldBuilder {
    pub fn new(id: &str, view_id: &str, technical_name: &str) -> Self {
        Self {
            field: FieldMeta {
                id: id.to_string(),
                view_id: view_id.to_string(),
                technical_name: technical_name.to_string(),
                business_name: technical_name.to_string(),
                data_type: "varchar".to_string(),
                length: Some(255),
                precision: None,
                description: String::new(),
                standard_id: None,
                code_table_id: None,
                subject_id: None,
                grade_label_id: None,
            },
        }
    }

    pub fn with_type(mut self, data_type: &str, length: Option<i32>, precision: Option<i32>) -> Self {
        self.field.data_type = data_type.to_string();
        self.field.length = length;
        self.field.precision = precision;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.field.description = description.to_string();
        self
    }

    pub fn with_standard(mut self, standard_id: &str) -> Self {
        self.field.standard_id = Some(standard_id.to_string());
        self
    }

    pub fn with_code_table(mut self, code_table_id: &str) -> Self {
        self.field.code_table_id = Some(code_table_id.to_string());
        self
    }

    pub fn with_subject(mut self, subject_id: &str) -> Self {
        self.field.subject_id = Some(subject_id.to_string());
        self
    }

    pub fn build(self) -> FieldMeta {
        self.field
    }
}

/// Builder for RuleConfig; the id is fixed so resolution order is predictable
pub struct RuleBuilder {
    rule: RuleConfig,
}

impl RuleBuilder {
    pub fn new(
        id: &str,
        level: RuleLevel,
        dimension: Dimension,
        dimension_type: DimensionType,
    ) -> Self {
        let mut rule = RuleConfig::new(id, level, dimension, dimension_type);
        rule.id = id.to_string();
        Self { rule }
    }

    pub fn field_rule(id: &str, view_id: &str, field_id: &str, dimension_type: DimensionType) -> Self {
        let dimension = match dimension_type {
            DimensionType::Null => Dimension::Completeness,
            DimensionType::Repeat => Dimension::Uniqueness,
            DimensionType::Statistics => Dimension::Statistics,
            DimensionType::Custom => Dimension::Accuracy,
            _ => Dimension::Standardization,
        };
        Self::new(id, RuleLevel::Field, dimension, dimension_type)
            .on_view(view_id)
            .on_field(field_id)
    }

    pub fn metadata_rule(id: &str, view_id: &str, dimension_type: DimensionType) -> Self {
        let dimension = match dimension_type {
            DimensionType::DataStandard => Dimension::Standardization,
            _ => Dimension::Completeness,
        };
        Self::new(id, RuleLevel::Metadata, dimension, dimension_type).on_view(view_id)
    }

    pub fn on_view(mut self, view_id: &str) -> Self {
        self.rule.view_id = Some(view_id.to_string());
        self
    }

    pub fn on_field(mut self, field_id: &str) -> Self {
        self.rule.field_id = Some(field_id.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.rule.name = name.to_string();
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.rule.config_body = Some(body);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.rule.enabled = false;
        self
    }

    pub fn draft(mut self) -> Self {
        self.rule.draft = true;
        self
    }

    pub fn build(self) -> RuleConfig {
        self.rule
    }
}

pub fn grade_rule(
    id: &str,
    subject_id: &str,
    label_id: &str,
    sort_weight: i32,
    expression: serde_json::Value,
) -> GradeRule {
    GradeRule {
        id: id.to_string(),
        name: id.to_string(),
        subject_id: subject_id.to_string(),
        label_id: label_id.to_string(),
        label_sort_weight: sort_weight,
        logical_expression: expression.to_string(),
        enabled: true,
    }
}
