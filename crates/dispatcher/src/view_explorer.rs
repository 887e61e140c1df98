//! 单视图的分类（分级）探查
//!
//! 加载视图与字段，调用分类服务，回写字段主题；分类分级任务再对视图的
//! 主题集合运行分级规则并回写标签。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use explore_core::{
    ClassificationService, ExploreError, ExploreTask, FieldMeta, FieldSubjectMatch,
    GradeRuleRepository, MetadataRepository, ViewMeta,
};

use crate::grading::grade_fields;

/// 视图失败的归类，决定父任务备注中的分桶
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureBucket {
    /// 加载视图或字段信息失败
    Load,
    /// 分类/分级本身失败
    Explore,
    Timeout,
}

impl FailureBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureBucket::Load => "load",
            FailureBucket::Explore => "explore",
            FailureBucket::Timeout => "timeout",
        }
    }

    /// 写入子任务的固定备注
    pub fn remark(&self) -> &'static str {
        match self {
            FailureBucket::Load => "获取探查信息失败",
            FailureBucket::Explore => "探查执行失败",
            FailureBucket::Timeout => "探查超时",
        }
    }
}

#[derive(Debug)]
pub struct ViewFailure {
    pub bucket: FailureBucket,
    pub error: ExploreError,
}

impl ViewFailure {
    fn load(error: ExploreError) -> Self {
        Self {
            bucket: FailureBucket::Load,
            error,
        }
    }

    fn explore(error: ExploreError) -> Self {
        Self {
            bucket: FailureBucket::Explore,
            error,
        }
    }
}

impl fmt::Display for ViewFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.bucket.remark(), self.error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewOutcome {
    pub view_id: String,
    pub classified_fields: usize,
    pub graded_fields: usize,
}

pub struct ViewExplorer {
    metadata_repo: Arc<dyn MetadataRepository>,
    classification: Arc<dyn ClassificationService>,
    grade_rules: Arc<dyn GradeRuleRepository>,
}

impl ViewExplorer {
    pub fn new(
        metadata_repo: Arc<dyn MetadataRepository>,
        classification: Arc<dyn ClassificationService>,
        grade_rules: Arc<dyn GradeRuleRepository>,
    ) -> Self {
        Self {
            metadata_repo,
            classification,
            grade_rules,
        }
    }

    pub async fn explore(&self, task: &ExploreTask, view_id: &str) -> Result<ViewOutcome, ViewFailure> {
        let (view, mut fields) = self.load(view_id).await.map_err(ViewFailure::load)?;

        let matches = self
            .classification
            .classify(&task.credential, &view, &fields)
            .await
            .map_err(ViewFailure::explore)?;

        let subjects = best_subjects(matches, &task.subject_ids);
        for field in fields.iter_mut() {
            if let Some(subject_id) = subjects.get(&field.id) {
                self.metadata_repo
                    .update_field_subject(&field.id, Some(subject_id.clone()))
                    .await
                    .map_err(ViewFailure::explore)?;
                field.subject_id = Some(subject_id.clone());
            }
        }

        let graded_fields = if task.kind.grading_enabled() {
            self.grade(&fields).await.map_err(ViewFailure::explore)?
        } else {
            0
        };

        debug!(
            "视图 {} 分类完成: {} 个字段命中主题, {} 个字段分级",
            view_id,
            subjects.len(),
            graded_fields
        );
        Ok(ViewOutcome {
            view_id: view_id.to_string(),
            classified_fields: subjects.len(),
            graded_fields,
        })
    }

    async fn load(&self, view_id: &str) -> Result<(ViewMeta, Vec<FieldMeta>), ExploreError> {
        let view = self
            .metadata_repo
            .get_view(view_id)
            .await?
            .ok_or_else(|| ExploreError::view_not_found(view_id))?;
        let fields = self.metadata_repo.list_fields(view_id).await?;
        Ok((view, fields))
    }

    /// 命中规则的字段写入标签，其余字段清空旧标签
    async fn grade(&self, fields: &[FieldMeta]) -> Result<usize, ExploreError> {
        let rules = self.grade_rules.list_enabled().await?;
        let assignments: HashMap<String, String> = grade_fields(fields, &rules)
            .into_iter()
            .map(|a| (a.field_id, a.label_id))
            .collect();

        for field in fields {
            let label = assignments.get(&field.id).cloned();
            if label.is_none() && field.grade_label_id.is_none() {
                continue;
            }
            self.metadata_repo.update_field_grade(&field.id, label).await?;
        }
        Ok(assignments.len())
    }
}

/// 每个字段取得分最高的主题；任务指定了主题范围时只保留范围内的
fn best_subjects(matches: Vec<FieldSubjectMatch>, allowed: &[String]) -> HashMap<String, String> {
    let mut best: HashMap<String, FieldSubjectMatch> = HashMap::new();
    for m in matches {
        if !allowed.is_empty() && !allowed.contains(&m.subject_id) {
            continue;
        }
        match best.get(&m.field_id) {
            Some(current) if current.score >= m.score => {}
            _ => {
                best.insert(m.field_id.clone(), m);
            }
        }
    }
    best.into_iter()
        .map(|(field_id, m)| (field_id, m.subject_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use explore_core::ExploreKind;
    use explore_testing_utils::{grade_rule, FieldBuilder, TaskBuilder, TestWorld};
    use serde_json::json;

    fn explorer(world: &TestWorld) -> ViewExplorer {
        ViewExplorer::new(
            world.metadata.clone(),
            world.classifier.clone(),
            world.grade_rules.clone(),
        )
    }

    #[tokio::test]
    async fn test_subjects_written_back() {
        let world = TestWorld::new();
        world.seed_datasource("ds-1", "hive", "ods").await;
        world.seed_views("ds-1", &["v1"]).await;
        world.classifier.assign("v1-f1", "s-name");

        let task = TaskBuilder::classification().on_view("v1").build();
        let outcome = explorer(&world).explore(&task, "v1").await.unwrap();
        assert_eq!(outcome.classified_fields, 1);

        let field = world.metadata.get_field("v1-f1").await.unwrap();
        assert_eq!(field.subject_id.as_deref(), Some("s-name"));
        assert_eq!(world.classifier.callers(), vec!["u-test"]);
    }

    #[tokio::test]
    async fn test_subject_scope_filters_matches() {
        let world = TestWorld::new();
        world.seed_datasource("ds-1", "hive", "ods").await;
        world.seed_views("ds-1", &["v1"]).await;
        world.classifier.assign("v1-f1", "s-name");

        let task = TaskBuilder::classification()
            .on_view("v1")
            .with_subjects(&["s-phone"])
            .build();
        let outcome = explorer(&world).explore(&task, "v1").await.unwrap();
        assert_eq!(outcome.classified_fields, 0);
        assert!(world.metadata.get_field("v1-f1").await.unwrap().subject_id.is_none());
    }

    #[tokio::test]
    async fn test_failure_buckets() {
        let world = TestWorld::new();
        world.seed_datasource("ds-1", "hive", "ods").await;
        world.seed_views("ds-1", &["v1"]).await;
        world.classifier.fail_on("v1");
        let task = TaskBuilder::classification().on_view("v1").build();

        let missing = explorer(&world).explore(&task, "nope").await.unwrap_err();
        assert_eq!(missing.bucket, FailureBucket::Load);
        assert!(missing.error.is_not_found());

        let failed = explorer(&world).explore(&task, "v1").await.unwrap_err();
        assert_eq!(failed.bucket, FailureBucket::Explore);
    }

    #[tokio::test]
    async fn test_grade_kind_writes_labels() {
        let world = TestWorld::new();
        world.seed_datasource("ds-1", "hive", "ods").await;
        world.seed_views("ds-1", &["v1"]).await;
        world
            .seed_field(
                FieldBuilder::new("v1-f2", "v1", "remark")
                    .with_subject("s-old")
                    .build(),
            )
            .await;
        world
            .metadata
            .update_field_grade("v1-f2", Some("stale".to_string()))
            .await
            .unwrap();
        world.classifier.assign("v1-f1", "s-name");
        world
            .grade_rules
            .insert(grade_rule(
                "g1",
                "s-name",
                "personal",
                2,
                json!({"operate": "or", "conditions": [
                    {"operate": "or", "subject_ids": ["s-name"]}
                ]}),
            ))
            .await;

        let task = TaskBuilder::new(ExploreKind::ClassificationGradeExplore)
            .on_view("v1")
            .build();
        let outcome = explorer(&world).explore(&task, "v1").await.unwrap();
        assert_eq!(outcome.graded_fields, 1);

        let named = world.metadata.get_field("v1-f1").await.unwrap();
        assert_eq!(named.grade_label_id.as_deref(), Some("personal"));
        let other = world.metadata.get_field("v1-f2").await.unwrap();
        assert!(other.grade_label_id.is_none());
    }

    #[test]
    fn test_best_subject_wins() {
        let matches = vec![
            FieldSubjectMatch {
                field_id: "f1".to_string(),
                subject_id: "a".to_string(),
                score: 0.4,
            },
            FieldSubjectMatch {
                field_id: "f1".to_string(),
                subject_id: "b".to_string(),
                score: 0.8,
            },
            FieldSubjectMatch {
                field_id: "f1".to_string(),
                subject_id: "c".to_string(),
                score: 0.8,
            },
        ];
        let best = best_subjects(matches, &[]);
        assert_eq!(best.get("f1").map(String::as_str), Some("b"));
    }
}
