//! 分级规则求值
//!
//! 逻辑表达式形如：
//!
//! ```json
//! {"operate": "or", "conditions": [
//!     {"operate": "and", "subject_ids": ["s1", "s2"]},
//!     {"operate": "or", "subject_ids": ["s3"]}
//! ]}
//! ```
//!
//! 子句判断视图的主题集合是否包含（全部/任一）给定主题，外层再组合子句结果。

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use tracing::debug;

use explore_core::{FieldMeta, GradeAssignment, GradeRule};

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum Operator {
    And,
    Or,
}

impl Operator {
    fn combine<I: IntoIterator<Item = bool>>(self, values: I) -> bool {
        let mut values = values.into_iter();
        match self {
            Operator::And => values.all(|v| v),
            Operator::Or => values.any(|v| v),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Expression {
    operate: Operator,
    conditions: Vec<Clause>,
}

#[derive(Debug, Deserialize)]
struct Clause {
    operate: Operator,
    subject_ids: Vec<String>,
}

/// 主题集合是否满足表达式；格式错误、未知运算符、空条件或空子句都视为不满足
pub fn evaluate(expression: &str, subjects: &HashSet<String>) -> bool {
    let parsed: Expression = match serde_json::from_str(expression) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("分级表达式无法解析: {}", e);
            return false;
        }
    };
    if parsed.conditions.is_empty() || parsed.conditions.iter().any(|c| c.subject_ids.is_empty()) {
        return false;
    }

    parsed.operate.combine(parsed.conditions.iter().map(|clause| {
        clause
            .operate
            .combine(clause.subject_ids.iter().map(|s| subjects.contains(s)))
    }))
}

/// 为视图字段计算分级标签
///
/// 视图的主题集合取自全部字段当前的分类主题。同一字段命中多条规则时，
/// 排序权重更高的标签覆盖更低的，权重相同保留先命中的（规则按ID排序）。
pub fn grade_fields(fields: &[FieldMeta], rules: &[GradeRule]) -> Vec<GradeAssignment> {
    let subjects: HashSet<String> = fields.iter().filter_map(|f| f.subject_id.clone()).collect();

    let mut rules: Vec<&GradeRule> = rules.iter().filter(|r| r.enabled).collect();
    rules.sort_by(|a, b| a.id.cmp(&b.id));

    let satisfied: Vec<&GradeRule> = rules
        .into_iter()
        .filter(|rule| evaluate(&rule.logical_expression, &subjects))
        .collect();

    let mut assignments: HashMap<&str, GradeAssignment> = HashMap::new();
    for field in fields {
        let Some(subject_id) = field.subject_id.as_deref() else {
            continue;
        };
        for rule in satisfied.iter().filter(|r| r.subject_id == subject_id) {
            let replace = assignments
                .get(field.id.as_str())
                .map_or(true, |current| rule.label_sort_weight > current.sort_weight);
            if replace {
                assignments.insert(
                    field.id.as_str(),
                    GradeAssignment {
                        field_id: field.id.clone(),
                        label_id: rule.label_id.clone(),
                        sort_weight: rule.label_sort_weight,
                        rule_id: rule.id.clone(),
                    },
                );
            }
        }
    }

    fields
        .iter()
        .filter_map(|f| assignments.remove(f.id.as_str()))
        .collect()
}
