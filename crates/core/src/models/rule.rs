//! 探查规则模型
//!
//! 规则按作用层级（元数据/字段/行/视图）划分，`dimension` 为质量维度，
//! `dimension_type` 细化到具体检查方式。配置体的结构由 `dimension_type` 决定。

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::{ExploreError, ExploreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RuleLevel {
    Metadata,
    Field,
    Row,
    View,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Completeness,
    Standardization,
    Uniqueness,
    Accuracy,
    Consistency,
    Timeliness,
    Statistics,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DimensionType {
    TableDescription,
    FieldDescription,
    DataStandard,
    Null,
    Dict,
    Format,
    Repeat,
    Statistics,
    RowNull,
    RowRepeat,
    UpdatePeriod,
    Custom,
}

impl DimensionType {
    /// 校验 (层级, 维度, 维度类型) 组合是否合法
    pub fn allowed(level: RuleLevel, dimension: Dimension, dimension_type: DimensionType) -> bool {
        use Dimension as D;
        use DimensionType as T;
        use RuleLevel as L;

        match (level, dimension_type) {
            (L::Metadata, T::TableDescription | T::FieldDescription) => dimension == D::Completeness,
            (L::Metadata, T::DataStandard) => dimension == D::Standardization,
            (L::Field, T::Null) => dimension == D::Completeness,
            (L::Field, T::Dict | T::Format) => dimension == D::Standardization,
            (L::Field, T::Repeat) => dimension == D::Uniqueness,
            (L::Field, T::Statistics) => dimension == D::Statistics,
            (L::Row, T::RowNull) => dimension == D::Completeness,
            (L::Row, T::RowRepeat) => dimension == D::Uniqueness,
            (L::View, T::UpdatePeriod) => dimension == D::Timeliness,
            (L::Field | L::Row | L::View, T::Custom) => {
                matches!(dimension, D::Accuracy | D::Consistency)
            }
            _ => false,
        }
    }

    /// 必须携带配置体的类型
    pub fn requires_body(&self) -> bool {
        matches!(
            self,
            DimensionType::RowNull
                | DimensionType::RowRepeat
                | DimensionType::UpdatePeriod
                | DimensionType::Custom
                | DimensionType::Statistics
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub level: RuleLevel,
    pub dimension: Dimension,
    pub dimension_type: DimensionType,
    pub view_id: Option<String>,
    pub field_id: Option<String>,
    pub config_body: Option<serde_json::Value>,
    pub enabled: bool,
    #[serde(default)]
    pub draft: bool,
    pub template_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RuleConfig {
    pub fn new(
        name: impl Into<String>,
        level: RuleLevel,
        dimension: Dimension,
        dimension_type: DimensionType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            level,
            dimension,
            dimension_type,
            view_id: None,
            field_id: None,
            config_body: None,
            enabled: true,
            draft: false,
            template_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 由模板规则派生出绑定到视图/字段的规则
    pub fn from_template(
        template: &TemplateRule,
        view_id: impl Into<String>,
        field_id: Option<String>,
    ) -> Self {
        let mut rule = Self::new(
            template.name.clone(),
            template.level,
            template.dimension,
            template.dimension_type,
        );
        rule.description = template.description.clone();
        rule.view_id = Some(view_id.into());
        rule.field_id = field_id;
        rule.config_body = template.config_body.clone();
        rule.enabled = template.enabled;
        rule.template_id = Some(template.id.clone());
        rule
    }

    pub fn is_effective(&self) -> bool {
        self.enabled && !self.draft
    }

    /// 持久化前的校验：层级/维度组合、目标引用与配置体结构
    pub fn validate(&self) -> ExploreResult<()> {
        if self.name.trim().is_empty() {
            return Err(ExploreError::validation("规则名称不能为空"));
        }
        if !DimensionType::allowed(self.level, self.dimension, self.dimension_type) {
            return Err(ExploreError::validation(format!(
                "规则 {} 的层级/维度组合无效: {:?}/{:?}/{:?}",
                self.name, self.level, self.dimension, self.dimension_type
            )));
        }
        if self.view_id.as_deref().map_or(true, str::is_empty) {
            return Err(ExploreError::validation(format!(
                "规则 {} 缺少视图引用",
                self.name
            )));
        }
        match self.level {
            RuleLevel::Field if self.field_id.as_deref().map_or(true, str::is_empty) => {
                return Err(ExploreError::validation(format!(
                    "字段级规则 {} 缺少字段引用",
                    self.name
                )));
            }
            RuleLevel::Metadata | RuleLevel::Row | RuleLevel::View if self.field_id.is_some() => {
                return Err(ExploreError::validation(format!(
                    "{:?} 级规则 {} 不能绑定字段",
                    self.level, self.name
                )));
            }
            _ => {}
        }
        if self.dimension_type.requires_body() && self.config_body.is_none() {
            return Err(ExploreError::validation(format!(
                "规则 {} 缺少 {:?} 配置",
                self.name, self.dimension_type
            )));
        }
        self.validate_body()
    }

    fn validate_body(&self) -> ExploreResult<()> {
        let Some(body) = &self.config_body else {
            return Ok(());
        };
        match self.dimension_type {
            DimensionType::Null => parse_body::<NullConfig>(body).map(|_| ()),
            DimensionType::Dict => parse_body::<DictConfig>(body).map(|_| ()),
            DimensionType::Format => parse_body::<FormatConfig>(body).map(|_| ()),
            DimensionType::RowNull => {
                let config = parse_body::<RowNullConfig>(body)?;
                if config.field_ids.is_empty() {
                    return Err(ExploreError::validation("行级空值规则至少需要一个字段"));
                }
                Ok(())
            }
            DimensionType::RowRepeat => {
                let config = parse_body::<RowRepeatConfig>(body)?;
                if config.field_ids.is_empty() {
                    return Err(ExploreError::validation("行级重复规则至少需要一个字段"));
                }
                Ok(())
            }
            DimensionType::UpdatePeriod => parse_body::<UpdatePeriodConfig>(body).map(|_| ()),
            DimensionType::Custom => {
                let config = parse_body::<CustomConfig>(body)?;
                if config.sql.trim().is_empty() {
                    return Err(ExploreError::validation("自定义规则表达式不能为空"));
                }
                Ok(())
            }
            DimensionType::Statistics => {
                let config = parse_body::<StatisticsConfig>(body)?;
                if config.items.is_empty() {
                    return Err(ExploreError::validation("统计规则至少需要一个统计项"));
                }
                Ok(())
            }
            DimensionType::TableDescription
            | DimensionType::FieldDescription
            | DimensionType::DataStandard
            | DimensionType::Repeat => Ok(()),
        }
    }

    pub fn body<T: DeserializeOwned>(&self) -> ExploreResult<Option<T>> {
        self.config_body.as_ref().map(parse_body::<T>).transpose()
    }
}

fn parse_body<T: DeserializeOwned>(body: &serde_json::Value) -> ExploreResult<T> {
    serde_json::from_value(body.clone())
        .map_err(|e| ExploreError::validation(format!("规则配置格式错误: {e}")))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NullConfig {
    pub null: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DictConfig {
    pub dict_id: String,
    #[serde(default)]
    pub data: Vec<DictItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DictItem {
    pub code: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FormatConfig {
    pub code_rule_id: Option<String>,
    pub regex: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowNullConfig {
    pub field_ids: Vec<String>,
    #[serde(default)]
    pub null: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowRepeatConfig {
    pub field_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePeriod {
    Day,
    Week,
    Month,
    Quarter,
    HalfYear,
    Year,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdatePeriodConfig {
    pub update_period: UpdatePeriod,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomConfig {
    pub sql: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatisticsConfig {
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSource {
    Internal,
    Custom,
}

/// 全局模板规则
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub source: TemplateSource,
    pub level: RuleLevel,
    pub dimension: Dimension,
    pub dimension_type: DimensionType,
    pub config_body: Option<serde_json::Value>,
    pub enabled: bool,
}

/// 规则列表查询条件
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    pub view_id: Option<String>,
    pub field_id: Option<String>,
    pub level: Option<RuleLevel>,
    pub dimension: Option<Dimension>,
    pub enabled: Option<bool>,
}

impl RuleFilter {
    pub fn matches(&self, rule: &RuleConfig) -> bool {
        self.view_id
            .as_ref()
            .map_or(true, |v| rule.view_id.as_ref() == Some(v))
            && self
                .field_id
                .as_ref()
                .map_or(true, |f| rule.field_id.as_ref() == Some(f))
            && self.level.map_or(true, |l| rule.level == l)
            && self.dimension.map_or(true, |d| rule.dimension == d)
            && self.enabled.map_or(true, |e| rule.enabled == e)
    }
}
