//! 规则解析：把视图上存储的规则配置编译成执行引擎可执行的作业描述
//!
//! - 元数据级规则在本地求值，结果以 `{hits, total}` 写入规则配置
//! - 字段级规则按类型补全配置（空值默认值、编码规则正则、码表枚举），
//!   补全失败只跳过该条规则
//! - 行级、视图级规则原样透传
//!
//! 规则按ID排序、字段按技术名称排序，相同输入得到字节级一致的作业描述。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use explore_config::ResolverConfig;
use explore_core::{
    Credential, DictConfig, DimensionType, ExploreError, ExploreKind, ExploreResult, ExploreTask,
    FieldJobEntry, FieldMeta, FormatConfig, JobSpec, MetadataRepository, NullConfig,
    ResolvedRule, RuleConfig, RuleLevel, RuleRepository, StandardInfo, StandardsService,
    StructuredLogger, TableLocation, TypeFamily, ViewKind, ViewMeta,
};

pub struct RuleResolver {
    rule_repo: Arc<dyn RuleRepository>,
    metadata_repo: Arc<dyn MetadataRepository>,
    standards: Arc<dyn StandardsService>,
    config: ResolverConfig,
}

/// 单次解析内的数据标准缓存，查询失败记为 `None` 且只记录一次日志
struct StandardCache<'a> {
    standards: &'a dyn StandardsService,
    credential: &'a Credential,
    entries: HashMap<String, Option<StandardInfo>>,
}

impl<'a> StandardCache<'a> {
    fn new(standards: &'a dyn StandardsService, credential: &'a Credential) -> Self {
        Self {
            standards,
            credential,
            entries: HashMap::new(),
        }
    }

    async fn get(&mut self, view_id: &str, field: &FieldMeta) -> Option<StandardInfo> {
        let standard_id = field.standard_id.as_deref()?;
        if let Some(cached) = self.entries.get(standard_id) {
            return cached.clone();
        }
        let fetched = match self.standards.get_standard(self.credential, standard_id).await {
            Ok(standard) => Some(standard),
            Err(e) => {
                StructuredLogger::log_enrichment_skipped(view_id, &field.id, "standard", &e);
                None
            }
        };
        self.entries.insert(standard_id.to_string(), fetched.clone());
        fetched
    }
}

impl RuleResolver {
    pub fn new(
        rule_repo: Arc<dyn RuleRepository>,
        metadata_repo: Arc<dyn MetadataRepository>,
        standards: Arc<dyn StandardsService>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            rule_repo,
            metadata_repo,
            standards,
            config,
        }
    }

    pub async fn resolve(&self, task: &ExploreTask, view: &ViewMeta) -> ExploreResult<JobSpec> {
        if !task.kind.uses_execution_engine() {
            return Err(ExploreError::validation(format!(
                "{} 类型的任务不通过执行引擎运行",
                task.kind
            )));
        }

        let location = self.resolve_location(view).await?;
        let mut fields = self.metadata_repo.list_fields(&view.id).await?;
        fields.sort_by(|a, b| {
            a.technical_name
                .cmp(&b.technical_name)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut spec = JobSpec {
            task_id: task.id.clone(),
            kind: task.kind,
            view_id: view.id.clone(),
            location,
            metadata_rules: Vec::new(),
            fields: Vec::new(),
            row_rules: Vec::new(),
            view_rules: Vec::new(),
            timestamp_fields: Vec::new(),
        };

        if task.kind == ExploreKind::TimestampExplore {
            spec.timestamp_fields = fields
                .iter()
                .filter(|f| f.type_family() == TypeFamily::Temporal)
                .map(|f| f.technical_name.clone())
                .collect();
            return Ok(spec);
        }

        let mut rules: Vec<RuleConfig> = self
            .rule_repo
            .list_by_view(&view.id)
            .await?
            .into_iter()
            .filter(RuleConfig::is_effective)
            .collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));

        let fields_by_id: HashMap<&str, &FieldMeta> =
            fields.iter().map(|f| (f.id.as_str(), f)).collect();
        let mut cache = StandardCache::new(self.standards.as_ref(), &task.credential);
        let mut field_rules: BTreeMap<String, Vec<ResolvedRule>> = BTreeMap::new();

        for rule in &rules {
            match rule.level {
                RuleLevel::Metadata => {
                    if let Some(resolved) =
                        Self::evaluate_metadata(view, &fields, rule, &mut cache).await
                    {
                        spec.metadata_rules.push(resolved);
                    }
                }
                RuleLevel::Field => {
                    let Some(field) = rule
                        .field_id
                        .as_deref()
                        .and_then(|id| fields_by_id.get(id).copied())
                    else {
                        debug!("规则 {} 引用的字段不在视图 {} 中，跳过", rule.id, view.id);
                        continue;
                    };
                    if let Some(config) = self
                        .resolve_field_rule(&task.credential, view, field, rule, &mut cache)
                        .await
                    {
                        field_rules
                            .entry(field.id.clone())
                            .or_default()
                            .push(resolved_rule(rule, config));
                    }
                }
                RuleLevel::Row => spec.row_rules.push(pass_through(rule)),
                RuleLevel::View => spec.view_rules.push(pass_through(rule)),
            }
        }

        spec.fields = fields
            .iter()
            .filter_map(|field| {
                field_rules.remove(&field.id).map(|rules| FieldJobEntry {
                    field_id: field.id.clone(),
                    field_name: field.technical_name.clone(),
                    field_type: field.data_type.clone(),
                    rules,
                })
            })
            .collect();

        debug!(
            "视图 {} 解析完成: {} 条规则, {} 个字段",
            view.id,
            spec.rule_count(),
            spec.fields.len()
        );
        Ok(spec)
    }

    /// 视图在查询引擎中的物理位置
    pub async fn resolve_location(&self, view: &ViewMeta) -> ExploreResult<TableLocation> {
        let (catalog, schema) = match view.kind {
            ViewKind::Datasource => {
                let datasource_id = view.datasource_id.as_deref().ok_or_else(|| {
                    ExploreError::validation(format!("视图 {} 未关联数据源", view.id))
                })?;
                let datasource = self
                    .metadata_repo
                    .get_datasource(datasource_id)
                    .await?
                    .ok_or_else(|| ExploreError::datasource_not_found(datasource_id))?;
                (datasource.catalog_name, datasource.schema_name)
            }
            ViewKind::Custom => (
                self.config.custom_catalog.clone(),
                self.config.custom_schema.clone(),
            ),
            ViewKind::LogicEntity => (
                self.config.logic_entity_catalog.clone(),
                self.config.logic_entity_schema.clone(),
            ),
        };
        Ok(TableLocation {
            catalog,
            schema,
            table: view.technical_name.clone(),
        })
    }

    async fn evaluate_metadata(
        view: &ViewMeta,
        fields: &[FieldMeta],
        rule: &RuleConfig,
        cache: &mut StandardCache<'_>,
    ) -> Option<ResolvedRule> {
        let (hits, total) = match rule.dimension_type {
            DimensionType::TableDescription => {
                let described = !view.description.trim().is_empty();
                (usize::from(described), 1)
            }
            DimensionType::FieldDescription => (
                fields.iter().filter(|f| f.has_description()).count(),
                fields.len(),
            ),
            DimensionType::DataStandard => {
                let mut hits = 0;
                let mut total = 0;
                for field in fields.iter().filter(|f| f.standard_id.is_some()) {
                    if let Some(standard) = cache.get(&view.id, field).await {
                        total += 1;
                        if standard.matches_field(field) {
                            hits += 1;
                        }
                    }
                }
                (hits, total)
            }
            other => {
                warn!("元数据级规则 {} 的类型 {:?} 无法本地求值", rule.id, other);
                return None;
            }
        };
        Some(resolved_rule(rule, json!({ "hits": hits, "total": total })))
    }

    async fn resolve_field_rule(
        &self,
        credential: &Credential,
        view: &ViewMeta,
        field: &FieldMeta,
        rule: &RuleConfig,
        cache: &mut StandardCache<'_>,
    ) -> Option<Value> {
        let result = match rule.dimension_type {
            DimensionType::Null => Self::null_config(field, rule),
            DimensionType::Format => self.format_config(credential, view, field, rule, cache).await,
            DimensionType::Dict => self.dict_config(credential, view, field, rule, cache).await,
            _ => Ok(rule.config_body.clone().unwrap_or_else(|| json!({}))),
        };
        match result {
            Ok(config) => Some(config),
            Err(e) => {
                let what = match rule.dimension_type {
                    DimensionType::Format => "format",
                    DimensionType::Dict => "dict",
                    _ => "rule_config",
                };
                StructuredLogger::log_enrichment_skipped(&view.id, &field.id, what, &e);
                None
            }
        }
    }

    fn null_config(field: &FieldMeta, rule: &RuleConfig) -> ExploreResult<Value> {
        let values = match rule.body::<NullConfig>()? {
            Some(config) => config.null,
            None => default_null_values(field.type_family()),
        };
        Ok(json!({ "null": values }))
    }

    async fn format_config(
        &self,
        credential: &Credential,
        view: &ViewMeta,
        field: &FieldMeta,
        rule: &RuleConfig,
        cache: &mut StandardCache<'_>,
    ) -> ExploreResult<Value> {
        let body = rule.body::<FormatConfig>()?.unwrap_or_default();
        if let Some(regex) = body.regex.filter(|r| !r.is_empty()) {
            return Ok(json!({ "format": { "regex": regex } }));
        }

        let code_rule_id = match body.code_rule_id {
            Some(id) => Some(id),
            None => cache
                .get(&view.id, field)
                .await
                .and_then(|standard| standard.code_rule_id),
        };
        let code_rule_id = code_rule_id.ok_or_else(|| {
            ExploreError::validation(format!("字段 {} 没有可用的编码规则", field.id))
        })?;

        let regex = self
            .standards
            .get_format_rule(credential, &code_rule_id)
            .await?;
        Ok(json!({ "format": { "regex": regex } }))
    }

    async fn dict_config(
        &self,
        credential: &Credential,
        view: &ViewMeta,
        field: &FieldMeta,
        rule: &RuleConfig,
        cache: &mut StandardCache<'_>,
    ) -> ExploreResult<Value> {
        let dict_id = match rule.body::<DictConfig>()? {
            Some(config) => Some(config.dict_id),
            None => match field.code_table_id.clone() {
                Some(id) => Some(id),
                None => cache
                    .get(&view.id, field)
                    .await
                    .and_then(|standard| standard.dict_id),
            },
        };
        let dict_id = dict_id.ok_or_else(|| {
            ExploreError::validation(format!("字段 {} 没有关联码表", field.id))
        })?;

        let data = self
            .standards
            .get_dictionary(credential, &dict_id)
            .await?;
        Ok(json!({ "dict": { "dict_id": dict_id, "data": data } }))
    }
}

/// 未显式配置时按字段类型推导的空值集合
pub fn default_null_values(family: TypeFamily) -> Vec<String> {
    let values: &[&str] = match family {
        TypeFamily::Character => &["NULL", ""],
        TypeFamily::Numeric => &["0", "NULL"],
        TypeFamily::Temporal | TypeFamily::Other => &["NULL"],
    };
    values.iter().map(|v| v.to_string()).collect()
}

fn resolved_rule(rule: &RuleConfig, config: Value) -> ResolvedRule {
    ResolvedRule {
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        dimension: rule.dimension,
        dimension_type: rule.dimension_type,
        config,
    }
}

fn pass_through(rule: &RuleConfig) -> ResolvedRule {
    resolved_rule(rule, rule.config_body.clone().unwrap_or_else(|| json!({})))
}
