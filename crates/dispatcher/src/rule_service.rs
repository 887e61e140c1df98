//! 探查规则的增删改查与模板展开

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use explore_core::{
    ExploreError, ExploreResult, MetadataRepository, Page, Paged, RuleConfig, RuleFilter,
    RuleLevel, RuleRepository, TemplateRuleRepository,
};

pub struct RuleService {
    rule_repo: Arc<dyn RuleRepository>,
    template_repo: Arc<dyn TemplateRuleRepository>,
    metadata_repo: Arc<dyn MetadataRepository>,
}

impl RuleService {
    pub fn new(
        rule_repo: Arc<dyn RuleRepository>,
        template_repo: Arc<dyn TemplateRuleRepository>,
        metadata_repo: Arc<dyn MetadataRepository>,
    ) -> Self {
        Self {
            rule_repo,
            template_repo,
            metadata_repo,
        }
    }

    pub async fn create_rule(&self, rule: RuleConfig) -> ExploreResult<RuleConfig> {
        rule.validate()?;
        self.ensure_target(&rule).await?;
        self.ensure_unique_name(&rule).await?;

        let created = self.rule_repo.create(&rule).await?;
        info!("规则 {} ({}) 已创建", created.name, created.id);
        Ok(created)
    }

    /// 由模板批量生成视图规则；字段级模板绑定到 `field_id`，其余模板绑定到视图
    pub async fn create_from_templates(
        &self,
        view_id: &str,
        template_ids: &[String],
        field_id: Option<&str>,
    ) -> ExploreResult<Vec<RuleConfig>> {
        let mut rules = Vec::with_capacity(template_ids.len());
        let mut names = HashSet::new();

        for template_id in template_ids {
            let template = self
                .template_repo
                .get_by_id(template_id)
                .await?
                .ok_or_else(|| ExploreError::rule_not_found(template_id))?;
            let bound_field = match template.level {
                RuleLevel::Field => Some(
                    field_id
                        .ok_or_else(|| {
                            ExploreError::validation(format!(
                                "字段级模板 {} 需要指定字段",
                                template.name
                            ))
                        })?
                        .to_string(),
                ),
                _ => None,
            };

            let rule = RuleConfig::from_template(&template, view_id, bound_field);
            rule.validate()?;
            if !names.insert(rule.name.clone()) {
                return Err(ExploreError::conflict(format!(
                    "模板中存在重名规则: {}",
                    rule.name
                )));
            }
            rules.push(rule);
        }

        for rule in &rules {
            self.ensure_target(rule).await?;
            self.ensure_unique_name(rule).await?;
        }

        self.rule_repo.create_batch(&rules).await?;
        info!("视图 {} 由模板生成 {} 条规则", view_id, rules.len());
        Ok(rules)
    }

    pub async fn update_rule(&self, mut rule: RuleConfig) -> ExploreResult<RuleConfig> {
        let existing = self.get_rule(&rule.id).await?;
        rule.created_at = existing.created_at;
        rule.template_id = existing.template_id;
        rule.updated_at = Utc::now();

        rule.validate()?;
        self.ensure_target(&rule).await?;
        self.ensure_unique_name(&rule).await?;

        self.rule_repo.update(&rule).await?;
        Ok(rule)
    }

    pub async fn delete_rule(&self, rule_id: &str) -> ExploreResult<()> {
        let rule = self.get_rule(rule_id).await?;
        self.rule_repo.delete(&rule.id).await?;
        info!("规则 {} ({}) 已删除", rule.name, rule.id);
        Ok(())
    }

    pub async fn set_enabled(&self, rule_id: &str, enabled: bool) -> ExploreResult<RuleConfig> {
        let mut rule = self.get_rule(rule_id).await?;
        if rule.enabled != enabled {
            rule.enabled = enabled;
            rule.updated_at = Utc::now();
            self.rule_repo.update(&rule).await?;
        }
        Ok(rule)
    }

    pub async fn get_rule(&self, rule_id: &str) -> ExploreResult<RuleConfig> {
        self.rule_repo
            .get_by_id(rule_id)
            .await?
            .ok_or_else(|| ExploreError::rule_not_found(rule_id))
    }

    pub async fn list_rules(&self, filter: &RuleFilter, page: Page) -> ExploreResult<Paged<RuleConfig>> {
        self.rule_repo.list(filter, page).await
    }

    /// 视图必须存在，字段级规则的字段必须属于该视图
    async fn ensure_target(&self, rule: &RuleConfig) -> ExploreResult<()> {
        let view_id = rule.view_id.as_deref().unwrap_or_default();
        if self.metadata_repo.get_view(view_id).await?.is_none() {
            return Err(ExploreError::view_not_found(view_id));
        }
        if let Some(field_id) = rule.field_id.as_deref() {
            let fields = self.metadata_repo.list_fields(view_id).await?;
            if !fields.iter().any(|f| f.id == field_id) {
                return Err(ExploreError::validation(format!(
                    "字段 {field_id} 不属于视图 {view_id}"
                )));
            }
        }
        Ok(())
    }

    async fn ensure_unique_name(&self, rule: &RuleConfig) -> ExploreResult<()> {
        let view_id = rule.view_id.as_deref().unwrap_or_default();
        match self.rule_repo.get_by_name(view_id, &rule.name).await? {
            Some(existing) if existing.id != rule.id => Err(ExploreError::conflict(format!(
                "视图 {} 下已存在同名规则: {}",
                view_id, rule.name
            ))),
            _ => Ok(()),
        }
    }
}
