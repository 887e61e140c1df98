use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use explore_core::{
    ExploreError, ExploreResult, GradeRule, GradeRuleRepository, Page, Paged, RuleConfig,
    RuleFilter, RuleRepository, TemplateRule, TemplateRuleRepository,
};

use super::paginate;

#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<HashMap<String, RuleConfig>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleRepository for InMemoryRuleStore {
    async fn create(&self, rule: &RuleConfig) -> ExploreResult<RuleConfig> {
        let mut rules = self.rules.write().await;
        if rules.contains_key(&rule.id) {
            return Err(ExploreError::conflict(format!("规则ID已存在: {}", rule.id)));
        }
        rules.insert(rule.id.clone(), rule.clone());
        Ok(rule.clone())
    }

    async fn create_batch(&self, rules: &[RuleConfig]) -> ExploreResult<()> {
        let mut store = self.rules.write().await;
        for rule in rules {
            store.insert(rule.id.clone(), rule.clone());
        }
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> ExploreResult<Option<RuleConfig>> {
        Ok(self.rules.read().await.get(id).cloned())
    }

    async fn get_by_name(&self, view_id: &str, name: &str) -> ExploreResult<Option<RuleConfig>> {
        let rules = self.rules.read().await;
        Ok(rules
            .values()
            .find(|r| r.view_id.as_deref() == Some(view_id) && r.name == name)
            .cloned())
    }

    async fn update(&self, rule: &RuleConfig) -> ExploreResult<()> {
        let mut rules = self.rules.write().await;
        match rules.get_mut(&rule.id) {
            Some(existing) => {
                *existing = rule.clone();
                Ok(())
            }
            None => Err(ExploreError::rule_not_found(&rule.id)),
        }
    }

    async fn delete(&self, id: &str) -> ExploreResult<()> {
        self.rules
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ExploreError::rule_not_found(id))
    }

    async fn list(&self, filter: &RuleFilter, page: Page) -> ExploreResult<Paged<RuleConfig>> {
        let rules = self.rules.read().await;
        let mut matched: Vec<RuleConfig> =
            rules.values().filter(|r| filter.matches(r)).cloned().collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(paginate(matched, page))
    }

    async fn list_by_view(&self, view_id: &str) -> ExploreResult<Vec<RuleConfig>> {
        let rules = self.rules.read().await;
        let mut matched: Vec<RuleConfig> = rules
            .values()
            .filter(|r| r.view_id.as_deref() == Some(view_id))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matched)
    }
}

/// 模板规则目录，启动时一次性载入
#[derive(Debug, Default)]
pub struct InMemoryTemplateCatalog {
    templates: RwLock<Vec<TemplateRule>>,
}

impl InMemoryTemplateCatalog {
    pub fn new(templates: Vec<TemplateRule>) -> Self {
        Self {
            templates: RwLock::new(templates),
        }
    }

    pub async fn insert(&self, template: TemplateRule) {
        self.templates.write().await.push(template);
    }
}

#[async_trait]
impl TemplateRuleRepository for InMemoryTemplateCatalog {
    async fn get_by_id(&self, id: &str) -> ExploreResult<Option<TemplateRule>> {
        Ok(self
            .templates
            .read()
            .await
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn list(&self) -> ExploreResult<Vec<TemplateRule>> {
        Ok(self.templates.read().await.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryGradeRuleStore {
    rules: RwLock<Vec<GradeRule>>,
}

impl InMemoryGradeRuleStore {
    pub fn new(rules: Vec<GradeRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    pub async fn insert(&self, rule: GradeRule) {
        self.rules.write().await.push(rule);
    }
}

#[async_trait]
impl GradeRuleRepository for InMemoryGradeRuleStore {
    async fn list_enabled(&self) -> ExploreResult<Vec<GradeRule>> {
        let mut enabled: Vec<GradeRule> = self
            .rules
            .read()
            .await
            .iter()
            .filter(|r| r.enabled)
            .cloned()
            .collect();
        enabled.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(enabled)
    }
}
