use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use explore_core::{
    DatasourceMeta, ExploreError, ExploreKind, ExploreResult, FieldMeta, JobRef, JobRefRepository,
    MetadataRepository, ViewMeta,
};

#[derive(Debug, Default)]
struct MetadataState {
    datasources: HashMap<String, DatasourceMeta>,
    views: HashMap<String, ViewMeta>,
    fields: HashMap<String, FieldMeta>,
}

/// 视图/字段元数据，字段的分类主题与分级标签在此回写
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    state: RwLock<MetadataState>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_datasource(&self, datasource: DatasourceMeta) {
        self.state
            .write()
            .await
            .datasources
            .insert(datasource.id.clone(), datasource);
    }

    pub async fn insert_view(&self, view: ViewMeta) {
        self.state.write().await.views.insert(view.id.clone(), view);
    }

    pub async fn insert_field(&self, field: FieldMeta) {
        self.state.write().await.fields.insert(field.id.clone(), field);
    }

    pub async fn get_field(&self, field_id: &str) -> Option<FieldMeta> {
        self.state.read().await.fields.get(field_id).cloned()
    }
}

#[async_trait]
impl MetadataRepository for InMemoryMetadataStore {
    async fn get_view(&self, view_id: &str) -> ExploreResult<Option<ViewMeta>> {
        Ok(self.state.read().await.views.get(view_id).cloned())
    }

    async fn get_datasource(&self, datasource_id: &str) -> ExploreResult<Option<DatasourceMeta>> {
        Ok(self.state.read().await.datasources.get(datasource_id).cloned())
    }

    async fn list_views_by_datasource(&self, datasource_id: &str) -> ExploreResult<Vec<ViewMeta>> {
        let state = self.state.read().await;
        let mut views: Vec<ViewMeta> = state
            .views
            .values()
            .filter(|v| v.datasource_id.as_deref() == Some(datasource_id))
            .cloned()
            .collect();
        views.sort_by(|a, b| a.technical_name.cmp(&b.technical_name));
        Ok(views)
    }

    async fn list_fields(&self, view_id: &str) -> ExploreResult<Vec<FieldMeta>> {
        let state = self.state.read().await;
        let mut fields: Vec<FieldMeta> = state
            .fields
            .values()
            .filter(|f| f.view_id == view_id)
            .cloned()
            .collect();
        fields.sort_by(|a, b| a.technical_name.cmp(&b.technical_name));
        Ok(fields)
    }

    async fn update_field_subject(
        &self,
        field_id: &str,
        subject_id: Option<String>,
    ) -> ExploreResult<()> {
        let mut state = self.state.write().await;
        let field = state
            .fields
            .get_mut(field_id)
            .ok_or_else(|| ExploreError::validation(format!("字段不存在: {field_id}")))?;
        field.subject_id = subject_id;
        Ok(())
    }

    async fn update_field_grade(
        &self,
        field_id: &str,
        label_id: Option<String>,
    ) -> ExploreResult<()> {
        let mut state = self.state.write().await;
        let field = state
            .fields
            .get_mut(field_id)
            .ok_or_else(|| ExploreError::validation(format!("字段不存在: {field_id}")))?;
        field.grade_label_id = label_id;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryJobRefStore {
    refs: RwLock<HashMap<(String, ExploreKind), JobRef>>,
}

impl InMemoryJobRefStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.refs.read().await.len()
    }
}

#[async_trait]
impl JobRefRepository for InMemoryJobRefStore {
    async fn get(&self, view_id: &str, kind: ExploreKind) -> ExploreResult<Option<JobRef>> {
        Ok(self
            .refs
            .read()
            .await
            .get(&(view_id.to_string(), kind))
            .cloned())
    }

    async fn save(&self, view_id: &str, kind: ExploreKind, job: &JobRef) -> ExploreResult<()> {
        self.refs
            .write()
            .await
            .insert((view_id.to_string(), kind), job.clone());
        Ok(())
    }

    async fn delete(&self, view_id: &str, kind: ExploreKind) -> ExploreResult<()> {
        self.refs.write().await.remove(&(view_id.to_string(), kind));
        Ok(())
    }
}
