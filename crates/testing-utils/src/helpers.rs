//! Test helper utilities and common testing patterns

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use explore_core::{DatasourceMeta, FieldMeta, ViewMeta};
use explore_infrastructure::{
    InMemoryExecutionEngine, InMemoryGradeRuleStore, InMemoryJobRefStore, InMemoryMessageQueue,
    InMemoryMetadataStore, InMemoryRuleStore, InMemoryStandardsService, InMemorySubTaskStore,
    InMemoryTaskStore, InMemoryTemplateCatalog,
};

use crate::builders::{datasource, FieldBuilder, ViewBuilder};
use crate::mocks::{CountingLock, FlakyExecutionEngine, MockClassificationService};

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }

        false
    }

    /// Set up logging for tests (call once per test binary)
    pub fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init();
    }
}

/// Every store and collaborator a component may need, all in memory
pub struct TestWorld {
    pub tasks: Arc<InMemoryTaskStore>,
    pub sub_tasks: Arc<InMemorySubTaskStore>,
    pub rules: Arc<InMemoryRuleStore>,
    pub templates: Arc<InMemoryTemplateCatalog>,
    pub metadata: Arc<InMemoryMetadataStore>,
    pub grade_rules: Arc<InMemoryGradeRuleStore>,
    pub job_refs: Arc<InMemoryJobRefStore>,
    pub engine: Arc<InMemoryExecutionEngine>,
    pub flaky_engine: Arc<FlakyExecutionEngine>,
    pub standards: Arc<InMemoryStandardsService>,
    pub classifier: Arc<MockClassificationService>,
    pub queue: Arc<InMemoryMessageQueue>,
    pub lock: Arc<CountingLock>,
}

impl TestWorld {
    pub fn new() -> Self {
        let engine = Arc::new(InMemoryExecutionEngine::new());
        Self {
            tasks: Arc::new(InMemoryTaskStore::new()),
            sub_tasks: Arc::new(InMemorySubTaskStore::new()),
            rules: Arc::new(InMemoryRuleStore::new()),
            templates: Arc::new(InMemoryTemplateCatalog::default()),
            metadata: Arc::new(InMemoryMetadataStore::new()),
            grade_rules: Arc::new(InMemoryGradeRuleStore::default()),
            job_refs: Arc::new(InMemoryJobRefStore::new()),
            flaky_engine: Arc::new(FlakyExecutionEngine::new(engine.clone())),
            engine,
            standards: Arc::new(InMemoryStandardsService::new()),
            classifier: Arc::new(MockClassificationService::new()),
            queue: Arc::new(InMemoryMessageQueue::new()),
            lock: Arc::new(CountingLock::new()),
        }
    }

    pub async fn seed_datasource(&self, id: &str, catalog: &str, schema: &str) -> DatasourceMeta {
        let ds = datasource(id, catalog, schema);
        self.metadata.insert_datasource(ds.clone()).await;
        ds
    }

    /// Views named `t_{view_id}` under a datasource, one varchar column each
    pub async fn seed_views(&self, datasource_id: &str, view_ids: &[&str]) -> Vec<ViewMeta> {
        let mut views = Vec::new();
        for view_id in view_ids {
            let view = ViewBuilder::new(view_id, &format!("t_{view_id}"))
                .in_datasource(datasource_id)
                .build();
            self.metadata.insert_view(view.clone()).await;
            self.seed_field(
                FieldBuilder::new(&format!("{view_id}-f1"), view_id, "name").build(),
            )
            .await;
            views.push(view);
        }
        views
    }

    pub async fn seed_view(&self, view: ViewMeta) -> ViewMeta {
        self.metadata.insert_view(view.clone()).await;
        view
    }

    pub async fn seed_field(&self, field: FieldMeta) -> FieldMeta {
        self.metadata.insert_field(field.clone()).await;
        field
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use explore_core::MetadataRepository;

    #[tokio::test]
    async fn test_wait_for_success() {
        let mut counter = 0;
        let condition = || {
            counter += 1;
            let reached = counter >= 3;
            async move { reached }
        };

        assert!(TestEnv::wait_for(condition, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn test_wait_for_timeout() {
        let condition = || async { false };
        assert!(!TestEnv::wait_for(condition, Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn test_seed_views_sorted_by_technical_name() {
        let world = TestWorld::new();
        world.seed_datasource("ds-1", "hive", "ods").await;
        world.seed_views("ds-1", &["v3", "v1", "v2"]).await;

        let views = world.metadata.list_views_by_datasource("ds-1").await.unwrap();
        let ids: Vec<_> = views.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v2", "v3"]);
        assert_eq!(world.metadata.list_fields("v2").await.unwrap().len(), 1);
    }
}
