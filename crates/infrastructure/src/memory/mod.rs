//! 存储与外部协作服务的内存实现，用于单实例部署和测试

mod metadata_store;
mod rule_store;
mod services;
mod task_store;

pub use metadata_store::{InMemoryJobRefStore, InMemoryMetadataStore};
pub use rule_store::{InMemoryGradeRuleStore, InMemoryRuleStore, InMemoryTemplateCatalog};
pub use services::{
    InMemoryClassificationService, InMemoryExecutionEngine, InMemoryStandardsService,
};
pub use task_store::{InMemorySubTaskStore, InMemoryTaskStore};

use explore_core::{Page, Paged};

fn paginate<T>(entries: Vec<T>, page: Page) -> Paged<T> {
    let total_count = entries.len();
    let entries = entries
        .into_iter()
        .skip(page.offset)
        .take(page.limit)
        .collect();
    Paged {
        entries,
        total_count,
    }
}
