//! 数据仓储层接口定义
//!
//! 此模块定义了探查服务依赖的持久化抽象接口，包括：
//! - 探查任务仓储 (ExploreTaskRepository)
//! - 子任务仓储 (SubTaskRepository)
//! - 探查规则与模板规则仓储 (RuleRepository / TemplateRuleRepository)
//! - 视图/字段元数据仓储 (MetadataRepository)
//! - 分级规则仓储 (GradeRuleRepository)
//! - 作业引用仓储 (JobRefRepository)
//!
//! ## 设计原则
//!
//! ### 接口隔离
//! 每个仓储接口只负责单一实体的数据操作，编排逻辑只依赖这些接口，
//! 不关心具体存储介质。
//!
//! ### 异步设计
//! 所有操作都是异步的，返回 `ExploreResult<T>` 统一错误处理，
//! 并要求实现 `Send + Sync` 以便在多个 tokio 任务间共享。
//!
//! ### 已知限制
//! “同一目标同一类型只允许一个进行中的任务”通过 [`ExploreTaskRepository::find_active`]
//! 先读后写检查，并发创建时存在竞态。需要强一致时应在具体存储中用唯一约束
//! 或条件插入实现 `create`。

use async_trait::async_trait;

use crate::models::{
    DatasourceMeta, ExploreKind, ExploreTarget, ExploreTask, ExploreTaskStatus, FieldMeta,
    GradeRule, JobRef, Page, Paged, RuleConfig, RuleFilter, SubTask, TaskFilter, TemplateRule,
    ViewMeta,
};
use crate::ExploreResult;

/// 探查任务仓储接口
///
/// 任务只由调度器、作业下发器和状态聚合器修改；除非运维人员显式删除，
/// 任务记录不会被物理删除。
#[async_trait]
pub trait ExploreTaskRepository: Send + Sync {
    /// 创建新任务，返回持久化后的任务
    async fn create(&self, task: &ExploreTask) -> ExploreResult<ExploreTask>;

    /// 批量创建任务
    async fn create_batch(&self, tasks: &[ExploreTask]) -> ExploreResult<Vec<ExploreTask>>;

    /// 根据ID获取任务，未找到时返回 `None`
    async fn get_by_id(&self, id: &str) -> ExploreResult<Option<ExploreTask>>;

    /// 整体更新任务记录
    async fn update(&self, task: &ExploreTask) -> ExploreResult<()>;

    /// 仅当存储中的状态仍为 `expected` 时整体写入，返回是否写入
    ///
    /// 状态推进都应走这里，避免覆盖并发写入的取消状态。
    async fn update_if_status(
        &self,
        task: &ExploreTask,
        expected: ExploreTaskStatus,
    ) -> ExploreResult<bool>;

    /// 只回写外部作业引用，不改动状态
    async fn set_external_job(&self, id: &str, job: &JobRef) -> ExploreResult<()>;

    /// 物理删除任务
    async fn delete(&self, id: &str) -> ExploreResult<()>;

    /// 按条件分页查询，结果按创建时间倒序
    async fn list(&self, filter: &TaskFilter, page: Page) -> ExploreResult<Paged<ExploreTask>>;

    /// 查找目标上指定类型的进行中（Queued/Running）任务
    async fn find_active(
        &self,
        target: &ExploreTarget,
        kind: ExploreKind,
    ) -> ExploreResult<Option<ExploreTask>>;

    /// 取一个给定类型中最早创建的 Queued/Running 任务
    ///
    /// 调度器在持有分布式锁时调用，Running 任务也会被返回，
    /// 以便重新派生上一次被中断的执行。
    async fn next_schedulable(&self, kinds: &[ExploreKind]) -> ExploreResult<Option<ExploreTask>>;
}

/// 子任务仓储接口
#[async_trait]
pub trait SubTaskRepository: Send + Sync {
    async fn create_batch(&self, sub_tasks: &[SubTask]) -> ExploreResult<()>;

    async fn list_by_parent(&self, parent_task_id: &str) -> ExploreResult<Vec<SubTask>>;

    async fn update(&self, sub_task: &SubTask) -> ExploreResult<()>;

    /// 仅当存储中的子任务状态仍为 `expected` 时写入，返回是否写入
    async fn update_if_status(
        &self,
        sub_task: &SubTask,
        expected: ExploreTaskStatus,
    ) -> ExploreResult<bool>;

    /// 将父任务下所有未结束的子任务标记为指定状态，返回受影响数量
    async fn update_active_status(
        &self,
        parent_task_id: &str,
        status: ExploreTaskStatus,
    ) -> ExploreResult<u64>;

    /// 删除父任务下全部子任务，返回删除数量
    async fn delete_by_parent(&self, parent_task_id: &str) -> ExploreResult<u64>;
}

/// 探查规则仓储接口
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn create(&self, rule: &RuleConfig) -> ExploreResult<RuleConfig>;

    async fn create_batch(&self, rules: &[RuleConfig]) -> ExploreResult<()>;

    async fn get_by_id(&self, id: &str) -> ExploreResult<Option<RuleConfig>>;

    /// 同一视图下按名称查找规则
    async fn get_by_name(&self, view_id: &str, name: &str) -> ExploreResult<Option<RuleConfig>>;

    async fn update(&self, rule: &RuleConfig) -> ExploreResult<()>;

    async fn delete(&self, id: &str) -> ExploreResult<()>;

    async fn list(&self, filter: &RuleFilter, page: Page) -> ExploreResult<Paged<RuleConfig>>;

    /// 视图下的全部规则（含字段级规则）
    async fn list_by_view(&self, view_id: &str) -> ExploreResult<Vec<RuleConfig>>;
}

/// 模板规则目录
#[async_trait]
pub trait TemplateRuleRepository: Send + Sync {
    async fn get_by_id(&self, id: &str) -> ExploreResult<Option<TemplateRule>>;

    async fn list(&self) -> ExploreResult<Vec<TemplateRule>>;
}

/// 视图/字段元数据仓储
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    async fn get_view(&self, view_id: &str) -> ExploreResult<Option<ViewMeta>>;

    async fn get_datasource(&self, datasource_id: &str) -> ExploreResult<Option<DatasourceMeta>>;

    async fn list_views_by_datasource(&self, datasource_id: &str) -> ExploreResult<Vec<ViewMeta>>;

    async fn list_fields(&self, view_id: &str) -> ExploreResult<Vec<FieldMeta>>;

    /// 回写字段的分类主题
    async fn update_field_subject(
        &self,
        field_id: &str,
        subject_id: Option<String>,
    ) -> ExploreResult<()>;

    /// 回写字段的分级标签
    async fn update_field_grade(
        &self,
        field_id: &str,
        label_id: Option<String>,
    ) -> ExploreResult<()>;
}

/// 分级规则仓储
#[async_trait]
pub trait GradeRuleRepository: Send + Sync {
    async fn list_enabled(&self) -> ExploreResult<Vec<GradeRule>>;
}

/// 执行引擎作业引用仓储，每个 (视图, 探查类型) 至多一个作业
#[async_trait]
pub trait JobRefRepository: Send + Sync {
    async fn get(&self, view_id: &str, kind: ExploreKind) -> ExploreResult<Option<JobRef>>;

    async fn save(&self, view_id: &str, kind: ExploreKind, job: &JobRef) -> ExploreResult<()>;

    async fn delete(&self, view_id: &str, kind: ExploreKind) -> ExploreResult<()>;
}
