//! 外部协作服务接口
//!
//! 所有调用都显式接收任务创建时捕获的 [`Credential`]，服务内部不保存任何
//! 进程级的“最近一次凭证”。

use async_trait::async_trait;

use crate::models::{
    Credential, DictItem, ExecutionFilter, ExecutionRecord, FieldMeta, FieldSubjectMatch, JobRef,
    JobSpec, StandardInfo, ViewMeta,
};
use crate::ExploreResult;

/// 执行引擎
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn create_job(&self, credential: &Credential, spec: &JobSpec) -> ExploreResult<JobRef>;

    /// 原地更新作业，返回相同ID和递增后的版本
    async fn update_job(
        &self,
        credential: &Credential,
        job_id: &str,
        spec: &JobSpec,
    ) -> ExploreResult<JobRef>;

    async fn get_status(
        &self,
        credential: &Credential,
        filter: &ExecutionFilter,
    ) -> ExploreResult<Vec<ExecutionRecord>>;

    async fn delete_job(&self, credential: &Credential, job_id: &str) -> ExploreResult<()>;
}

/// 数据标准服务
#[async_trait]
pub trait StandardsService: Send + Sync {
    async fn get_standard(
        &self,
        credential: &Credential,
        standard_id: &str,
    ) -> ExploreResult<StandardInfo>;

    /// 编码规则对应的正则表达式
    async fn get_format_rule(
        &self,
        credential: &Credential,
        code_rule_id: &str,
    ) -> ExploreResult<String>;

    /// 码表的 code → label 枚举
    async fn get_dictionary(
        &self,
        credential: &Credential,
        dict_id: &str,
    ) -> ExploreResult<Vec<DictItem>>;
}

/// 分类助手服务
#[async_trait]
pub trait ClassificationService: Send + Sync {
    async fn classify(
        &self,
        credential: &Credential,
        view: &ViewMeta,
        fields: &[FieldMeta],
    ) -> ExploreResult<Vec<FieldSubjectMatch>>;
}
