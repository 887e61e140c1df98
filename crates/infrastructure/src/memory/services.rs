//! 外部协作服务的内存实现
//!
//! 单实例部署时代替执行引擎、数据标准服务和分类助手服务；
//! 查询不到的对象按下游服务错误返回，与远程服务的 404 行为一致。

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use explore_core::{
    ClassificationService, Credential, DictItem, ExecutionEngine, ExecutionFilter,
    ExecutionRecord, ExecutionStatus, ExploreError, ExploreResult, FieldMeta, FieldSubjectMatch,
    JobRef, JobSpec, StandardInfo, StandardsService, ViewMeta,
};

const ENGINE: &str = "execution-engine";
const STANDARDS: &str = "standards";

#[derive(Debug, Clone)]
struct EngineJob {
    spec: JobSpec,
    version: i64,
    record: ExecutionRecord,
}

/// 内存执行引擎：作业按ID保存，每个作业对应一条执行记录
///
/// 执行进度由 [`InMemoryExecutionEngine::report`] 推进。
#[derive(Debug, Default)]
pub struct InMemoryExecutionEngine {
    jobs: RwLock<HashMap<String, EngineJob>>,
    last_caller: RwLock<Option<String>>,
}

impl InMemoryExecutionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 上报某任务在某视图上的执行进度
    pub async fn report(
        &self,
        task_id: &str,
        view_id: &str,
        status: ExecutionStatus,
        reason: Option<&str>,
    ) -> ExploreResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .values_mut()
            .find(|j| j.record.task_id == task_id && j.record.view_id == view_id)
            .ok_or_else(|| {
                ExploreError::downstream(
                    ENGINE,
                    format!("no execution of task {task_id} on view {view_id}"),
                )
            })?;
        job.record.status = status;
        job.record.reason = reason.map(str::to_string);
        job.record.updated_at = Utc::now();
        Ok(())
    }

    pub async fn job(&self, job_id: &str) -> Option<(JobSpec, i64)> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(|j| (j.spec.clone(), j.version))
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// 最近一次调用方的用户ID
    pub async fn last_caller(&self) -> Option<String> {
        self.last_caller.read().await.clone()
    }

    async fn remember_caller(&self, credential: &Credential) {
        *self.last_caller.write().await = Some(credential.user_id.clone());
    }

    fn queued_record(spec: &JobSpec) -> ExecutionRecord {
        ExecutionRecord {
            task_id: spec.task_id.clone(),
            view_id: spec.view_id.clone(),
            status: ExecutionStatus::Queued,
            reason: None,
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ExecutionEngine for InMemoryExecutionEngine {
    async fn create_job(&self, credential: &Credential, spec: &JobSpec) -> ExploreResult<JobRef> {
        self.remember_caller(credential).await;
        let job_id = Uuid::new_v4().to_string();
        self.jobs.write().await.insert(
            job_id.clone(),
            EngineJob {
                spec: spec.clone(),
                version: 1,
                record: Self::queued_record(spec),
            },
        );
        debug!("Engine job {} created for view {}", job_id, spec.view_id);
        Ok(JobRef { job_id, version: 1 })
    }

    async fn update_job(
        &self,
        credential: &Credential,
        job_id: &str,
        spec: &JobSpec,
    ) -> ExploreResult<JobRef> {
        self.remember_caller(credential).await;
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| ExploreError::downstream(ENGINE, format!("job {job_id} not found")))?;
        job.version += 1;
        job.spec = spec.clone();
        job.record = Self::queued_record(spec);
        debug!("Engine job {} updated to version {}", job_id, job.version);
        Ok(JobRef {
            job_id: job_id.to_string(),
            version: job.version,
        })
    }

    async fn get_status(
        &self,
        credential: &Credential,
        filter: &ExecutionFilter,
    ) -> ExploreResult<Vec<ExecutionRecord>> {
        self.remember_caller(credential).await;
        let jobs = self.jobs.read().await;
        let mut records: Vec<ExecutionRecord> = jobs
            .values()
            .filter(|job| match filter {
                ExecutionFilter::Task(task_id) => &job.record.task_id == task_id,
                ExecutionFilter::Location { catalog, schema } => {
                    &job.spec.location.catalog == catalog && &job.spec.location.schema == schema
                }
            })
            .map(|job| job.record.clone())
            .collect();
        records.sort_by(|a, b| a.view_id.cmp(&b.view_id));
        Ok(records)
    }

    async fn delete_job(&self, credential: &Credential, job_id: &str) -> ExploreResult<()> {
        self.remember_caller(credential).await;
        self.jobs
            .write()
            .await
            .remove(job_id)
            .map(|_| ())
            .ok_or_else(|| ExploreError::downstream(ENGINE, format!("job {job_id} not found")))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStandardsService {
    standards: RwLock<HashMap<String, StandardInfo>>,
    format_rules: RwLock<HashMap<String, String>>,
    dictionaries: RwLock<HashMap<String, Vec<DictItem>>>,
}

impl InMemoryStandardsService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_standard(&self, standard: StandardInfo) {
        self.standards
            .write()
            .await
            .insert(standard.id.clone(), standard);
    }

    pub async fn insert_format_rule(&self, code_rule_id: &str, regex: &str) {
        self.format_rules
            .write()
            .await
            .insert(code_rule_id.to_string(), regex.to_string());
    }

    pub async fn insert_dictionary(&self, dict_id: &str, items: Vec<DictItem>) {
        self.dictionaries
            .write()
            .await
            .insert(dict_id.to_string(), items);
    }
}

#[async_trait]
impl StandardsService for InMemoryStandardsService {
    async fn get_standard(
        &self,
        _credential: &Credential,
        standard_id: &str,
    ) -> ExploreResult<StandardInfo> {
        self.standards
            .read()
            .await
            .get(standard_id)
            .cloned()
            .ok_or_else(|| {
                ExploreError::downstream(STANDARDS, format!("standard {standard_id} not found"))
            })
    }

    async fn get_format_rule(
        &self,
        _credential: &Credential,
        code_rule_id: &str,
    ) -> ExploreResult<String> {
        self.format_rules
            .read()
            .await
            .get(code_rule_id)
            .cloned()
            .ok_or_else(|| {
                ExploreError::downstream(STANDARDS, format!("code rule {code_rule_id} not found"))
            })
    }

    async fn get_dictionary(
        &self,
        _credential: &Credential,
        dict_id: &str,
    ) -> ExploreResult<Vec<DictItem>> {
        self.dictionaries
            .read()
            .await
            .get(dict_id)
            .cloned()
            .ok_or_else(|| {
                ExploreError::downstream(STANDARDS, format!("dictionary {dict_id} not found"))
            })
    }
}

/// 按字段技术名称关键字匹配分类主题
#[derive(Debug, Default)]
pub struct InMemoryClassificationService {
    keywords: RwLock<Vec<(String, String)>>,
}

impl InMemoryClassificationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// 技术名称包含 `keyword`（不区分大小写）的字段归入 `subject_id`
    pub async fn add_keyword(&self, keyword: &str, subject_id: &str) {
        self.keywords
            .write()
            .await
            .push((keyword.to_ascii_lowercase(), subject_id.to_string()));
    }
}

#[async_trait]
impl ClassificationService for InMemoryClassificationService {
    async fn classify(
        &self,
        _credential: &Credential,
        _view: &ViewMeta,
        fields: &[FieldMeta],
    ) -> ExploreResult<Vec<FieldSubjectMatch>> {
        let keywords = self.keywords.read().await;
        Ok(fields
            .iter()
            .filter_map(|field| {
                let name = field.technical_name.to_ascii_lowercase();
                keywords
                    .iter()
                    .find(|(keyword, _)| name.contains(keyword.as_str()))
                    .map(|(_, subject_id)| FieldSubjectMatch {
                        field_id: field.id.clone(),
                        subject_id: subject_id.clone(),
                        score: 1.0,
                    })
            })
            .collect())
    }
}
