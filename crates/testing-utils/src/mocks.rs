//! Scripted collaborators for testing
//!
//! The in-memory stores from `explore-infrastructure` cover persistence;
//! these doubles add what tests need on top: injected failures, panics,
//! delays, hooks that run mid-call, and call recording.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use explore_core::{
    ClassificationService, Credential, DistributedLock, ExecutionEngine, ExecutionFilter,
    ExecutionRecord, ExploreError, ExploreResult, FieldMeta, FieldSubjectMatch, JobRef, JobSpec,
    ViewMeta,
};
use explore_infrastructure::{InMemoryDistributedLock, InMemoryExecutionEngine};

/// Runs while a view is being classified, before the result is returned
pub type ClassifyHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Runs when a job for the view reaches the engine, before it is created
pub type DispatchHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
struct ClassifyScript {
    subjects: HashMap<String, String>,
    failures: HashSet<String>,
    panics: HashSet<String>,
    delays: HashMap<String, Duration>,
    hooks: HashMap<String, ClassifyHook>,
}

#[derive(Default)]
pub struct MockClassificationService {
    script: Mutex<ClassifyScript>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockClassificationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field `field_id` is classified as `subject_id`
    pub fn assign(&self, field_id: &str, subject_id: &str) {
        self.script
            .lock()
            .unwrap()
            .subjects
            .insert(field_id.to_string(), subject_id.to_string());
    }

    pub fn fail_on(&self, view_id: &str) {
        self.script
            .lock()
            .unwrap()
            .failures
            .insert(view_id.to_string());
    }

    pub fn panic_on(&self, view_id: &str) {
        self.script
            .lock()
            .unwrap()
            .panics
            .insert(view_id.to_string());
    }

    pub fn delay_on(&self, view_id: &str, delay: Duration) {
        self.script
            .lock()
            .unwrap()
            .delays
            .insert(view_id.to_string(), delay);
    }

    pub fn on_classify(&self, view_id: &str, hook: ClassifyHook) {
        self.script
            .lock()
            .unwrap()
            .hooks
            .insert(view_id.to_string(), hook);
    }

    /// View ids in the order they were classified
    pub fn classified_views(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(view_id, _)| view_id.clone())
            .collect()
    }

    /// User ids seen by the service, one per call
    pub fn callers(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, user_id)| user_id.clone())
            .collect()
    }
}

#[async_trait]
impl ClassificationService for MockClassificationService {
    async fn classify(
        &self,
        credential: &Credential,
        view: &ViewMeta,
        fields: &[FieldMeta],
    ) -> ExploreResult<Vec<FieldSubjectMatch>> {
        self.calls
            .lock()
            .unwrap()
            .push((view.id.clone(), credential.user_id.clone()));

        let (delay, hook, fail, panic, matches) = {
            let script = self.script.lock().unwrap();
            let matches: Vec<FieldSubjectMatch> = fields
                .iter()
                .filter_map(|f| {
                    script.subjects.get(&f.id).map(|subject_id| FieldSubjectMatch {
                        field_id: f.id.clone(),
                        subject_id: subject_id.clone(),
                        score: 0.9,
                    })
                })
                .collect();
            (
                script.delays.get(&view.id).copied(),
                script.hooks.get(&view.id).cloned(),
                script.failures.contains(&view.id),
                script.panics.contains(&view.id),
                matches,
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if panic {
            panic!("classification of view {} panicked", view.id);
        }
        if let Some(hook) = hook {
            hook().await;
        }
        if fail {
            return Err(ExploreError::downstream(
                "classification",
                format!("classification of view {} failed", view.id),
            ));
        }
        Ok(matches)
    }
}

/// Lock that can refuse a number of attempts before delegating
#[derive(Default)]
pub struct CountingLock {
    inner: InMemoryDistributedLock,
    refusals: AtomicUsize,
    attempts: AtomicUsize,
    unlocks: AtomicUsize,
}

impl CountingLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` attempts report the lock as held elsewhere
    pub fn refuse_next(&self, n: usize) {
        self.refusals.store(n, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn unlocks(&self) -> usize {
        self.unlocks.load(Ordering::SeqCst)
    }

    pub async fn is_locked(&self, name: &str) -> bool {
        self.inner.is_locked(name).await
    }
}

#[async_trait]
impl DistributedLock for CountingLock {
    async fn try_lock(&self, name: &str) -> ExploreResult<bool> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Ok(false);
        }
        self.inner.try_lock(name).await
    }

    async fn unlock(&self, name: &str) -> ExploreResult<()> {
        self.unlocks.fetch_add(1, Ordering::SeqCst);
        self.inner.unlock(name).await
    }
}

/// Execution engine that rejects jobs for selected views
pub struct FlakyExecutionEngine {
    inner: Arc<InMemoryExecutionEngine>,
    failing_views: Mutex<HashSet<String>>,
    deleted: Mutex<Vec<String>>,
    hooks: Mutex<HashMap<String, DispatchHook>>,
}

impl FlakyExecutionEngine {
    pub fn new(inner: Arc<InMemoryExecutionEngine>) -> Self {
        Self {
            inner,
            failing_views: Mutex::new(HashSet::new()),
            deleted: Mutex::new(Vec::new()),
            hooks: Mutex::new(HashMap::new()),
        }
    }

    pub fn fail_on(&self, view_id: &str) {
        self.failing_views
            .lock()
            .unwrap()
            .insert(view_id.to_string());
    }

    pub fn on_create(&self, view_id: &str, hook: DispatchHook) {
        self.hooks
            .lock()
            .unwrap()
            .insert(view_id.to_string(), hook);
    }

    pub fn deleted_jobs(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn check(&self, spec: &JobSpec) -> ExploreResult<()> {
        if self.failing_views.lock().unwrap().contains(&spec.view_id) {
            return Err(ExploreError::downstream(
                "execution-engine",
                format!("bad request: view {} rejected", spec.view_id),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionEngine for FlakyExecutionEngine {
    async fn create_job(&self, credential: &Credential, spec: &JobSpec) -> ExploreResult<JobRef> {
        self.check(spec)?;
        let hook = self.hooks.lock().unwrap().get(&spec.view_id).cloned();
        if let Some(hook) = hook {
            hook().await;
        }
        self.inner.create_job(credential, spec).await
    }

    async fn update_job(
        &self,
        credential: &Credential,
        job_id: &str,
        spec: &JobSpec,
    ) -> ExploreResult<JobRef> {
        self.check(spec)?;
        self.inner.update_job(credential, job_id, spec).await
    }

    async fn get_status(
        &self,
        credential: &Credential,
        filter: &ExecutionFilter,
    ) -> ExploreResult<Vec<ExecutionRecord>> {
        self.inner.get_status(credential, filter).await
    }

    async fn delete_job(&self, credential: &Credential, job_id: &str) -> ExploreResult<()> {
        self.deleted.lock().unwrap().push(job_id.to_string());
        self.inner.delete_job(credential, job_id).await
    }
}
