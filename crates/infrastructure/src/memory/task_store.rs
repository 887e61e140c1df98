use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use explore_core::{
    ExploreError, ExploreKind, ExploreResult, ExploreTarget, ExploreTask, ExploreTaskRepository,
    ExploreTaskStatus, JobRef, Page, Paged, SubTask, SubTaskRepository, TaskFilter,
};

use super::paginate;

#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, ExploreTask>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.tasks.read().await.len()
    }
}

#[async_trait]
impl ExploreTaskRepository for InMemoryTaskStore {
    async fn create(&self, task: &ExploreTask) -> ExploreResult<ExploreTask> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(ExploreError::conflict(format!("任务ID已存在: {}", task.id)));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(task.clone())
    }

    async fn create_batch(&self, tasks: &[ExploreTask]) -> ExploreResult<Vec<ExploreTask>> {
        let mut store = self.tasks.write().await;
        if let Some(dup) = tasks.iter().find(|t| store.contains_key(&t.id)) {
            return Err(ExploreError::conflict(format!("任务ID已存在: {}", dup.id)));
        }
        for task in tasks {
            store.insert(task.id.clone(), task.clone());
        }
        Ok(tasks.to_vec())
    }

    async fn get_by_id(&self, id: &str) -> ExploreResult<Option<ExploreTask>> {
        Ok(self.tasks.read().await.get(id).cloned())
    }

    async fn update(&self, task: &ExploreTask) -> ExploreResult<()> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => Err(ExploreError::task_not_found(&task.id)),
        }
    }

    async fn update_if_status(
        &self,
        task: &ExploreTask,
        expected: ExploreTaskStatus,
    ) -> ExploreResult<bool> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.id) {
            Some(existing) if existing.status == expected => {
                *existing = task.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(ExploreError::task_not_found(&task.id)),
        }
    }

    async fn set_external_job(&self, id: &str, job: &JobRef) -> ExploreResult<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| ExploreError::task_not_found(id))?;
        task.external_job = Some(job.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> ExploreResult<()> {
        self.tasks
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ExploreError::task_not_found(id))
    }

    async fn list(&self, filter: &TaskFilter, page: Page) -> ExploreResult<Paged<ExploreTask>> {
        let tasks = self.tasks.read().await;
        let mut matched: Vec<ExploreTask> =
            tasks.values().filter(|t| filter.matches(t)).cloned().collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(paginate(matched, page))
    }

    async fn find_active(
        &self,
        target: &ExploreTarget,
        kind: ExploreKind,
    ) -> ExploreResult<Option<ExploreTask>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .find(|t| &t.target == target && t.kind == kind && t.is_active())
            .cloned())
    }

    async fn next_schedulable(&self, kinds: &[ExploreKind]) -> ExploreResult<Option<ExploreTask>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .filter(|t| t.is_active() && kinds.contains(&t.kind))
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySubTaskStore {
    sub_tasks: RwLock<HashMap<String, SubTask>>,
}

impl InMemorySubTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubTaskRepository for InMemorySubTaskStore {
    async fn create_batch(&self, sub_tasks: &[SubTask]) -> ExploreResult<()> {
        let mut store = self.sub_tasks.write().await;
        for sub_task in sub_tasks {
            store.insert(sub_task.id.clone(), sub_task.clone());
        }
        Ok(())
    }

    async fn list_by_parent(&self, parent_task_id: &str) -> ExploreResult<Vec<SubTask>> {
        let store = self.sub_tasks.read().await;
        let mut sub_tasks: Vec<SubTask> = store
            .values()
            .filter(|s| s.parent_task_id == parent_task_id)
            .cloned()
            .collect();
        sub_tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(sub_tasks)
    }

    async fn update(&self, sub_task: &SubTask) -> ExploreResult<()> {
        let mut store = self.sub_tasks.write().await;
        match store.get_mut(&sub_task.id) {
            Some(existing) => {
                *existing = sub_task.clone();
                Ok(())
            }
            None => Err(ExploreError::task_not_found(&sub_task.id)),
        }
    }

    async fn update_if_status(
        &self,
        sub_task: &SubTask,
        expected: ExploreTaskStatus,
    ) -> ExploreResult<bool> {
        let mut store = self.sub_tasks.write().await;
        match store.get_mut(&sub_task.id) {
            Some(existing) if existing.status == expected => {
                *existing = sub_task.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(ExploreError::task_not_found(&sub_task.id)),
        }
    }

    async fn update_active_status(
        &self,
        parent_task_id: &str,
        status: ExploreTaskStatus,
    ) -> ExploreResult<u64> {
        let mut store = self.sub_tasks.write().await;
        let mut affected = 0;
        for sub_task in store
            .values_mut()
            .filter(|s| s.parent_task_id == parent_task_id && s.status.is_active())
        {
            sub_task.mark(status, None);
            affected += 1;
        }
        Ok(affected)
    }

    async fn delete_by_parent(&self, parent_task_id: &str) -> ExploreResult<u64> {
        let mut store = self.sub_tasks.write().await;
        let before = store.len();
        store.retain(|_, s| s.parent_task_id != parent_task_id);
        Ok((before - store.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use explore_core::Credential;

    fn task(kind: ExploreKind, target: &str, age_secs: i64) -> ExploreTask {
        let mut task = ExploreTask::new(
            kind,
            ExploreTarget::Datasource(target.to_string()),
            Credential::new("u-1", "alice", ""),
        );
        task.created_at = Utc::now() - Duration::seconds(age_secs);
        task
    }

    #[tokio::test]
    async fn test_next_schedulable_picks_oldest_matching_kind() {
        let store = InMemoryTaskStore::new();
        let newer = task(ExploreKind::ClassificationExplore, "ds-1", 10);
        let older = task(ExploreKind::ClassificationGradeExplore, "ds-2", 60);
        let data = task(ExploreKind::DataExplore, "ds-3", 120);
        store.create_batch(&[newer, older.clone(), data]).await.unwrap();

        let next = store
            .next_schedulable(&ExploreKind::SCHEDULED)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.id, older.id);
    }

    #[tokio::test]
    async fn test_find_active_ignores_terminal_tasks() {
        let store = InMemoryTaskStore::new();
        let mut done = task(ExploreKind::DataExplore, "ds-1", 5);
        done.status = ExploreTaskStatus::Finished;
        store.create(&done).await.unwrap();

        let target = ExploreTarget::Datasource("ds-1".to_string());
        assert!(store
            .find_active(&target, ExploreKind::DataExplore)
            .await
            .unwrap()
            .is_none());

        let active = task(ExploreKind::DataExplore, "ds-1", 1);
        store.create(&active).await.unwrap();
        let found = store
            .find_active(&target, ExploreKind::DataExplore)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, active.id);
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_paged() {
        let store = InMemoryTaskStore::new();
        for i in 0..5 {
            store
                .create(&task(ExploreKind::DataExplore, &format!("ds-{i}"), i * 10))
                .await
                .unwrap();
        }

        let page = store
            .list(&TaskFilter::default(), Page { offset: 1, limit: 2 })
            .await
            .unwrap();
        assert_eq!(page.total_count, 5);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].target.id(), "ds-1");
        assert_eq!(page.entries[1].target.id(), "ds-2");
    }

    #[tokio::test]
    async fn test_conditional_update_keeps_concurrent_cancel() {
        let store = InMemoryTaskStore::new();
        let mut running = task(ExploreKind::ClassificationExplore, "ds-1", 5);
        running.status = ExploreTaskStatus::Running;
        store.create(&running).await.unwrap();

        let mut canceled = running.clone();
        canceled.transition_to(ExploreTaskStatus::Canceled).unwrap();
        assert!(store
            .update_if_status(&canceled, ExploreTaskStatus::Running)
            .await
            .unwrap());

        let mut finished = running.clone();
        finished.transition_to(ExploreTaskStatus::Finished).unwrap();
        assert!(!store
            .update_if_status(&finished, ExploreTaskStatus::Running)
            .await
            .unwrap());

        let stored = store.get_by_id(&running.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExploreTaskStatus::Canceled);
        assert!(store
            .update_if_status(&task(ExploreKind::DataExplore, "x", 0), ExploreTaskStatus::Queued)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_set_external_job_leaves_status_alone() {
        let store = InMemoryTaskStore::new();
        let mut queued = task(ExploreKind::DataExplore, "ds-1", 5);
        store.create(&queued).await.unwrap();

        queued.transition_to(ExploreTaskStatus::Canceled).unwrap();
        store.update(&queued).await.unwrap();

        let job = JobRef {
            job_id: "job-1".to_string(),
            version: 1,
        };
        store.set_external_job(&queued.id, &job).await.unwrap();

        let stored = store.get_by_id(&queued.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExploreTaskStatus::Canceled);
        assert_eq!(stored.external_job, Some(job));
    }

    #[tokio::test]
    async fn test_sub_task_conditional_update() {
        let store = InMemorySubTaskStore::new();
        let sub_task = SubTask::new("p-1", "v-1");
        store.create_batch(&[sub_task.clone()]).await.unwrap();
        store
            .update_active_status("p-1", ExploreTaskStatus::Canceled)
            .await
            .unwrap();

        let mut running = sub_task.clone();
        running.mark(ExploreTaskStatus::Running, None);
        assert!(!store
            .update_if_status(&running, ExploreTaskStatus::Queued)
            .await
            .unwrap());
        let stored = store.list_by_parent("p-1").await.unwrap();
        assert_eq!(stored[0].status, ExploreTaskStatus::Canceled);
    }

    #[tokio::test]
    async fn test_sub_task_status_sweep() {
        let store = InMemorySubTaskStore::new();
        let mut finished = SubTask::new("p-1", "v-1");
        finished.mark(ExploreTaskStatus::Finished, None);
        let queued = SubTask::new("p-1", "v-2");
        let other = SubTask::new("p-2", "v-3");
        store
            .create_batch(&[finished, queued, other])
            .await
            .unwrap();

        let affected = store
            .update_active_status("p-1", ExploreTaskStatus::Canceled)
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let statuses: Vec<_> = store
            .list_by_parent("p-1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.status)
            .collect();
        assert!(statuses.contains(&ExploreTaskStatus::Finished));
        assert!(statuses.contains(&ExploreTaskStatus::Canceled));

        assert_eq!(store.delete_by_parent("p-1").await.unwrap(), 2);
        assert_eq!(store.list_by_parent("p-2").await.unwrap().len(), 1);
    }
}
