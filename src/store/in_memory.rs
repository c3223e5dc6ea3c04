//! Process-local store used by tests and by deployments without a database.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};

use super::errors::{StoreError, StoreResult};
use super::traits::{CredentialStore, JobStore};
use crate::models::{BatchTask, Credential, Job, RetryEntry};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    jobs: DashMap<String, Job>,
    tasks: DashMap<String, BTreeMap<u32, BatchTask>>,
    retries: DashMap<String, VecDeque<RetryEntry>>,
    credentials: Mutex<BTreeMap<i64, Credential>>,
    next_credential_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            next_credential_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    pub fn with_credentials<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        {
            let mut credentials = store.credentials.lock();
            for secret in secrets {
                let id = store.next_credential_id.fetch_add(1, Ordering::SeqCst);
                credentials.insert(id, Credential::new(id, secret));
            }
        }
        store
    }

    pub fn retry_queue_len(&self, session_id: &str) -> usize {
        self.retries.get(session_id).map_or(0, |queue| queue.len())
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn create_job(&self, job: &Job, tasks: &[BatchTask]) -> StoreResult<()> {
        use dashmap::mapref::entry::Entry;
        let mut planned = BTreeMap::new();
        for task in tasks {
            if task.session_id != job.session_id || planned.contains_key(&task.batch_index) {
                return Err(StoreError::duplicate("batch task", task.key().to_string()));
            }
            planned.insert(task.batch_index, task.clone());
        }
        match self.jobs.entry(job.session_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::duplicate("job", &job.session_id)),
            Entry::Vacant(slot) => {
                self.tasks.insert(job.session_id.clone(), planned);
                slot.insert(job.clone());
                Ok(())
            }
        }
    }

    async fn get_job(&self, session_id: &str) -> StoreResult<Option<Job>> {
        Ok(self.jobs.get(session_id).map(|job| job.clone()))
    }

    async fn save_job(&self, job: &Job) -> StoreResult<()> {
        let mut existing = self
            .jobs
            .get_mut(&job.session_id)
            .ok_or_else(|| StoreError::not_found("job", &job.session_id))?;
        *existing = job.clone();
        Ok(())
    }

    async fn list_active_jobs(&self) -> StoreResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|job| !job.status.is_terminal())
            .map(|job| job.clone())
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn get_task(&self, session_id: &str, batch_index: u32) -> StoreResult<Option<BatchTask>> {
        Ok(self
            .tasks
            .get(session_id)
            .and_then(|tasks| tasks.get(&batch_index).cloned()))
    }

    async fn save_task(&self, task: &BatchTask) -> StoreResult<()> {
        let mut tasks = self
            .tasks
            .get_mut(&task.session_id)
            .ok_or_else(|| StoreError::not_found("batch task", task.key().to_string()))?;
        let existing = tasks
            .get_mut(&task.batch_index)
            .ok_or_else(|| StoreError::not_found("batch task", task.key().to_string()))?;
        *existing = task.clone();
        Ok(())
    }

    async fn list_tasks(&self, session_id: &str) -> StoreResult<Vec<BatchTask>> {
        Ok(self
            .tasks
            .get(session_id)
            .map(|tasks| tasks.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn enqueue_retry(&self, entry: &RetryEntry) -> StoreResult<()> {
        let mut queue = self.retries.entry(entry.session_id.clone()).or_default();
        queue.retain(|queued| queued.batch_index != entry.batch_index);
        queue.push_back(entry.clone());
        Ok(())
    }

    async fn dequeue_retry(&self, session_id: &str) -> StoreResult<Option<RetryEntry>> {
        Ok(self
            .retries
            .get_mut(session_id)
            .and_then(|mut queue| queue.pop_front()))
    }

    async fn sessions_with_pending_retries(&self) -> StoreResult<Vec<String>> {
        let mut sessions: Vec<String> = self
            .retries
            .iter()
            .filter(|queue| !queue.is_empty())
            .map(|queue| queue.key().clone())
            .collect();
        sessions.sort();
        Ok(sessions)
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn list_credentials(&self) -> StoreResult<Vec<Credential>> {
        Ok(self.credentials.lock().values().cloned().collect())
    }

    async fn save_credential(&self, credential: &Credential) -> StoreResult<()> {
        let mut credentials = self.credentials.lock();
        let existing = credentials
            .get_mut(&credential.id)
            .ok_or_else(|| StoreError::not_found("credential", credential.id.to_string()))?;
        *existing = credential.clone();
        Ok(())
    }

    async fn add_credential(&self, secret: &str) -> StoreResult<Credential> {
        let mut credentials = self.credentials.lock();
        if let Some(existing) = credentials.values().find(|c| c.secret == secret) {
            return Ok(existing.clone());
        }
        let id = self.next_credential_id.fetch_add(1, Ordering::SeqCst);
        let credential = Credential::new(id, secret);
        credentials.insert(id, credential.clone());
        Ok(credential)
    }
}
