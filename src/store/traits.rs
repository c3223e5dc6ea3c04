use async_trait::async_trait;

use super::errors::StoreResult;
use crate::models::{BatchTask, Credential, Job, RetryEntry};

/// Authoritative storage for jobs, batch tasks and the durable retry queue
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a job with its planned batch tasks, all or nothing
    ///
    /// Fails with `Duplicate` when the session id is taken.
    async fn create_job(&self, job: &Job, tasks: &[BatchTask]) -> StoreResult<()>;

    async fn get_job(&self, session_id: &str) -> StoreResult<Option<Job>>;

    async fn save_job(&self, job: &Job) -> StoreResult<()>;

    /// Jobs whose status is not terminal
    async fn list_active_jobs(&self) -> StoreResult<Vec<Job>>;

    async fn get_task(&self, session_id: &str, batch_index: u32) -> StoreResult<Option<BatchTask>>;

    async fn save_task(&self, task: &BatchTask) -> StoreResult<()>;

    /// All tasks of a job ordered by batch index
    async fn list_tasks(&self, session_id: &str) -> StoreResult<Vec<BatchTask>>;

    /// Insert or replace the queue entry for `(session_id, batch_index)`
    async fn enqueue_retry(&self, entry: &RetryEntry) -> StoreResult<()>;

    /// Remove and return the oldest entry of a job
    async fn dequeue_retry(&self, session_id: &str) -> StoreResult<Option<RetryEntry>>;

    async fn sessions_with_pending_retries(&self) -> StoreResult<Vec<String>>;
}

/// Credential pool storage; secrets are opaque here
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn list_credentials(&self) -> StoreResult<Vec<Credential>>;

    async fn save_credential(&self, credential: &Credential) -> StoreResult<()>;

    /// Register a secret; re-adding a known secret returns the existing credential
    async fn add_credential(&self, secret: &str) -> StoreResult<Credential>;
}
