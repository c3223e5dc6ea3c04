use std::sync::Arc;

use super::credential_allocator::CredentialAllocator;
use super::job_locks::JobLocks;
use super::worker_selector::WorkerSelector;
use crate::clock::SharedClock;
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{BatchTask, Job};
use crate::services::{ClientNotifier, QuotaService, WorkerClient};
use crate::store::JobStore;

/// Scheduler state and collaborators shared by every orchestration component
pub struct OrchestratorContext {
    pub config: Arc<OrchestratorConfig>,
    pub jobs: Arc<dyn JobStore>,
    pub credentials: Arc<CredentialAllocator>,
    pub workers: Arc<WorkerSelector>,
    pub worker_client: Arc<dyn WorkerClient>,
    pub notifier: Arc<dyn ClientNotifier>,
    pub quota: Arc<dyn QuotaService>,
    pub clock: SharedClock,
    pub locks: JobLocks,
    pub instance_id: String,
}

impl std::fmt::Debug for OrchestratorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorContext")
            .field("instance_id", &self.instance_id)
            .field("workers", &self.workers.len())
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl OrchestratorContext {
    pub async fn require_job(&self, session_id: &str) -> OrchestratorResult<Job> {
        self.jobs
            .get_job(session_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(session_id.to_string()))
    }

    pub async fn require_task(&self, session_id: &str, batch_index: u32) -> OrchestratorResult<BatchTask> {
        self.jobs
            .get_task(session_id, batch_index)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("{session_id}_batch{batch_index}")))
    }
}
