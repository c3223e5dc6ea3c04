use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use translation_orchestrator::clock::ManualClock;
use translation_orchestrator::config::{OrchestratorConfig, WorkerConfig};
use translation_orchestrator::error::{OrchestratorError, OrchestratorResult};
use translation_orchestrator::messaging::{
    ClientNotification, CredentialUsage, DispatchRequest, JobSubmission, WorkerCallback,
};
use translation_orchestrator::models::{mask_secret, BatchTask, Job, RetryEntry, SubtitleLine, TranslatedLine};
use translation_orchestrator::orchestration::{Orchestrator, OrchestratorComponents};
use translation_orchestrator::services::{ClientNotifier, InMemoryQuota, QuotaService, WorkerClient};
use translation_orchestrator::store::{InMemoryStore, JobStore, StoreError, StoreResult};

type Responder = Box<dyn Fn(usize, &DispatchRequest) -> OrchestratorResult<()> + Send + Sync>;

/// Worker client that records every dispatch and answers from a script
pub struct FakeWorkerClient {
    responder: Responder,
    requests: Mutex<Vec<(String, DispatchRequest)>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeWorkerClient {
    pub fn accepting() -> Self {
        Self::scripted(|_, _| Ok(()))
    }

    /// `respond(call_number, request)`; call numbers start at 0
    pub fn scripted<F>(respond: F) -> Self
    where
        F: Fn(usize, &DispatchRequest) -> OrchestratorResult<()> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(respond),
            requests: Mutex::new(Vec::new()),
            latency: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Hold every dispatch open for `latency` so overlapping calls are observable
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Highest number of dispatches that were in flight at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(String, DispatchRequest)> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn calls_for(&self, composite_id: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|(_, request)| request.session_id == composite_id)
            .count()
    }
}

impl std::fmt::Debug for FakeWorkerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeWorkerClient")
            .field("calls", &self.calls())
            .finish()
    }
}

#[async_trait]
impl WorkerClient for FakeWorkerClient {
    async fn dispatch(&self, worker_url: &str, request: &DispatchRequest) -> OrchestratorResult<()> {
        let call = {
            let mut requests = self.requests.lock();
            requests.push((worker_url.to_string(), request.clone()));
            requests.len() - 1
        };
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.responder)(call, request)
    }
}

pub fn http_500() -> OrchestratorError {
    OrchestratorError::Remote {
        status: 500,
        message: "internal error".to_string(),
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, ClientNotification)>>,
}

#[async_trait]
impl ClientNotifier for RecordingNotifier {
    async fn notify(&self, callback_url: &str, notification: &ClientNotification) -> OrchestratorResult<()> {
        self.sent
            .lock()
            .push((callback_url.to_string(), notification.clone()));
        Ok(())
    }
}

pub fn worker_config(id: &str, rpm_limit: u32) -> WorkerConfig {
    WorkerConfig {
        id: id.to_string(),
        url: format!("http://{id}.test"),
        priority: 0,
        rpm_limit,
    }
}

/// Small delays so retries and selection backoff finish quickly
pub fn test_config(workers: Vec<WorkerConfig>) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.workers = workers;
    config.scheduler.selection_max_attempts = 2;
    config.scheduler.selection_base_delay_ms = 1;
    config.scheduler.selection_max_delay_ms = 2;
    config.retry.retry_delay_ms = 1;
    config.dispatch.callback_base_url = "http://orchestrator.test".to_string();
    config
}

pub const SECRET_A: &str = "AIzaSyA-first-secret-0001";
pub const SECRET_B: &str = "AIzaSyB-second-secret-0002";

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub store: Arc<InMemoryStore>,
    pub worker_client: Arc<FakeWorkerClient>,
    pub notifier: Arc<RecordingNotifier>,
    pub quota: Arc<InMemoryQuota>,
    pub clock: Arc<ManualClock>,
}

pub fn harness(config: OrchestratorConfig, secrets: &[&str], worker_client: FakeWorkerClient) -> Harness {
    let store = Arc::new(InMemoryStore::with_credentials(secrets.iter().copied()));
    harness_with_jobs(config, store.clone(), store, worker_client)
}

/// Harness whose job storage goes through `jobs` instead of `store`
pub fn harness_with_jobs(
    config: OrchestratorConfig,
    jobs: Arc<dyn JobStore>,
    store: Arc<InMemoryStore>,
    worker_client: FakeWorkerClient,
) -> Harness {
    let worker_client = Arc::new(worker_client);
    let notifier = Arc::new(RecordingNotifier::default());
    let quota = Arc::new(InMemoryQuota::new());
    let clock = Arc::new(ManualClock::default());

    let quota_service: Arc<dyn QuotaService> = quota.clone();
    let orchestrator = Orchestrator::new(
        config,
        OrchestratorComponents {
            jobs,
            credentials: store.clone(),
            worker_client: worker_client.clone(),
            notifier: notifier.clone(),
            quota: quota_service,
            clock: clock.clone(),
            instance_id: "test-instance".to_string(),
        },
    );

    Harness {
        orchestrator,
        store,
        worker_client,
        notifier,
        quota,
        clock,
    }
}

pub fn lines(count: u32) -> Vec<SubtitleLine> {
    (1..=count)
        .map(|index| SubtitleLine {
            index,
            text: format!("line {index}"),
        })
        .collect()
}

pub fn submission(session_id: &str, line_count: u32) -> JobSubmission {
    JobSubmission {
        session_id: session_id.to_string(),
        user_id: None,
        prompt: "Translate to Vietnamese".to_string(),
        system_instruction: "You are a subtitle translator".to_string(),
        target_language: "vi".to_string(),
        model: None,
        thinking_budget: None,
        callback_url: None,
        lines: lines(line_count),
    }
}

/// Success callback translating every line of `request`
pub fn success_callback(request: &DispatchRequest) -> WorkerCallback {
    let results: Vec<TranslatedLine> = request
        .lines
        .iter()
        .map(|line| TranslatedLine {
            index: line.index,
            original: line.text.clone(),
            translated: format!("dịch {}", line.text),
        })
        .collect();
    WorkerCallback {
        status: "completed".to_string(),
        total_lines: results.len() as u32,
        completed_lines: results.len() as u32,
        error: None,
        credential_usage: request
            .credentials
            .iter()
            .map(|secret| CredentialUsage {
                masked_key: mask_secret(secret),
                success_count: 1,
                failure_count: 0,
            })
            .collect(),
        results,
    }
}

/// Failure callback blaming the credentials of `request`
pub fn credential_failure_callback(request: &DispatchRequest) -> WorkerCallback {
    WorkerCallback {
        status: "failed".to_string(),
        total_lines: request.lines.len() as u32,
        completed_lines: 0,
        error: Some("429 RESOURCE_EXHAUSTED: quota exceeded for API key".to_string()),
        credential_usage: request
            .credentials
            .iter()
            .map(|secret| CredentialUsage {
                masked_key: mask_secret(secret),
                success_count: 0,
                failure_count: 1,
            })
            .collect(),
        results: Vec::new(),
    }
}

/// Job store that rejects the next `create_job` and otherwise delegates
#[derive(Debug)]
pub struct FailingCreateStore {
    inner: Arc<InMemoryStore>,
    fail_next_create: AtomicBool,
}

impl FailingCreateStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            fail_next_create: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl JobStore for FailingCreateStore {
    async fn create_job(&self, job: &Job, tasks: &[BatchTask]) -> StoreResult<()> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Serialization("connection reset while writing".to_string()));
        }
        self.inner.create_job(job, tasks).await
    }

    async fn get_job(&self, session_id: &str) -> StoreResult<Option<Job>> {
        self.inner.get_job(session_id).await
    }

    async fn save_job(&self, job: &Job) -> StoreResult<()> {
        self.inner.save_job(job).await
    }

    async fn list_active_jobs(&self) -> StoreResult<Vec<Job>> {
        self.inner.list_active_jobs().await
    }

    async fn get_task(&self, session_id: &str, batch_index: u32) -> StoreResult<Option<BatchTask>> {
        self.inner.get_task(session_id, batch_index).await
    }

    async fn save_task(&self, task: &BatchTask) -> StoreResult<()> {
        self.inner.save_task(task).await
    }

    async fn list_tasks(&self, session_id: &str) -> StoreResult<Vec<BatchTask>> {
        self.inner.list_tasks(session_id).await
    }

    async fn enqueue_retry(&self, entry: &RetryEntry) -> StoreResult<()> {
        self.inner.enqueue_retry(entry).await
    }

    async fn dequeue_retry(&self, session_id: &str) -> StoreResult<Option<RetryEntry>> {
        self.inner.dequeue_retry(session_id).await
    }

    async fn sessions_with_pending_retries(&self) -> StoreResult<Vec<String>> {
        self.inner.sessions_with_pending_retries().await
    }
}
