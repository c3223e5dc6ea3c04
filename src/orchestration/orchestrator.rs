//! # Orchestrator
//!
//! Single entry point that wires the scheduling components together and exposes
//! the operations the web layer and the binary use: job submission, status and
//! results queries, worker callbacks and the sweeper.
//!
//! ## Submission
//!
//! `accept_job` validates, checks admission (workers, credentials, duplicate
//! session, quota), plans batches and persists the job with its tasks. Quota that
//! was charged is refunded when persisting fails. `submit_job` additionally
//! spawns the distribution of the job as its own unit of work.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use super::batch_planner::plan_batches;
use super::context::OrchestratorContext;
use super::credential_allocator::CredentialAllocator;
use super::dispatcher::{Dispatcher, DistributionReport};
use super::job_finalizer::{merge_completed, JobFinalizer};
use super::job_locks::JobLocks;
use super::result_aggregator::{CallbackReceipt, ResultAggregator};
use super::retry_coordinator::{DrainReport, RetryCoordinator};
use super::sweeper::{JobSweeper, SweepReport};
use super::worker_selector::WorkerSelector;
use crate::clock::SharedClock;
use crate::config::OrchestratorConfig;
use crate::error::{AdmissionError, OrchestratorError, OrchestratorResult};
use crate::logging::log_job_operation;
use crate::messaging::{JobResultsReport, JobStatusReport, JobSubmission, SubmissionReceipt, WorkerCallback};
use crate::models::{BatchTask, Credential, Job, Worker};
use crate::services::{ClientNotifier, QuotaService, WorkerClient};
use crate::state_machine::BatchTaskState;
use crate::store::{CredentialStore, JobStore, StoreError};
use crate::utils::sanitize_lines;

/// Collaborators injected into [`Orchestrator::new`]
pub struct OrchestratorComponents {
    pub jobs: Arc<dyn JobStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub worker_client: Arc<dyn WorkerClient>,
    pub notifier: Arc<dyn ClientNotifier>,
    pub quota: Arc<dyn QuotaService>,
    pub clock: SharedClock,
    pub instance_id: String,
}

/// Batch count per batch state name, every state present
pub fn task_stats(tasks: &[BatchTask]) -> std::collections::BTreeMap<String, u32> {
    let mut stats: std::collections::BTreeMap<String, u32> = BatchTaskState::ALL
        .iter()
        .map(|state| (state.as_str().to_string(), 0))
        .collect();
    for task in tasks {
        *stats.entry(task.status.as_str().to_string()).or_insert(0) += 1;
    }
    stats
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    ctx: Arc<OrchestratorContext>,
    finalizer: Arc<JobFinalizer>,
    dispatcher: Arc<Dispatcher>,
    retry: Arc<RetryCoordinator>,
    aggregator: Arc<ResultAggregator>,
    sweeper: Arc<JobSweeper>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, components: OrchestratorComponents) -> Self {
        let OrchestratorComponents {
            jobs,
            credentials,
            worker_client,
            notifier,
            quota,
            clock,
            instance_id,
        } = components;

        let workers = Arc::new(WorkerSelector::new(
            &config.workers,
            config.scheduler.clone(),
            Arc::clone(&clock),
        ));
        let allocator = Arc::new(CredentialAllocator::new(
            credentials,
            config.credentials.clone(),
            Arc::clone(&clock),
        ));

        let ctx = Arc::new(OrchestratorContext {
            config: Arc::new(config),
            jobs,
            credentials: allocator,
            workers,
            worker_client,
            notifier,
            quota,
            clock,
            locks: JobLocks::new(),
            instance_id,
        });

        let finalizer = Arc::new(JobFinalizer::new(Arc::clone(&ctx)));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&ctx), Arc::clone(&finalizer)));
        let retry = Arc::new(RetryCoordinator::new(
            Arc::clone(&ctx),
            Arc::clone(&dispatcher),
            Arc::clone(&finalizer),
        ));
        let aggregator = Arc::new(ResultAggregator::new(
            Arc::clone(&ctx),
            Arc::clone(&finalizer),
            Arc::clone(&retry),
        ));
        let sweeper = Arc::new(JobSweeper::new(
            Arc::clone(&ctx),
            Arc::clone(&dispatcher),
            Arc::clone(&retry),
            Arc::clone(&finalizer),
        ));

        info!(
            instance_id = %ctx.instance_id,
            workers = ctx.workers.len(),
            "✅ Orchestrator initialized"
        );

        Self {
            ctx,
            finalizer,
            dispatcher,
            retry,
            aggregator,
            sweeper,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.ctx.config
    }

    pub fn instance_id(&self) -> &str {
        &self.ctx.instance_id
    }

    fn validate(submission: &JobSubmission) -> OrchestratorResult<()> {
        if submission.session_id.trim().is_empty() {
            return Err(OrchestratorError::Validation("sessionId is required".to_string()));
        }
        if submission.lines.is_empty() {
            return Err(OrchestratorError::Validation("lines must not be empty".to_string()));
        }
        Ok(())
    }

    /// Validate, admit and persist a job without starting distribution
    #[instrument(skip(self, submission), fields(session_id = %submission.session_id))]
    pub async fn accept_job(&self, submission: JobSubmission) -> OrchestratorResult<SubmissionReceipt> {
        Self::validate(&submission)?;

        if self.ctx.workers.is_empty() {
            return Err(AdmissionError::NoWorkers.into());
        }
        if self.ctx.credentials.registered_count().await? == 0 {
            return Err(AdmissionError::NoCredentials.into());
        }
        if self.ctx.jobs.get_job(&submission.session_id).await?.is_some() {
            return Err(OrchestratorError::DuplicateSession(submission.session_id));
        }

        let now = self.ctx.clock.now();
        let job = Job::from_submission(submission, &self.ctx.config.jobs.default_model, now);

        let charged_user = match job.user_id.as_deref() {
            Some(user_id) => {
                let granted = self
                    .ctx
                    .quota
                    .check_and_charge_lines(user_id, job.total_lines)
                    .await
                    .map_err(|e| OrchestratorError::Quota(e.to_string()))?;
                if !granted {
                    return Err(AdmissionError::InsufficientQuota {
                        requested: job.total_lines,
                    }
                    .into());
                }
                Some(user_id.to_string())
            }
            None => None,
        };

        let batching = &self.ctx.config.batching;
        let plans = plan_batches(job.total_lines, batching.batch_size, batching.merge_threshold);
        let tasks: Vec<BatchTask> = plans
            .iter()
            .map(|plan| BatchTask::planned(&job.session_id, plan))
            .collect();

        if let Err(e) = self.persist(&job, &tasks).await {
            if let Some(user_id) = charged_user.as_deref() {
                if let Err(refund) = self.ctx.quota.refund_lines(user_id, job.total_lines).await {
                    error!(
                        session_id = %job.session_id,
                        user_id = %user_id,
                        error = %refund,
                        "Quota rollback after failed submission did not complete"
                    );
                }
            }
            return Err(e);
        }

        let batch_count = tasks.len() as u32;
        let servers_assigned = batch_count.min(self.ctx.workers.len() as u32);
        log_job_operation("accept", &job.session_id, job.status.as_str(), None);
        info!(
            session_id = %job.session_id,
            total_lines = job.total_lines,
            batch_count,
            servers_assigned,
            "📥 Job accepted"
        );

        Ok(SubmissionReceipt {
            session_id: job.session_id.clone(),
            status: job.status,
            total_lines: job.total_lines,
            batch_count,
            servers_assigned,
            message: format!(
                "Job accepted: {} lines in {} batches",
                job.total_lines, batch_count
            ),
        })
    }

    async fn persist(&self, job: &Job, tasks: &[BatchTask]) -> OrchestratorResult<()> {
        match self.ctx.jobs.create_job(job, tasks).await {
            Ok(()) => Ok(()),
            Err(StoreError::Duplicate { entity: "job", .. }) => {
                Err(OrchestratorError::DuplicateSession(job.session_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Accept a job and start distributing it in the background
    pub async fn submit_job(&self, submission: JobSubmission) -> OrchestratorResult<SubmissionReceipt> {
        let receipt = self.accept_job(submission).await?;
        let orchestrator = self.clone();
        let session_id = receipt.session_id.clone();
        tokio::spawn(async move {
            orchestrator.run_distribution(&session_id).await;
        });
        Ok(receipt)
    }

    /// Initial dispatch wave followed by a drain of the retry queue
    pub async fn run_distribution(&self, session_id: &str) -> (Option<DistributionReport>, Option<DrainReport>) {
        let distribution = match self.dispatcher.distribute_job(session_id).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Job distribution failed");
                None
            }
        };
        let drain = match self.retry.drain_job(session_id).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Retry drain after distribution failed");
                None
            }
        };
        (distribution, drain)
    }

    pub async fn job_status(&self, session_id: &str) -> OrchestratorResult<JobStatusReport> {
        let job = self.ctx.require_job(session_id).await?;
        let tasks = self.ctx.jobs.list_tasks(session_id).await?;
        Ok(JobStatusReport {
            session_id: job.session_id,
            status: job.status,
            progress: job.progress,
            total_lines: job.total_lines,
            completed_lines: job.completed_lines,
            error: job.error_message,
            task_stats: task_stats(&tasks),
        })
    }

    /// Merged results; partial results so far while the job is still running
    pub async fn job_results(&self, session_id: &str) -> OrchestratorResult<JobResultsReport> {
        let job = self.ctx.require_job(session_id).await?;
        let merged = match job.results {
            Some(results) => results,
            None => merge_completed(&self.ctx.jobs.list_tasks(session_id).await?),
        };
        let mut results = sanitize_lines(merged);
        results.sort_by_key(|line| line.index);

        Ok(JobResultsReport {
            session_id: job.session_id,
            status: job.status,
            total_lines: job.total_lines,
            completed_lines: job.completed_lines,
            results,
            error: job.error_message,
            created_at: job.created_at,
            completed_at: job.completed_at,
        })
    }

    pub async fn handle_worker_callback(
        &self,
        session_id: &str,
        batch_index: u32,
        callback: WorkerCallback,
    ) -> OrchestratorResult<CallbackReceipt> {
        self.aggregator
            .handle_callback(session_id, batch_index, callback)
            .await
    }

    pub async fn handle_keyed_callback(&self, key: &str, callback: WorkerCallback) -> OrchestratorResult<CallbackReceipt> {
        self.aggregator.handle_keyed_callback(key, callback).await
    }

    pub async fn handle_malformed_callback(
        &self,
        session_id: &str,
        batch_index: u32,
        parse_error: &str,
    ) -> OrchestratorResult<CallbackReceipt> {
        warn!(session_id = %session_id, batch_index, "Undecodable worker callback");
        self.aggregator
            .handle_malformed_callback(session_id, batch_index, parse_error)
            .await
    }

    pub fn workers(&self) -> Vec<Worker> {
        self.ctx.workers.snapshot()
    }

    /// Jobs that currently own a lock entry
    pub fn tracked_job_locks(&self) -> usize {
        self.ctx.locks.len()
    }

    /// Credential pool with current counters; secrets stay inside [`Credential`]
    pub async fn credentials(&self) -> Vec<Credential> {
        self.ctx.credentials.snapshot().await
    }

    pub async fn sweep_once(&self) -> OrchestratorResult<SweepReport> {
        self.sweeper.sweep_once().await
    }

    pub async fn expire_job(&self, session_id: &str) -> OrchestratorResult<bool> {
        Ok(self.finalizer.expire_job(session_id).await?.is_some())
    }

    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.sweeper.spawn(self.ctx.config.jobs.sweep_interval())
    }

    pub fn spawn_sweeper_every(&self, interval: Duration) -> JoinHandle<()> {
        self.sweeper.spawn(interval)
    }

    pub fn stop_sweeper(&self) {
        self.sweeper.stop();
    }
}
