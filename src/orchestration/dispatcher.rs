//! # Dispatcher
//!
//! Sends batches to workers. The task is persisted as `sent` before the outbound
//! call so a callback that beats the HTTP response can still be correlated; the
//! job lock is released for the duration of the call.
//!
//! ## Failure handling
//!
//! A transport error or non-2xx answer fails the task, releases the worker slot
//! and records a worker failure. While the retry budget lasts the task moves to
//! `retrying` and a durable retry entry is written; otherwise it stays `failed`
//! and the job finalizer runs.

use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::context::OrchestratorContext;
use super::credential_allocator::Allocation;
use super::job_finalizer::{FinalizationResult, JobFinalizer};
use super::worker_selector::WorkerLease;
use crate::error::{AdmissionError, OrchestratorError, OrchestratorResult};
use crate::logging::log_batch_operation;
use crate::messaging::DispatchRequest;
use crate::models::{BatchTask, Credential, Job, RetryEntry};
use crate::state_machine::{BatchTaskState, JobEvent, JobState};

/// What happened to one dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Worker accepted the batch
    Accepted,
    /// A callback settled the task before the worker answered
    AlreadySettled,
    /// Dispatch failed and the batch went to the retry queue
    RetryQueued,
    /// Dispatch failed with no retry budget left
    Exhausted,
    /// Task or job was no longer dispatchable
    Skipped,
}

/// What a failed batch turned into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    RetryQueued,
    Terminal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionReport {
    pub session_id: String,
    pub dispatched: u32,
    pub outcomes: Vec<DispatchOutcome>,
    /// Pending batches left because every credential was cooling down
    pub waiting_for_credentials: bool,
}

/// Fail an in-flight task and queue a retry when `retryable` and budget remains
///
/// Caller holds the job lock. The worker slot is released and, for dispatch
/// failures, a worker failure is recorded.
pub async fn fail_batch_locked(
    ctx: &OrchestratorContext,
    task: &mut BatchTask,
    error: &str,
    retryable: bool,
    count_worker_failure: bool,
) -> OrchestratorResult<FailureDisposition> {
    let now = ctx.clock.now();
    task.mark_failed(error, now)?;

    let worker_id = task.worker_id.clone();
    if let Some(worker_id) = worker_id.as_deref() {
        ctx.workers.release(worker_id);
        if count_worker_failure {
            ctx.workers.record_failure(worker_id);
        }
    }

    let disposition = if retryable && task.retry_count < ctx.config.retry.max_retries {
        task.queue_retry()?;
        ctx.jobs.save_task(task).await?;
        ctx.jobs
            .enqueue_retry(&RetryEntry::new(
                &task.session_id,
                task.batch_index,
                worker_id,
                now,
            ))
            .await?;
        FailureDisposition::RetryQueued
    } else {
        ctx.jobs.save_task(task).await?;
        FailureDisposition::Terminal
    };

    log_batch_operation(
        "fail",
        &task.session_id,
        task.batch_index,
        task.worker_id.as_deref(),
        task.status.as_str(),
        Some(error),
    );
    Ok(disposition)
}

#[derive(Debug)]
pub struct Dispatcher {
    ctx: Arc<OrchestratorContext>,
    finalizer: Arc<JobFinalizer>,
    distributing: DashSet<String>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<OrchestratorContext>, finalizer: Arc<JobFinalizer>) -> Self {
        Self {
            ctx,
            finalizer,
            distributing: DashSet::new(),
        }
    }

    fn build_request(&self, job: &Job, task: &BatchTask, credentials: &[Credential], is_retry: bool) -> DispatchRequest {
        let batching = &self.ctx.config.batching;
        let internal = batching.internal_batch_size.max(1);
        DispatchRequest {
            model: job.model.clone(),
            prompt: job.prompt.clone(),
            system_instruction: job.system_instruction.clone(),
            lines: job.lines_for(task.start_line_index, task.line_count).to_vec(),
            session_id: task.key().to_string(),
            credentials: credentials.iter().map(|c| c.secret.clone()).collect(),
            batch_size: internal,
            thinking_budget: job.thinking_budget,
            callback_url: self
                .ctx
                .config
                .dispatch
                .callback_url(&job.session_id, task.batch_index),
            delay_between_batches_ms: batching.delay_between_batches_ms,
            total_internal_batches: task.line_count.div_ceil(internal),
            max_retries: batching.worker_max_retries,
            target_language: job.target_language.clone(),
            is_retry: is_retry.then_some(true),
            retry_count: is_retry.then_some(task.retry_count),
        }
    }

    /// Send one batch to the leased worker
    #[instrument(skip(self, lease, credentials), fields(worker_id = %lease.worker_id))]
    pub async fn dispatch_batch(
        &self,
        session_id: &str,
        batch_index: u32,
        lease: &WorkerLease,
        credentials: &[Credential],
        is_retry: bool,
    ) -> OrchestratorResult<DispatchOutcome> {
        let now = self.ctx.clock.now();

        let guard = self.ctx.locks.lock(session_id).await;
        let mut job = self.ctx.require_job(session_id).await?;
        let mut task = self.ctx.require_task(session_id, batch_index).await?;
        if job.status.is_terminal() || task.mark_sent(&lease.worker_id, now, is_retry).is_err() {
            self.ctx.workers.release(&lease.worker_id);
            debug!(
                session_id = %session_id,
                batch_index,
                task_status = %task.status,
                "Batch no longer dispatchable"
            );
            return Ok(DispatchOutcome::Skipped);
        }
        self.ctx.jobs.save_task(&task).await?;
        if job.status == JobState::Distributing {
            job.apply(JobEvent::BeginProcessing, now)?;
            self.ctx.jobs.save_job(&job).await?;
        }
        drop(guard);

        log_batch_operation(
            "dispatch",
            session_id,
            batch_index,
            Some(&lease.worker_id),
            task.status.as_str(),
            is_retry.then_some("retry"),
        );

        let request = self.build_request(&job, &task, credentials, is_retry);
        let sent = self.ctx.worker_client.dispatch(&lease.url, &request).await;

        let guard = self.ctx.locks.lock(session_id).await;
        let mut task = self.ctx.require_task(session_id, batch_index).await?;
        let (outcome, finalized) = match sent {
            Ok(()) => {
                if task.status == BatchTaskState::Sent && task.mark_accepted().is_ok() {
                    self.ctx.jobs.save_task(&task).await?;
                    (DispatchOutcome::Accepted, None)
                } else {
                    debug!(
                        session_id = %session_id,
                        batch_index,
                        task_status = %task.status,
                        "Callback settled the batch before the dispatch response"
                    );
                    (DispatchOutcome::AlreadySettled, None)
                }
            }
            Err(e) if task.status.is_in_flight() && task.worker_id.as_deref() == Some(lease.worker_id.as_str()) => {
                warn!(
                    session_id = %session_id,
                    batch_index,
                    worker_id = %lease.worker_id,
                    error = %e,
                    "Batch dispatch failed"
                );
                let message = e.to_string();
                match fail_batch_locked(&self.ctx, &mut task, &message, true, true).await? {
                    FailureDisposition::RetryQueued => (DispatchOutcome::RetryQueued, None),
                    FailureDisposition::Terminal => {
                        let finalized = self.finalizer.finalize_locked(session_id).await?;
                        (DispatchOutcome::Exhausted, finalized)
                    }
                }
            }
            Err(e) => {
                debug!(
                    session_id = %session_id,
                    batch_index,
                    error = %e,
                    "Dispatch failed after the batch was already settled"
                );
                (DispatchOutcome::AlreadySettled, None::<FinalizationResult>)
            }
        };
        drop(guard);
        self.finalizer.complete(finalized).await;
        Ok(outcome)
    }

    /// Dispatch every pending batch of a job
    ///
    /// Moves the job to `distributing`. When all credentials are cooling down the
    /// pending batches are left alone and the job waits in `distributing`.
    #[instrument(skip(self))]
    pub async fn distribute_job(&self, session_id: &str) -> OrchestratorResult<DistributionReport> {
        let mut report = DistributionReport {
            session_id: session_id.to_string(),
            ..Default::default()
        };
        if !self.distributing.insert(session_id.to_string()) {
            debug!(session_id = %session_id, "Distribution already running");
            return Ok(report);
        }
        let result = self.distribute_pending(session_id, &mut report).await;
        self.distributing.remove(session_id);
        result.map(|()| report)
    }

    async fn distribute_pending(&self, session_id: &str, report: &mut DistributionReport) -> OrchestratorResult<()> {
        let pending: Vec<BatchTask> = {
            let _guard = self.ctx.locks.lock(session_id).await;
            let mut job = self.ctx.require_job(session_id).await?;
            if job.status.is_terminal() {
                return Ok(());
            }
            if job.status == JobState::Pending {
                job.apply(JobEvent::StartDistribution, self.ctx.clock.now())?;
                self.ctx.jobs.save_job(&job).await?;
                info!(session_id = %session_id, total_lines = job.total_lines, "🚀 DISPATCHER: Distribution started");
            }
            self.ctx
                .jobs
                .list_tasks(session_id)
                .await?
                .into_iter()
                .filter(|task| task.status == BatchTaskState::Pending)
                .collect()
        };
        if pending.is_empty() {
            return Ok(());
        }

        let subsets = match self.ctx.credentials.allocate(pending.len()).await {
            Ok(Allocation::Assigned(subsets)) => subsets,
            Ok(Allocation::AllCooling { next_eligible_at }) => {
                info!(
                    session_id = %session_id,
                    pending = pending.len(),
                    next_eligible_at = ?next_eligible_at,
                    "⏳ DISPATCHER: All credentials cooling down, job waits in distributing"
                );
                report.waiting_for_credentials = true;
                return Ok(());
            }
            Err(OrchestratorError::Admission(AdmissionError::NoCredentials)) => {
                warn!(session_id = %session_id, "⏳ DISPATCHER: Credential pool emptied after admission, job waits");
                report.waiting_for_credentials = true;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let permits = Arc::new(Semaphore::new(self.ctx.workers.len().max(1)));
        let dispatches = pending.iter().zip(subsets.iter()).map(|(task, credentials)| {
            let permits = Arc::clone(&permits);
            async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| OrchestratorError::Configuration(e.to_string()))?;
                let lease = self
                    .ctx
                    .workers
                    .acquire(session_id, None)
                    .await
                    .map_err(|_| OrchestratorError::Admission(AdmissionError::NoWorkers))?;
                self.dispatch_batch(session_id, task.batch_index, &lease, credentials, false)
                    .await
            }
        });

        for result in futures::future::join_all(dispatches).await {
            match result {
                Ok(outcome) => {
                    if outcome != DispatchOutcome::Skipped {
                        report.dispatched += 1;
                    }
                    report.outcomes.push(outcome);
                }
                Err(e) => warn!(session_id = %session_id, error = %e, "Batch dispatch errored"),
            }
        }

        info!(
            session_id = %session_id,
            dispatched = report.dispatched,
            "📤 DISPATCHER: Initial wave sent"
        );
        Ok(())
    }
}
