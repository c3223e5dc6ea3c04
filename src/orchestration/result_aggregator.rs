//! # Result Aggregator
//!
//! Applies worker callbacks to batch tasks. Callbacks arrive out of order and may
//! be redelivered; each one is applied under the job lock and callbacks for
//! unknown or already-terminal batches are accepted as no-ops.
//!
//! ## Steps per callback
//!
//! 1. Load the batch task (unknown → discard, terminal → no-op)
//! 2. Mark it completed or failed and release the worker slot
//! 3. Apply credential usage reports to the pool
//! 4. Queue a retry for credential-attributable failures with budget left
//! 5. Recompute `completedLines` and progress
//! 6. Finalize the job once every batch is terminal

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::context::OrchestratorContext;
use super::dispatcher::{fail_batch_locked, FailureDisposition};
use super::error_classifier::{classify_callback_failure, FailureCategory};
use super::job_finalizer::{completed_line_count, JobFinalizer};
use super::retry_coordinator::RetryCoordinator;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::logging::log_batch_operation;
use crate::messaging::{BatchKey, WorkerCallback};
use crate::state_machine::JobState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    Completed,
    Failed,
    RetryQueued,
    /// Batch was already terminal
    Duplicate,
    /// No such batch, or the batch is not in flight
    Ignored,
}

impl CallbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RetryQueued => "retry_queued",
            Self::Duplicate => "duplicate",
            Self::Ignored => "ignored",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackReceipt {
    pub outcome: CallbackOutcome,
    pub completed_lines: u32,
    /// Set when this callback finalized the job
    pub job_status: Option<JobState>,
}

impl CallbackReceipt {
    fn noop(outcome: CallbackOutcome) -> Self {
        Self {
            outcome,
            completed_lines: 0,
            job_status: None,
        }
    }
}

enum Payload {
    Report(WorkerCallback),
    Malformed(String),
}

#[derive(Debug)]
pub struct ResultAggregator {
    ctx: Arc<OrchestratorContext>,
    finalizer: Arc<JobFinalizer>,
    retry: Arc<RetryCoordinator>,
}

impl ResultAggregator {
    pub fn new(ctx: Arc<OrchestratorContext>, finalizer: Arc<JobFinalizer>, retry: Arc<RetryCoordinator>) -> Self {
        Self {
            ctx,
            finalizer,
            retry,
        }
    }

    /// Apply a decoded worker callback
    #[instrument(skip(self, callback), fields(status = %callback.status))]
    pub async fn handle_callback(
        &self,
        session_id: &str,
        batch_index: u32,
        callback: WorkerCallback,
    ) -> OrchestratorResult<CallbackReceipt> {
        self.apply(session_id, batch_index, Payload::Report(callback)).await
    }

    /// Callback keyed by the composite `{sessionId}_batch{n}` id
    pub async fn handle_keyed_callback(&self, key: &str, callback: WorkerCallback) -> OrchestratorResult<CallbackReceipt> {
        let key: BatchKey = key
            .parse()
            .map_err(|e: crate::messaging::BatchKeyError| OrchestratorError::Validation(e.to_string()))?;
        self.handle_callback(&key.session_id, key.batch_index, callback).await
    }

    /// A callback body that could not be decoded fails only its own batch
    #[instrument(skip(self))]
    pub async fn handle_malformed_callback(
        &self,
        session_id: &str,
        batch_index: u32,
        parse_error: &str,
    ) -> OrchestratorResult<CallbackReceipt> {
        self.apply(session_id, batch_index, Payload::Malformed(parse_error.to_string()))
            .await
    }

    async fn apply(&self, session_id: &str, batch_index: u32, payload: Payload) -> OrchestratorResult<CallbackReceipt> {
        let guard = self.ctx.locks.lock(session_id).await;

        let noop = match self.ctx.jobs.get_task(session_id, batch_index).await? {
            None => {
                debug!(session_id = %session_id, batch_index, "Callback for unknown batch discarded");
                Err(CallbackOutcome::Ignored)
            }
            Some(task) if task.is_terminal() => {
                debug!(session_id = %session_id, batch_index, status = %task.status, "Duplicate callback ignored");
                Err(CallbackOutcome::Duplicate)
            }
            Some(task) if !task.status.is_in_flight() => {
                debug!(session_id = %session_id, batch_index, status = %task.status, "Callback for batch not in flight ignored");
                Err(CallbackOutcome::Ignored)
            }
            Some(task) => Ok(task),
        };
        let mut task = match noop {
            Ok(task) => task,
            Err(outcome) => {
                drop(guard);
                self.ctx.locks.forget(session_id);
                return Ok(CallbackReceipt::noop(outcome));
            }
        };

        let now = self.ctx.clock.now();
        let worker_id = task.worker_id.clone();
        let outcome = match payload {
            Payload::Report(callback) => {
                if let Err(e) = self.ctx.credentials.record_usage(&callback.credential_usage).await {
                    warn!(session_id = %session_id, batch_index, error = %e, "Credential usage not recorded");
                }

                if callback.is_success() {
                    let returned = callback.results.len();
                    task.mark_completed(callback.results, now)?;
                    self.ctx.jobs.save_task(&task).await?;
                    if let Some(worker_id) = worker_id.as_deref() {
                        self.ctx.workers.release(worker_id);
                    }
                    log_batch_operation(
                        "complete",
                        session_id,
                        batch_index,
                        worker_id.as_deref(),
                        task.status.as_str(),
                        None,
                    );
                    debug!(session_id = %session_id, batch_index, returned, "Batch results stored");
                    CallbackOutcome::Completed
                } else {
                    let category = classify_callback_failure(&callback);
                    let error = callback
                        .error
                        .clone()
                        .unwrap_or_else(|| format!("worker reported status '{}'", callback.status));
                    info!(
                        session_id = %session_id,
                        batch_index,
                        category = %category,
                        error = %error,
                        "Worker reported batch failure"
                    );
                    let retryable = category == FailureCategory::Credential;
                    match fail_batch_locked(&self.ctx, &mut task, &error, retryable, true).await? {
                        FailureDisposition::RetryQueued => CallbackOutcome::RetryQueued,
                        FailureDisposition::Terminal => CallbackOutcome::Failed,
                    }
                }
            }
            Payload::Malformed(parse_error) => {
                let error = OrchestratorError::Parse(parse_error).to_string();
                warn!(session_id = %session_id, batch_index, error = %error, "Malformed callback fails its batch");
                fail_batch_locked(&self.ctx, &mut task, &error, false, false).await?;
                CallbackOutcome::Failed
            }
        };

        let tasks = self.ctx.jobs.list_tasks(session_id).await?;
        let mut completed_lines = 0;
        let mut job_finished = true;
        if let Some(mut job) = self.ctx.jobs.get_job(session_id).await? {
            if !job.status.is_terminal() {
                completed_lines = job.record_progress(completed_line_count(&tasks), now);
                self.ctx.jobs.save_job(&job).await?;
                job_finished = false;
            } else {
                completed_lines = job.completed_lines;
            }
        }

        let finalized = if tasks.iter().all(|t| t.is_terminal()) {
            self.finalizer.finalize_locked(session_id).await?
        } else {
            None
        };
        drop(guard);
        if job_finished {
            self.ctx.locks.forget(session_id);
        }

        let job_status = self.finalizer.complete(finalized).await;
        if outcome == CallbackOutcome::RetryQueued {
            self.retry.schedule_drain(session_id);
        }

        Ok(CallbackReceipt {
            outcome,
            completed_lines,
            job_status,
        })
    }
}
