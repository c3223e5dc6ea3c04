//! # Job Finalizer
//!
//! Turns a job whose batches are all terminal into a terminal job: merges the
//! completed batches in line order, picks the final status, refunds quota for
//! failed batches and sends the client completion callback.
//!
//! ## Final status
//!
//! | Completed batches | Failed batches | Job status          |
//! |-------------------|----------------|---------------------|
//! | all               | none           | `completed`         |
//! | some              | some           | `partialcompleted`  |
//! | none              | all            | `failed`            |

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::context::OrchestratorContext;
use crate::error::OrchestratorResult;
use crate::logging::log_job_operation;
use crate::messaging::ClientNotification;
use crate::models::{BatchTask, Job, TranslatedLine};
use crate::state_machine::{BatchTaskState, JobEvent, JobState};

/// Outcome of a finalization, returned so callers can notify outside the job lock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizationResult {
    pub session_id: String,
    pub status: JobState,
    pub completed_batches: u32,
    pub failed_batches: u32,
    pub refunded_lines: u32,
    pub callback_url: Option<String>,
    pub notification: ClientNotification,
}

/// Results of completed batches ordered by start line, then line index
pub fn merge_completed(tasks: &[BatchTask]) -> Vec<TranslatedLine> {
    let mut completed: Vec<&BatchTask> = tasks
        .iter()
        .filter(|task| task.status == BatchTaskState::Completed)
        .collect();
    completed.sort_by_key(|task| task.start_line_index);

    completed
        .into_iter()
        .flat_map(|task| {
            let mut lines = task.results.clone().unwrap_or_default();
            lines.sort_by_key(|line| line.index);
            lines
        })
        .collect()
}

/// Sum of line counts of completed batches
pub fn completed_line_count(tasks: &[BatchTask]) -> u32 {
    tasks
        .iter()
        .filter(|task| task.status == BatchTaskState::Completed)
        .map(|task| task.line_count)
        .sum()
}

fn notification_for(job: &Job) -> ClientNotification {
    ClientNotification {
        session_id: job.session_id.clone(),
        status: job.status,
        total_lines: job.total_lines,
        completed_lines: job.completed_lines,
        progress: job.progress,
        error: job.error_message.clone(),
    }
}

#[derive(Debug)]
pub struct JobFinalizer {
    ctx: Arc<OrchestratorContext>,
}

impl JobFinalizer {
    pub fn new(ctx: Arc<OrchestratorContext>) -> Self {
        Self { ctx }
    }

    /// Finalize if every batch is terminal; takes the job lock
    pub async fn finalize_if_complete(&self, session_id: &str) -> OrchestratorResult<Option<JobState>> {
        let guard = self.ctx.locks.lock(session_id).await;
        let result = self.finalize_locked(session_id).await?;
        drop(guard);
        Ok(self.complete(result).await)
    }

    /// Finalize while the caller holds the job lock
    #[instrument(skip(self))]
    pub async fn finalize_locked(&self, session_id: &str) -> OrchestratorResult<Option<FinalizationResult>> {
        let Some(mut job) = self.ctx.jobs.get_job(session_id).await? else {
            return Ok(None);
        };
        if job.status.is_terminal() {
            return Ok(None);
        }

        let tasks = self.ctx.jobs.list_tasks(session_id).await?;
        if tasks.is_empty() || tasks.iter().any(|task| !task.is_terminal()) {
            return Ok(None);
        }

        let completed = tasks
            .iter()
            .filter(|t| t.status == BatchTaskState::Completed)
            .count() as u32;
        let failed_tasks: Vec<&BatchTask> = tasks
            .iter()
            .filter(|t| t.status == BatchTaskState::Failed)
            .collect();
        let failed = failed_tasks.len() as u32;
        let failed_lines: u32 = failed_tasks.iter().map(|t| t.line_count).sum();

        let event = if failed == 0 {
            JobEvent::Complete
        } else {
            let reason = job.error_message.clone().unwrap_or_else(|| {
                let indices: Vec<String> =
                    failed_tasks.iter().map(|t| t.batch_index.to_string()).collect();
                format!(
                    "{failed} of {} batches failed (batches {})",
                    tasks.len(),
                    indices.join(", ")
                )
            });
            if completed == 0 {
                JobEvent::Fail(reason)
            } else {
                JobEvent::CompletePartially(reason)
            }
        };

        let now = self.ctx.clock.now();
        job.record_progress(completed_line_count(&tasks), now);
        let status = job.finalize(merge_completed(&tasks), event, now)?;
        self.ctx.jobs.save_job(&job).await?;

        let refunded_lines = self.refund(&job, failed_lines).await;

        log_job_operation(
            "finalize",
            session_id,
            status.as_str(),
            job.error_message.as_deref(),
        );
        info!(
            session_id = %session_id,
            status = %status,
            completed_batches = completed,
            failed_batches = failed,
            refunded_lines,
            "🏁 FINALIZER: Job reached terminal state"
        );

        Ok(Some(FinalizationResult {
            session_id: session_id.to_string(),
            status,
            completed_batches: completed,
            failed_batches: failed,
            refunded_lines,
            callback_url: job.callback_url.clone(),
            notification: notification_for(&job),
        }))
    }

    async fn refund(&self, job: &Job, failed_lines: u32) -> u32 {
        let Some(user_id) = job.user_id.as_deref() else {
            return 0;
        };
        if failed_lines == 0 {
            return 0;
        }
        match self.ctx.quota.refund_lines(user_id, failed_lines).await {
            Ok(()) => failed_lines,
            Err(e) => {
                error!(
                    session_id = %job.session_id,
                    user_id = %user_id,
                    failed_lines,
                    error = %e,
                    "Quota refund failed"
                );
                0
            }
        }
    }

    /// Post-lock half of finalization: client callback and lock cleanup
    pub async fn complete(&self, result: Option<FinalizationResult>) -> Option<JobState> {
        let result = result?;
        self.notify(&result).await;
        self.ctx.locks.forget(&result.session_id);
        Some(result.status)
    }

    /// Best effort; failures are logged and never retried
    pub async fn notify(&self, result: &FinalizationResult) {
        let Some(url) = result.callback_url.as_deref() else {
            return;
        };
        match self.ctx.notifier.notify(url, &result.notification).await {
            Ok(()) => debug!(session_id = %result.session_id, "Client notified"),
            Err(e) => warn!(
                session_id = %result.session_id,
                callback_url = %url,
                error = %e,
                "Client completion callback failed"
            ),
        }
    }

    /// Fail every unfinished batch of a job that outlived its maximum lifetime
    #[instrument(skip(self))]
    pub async fn expire_job(&self, session_id: &str) -> OrchestratorResult<Option<JobState>> {
        let guard = self.ctx.locks.lock(session_id).await;
        let mut job = self.ctx.require_job(session_id).await?;
        if job.status.is_terminal() {
            return Ok(None);
        }

        let now = self.ctx.clock.now();
        let reason = "job exceeded its maximum lifetime";
        for mut task in self.ctx.jobs.list_tasks(session_id).await? {
            let worker_id = task.worker_id.clone();
            match task.status {
                BatchTaskState::Pending => task.mark_failed(reason, now)?,
                BatchTaskState::Sent | BatchTaskState::Processing => {
                    task.mark_failed(reason, now)?;
                    if let Some(worker_id) = worker_id.as_deref() {
                        self.ctx.workers.release(worker_id);
                    }
                }
                BatchTaskState::Retrying => task.exhaust(reason, now)?,
                BatchTaskState::Completed | BatchTaskState::Failed => continue,
            }
            self.ctx.jobs.save_task(&task).await?;
        }
        while self.ctx.jobs.dequeue_retry(session_id).await?.is_some() {}

        job.error_message = Some(reason.to_string());
        self.ctx.jobs.save_job(&job).await?;
        warn!(session_id = %session_id, "⏰ FINALIZER: Expiring job past its maximum lifetime");

        let result = self.finalize_locked(session_id).await?;
        drop(guard);
        Ok(self.complete(result).await)
    }
}
