//! # Retry Coordinator
//!
//! Drains the durable per-job retry queue. Each entry re-runs credential
//! allocation and worker selection (steering away from the worker that failed)
//! and re-dispatches the batch as a retry.
//!
//! At most one drain runs per job. A drain requested while one is running sets a
//! rerun flag so the running drain makes another pass instead of losing the
//! request.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::context::OrchestratorContext;
use super::credential_allocator::Allocation;
use super::dispatcher::{DispatchOutcome, Dispatcher};
use super::job_finalizer::JobFinalizer;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::logging::{log_batch_operation, log_error};
use crate::models::RetryEntry;
use crate::state_machine::BatchTaskState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOutcome {
    Dispatched(DispatchOutcome),
    /// Nothing available right now; entry went back on the queue
    Requeued,
    /// Retry budget used up; the batch is terminally failed
    Exhausted,
    /// Entry no longer matched a retrying task
    Stale,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub processed: u32,
    pub outcomes: Vec<RetryOutcome>,
}

#[derive(Debug)]
pub struct RetryCoordinator {
    ctx: Arc<OrchestratorContext>,
    dispatcher: Arc<Dispatcher>,
    finalizer: Arc<JobFinalizer>,
    /// Sessions being drained, with their rerun flag
    draining: DashMap<String, bool>,
}

impl RetryCoordinator {
    pub fn new(ctx: Arc<OrchestratorContext>, dispatcher: Arc<Dispatcher>, finalizer: Arc<JobFinalizer>) -> Self {
        Self {
            ctx,
            dispatcher,
            finalizer,
            draining: DashMap::new(),
        }
    }

    /// Drain in the background
    pub fn schedule_drain(self: &Arc<Self>, session_id: &str) {
        let coordinator = Arc::clone(self);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = coordinator.drain_job(&session_id).await {
                log_error("retry_coordinator", "drain", &e.to_string(), Some(&session_id));
            }
        });
    }

    /// Process the job's retry queue until it is empty or only requeued entries remain
    #[instrument(skip(self))]
    pub async fn drain_job(&self, session_id: &str) -> OrchestratorResult<DrainReport> {
        match self.draining.entry(session_id.to_string()) {
            Entry::Occupied(mut running) => {
                *running.get_mut() = true;
                debug!(session_id = %session_id, "Drain already running, flagged for rerun");
                return Ok(DrainReport::default());
            }
            Entry::Vacant(slot) => {
                slot.insert(false);
            }
        }

        let mut report = DrainReport::default();
        let result = loop {
            if let Err(e) = self.drain_pass(session_id, &mut report).await {
                break Err(e);
            }
            let rerun = match self.draining.entry(session_id.to_string()) {
                Entry::Occupied(mut running) if *running.get() => {
                    *running.get_mut() = false;
                    true
                }
                Entry::Occupied(running) => {
                    running.remove();
                    false
                }
                Entry::Vacant(_) => false,
            };
            if !rerun {
                break Ok(());
            }
        };

        if result.is_err() {
            self.draining.remove(session_id);
        }
        result.map(|()| report)
    }

    async fn drain_pass(&self, session_id: &str, report: &mut DrainReport) -> OrchestratorResult<()> {
        while let Some(entry) = self.ctx.jobs.dequeue_retry(session_id).await? {
            let outcome = self.process_entry(entry).await?;
            report.processed += 1;
            report.outcomes.push(outcome);
            if outcome == RetryOutcome::Requeued {
                // The sweeper picks requeued entries up on its next tick
                break;
            }
        }
        Ok(())
    }

    async fn process_entry(&self, entry: RetryEntry) -> OrchestratorResult<RetryOutcome> {
        let session_id = entry.session_id.clone();
        let batch_index = entry.batch_index;
        let max_retries = self.ctx.config.retry.max_retries;

        {
            let guard = self.ctx.locks.lock(&session_id).await;
            let job = self.ctx.jobs.get_job(&session_id).await?;
            let task = self.ctx.jobs.get_task(&session_id, batch_index).await?;
            let (Some(job), Some(mut task)) = (job, task) else {
                return Ok(RetryOutcome::Stale);
            };
            if job.status.is_terminal() || task.status != BatchTaskState::Retrying {
                debug!(session_id = %session_id, batch_index, status = %task.status, "Stale retry entry");
                return Ok(RetryOutcome::Stale);
            }
            if task.retry_count >= max_retries {
                let reason = OrchestratorError::RetryExhausted {
                    batch: task.key().to_string(),
                }
                .to_string();
                task.exhaust(&reason, self.ctx.clock.now())?;
                self.ctx.jobs.save_task(&task).await?;
                log_batch_operation("exhaust", &session_id, batch_index, None, task.status.as_str(), Some(&reason));
                let finalized = self.finalizer.finalize_locked(&session_id).await?;
                drop(guard);
                self.finalizer.complete(finalized).await;
                return Ok(RetryOutcome::Exhausted);
            }
        }

        tokio::time::sleep(self.ctx.config.retry.retry_delay()).await;

        let credentials = match self.ctx.credentials.allocate(1).await {
            Ok(Allocation::Assigned(mut subsets)) => subsets.pop().unwrap_or_default(),
            Ok(Allocation::AllCooling { .. }) | Err(OrchestratorError::Admission(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        if credentials.is_empty() {
            return self.requeue(entry, "no eligible credential").await;
        }

        let lease = match self
            .ctx
            .workers
            .acquire(&session_id, entry.exclude_worker_id.as_deref())
            .await
        {
            Ok(lease) => lease,
            Err(_) => return self.requeue(entry, "no worker registered").await,
        };

        info!(
            session_id = %session_id,
            batch_index,
            worker_id = %lease.worker_id,
            avoided = ?entry.exclude_worker_id,
            "🔁 RETRY: Re-dispatching batch"
        );
        let outcome = self
            .dispatcher
            .dispatch_batch(&session_id, batch_index, &lease, &credentials, true)
            .await?;
        Ok(RetryOutcome::Dispatched(outcome))
    }

    async fn requeue(&self, entry: RetryEntry, reason: &str) -> OrchestratorResult<RetryOutcome> {
        let now = self.ctx.clock.now();
        let entry = entry.requeued(now);
        if entry.attempts > self.ctx.config.retry.max_retries {
            let session_id = entry.session_id.clone();
            let guard = self.ctx.locks.lock(&session_id).await;
            if let Some(mut task) = self.ctx.jobs.get_task(&session_id, entry.batch_index).await? {
                if task.status == BatchTaskState::Retrying {
                    let reason = format!("retry exhausted: {reason}");
                    task.exhaust(&reason, now)?;
                    self.ctx.jobs.save_task(&task).await?;
                }
            }
            let finalized = self.finalizer.finalize_locked(&session_id).await?;
            drop(guard);
            self.finalizer.complete(finalized).await;
            warn!(
                session_id = %session_id,
                batch_index = entry.batch_index,
                attempts = entry.attempts,
                reason,
                "🔁 RETRY: Dropping batch after repeated requeues"
            );
            return Ok(RetryOutcome::Exhausted);
        }

        debug!(
            session_id = %entry.session_id,
            batch_index = entry.batch_index,
            attempts = entry.attempts,
            reason,
            "Requeueing retry entry"
        );
        self.ctx.jobs.enqueue_retry(&entry).await?;
        Ok(RetryOutcome::Requeued)
    }
}
