//! # Job Sweeper
//!
//! Periodic pass over active jobs. It resumes jobs left waiting for a credential,
//! drains retry queues whose entries were requeued, expires jobs past their
//! maximum lifetime and finalizes jobs whose batches are all terminal.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::context::OrchestratorContext;
use super::dispatcher::Dispatcher;
use super::job_finalizer::JobFinalizer;
use super::retry_coordinator::RetryCoordinator;
use crate::error::OrchestratorResult;
use crate::logging::log_error;
use crate::state_machine::BatchTaskState;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub active_jobs: u32,
    pub resumed: u32,
    pub drained: u32,
    pub expired: u32,
    pub finalized: u32,
}

#[derive(Debug)]
pub struct JobSweeper {
    ctx: Arc<OrchestratorContext>,
    dispatcher: Arc<Dispatcher>,
    retry: Arc<RetryCoordinator>,
    finalizer: Arc<JobFinalizer>,
    shutdown: Arc<Notify>,
}

impl JobSweeper {
    pub fn new(
        ctx: Arc<OrchestratorContext>,
        dispatcher: Arc<Dispatcher>,
        retry: Arc<RetryCoordinator>,
        finalizer: Arc<JobFinalizer>,
    ) -> Self {
        Self {
            ctx,
            dispatcher,
            retry,
            finalizer,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// One pass over every active job
    pub async fn sweep_once(&self) -> OrchestratorResult<SweepReport> {
        let mut report = SweepReport::default();
        let now = self.ctx.clock.now();
        let max_lifetime = self.ctx.config.jobs.max_lifetime();

        let jobs = self.ctx.jobs.list_active_jobs().await?;
        report.active_jobs = jobs.len() as u32;

        for job in jobs {
            let session_id = job.session_id.clone();
            let expired = max_lifetime.is_some_and(|lifetime| job.is_expired(now, lifetime));
            if let Err(e) = self.sweep_job(&session_id, expired, &mut report).await {
                warn!(session_id = %session_id, error = %e, "Sweep of job failed");
            }
        }

        for session_id in self.ctx.jobs.sessions_with_pending_retries().await? {
            match self.retry.drain_job(&session_id).await {
                Ok(drain) if drain.processed > 0 => report.drained += 1,
                Ok(_) => {}
                Err(e) => warn!(session_id = %session_id, error = %e, "Retry drain during sweep failed"),
            }
        }

        if report != SweepReport::default() {
            debug!(
                active_jobs = report.active_jobs,
                resumed = report.resumed,
                drained = report.drained,
                expired = report.expired,
                finalized = report.finalized,
                "🧹 SWEEPER: Pass finished"
            );
        }
        Ok(report)
    }

    async fn sweep_job(&self, session_id: &str, expired: bool, report: &mut SweepReport) -> OrchestratorResult<()> {
        if expired {
            if self.finalizer.expire_job(session_id).await?.is_some() {
                report.expired += 1;
            }
            return Ok(());
        }

        let tasks = self.ctx.jobs.list_tasks(session_id).await?;
        if tasks.iter().any(|t| t.status == BatchTaskState::Pending) {
            let distribution = self.dispatcher.distribute_job(session_id).await?;
            if distribution.dispatched > 0 {
                report.resumed += 1;
            }
            return Ok(());
        }

        if self.finalizer.finalize_if_complete(session_id).await?.is_some() {
            report.finalized += 1;
        }
        Ok(())
    }

    /// Run `sweep_once` every `interval` until [`JobSweeper::stop`]
    pub fn spawn(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let sweeper = Arc::clone(self);
        info!(interval_ms = interval.as_millis() as u64, "🧹 SWEEPER: Starting");
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {},
                    _ = sweeper.shutdown.notified() => {
                        info!("🧹 SWEEPER: Stopped");
                        break;
                    }
                }
                if let Err(e) = sweeper.sweep_once().await {
                    log_error("sweeper", "sweep_once", &e.to_string(), None);
                }
            }
        })
    }

    pub fn stop(&self) {
        self.shutdown.notify_one();
    }
}
