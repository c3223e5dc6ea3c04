use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lines::TranslatedLine;
use crate::messaging::BatchKey;
use crate::orchestration::batch_planner::BatchPlan;
use crate::state_machine::{batch_transition, BatchEvent, BatchTaskState, StateMachineResult};

/// One batch of a job and its delivery state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTask {
    pub session_id: String,
    pub batch_index: u32,
    pub start_line_index: u32,
    pub line_count: u32,
    pub worker_id: Option<String>,
    pub status: BatchTaskState,
    pub retry_count: u32,
    pub results: Option<Vec<TranslatedLine>>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchTask {
    pub fn planned(session_id: &str, plan: &BatchPlan) -> Self {
        Self {
            session_id: session_id.to_string(),
            batch_index: plan.batch_index,
            start_line_index: plan.start_line_index,
            line_count: plan.line_count,
            worker_id: None,
            status: BatchTaskState::Pending,
            retry_count: 0,
            results: None,
            error_message: None,
            sent_at: None,
            completed_at: None,
        }
    }

    pub fn key(&self) -> BatchKey {
        BatchKey::new(&self.session_id, self.batch_index)
    }

    pub fn end_line_index(&self) -> u32 {
        self.start_line_index + self.line_count
    }

    fn transition(&mut self, event: &BatchEvent) -> StateMachineResult<BatchTaskState> {
        let target = batch_transition(self.status, event)?;
        self.status = target;
        Ok(target)
    }

    /// Record the outbound attempt; retries bump `retry_count`
    pub fn mark_sent(
        &mut self,
        worker_id: &str,
        now: DateTime<Utc>,
        is_retry: bool,
    ) -> StateMachineResult<()> {
        self.transition(&BatchEvent::Send)?;
        self.worker_id = Some(worker_id.to_string());
        self.sent_at = Some(now);
        self.error_message = None;
        if is_retry {
            self.retry_count += 1;
        }
        Ok(())
    }

    pub fn mark_accepted(&mut self) -> StateMachineResult<()> {
        self.transition(&BatchEvent::Accept).map(|_| ())
    }

    pub fn mark_completed(
        &mut self,
        results: Vec<TranslatedLine>,
        now: DateTime<Utc>,
    ) -> StateMachineResult<()> {
        self.transition(&BatchEvent::Complete)?;
        self.results = Some(results);
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn mark_failed(&mut self, error: &str, now: DateTime<Utc>) -> StateMachineResult<()> {
        let event = BatchEvent::Fail(error.to_string());
        self.transition(&event)?;
        self.error_message = Some(error.to_string());
        self.completed_at = Some(now);
        Ok(())
    }

    /// Reopen a failed task for another attempt
    pub fn queue_retry(&mut self) -> StateMachineResult<()> {
        self.transition(&BatchEvent::QueueRetry)?;
        self.completed_at = None;
        Ok(())
    }

    /// Close a queued retry for good
    pub fn exhaust(&mut self, reason: &str, now: DateTime<Utc>) -> StateMachineResult<()> {
        self.transition(&BatchEvent::Exhaust(reason.to_string()))?;
        self.error_message = Some(reason.to_string());
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
