//! Central transition tables for jobs and batch tasks.
//!
//! Every status change in the crate goes through [`job_transition`] or
//! [`batch_transition`]; anything not listed in the tables is rejected.

use super::errors::{StateMachineError, StateMachineResult};
use super::events::{BatchEvent, JobEvent};
use super::states::{BatchTaskState, JobState};

/// Allowed job transitions as (from, to) pairs
pub const JOB_TRANSITIONS: &[(JobState, JobState)] = &[
    (JobState::Pending, JobState::Distributing),
    (JobState::Pending, JobState::Failed),
    (JobState::Distributing, JobState::Processing),
    (JobState::Distributing, JobState::Completed),
    (JobState::Distributing, JobState::PartialCompleted),
    (JobState::Distributing, JobState::Failed),
    (JobState::Processing, JobState::Completed),
    (JobState::Processing, JobState::PartialCompleted),
    (JobState::Processing, JobState::Failed),
];

/// Allowed batch task transitions as (from, to) pairs
pub const BATCH_TRANSITIONS: &[(BatchTaskState, BatchTaskState)] = &[
    (BatchTaskState::Pending, BatchTaskState::Sent),
    (BatchTaskState::Pending, BatchTaskState::Failed),
    (BatchTaskState::Sent, BatchTaskState::Processing),
    // Callback can beat the dispatch response
    (BatchTaskState::Sent, BatchTaskState::Completed),
    (BatchTaskState::Sent, BatchTaskState::Failed),
    (BatchTaskState::Processing, BatchTaskState::Completed),
    (BatchTaskState::Processing, BatchTaskState::Failed),
    (BatchTaskState::Failed, BatchTaskState::Retrying),
    (BatchTaskState::Retrying, BatchTaskState::Sent),
    (BatchTaskState::Retrying, BatchTaskState::Failed),
];

fn job_event_target(event: &JobEvent) -> JobState {
    match event {
        JobEvent::StartDistribution => JobState::Distributing,
        JobEvent::BeginProcessing => JobState::Processing,
        JobEvent::Complete => JobState::Completed,
        JobEvent::CompletePartially(_) => JobState::PartialCompleted,
        JobEvent::Fail(_) => JobState::Failed,
    }
}

fn batch_event_target(event: &BatchEvent) -> BatchTaskState {
    match event {
        BatchEvent::Send => BatchTaskState::Sent,
        BatchEvent::Accept => BatchTaskState::Processing,
        BatchEvent::Complete => BatchTaskState::Completed,
        BatchEvent::Fail(_) | BatchEvent::Exhaust(_) => BatchTaskState::Failed,
        BatchEvent::QueueRetry => BatchTaskState::Retrying,
    }
}

pub fn is_job_transition_allowed(from: JobState, to: JobState) -> bool {
    JOB_TRANSITIONS.contains(&(from, to))
}

pub fn is_batch_transition_allowed(from: BatchTaskState, to: BatchTaskState) -> bool {
    BATCH_TRANSITIONS.contains(&(from, to))
}

/// Resolve the target job state for `event`, rejecting transitions outside the table
pub fn job_transition(from: JobState, event: &JobEvent) -> StateMachineResult<JobState> {
    let to = job_event_target(event);
    if is_job_transition_allowed(from, to) {
        Ok(to)
    } else {
        Err(StateMachineError::InvalidTransition {
            entity: "job",
            from: from.to_string(),
            to: to.to_string(),
            event: event.event_type(),
        })
    }
}

/// Resolve the target batch state for `event`, rejecting transitions outside the table
pub fn batch_transition(
    from: BatchTaskState,
    event: &BatchEvent,
) -> StateMachineResult<BatchTaskState> {
    let to = batch_event_target(event);
    // Exhaust only applies to queued retries; Fail covers in-flight work
    let allowed = match event {
        BatchEvent::Exhaust(_) => from == BatchTaskState::Retrying,
        BatchEvent::Fail(_) => from != BatchTaskState::Retrying && is_batch_transition_allowed(from, to),
        _ => is_batch_transition_allowed(from, to),
    };

    if allowed {
        Ok(to)
    } else {
        Err(StateMachineError::InvalidTransition {
            entity: "batch task",
            from: from.to_string(),
            to: to.to_string(),
            event: event.event_type(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_happy_path() {
        let state = job_transition(JobState::Pending, &JobEvent::StartDistribution).unwrap();
        let state = job_transition(state, &JobEvent::BeginProcessing).unwrap();
        let state = job_transition(state, &JobEvent::Complete).unwrap();
        assert_eq!(state, JobState::Completed);
    }

    #[test]
    fn test_terminal_jobs_reject_everything() {
        for terminal in [JobState::Completed, JobState::PartialCompleted, JobState::Failed] {
            assert!(job_transition(terminal, &JobEvent::StartDistribution).is_err());
            assert!(job_transition(terminal, &JobEvent::Fail("late".into())).is_err());
        }
    }

    #[test]
    fn test_batch_retry_cycle() {
        let state = batch_transition(BatchTaskState::Pending, &BatchEvent::Send).unwrap();
        let state = batch_transition(state, &BatchEvent::Fail("500".into())).unwrap();
        let state = batch_transition(state, &BatchEvent::QueueRetry).unwrap();
        assert_eq!(state, BatchTaskState::Retrying);
        let state = batch_transition(state, &BatchEvent::Send).unwrap();
        let state = batch_transition(state, &BatchEvent::Accept).unwrap();
        let state = batch_transition(state, &BatchEvent::Complete).unwrap();
        assert_eq!(state, BatchTaskState::Completed);
    }

    #[test]
    fn test_completed_batch_cannot_be_resent() {
        let err = batch_transition(BatchTaskState::Completed, &BatchEvent::Send).unwrap_err();
        assert_eq!(
            err,
            StateMachineError::InvalidTransition {
                entity: "batch task",
                from: "completed".into(),
                to: "sent".into(),
                event: "send",
            }
        );
    }

    #[test]
    fn test_early_callback_beats_accept() {
        let state = batch_transition(BatchTaskState::Sent, &BatchEvent::Complete).unwrap();
        assert!(batch_transition(state, &BatchEvent::Accept).is_err());
    }

    #[test]
    fn test_exhaust_only_from_retrying() {
        assert!(batch_transition(BatchTaskState::Retrying, &BatchEvent::Exhaust("x".into())).is_ok());
        assert!(batch_transition(BatchTaskState::Processing, &BatchEvent::Exhaust("x".into())).is_err());
        // A stale callback cannot fail a queued retry
        assert!(batch_transition(BatchTaskState::Retrying, &BatchEvent::Fail("x".into())).is_err());
        assert!(batch_transition(BatchTaskState::Retrying, &BatchEvent::Complete).is_err());
    }
}
