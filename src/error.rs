//! # Orchestrator Errors
//!
//! Crate-level error taxonomy. Admission failures surface synchronously to the
//! submitter; transport/remote failures feed the retry queue; parse failures stay
//! isolated to one batch. Nothing here is fatal to the process.

use crate::state_machine::StateMachineError;
use crate::store::StoreError;
use thiserror::Error;

/// Reasons a job is refused at submission time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("no workers are registered")]
    NoWorkers,

    #[error("no credentials are registered")]
    NoCredentials,

    #[error("insufficient quota for {requested} lines")]
    InsufficientQuota { requested: u32 },
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Worker returned HTTP {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Retries exhausted for {batch}")]
    RetryExhausted { batch: String },

    #[error("State transition error: {0}")]
    StateTransition(#[from] StateMachineError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Quota service error: {0}")]
    Quota(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Session {0} already exists")]
    DuplicateSession(String),
}

impl OrchestratorError {
    /// Transport and remote failures are the ones the retry queue absorbs
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Remote { .. })
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;
