use serde::{Deserialize, Serialize};

/// Events that can trigger job state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum JobEvent {
    /// The distribution loop picked the job up
    StartDistribution,
    /// First batch was handed to a worker
    BeginProcessing,
    /// All batches succeeded
    Complete,
    /// Some batches succeeded, some were exhausted
    CompletePartially(String),
    /// No batch succeeded, or the job expired
    Fail(String),
}

impl JobEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StartDistribution => "start_distribution",
            Self::BeginProcessing => "begin_processing",
            Self::Complete => "complete",
            Self::CompletePartially(_) => "complete_partially",
            Self::Fail(_) => "fail",
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::CompletePartially(msg) | Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Events that can trigger batch task state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BatchEvent {
    /// Persisted ahead of the outbound call
    Send,
    /// Worker answered the dispatch with 2xx
    Accept,
    /// Success callback arrived
    Complete,
    /// Dispatch or callback failure
    Fail(String),
    /// Re-opened and placed on the retry queue
    QueueRetry,
    /// Retry budget spent while queued
    Exhaust(String),
}

impl BatchEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Accept => "accept",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::QueueRetry => "queue_retry",
            Self::Exhaust(_) => "exhaust",
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) | Self::Exhaust(msg) => Some(msg),
            _ => None,
        }
    }
}
