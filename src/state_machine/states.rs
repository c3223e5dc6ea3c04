use serde::{Deserialize, Serialize};
use std::fmt;

/// Job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Accepted, batches planned, nothing dispatched yet
    #[default]
    Pending,
    /// Initial dispatch wave in progress (or waiting for a credential)
    Distributing,
    /// At least one batch is out with a worker
    Processing,
    /// Every batch succeeded
    Completed,
    /// Some batches succeeded, the rest exhausted their retries
    PartialCompleted,
    /// No batch succeeded
    Failed,
}

impl JobState {
    pub const ALL: [JobState; 6] = [
        Self::Pending,
        Self::Distributing,
        Self::Processing,
        Self::Completed,
        Self::PartialCompleted,
        Self::Failed,
    ];

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PartialCompleted | Self::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Distributing => "distributing",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::PartialCompleted => "partialcompleted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "distributing" => Ok(Self::Distributing),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "partialcompleted" => Ok(Self::PartialCompleted),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid job state: {s}")),
        }
    }
}

/// Batch task lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BatchTaskState {
    /// Planned, not yet handed to a worker
    #[default]
    Pending,
    /// Persisted as sent; the outbound call may still be in flight
    Sent,
    /// Worker accepted the batch, waiting for its callback
    Processing,
    /// Worker reported success and results are stored
    Completed,
    /// Failed; terminal unless re-opened for retry
    Failed,
    /// Queued in the durable retry queue
    Retrying,
}

impl BatchTaskState {
    pub const ALL: [BatchTaskState; 6] = [
        Self::Pending,
        Self::Sent,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::Retrying,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a worker is currently holding this batch
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Sent | Self::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        }
    }
}

impl fmt::Display for BatchTaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BatchTaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "retrying" => Ok(Self::Retrying),
            _ => Err(format!("Invalid batch task state: {s}")),
        }
    }
}
