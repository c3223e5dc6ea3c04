//! # Wire Messages
//!
//! JSON bodies exchanged with clients and workers. Everything is camelCase on the
//! wire; optional fields are omitted rather than sent as `null`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{SubtitleLine, TranslatedLine};
use crate::state_machine::JobState;

/// Client request to translate a subtitle file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub system_instruction: String,
    #[serde(default)]
    pub target_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub lines: Vec<SubtitleLine>,
}

/// Synchronous answer to a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub session_id: String,
    pub status: JobState,
    pub total_lines: u32,
    pub batch_count: u32,
    pub servers_assigned: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub session_id: String,
    pub status: JobState,
    pub progress: f64,
    pub total_lines: u32,
    pub completed_lines: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Batch count per batch state name
    pub task_stats: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResultsReport {
    pub session_id: String,
    pub status: JobState,
    pub total_lines: u32,
    pub completed_lines: u32,
    pub results: Vec<TranslatedLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Body of `POST {worker.url}/translate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub model: String,
    pub prompt: String,
    pub system_instruction: String,
    pub lines: Vec<SubtitleLine>,
    /// Composite `{sessionId}_batch{n}` id
    pub session_id: String,
    pub credentials: Vec<String>,
    pub batch_size: u32,
    pub thinking_budget: Option<i64>,
    pub callback_url: String,
    pub delay_between_batches_ms: u64,
    pub total_internal_batches: u32,
    pub max_retries: u32,
    pub target_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_retry: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

/// Per-credential usage a worker reports back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialUsage {
    pub masked_key: String,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
}

/// Body of `POST /callback/{sessionId}/{batchIndex}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerCallback {
    pub status: String,
    #[serde(default)]
    pub total_lines: u32,
    #[serde(default)]
    pub completed_lines: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub credential_usage: Vec<CredentialUsage>,
    #[serde(default)]
    pub results: Vec<TranslatedLine>,
}

impl WorkerCallback {
    pub fn is_success(&self) -> bool {
        matches!(
            self.status.trim().to_ascii_lowercase().as_str(),
            "completed" | "success"
        )
    }
}

/// Body of the optional client completion callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientNotification {
    pub session_id: String,
    pub status: JobState,
    pub total_lines: u32,
    pub completed_lines: u32,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
