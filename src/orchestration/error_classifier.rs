//! # Batch Failure Classification
//!
//! Decides whether a failed batch is worth another attempt with a fresh
//! credential. Dispatch failures (transport errors, non-2xx answers) are always
//! retryable. A failure reported through the callback is only retried when it is
//! attributable to the credentials the worker used; everything else is treated as
//! a property of the batch itself and is terminal.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::messaging::{CredentialUsage, WorkerCallback};

/// Markers upstream APIs use for key, quota and rate-limit problems
const CREDENTIAL_MARKERS: &[&str] = &[
    "api key",
    "api_key",
    "apikey",
    "invalid key",
    "credential",
    "quota",
    "rate limit",
    "ratelimit",
    "rate_limit",
    "resource_exhausted",
    "resource exhausted",
    "too many requests",
    "permission_denied",
    "permission denied",
    "unauthenticated",
    "unauthorized",
    "429",
    "401",
    "403",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Outbound call failed; retried with a different worker where possible
    Dispatch,
    /// Upstream rejected the credentials; retried with fresh credentials
    Credential,
    /// Anything else reported by the worker, including malformed callbacks
    Permanent,
}

impl FailureCategory {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Dispatch | Self::Credential)
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Dispatch => "dispatch",
            Self::Credential => "credential",
            Self::Permanent => "permanent",
        };
        f.write_str(label)
    }
}

pub fn mentions_credential_problem(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    CREDENTIAL_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Every reported credential failed and none succeeded
fn usage_shows_credential_failure(usage: &[CredentialUsage]) -> bool {
    !usage.is_empty()
        && usage
            .iter()
            .all(|report| report.failure_count > 0 && report.success_count == 0)
}

/// Classify a failed worker callback
pub fn classify_callback_failure(callback: &WorkerCallback) -> FailureCategory {
    let by_message = callback
        .error
        .as_deref()
        .is_some_and(mentions_credential_problem);
    if by_message || usage_shows_credential_failure(&callback.credential_usage) {
        FailureCategory::Credential
    } else {
        FailureCategory::Permanent
    }
}
