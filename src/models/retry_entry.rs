use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable retry queue item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryEntry {
    pub session_id: String,
    pub batch_index: u32,
    /// Times the entry went back on the queue because nothing was available
    pub attempts: u32,
    pub exclude_worker_id: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl RetryEntry {
    pub fn new(
        session_id: &str,
        batch_index: u32,
        exclude_worker_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            batch_index,
            attempts: 0,
            exclude_worker_id,
            enqueued_at: now,
        }
    }

    pub fn requeued(mut self, now: DateTime<Utc>) -> Self {
        self.attempts += 1;
        self.enqueued_at = now;
        self
    }
}
