use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of a registered worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub id: String,
    pub url: String,
    pub priority: i32,
    pub rpm_limit: u32,
    pub is_busy: bool,
    pub current_session_id: Option<String>,
    pub active_jobs: u32,
    pub failure_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    /// Dispatches counted in the trailing RPM window
    pub window_count: u32,
}

impl Worker {
    pub fn headroom(&self) -> u32 {
        self.rpm_limit.saturating_sub(self.window_count)
    }
}
