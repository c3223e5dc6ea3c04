use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::lines::{SubtitleLine, TranslatedLine};
use crate::messaging::JobSubmission;
use crate::state_machine::{job_transition, JobEvent, JobState, StateMachineResult};

/// One end-to-end translation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub session_id: String,
    pub user_id: Option<String>,
    pub status: JobState,
    pub total_lines: u32,
    pub completed_lines: u32,
    pub progress: f64,
    pub model: String,
    pub prompt: String,
    pub system_instruction: String,
    pub target_language: String,
    pub thinking_budget: Option<i64>,
    pub callback_url: Option<String>,
    /// Snapshot taken at submission, never modified afterwards
    pub original_lines: Vec<SubtitleLine>,
    /// Merged output, only present once the job is terminal
    pub results: Option<Vec<TranslatedLine>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn from_submission(submission: JobSubmission, default_model: &str, now: DateTime<Utc>) -> Self {
        let total_lines = submission.lines.len() as u32;
        Self {
            session_id: submission.session_id,
            user_id: submission.user_id,
            status: JobState::Pending,
            total_lines,
            completed_lines: 0,
            progress: 0.0,
            model: submission
                .model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| default_model.to_string()),
            prompt: submission.prompt,
            system_instruction: submission.system_instruction,
            target_language: submission.target_language,
            thinking_budget: submission.thinking_budget,
            callback_url: submission.callback_url.filter(|u| !u.trim().is_empty()),
            original_lines: submission.lines,
            results: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Apply a lifecycle event through the job transition table
    pub fn apply(&mut self, event: JobEvent, now: DateTime<Utc>) -> StateMachineResult<JobState> {
        let target = job_transition(self.status, &event)?;
        if let Some(message) = event.error_message() {
            self.error_message = Some(message.to_string());
        }
        self.status = target;
        self.updated_at = now;
        if target.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(target)
    }

    /// Store the merged results and move to a terminal state in one step
    pub fn finalize(
        &mut self,
        results: Vec<TranslatedLine>,
        event: JobEvent,
        now: DateTime<Utc>,
    ) -> StateMachineResult<JobState> {
        let target = self.apply(event, now)?;
        self.results = Some(results);
        Ok(target)
    }

    /// Record completed lines; the counter never decreases and never exceeds the total
    pub fn record_progress(&mut self, completed_lines: u32, now: DateTime<Utc>) -> u32 {
        let capped = completed_lines.min(self.total_lines);
        if capped > self.completed_lines {
            self.completed_lines = capped;
            self.updated_at = now;
        }
        self.progress = progress_percent(self.completed_lines, self.total_lines);
        self.completed_lines
    }

    /// Lines at positions `[start, start + count)` of the submission
    pub fn lines_for(&self, start: u32, count: u32) -> &[SubtitleLine] {
        let len = self.original_lines.len();
        let start = (start as usize).min(len);
        let end = start.saturating_add(count as usize).min(len);
        &self.original_lines[start..end]
    }

    pub fn is_expired(&self, now: DateTime<Utc>, max_lifetime: Duration) -> bool {
        !self.status.is_terminal() && now - self.created_at > max_lifetime
    }
}

/// Percentage rounded to two decimals
pub fn progress_percent(completed: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let ratio = f64::from(completed.min(total)) / f64::from(total);
    (ratio * 10_000.0).round() / 100.0
}
