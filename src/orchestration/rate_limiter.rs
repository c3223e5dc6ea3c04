use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Sliding window of dispatch timestamps for one worker
///
/// Callers hold the owning worker's lock across [`SlidingWindow::try_register`],
/// which makes the admission check and the registration one step.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    period: Duration,
    limit: u32,
    timestamps: VecDeque<DateTime<Utc>>,
}

impl SlidingWindow {
    pub fn new(period: Duration, limit: u32) -> Self {
        Self {
            period,
            limit,
            timestamps: VecDeque::new(),
        }
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        let horizon = now - self.period;
        while self.timestamps.front().is_some_and(|ts| *ts <= horizon) {
            self.timestamps.pop_front();
        }
    }

    /// Dispatches counted in the trailing window ending at `now`
    pub fn count(&mut self, now: DateTime<Utc>) -> u32 {
        self.evict(now);
        self.timestamps.len() as u32
    }

    pub fn headroom(&mut self, now: DateTime<Utc>) -> u32 {
        self.limit.saturating_sub(self.count(now))
    }

    pub fn is_admissible(&mut self, now: DateTime<Utc>) -> bool {
        self.count(now) < self.limit
    }

    /// Record a dispatch if the window has room
    pub fn try_register(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_admissible(now) {
            return false;
        }
        self.timestamps.push_back(now);
        true
    }

    /// Record a dispatch regardless of the limit (degraded fallback)
    pub fn force_register(&mut self, now: DateTime<Utc>) {
        self.evict(now);
        self.timestamps.push_back(now);
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}
