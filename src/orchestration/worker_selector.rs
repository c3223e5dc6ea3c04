//! # Worker Selector
//!
//! Rate-limited, load-aware worker selection over the configured worker pool.
//!
//! ## Selection order
//!
//! Among workers whose sliding RPM window has room:
//! 1. fewest active batches
//! 2. most remaining RPM headroom
//! 3. lower priority value
//! 4. fewer historical failures
//! 5. worker id
//!
//! A worker passed as `avoid` (the one that just failed a retry) is only used when
//! it is the sole admissible worker. When nobody is admissible the caller polls
//! with bounded backoff and finally falls back to round-robin, which is logged as
//! degraded.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::rate_limiter::SlidingWindow;
use crate::clock::SharedClock;
use crate::config::{SchedulerConfig, WorkerConfig};
use crate::models::Worker;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerSelectionError {
    #[error("No workers are registered")]
    NoWorkers,
}

/// Worker handed out for one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLease {
    pub worker_id: String,
    pub url: String,
    /// Picked by the round-robin fallback past the RPM limit
    pub degraded: bool,
}

#[derive(Debug)]
struct SlotState {
    window: SlidingWindow,
    current_session_id: Option<String>,
    last_used_at: Option<DateTime<Utc>>,
}

/// Scheduler state for one worker
#[derive(Debug)]
pub struct WorkerSlot {
    config: WorkerConfig,
    state: Mutex<SlotState>,
    active_jobs: AtomicU32,
    failure_count: AtomicU64,
}

impl WorkerSlot {
    fn new(config: WorkerConfig, period: chrono::Duration) -> Self {
        let window = SlidingWindow::new(period, config.rpm_limit);
        Self {
            config,
            state: Mutex::new(SlotState {
                window,
                current_session_id: None,
                last_used_at: None,
            }),
            active_jobs: AtomicU32::new(0),
            failure_count: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    fn lease(&self, degraded: bool) -> WorkerLease {
        WorkerLease {
            worker_id: self.config.id.clone(),
            url: self.config.url.clone(),
            degraded,
        }
    }

    fn mark_dispatched(&self, state: &mut SlotState, session_id: &str, now: DateTime<Utc>) {
        state.current_session_id = Some(session_id.to_string());
        state.last_used_at = Some(now);
        self.active_jobs.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Rank {
    active: u32,
    neg_headroom: i64,
    priority: i32,
    failures: u64,
}

#[derive(Debug)]
pub struct WorkerSelector {
    /// Sorted by worker id
    slots: Vec<Arc<WorkerSlot>>,
    clock: SharedClock,
    config: SchedulerConfig,
    fallback_cursor: AtomicUsize,
}

impl WorkerSelector {
    pub fn new(workers: &[WorkerConfig], config: SchedulerConfig, clock: SharedClock) -> Self {
        let period = config.rpm_period();
        let mut slots: Vec<Arc<WorkerSlot>> = workers
            .iter()
            .cloned()
            .map(|worker| Arc::new(WorkerSlot::new(worker, period)))
            .collect();
        slots.sort_by(|a, b| a.config.id.cmp(&b.config.id));

        info!(
            worker_count = slots.len(),
            rpm_period_seconds = config.rpm_period_seconds,
            "Worker selector initialized"
        );

        Self {
            slots,
            clock,
            config,
            fallback_cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, worker_id: &str) -> Option<&Arc<WorkerSlot>> {
        self.slots
            .binary_search_by(|slot| slot.config.id.as_str().cmp(worker_id))
            .ok()
            .map(|idx| &self.slots[idx])
    }

    /// One non-blocking selection round; registers the dispatch on success
    pub fn try_acquire(&self, session_id: &str, avoid: Option<&str>) -> Option<WorkerLease> {
        let now = self.clock.now();

        let mut ranked: Vec<(bool, Rank, &Arc<WorkerSlot>)> = self
            .slots
            .iter()
            .filter_map(|slot| {
                let headroom = slot.state.lock().window.headroom(now);
                if headroom == 0 {
                    return None;
                }
                let rank = Rank {
                    active: slot.active_jobs.load(Ordering::SeqCst),
                    neg_headroom: -i64::from(headroom),
                    priority: slot.config.priority,
                    failures: slot.failure_count.load(Ordering::SeqCst),
                };
                let avoided = avoid == Some(slot.id());
                Some((avoided, rank, slot))
            })
            .collect();
        // Slots are already in id order and the sort is stable
        ranked.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

        for (_, _, slot) in ranked {
            let mut state = slot.state.lock();
            // The window may have filled since ranking; re-check under the lock
            if state.window.try_register(now) {
                slot.mark_dispatched(&mut state, session_id, now);
                debug!(
                    worker_id = %slot.id(),
                    session_id = %session_id,
                    active_jobs = slot.active_jobs.load(Ordering::SeqCst),
                    "Selected worker"
                );
                return Some(slot.lease(false));
            }
        }
        None
    }

    /// Backoff before poll `attempt`: `base * 1.5^attempt`, capped
    pub fn selection_delay(&self, attempt: u32) -> Duration {
        let base = self.config.selection_base_delay_ms as f64;
        let scaled = base * 1.5_f64.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let capped = scaled.min(self.config.selection_max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Select a worker, waiting for window room and falling back to round-robin
    pub async fn acquire(
        &self,
        session_id: &str,
        avoid: Option<&str>,
    ) -> Result<WorkerLease, WorkerSelectionError> {
        if self.slots.is_empty() {
            return Err(WorkerSelectionError::NoWorkers);
        }

        for attempt in 0..self.config.selection_max_attempts {
            if let Some(lease) = self.try_acquire(session_id, avoid) {
                return Ok(lease);
            }
            let delay = self.selection_delay(attempt);
            debug!(
                session_id = %session_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "No admissible worker, backing off"
            );
            tokio::time::sleep(delay).await;
        }

        if let Some(lease) = self.try_acquire(session_id, avoid) {
            return Ok(lease);
        }
        Ok(self.round_robin(session_id))
    }

    fn round_robin(&self, session_id: &str) -> WorkerLease {
        let now = self.clock.now();
        let idx = self.fallback_cursor.fetch_add(1, Ordering::SeqCst) % self.slots.len();
        let slot = &self.slots[idx];
        let mut state = slot.state.lock();
        state.window.force_register(now);
        slot.mark_dispatched(&mut state, session_id, now);

        warn!(
            worker_id = %slot.id(),
            session_id = %session_id,
            max_attempts = self.config.selection_max_attempts,
            "⚠️ DEGRADED: No worker under its RPM limit, using round-robin fallback"
        );
        slot.lease(true)
    }

    /// Batch reached a terminal outcome on this worker
    pub fn release(&self, worker_id: &str) {
        let Some(slot) = self.slot(worker_id) else {
            warn!(worker_id = %worker_id, "Release for unknown worker");
            return;
        };
        let mut state = slot.state.lock();
        let previous = slot
            .active_jobs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        if previous <= 1 {
            state.current_session_id = None;
        }
    }

    pub fn record_failure(&self, worker_id: &str) {
        if let Some(slot) = self.slot(worker_id) {
            let failures = slot.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(worker_id = %worker_id, failures, "Worker failure recorded");
        }
    }

    pub fn snapshot(&self) -> Vec<Worker> {
        let now = self.clock.now();
        self.slots
            .iter()
            .map(|slot| {
                let mut state = slot.state.lock();
                let active_jobs = slot.active_jobs.load(Ordering::SeqCst);
                Worker {
                    id: slot.config.id.clone(),
                    url: slot.config.url.clone(),
                    priority: slot.config.priority,
                    rpm_limit: slot.config.rpm_limit,
                    is_busy: active_jobs > 0,
                    current_session_id: state.current_session_id.clone(),
                    active_jobs,
                    failure_count: slot.failure_count.load(Ordering::SeqCst),
                    last_used_at: state.last_used_at,
                    window_count: state.window.count(now),
                }
            })
            .collect()
    }

    pub fn worker(&self, worker_id: &str) -> Option<Worker> {
        self.snapshot().into_iter().find(|w| w.id == worker_id)
    }
}
