use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per job
///
/// Every read-modify-write of a job or its batch tasks happens under the job's
/// guard. Guards are never held across outbound HTTP calls.
#[derive(Debug, Default, Clone)]
pub struct JobLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let mutex = Arc::clone(
            self.locks
                .entry(session_id.to_string())
                .or_default()
                .value(),
        );
        mutex.lock_owned().await
    }

    /// Drop the mutex of a finished job if nobody holds or waits on it
    pub fn forget(&self, session_id: &str) {
        self.locks
            .remove_if(session_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
