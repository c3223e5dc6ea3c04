//! # Credential Allocator
//!
//! Partitions the cooldown-aware credential pool across the batches of a job and
//! applies worker usage reports back onto the pool.
//!
//! Eligible credentials are ordered least-used first and dealt out as
//! `perBatch = clamp(P / B, 1, max_per_batch)` consecutive indices per batch,
//! wrapping around the pool. With at least as many credentials as batches the
//! subsets are disjoint; otherwise they overlap round-robin.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::CredentialsConfig;
use crate::error::{AdmissionError, OrchestratorResult};
use crate::messaging::CredentialUsage;
use crate::models::Credential;
use crate::store::CredentialStore;

/// Result of allocating credentials for a set of batches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    /// One credential subset per batch, in batch order
    Assigned(Vec<Vec<Credential>>),
    /// Every registered credential is cooling down
    AllCooling { next_eligible_at: Option<DateTime<Utc>> },
}

/// Index subsets of a least-used-first pool of `pool_size`, one per batch
pub fn partition(pool_size: usize, batch_count: usize, max_per_batch: usize) -> Vec<Vec<usize>> {
    if pool_size == 0 || batch_count == 0 {
        return vec![Vec::new(); batch_count];
    }
    let per_batch = (pool_size / batch_count).clamp(1, max_per_batch.max(1));
    (0..batch_count)
        .map(|i| {
            (0..per_batch)
                .map(|j| (i * per_batch + j) % pool_size)
                .collect()
        })
        .collect()
}

pub struct CredentialAllocator {
    store: Arc<dyn CredentialStore>,
    records: DashMap<i64, Arc<Mutex<Credential>>>,
    config: CredentialsConfig,
    clock: SharedClock,
}

impl std::fmt::Debug for CredentialAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialAllocator")
            .field("credentials", &self.records.len())
            .field("config", &self.config)
            .finish()
    }
}

impl CredentialAllocator {
    pub fn new(store: Arc<dyn CredentialStore>, config: CredentialsConfig, clock: SharedClock) -> Self {
        Self {
            store,
            records: DashMap::new(),
            config,
            clock,
        }
    }

    /// Pick up credentials registered since the last read
    ///
    /// Known records are only ever changed by [`Self::record_usage`], which
    /// writes them through under their own lock, so a snapshot read here can
    /// never roll back a cooldown applied in the meantime.
    pub async fn refresh(&self) -> OrchestratorResult<usize> {
        let credentials = self.store.list_credentials().await?;
        let count = credentials.len();
        for credential in credentials {
            self.records
                .entry(credential.id)
                .or_insert_with(|| Arc::new(Mutex::new(credential)));
        }
        Ok(count)
    }

    async fn current(&self) -> Vec<Credential> {
        let records: Vec<Arc<Mutex<Credential>>> =
            self.records.iter().map(|r| Arc::clone(r.value())).collect();
        let mut credentials = Vec::with_capacity(records.len());
        for record in records {
            credentials.push(record.lock().await.clone());
        }
        credentials
    }

    pub async fn registered_count(&self) -> OrchestratorResult<usize> {
        self.refresh().await
    }

    /// Assign credential subsets to `batch_count` batches
    pub async fn allocate(&self, batch_count: usize) -> OrchestratorResult<Allocation> {
        let registered = self.refresh().await?;
        if registered == 0 {
            return Err(AdmissionError::NoCredentials.into());
        }

        let now = self.clock.now();
        let all = self.current().await;
        let next_eligible_at = all.iter().filter_map(|c| c.cooldown_until).filter(|t| *t > now).min();
        let mut eligible: Vec<Credential> = all.into_iter().filter(|c| c.is_eligible(now)).collect();

        if eligible.is_empty() {
            info!(
                registered,
                next_eligible_at = ?next_eligible_at,
                "🧊 CREDENTIALS: Entire pool is cooling down"
            );
            return Ok(Allocation::AllCooling { next_eligible_at });
        }

        eligible.sort_by(|a, b| {
            (a.success_count, a.consecutive_failures, a.id).cmp(&(
                b.success_count,
                b.consecutive_failures,
                b.id,
            ))
        });

        let subsets = partition(
            eligible.len(),
            batch_count,
            self.config.max_per_batch as usize,
        )
        .into_iter()
        .map(|indices| indices.into_iter().map(|i| eligible[i].clone()).collect())
        .collect();

        debug!(
            eligible = eligible.len(),
            batch_count, "Allocated credentials across batches"
        );
        Ok(Allocation::Assigned(subsets))
    }

    /// Apply worker-reported usage, matching credentials by masked key
    pub async fn record_usage(&self, reports: &[CredentialUsage]) -> OrchestratorResult<()> {
        if reports.is_empty() {
            return Ok(());
        }
        if self.records.is_empty() {
            self.refresh().await?;
        }

        let now = self.clock.now();
        let mut records: Vec<(i64, Arc<Mutex<Credential>>)> = self
            .records
            .iter()
            .map(|r| (*r.key(), Arc::clone(r.value())))
            .collect();
        records.sort_by_key(|(id, _)| *id);

        for report in reports {
            let mut matched: Option<i64> = None;
            for (id, record) in &records {
                let mut credential = record.lock().await;
                if credential.masked_key() != report.masked_key {
                    continue;
                }
                if let Some(applied_to) = matched {
                    warn!(
                        masked_key = %report.masked_key,
                        applied_to,
                        also_matches = *id,
                        "Usage report matches several credentials; applied to the lowest id"
                    );
                    continue;
                }
                matched = Some(*id);
                if report.success_count > 0 {
                    credential.record_success(report.success_count);
                }
                if report.failure_count > 0 {
                    let cooled = credential.record_failure(
                        report.failure_count,
                        now,
                        self.config.failure_threshold,
                        self.config.cooldown(),
                    );
                    if cooled {
                        warn!(
                            credential_id = credential.id,
                            masked_key = %report.masked_key,
                            consecutive_failures = credential.consecutive_failures,
                            cooldown_until = ?credential.cooldown_until,
                            "🧊 CREDENTIALS: Credential entered cooldown"
                        );
                    }
                }
                self.store.save_credential(&credential).await?;
            }
            if matched.is_none() {
                debug!(masked_key = %report.masked_key, "Usage report for unknown credential");
            }
        }
        Ok(())
    }

    pub async fn snapshot(&self) -> Vec<Credential> {
        let mut credentials = self.current().await;
        credentials.sort_by_key(|c| c.id);
        credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::store::InMemoryStore;
    use crate::error::OrchestratorError;
    use chrono::Duration;

    fn allocator(secrets: &[&str]) -> (CredentialAllocator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(InMemoryStore::with_credentials(secrets.iter().copied()));
        (
            CredentialAllocator::new(store, CredentialsConfig::default(), clock.clone()),
            clock,
        )
    }

    fn usage(secret: &str, success: u64, failure: u64) -> CredentialUsage {
        CredentialUsage {
            masked_key: crate::models::mask_secret(secret),
            success_count: success,
            failure_count: failure,
        }
    }

    #[test]
    fn test_partition_disjoint_when_pool_is_large() {
        let subsets = partition(6, 3, 3);
        assert_eq!(subsets, vec![vec![0, 1], vec![2, 3], vec![4, 5]]);
    }

    #[test]
    fn test_partition_capped_and_round_robin() {
        assert_eq!(partition(10, 1, 3), vec![vec![0, 1, 2]]);
        assert_eq!(partition(2, 3, 3), vec![vec![0], vec![1], vec![0]]);
        assert_eq!(partition(0, 2, 3), vec![Vec::<usize>::new(), Vec::new()]);
    }

    #[tokio::test]
    async fn test_empty_pool_is_admission_error() {
        let (allocator, _) = allocator(&[]);
        let err = allocator.allocate(1).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Admission(AdmissionError::NoCredentials)
        ));
    }

    #[tokio::test]
    async fn test_cooling_credential_never_allocated() {
        let (allocator, clock) = allocator(&["first-key-0001", "second-key-0002"]);
        allocator
            .record_usage(&[usage("first-key-0001", 0, 1)])
            .await
            .unwrap();

        let Allocation::Assigned(subsets) = allocator.allocate(2).await.unwrap() else {
            panic!("expected an assignment");
        };
        for subset in &subsets {
            assert_eq!(subset.len(), 1);
            assert_eq!(subset[0].secret, "second-key-0002");
        }

        clock.advance(Duration::seconds(301));
        let Allocation::Assigned(subsets) = allocator.allocate(1).await.unwrap() else {
            panic!("expected an assignment");
        };
        assert_eq!(subsets[0].len(), 2);
    }

    #[tokio::test]
    async fn test_all_cooling_reports_next_eligible_time() {
        let (allocator, clock) = allocator(&["only-key-000001"]);
        allocator
            .record_usage(&[usage("only-key-000001", 0, 2)])
            .await
            .unwrap();
        match allocator.allocate(1).await.unwrap() {
            Allocation::AllCooling { next_eligible_at } => {
                assert_eq!(next_eligible_at, Some(clock.now() + Duration::seconds(300)));
            }
            other => panic!("unexpected allocation {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_least_used_first_and_success_resets_streak() {
        let (allocator, _) = allocator(&["aaaa-key-00001", "bbbb-key-00002"]);
        allocator
            .record_usage(&[usage("aaaa-key-00001", 5, 0)])
            .await
            .unwrap();
        let Allocation::Assigned(subsets) = allocator.allocate(2).await.unwrap() else {
            panic!("expected an assignment");
        };
        assert_eq!(subsets[0][0].secret, "bbbb-key-00002");

        let snapshot = allocator.snapshot().await;
        assert_eq!(snapshot[0].success_count, 5);
        assert_eq!(snapshot[0].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_stale_store_read_does_not_undo_cooldown() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(InMemoryStore::with_credentials(["stale-key-00001", "other-key-00002"]));
        let allocator = CredentialAllocator::new(store.clone(), CredentialsConfig::default(), clock.clone());
        allocator.allocate(1).await.unwrap();

        let before_failure = store.list_credentials().await.unwrap();
        allocator
            .record_usage(&[usage("stale-key-00001", 0, 1)])
            .await
            .unwrap();
        // a snapshot taken before the failure landed is written back late
        for credential in &before_failure {
            store.save_credential(credential).await.unwrap();
        }

        let Allocation::Assigned(subsets) = allocator.allocate(2).await.unwrap() else {
            panic!("expected an assignment");
        };
        for subset in &subsets {
            assert!(subset.iter().all(|c| c.secret == "other-key-00002"));
        }

        allocator
            .record_usage(&[usage("stale-key-00001", 1, 0)])
            .await
            .unwrap();
        let stored = store.list_credentials().await.unwrap();
        let cooled = stored.iter().find(|c| c.secret == "stale-key-00001").unwrap();
        assert!(cooled.cooldown_until.is_some_and(|until| until > clock.now()));
        assert_eq!(cooled.success_count, 1);
    }

    #[tokio::test]
    async fn test_ambiguous_masked_key_applies_to_one_credential() {
        let (allocator, _) = allocator(&["AIzaSy-first-same", "AIzaSy-other-same"]);
        assert_eq!(
            crate::models::mask_secret("AIzaSy-first-same"),
            crate::models::mask_secret("AIzaSy-other-same")
        );
        allocator
            .record_usage(&[usage("AIzaSy-first-same", 3, 0)])
            .await
            .unwrap();
        let snapshot = allocator.snapshot().await;
        assert_eq!(snapshot[0].success_count, 3);
        assert_eq!(snapshot[1].success_count, 0);
    }
}
