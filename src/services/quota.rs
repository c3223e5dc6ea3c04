//! # Quota Service
//!
//! Line-quota collaborator consulted at admission and refunded for failed batches.
//! Jobs without a user id are never charged.

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("quota backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait QuotaService: Send + Sync {
    /// Charge `line_count` lines if the user has them; returns whether the charge happened
    async fn check_and_charge_lines(&self, user_id: &str, line_count: u32) -> Result<bool, QuotaError>;

    async fn refund_lines(&self, user_id: &str, line_count: u32) -> Result<(), QuotaError>;
}

/// Allows everything, records nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlimitedQuota;

#[async_trait]
impl QuotaService for UnlimitedQuota {
    async fn check_and_charge_lines(&self, _user_id: &str, _line_count: u32) -> Result<bool, QuotaError> {
        Ok(true)
    }

    async fn refund_lines(&self, _user_id: &str, _line_count: u32) -> Result<(), QuotaError> {
        Ok(())
    }
}

/// Per-user remaining-line ledger
#[derive(Debug, Default)]
pub struct InMemoryQuota {
    remaining: DashMap<String, u64>,
}

impl InMemoryQuota {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, user_id: &str, lines: u64) {
        *self.remaining.entry(user_id.to_string()).or_insert(0) += lines;
    }

    pub fn remaining(&self, user_id: &str) -> u64 {
        self.remaining.get(user_id).map_or(0, |lines| *lines)
    }
}

#[async_trait]
impl QuotaService for InMemoryQuota {
    async fn check_and_charge_lines(&self, user_id: &str, line_count: u32) -> Result<bool, QuotaError> {
        let mut balance = self.remaining.entry(user_id.to_string()).or_insert(0);
        let needed = u64::from(line_count);
        if *balance < needed {
            debug!(user_id, line_count, balance = *balance, "Quota check refused");
            return Ok(false);
        }
        *balance -= needed;
        Ok(true)
    }

    async fn refund_lines(&self, user_id: &str, line_count: u32) -> Result<(), QuotaError> {
        *self.remaining.entry(user_id.to_string()).or_insert(0) += u64::from(line_count);
        info!(user_id, line_count, "💸 QUOTA: Refunded lines");
        Ok(())
    }
}
