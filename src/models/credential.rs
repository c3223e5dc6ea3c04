use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream API key with its health counters
///
/// The secret is opaque to the orchestrator. Workers identify credentials in their
/// usage reports by [`Credential::masked_key`], so `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: i64,
    pub secret: String,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
}

impl Credential {
    pub fn new(id: i64, secret: impl Into<String>) -> Self {
        Self {
            id,
            secret: secret.into(),
            cooldown_until: None,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
        }
    }

    pub fn masked_key(&self) -> String {
        mask_secret(&self.secret)
    }

    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.map_or(true, |until| until <= now)
    }

    pub fn record_success(&mut self, count: u64) {
        self.success_count += count;
        self.consecutive_failures = 0;
    }

    /// Returns true when this failure put the credential into cooldown
    pub fn record_failure(
        &mut self,
        count: u64,
        now: DateTime<Utc>,
        threshold: u32,
        cooldown: Duration,
    ) -> bool {
        self.failure_count += count;
        let streak = u32::try_from(count).unwrap_or(u32::MAX);
        self.consecutive_failures = self.consecutive_failures.saturating_add(streak);
        if self.consecutive_failures >= threshold.max(1) {
            self.cooldown_until = Some(now + cooldown);
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("masked_key", &self.masked_key())
            .field("cooldown_until", &self.cooldown_until)
            .field("success_count", &self.success_count)
            .field("failure_count", &self.failure_count)
            .field("consecutive_failures", &self.consecutive_failures)
            .finish()
    }
}

/// First four and last four characters around `...`
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
