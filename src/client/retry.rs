//! Retry policy for the client's commit and delete loops

use crate::error::{Result, StoreError};
use log::warn;
use std::time::Duration;

/// How often and how patiently the client retries a commit or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries until success.
    pub max_attempts: Option<u32>,
    /// Wait before retrying after a version conflict; doubles each time.
    pub backoff: Duration,
    /// Upper bound on the doubled wait.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(64),
            backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Retry forever without waiting.
    pub fn unbounded() -> Self {
        Self { max_attempts: None, backoff: Duration::ZERO, max_backoff: Duration::ZERO }
    }

    /// At most `max_attempts` attempts, no waiting between them.
    pub fn attempts(max_attempts: u32) -> Self {
        Self { max_attempts: Some(max_attempts), backoff: Duration::ZERO, max_backoff: Duration::ZERO }
    }

    /// Wait before retry number `retry` (1-based) after a conflict.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Attempt counter for one client operation.
pub(crate) struct Attempts {
    policy: RetryPolicy,
    operation: String,
    made: u32,
    conflicts: u32,
}

impl Attempts {
    pub(crate) fn new(policy: RetryPolicy, operation: String) -> Self {
        Self { policy, operation, made: 0, conflicts: 0 }
    }

    /// Account for the next attempt, failing once the policy's budget is spent.
    pub(crate) fn begin(&mut self) -> Result<u32> {
        if let Some(max) = self.policy.max_attempts {
            if self.made >= max {
                warn!("{} exhausted {} attempt(s)", self.operation, self.made);
                return Err(StoreError::RetriesExhausted {
                    operation: self.operation.clone(),
                    attempts: self.made,
                });
            }
        }
        self.made += 1;
        Ok(self.made)
    }

    /// Sleep after a version conflict.
    pub(crate) async fn backoff(&mut self) {
        self.conflicts += 1;
        let delay = self.policy.delay(self.conflicts);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    pub(crate) fn made(&self) -> u32 {
        self.made
    }
}
