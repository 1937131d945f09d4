//! Lock transition tuning.

use std::env;
use std::time::Duration;

use crate::db::timeouts::DEFAULT_TRANSACTION_TIMEOUT;

/// Retry and timeout settings for the lock transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Attempts per invocation before giving up on conflicts
    pub max_attempts: u32,

    /// Backoff unit between attempts; attempt `n` waits `n` units
    pub retry_backoff: Duration,

    /// Upper bound on one transaction attempt
    pub transaction_timeout: Duration,

    /// Outbox events relayed per sweep
    pub outbox_batch_size: usize,

    /// Delivery attempts per assignment event before it is abandoned
    pub max_delivery_attempts: u32,
}

impl LockConfig {
    /// Create configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - `LOCK_MAX_ATTEMPTS`: Attempts per invocation (default: 3)
    /// - `LOCK_RETRY_BACKOFF_MS`: Backoff unit in milliseconds (default: 50)
    /// - `LOCK_TX_TIMEOUT_SECS`: Transaction timeout in seconds (default: 10)
    /// - `OUTBOX_BATCH_SIZE`: Events relayed per sweep (default: 100)
    /// - `OUTBOX_MAX_ATTEMPTS`: Deliveries per event before giving up (default: 5)
    ///
    /// Unparseable values fall back to the default. Zero attempt counts are
    /// raised to one.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_attempts: env::var("LOCK_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_attempts)
                .max(1),
            retry_backoff: env::var("LOCK_RETRY_BACKOFF_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            transaction_timeout: env::var("LOCK_TX_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.transaction_timeout),
            outbox_batch_size: env::var("OUTBOX_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.outbox_batch_size),
            max_delivery_attempts: env::var("OUTBOX_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_delivery_attempts)
                .max(1),
        }
    }

    /// Backoff before attempt `attempt + 1`
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(attempt)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(50),
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            outbox_batch_size: 100,
            max_delivery_attempts: 5,
        }
    }
}
