//! Database query timeout helpers
//!
//! Provides timeout wrappers for store operations to prevent indefinite hangs.

use crate::tournament::errors::{LockError, LockResult};
use std::time::Duration;
use tokio::time::timeout;

/// Default timeout for single queries (5 seconds)
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for a lock transaction (10 seconds)
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Execute a store operation with timeout
///
/// # Arguments
///
/// * `duration` - Timeout duration
/// * `future` - Async operation to execute
///
/// # Returns
///
/// * `LockResult<T>` - Result, or `LockError::Timeout` if the deadline passed
///
/// # Example
///
/// ```no_run
/// use tourney::db::timeouts::{with_timeout, DEFAULT_QUERY_TIMEOUT};
/// use tourney::db::TournamentStore;
/// # async fn example(store: &dyn TournamentStore) -> Result<(), Box<dyn std::error::Error>> {
///
/// let due = with_timeout(DEFAULT_QUERY_TIMEOUT, store.due_tournaments(chrono::Utc::now())).await?;
///
/// # Ok(())
/// # }
/// ```
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> LockResult<T>
where
    F: std::future::Future<Output = LockResult<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(LockError::Timeout(duration)),
    }
}

/// Execute a store operation with the default query timeout (5 seconds)
pub async fn with_default_timeout<F, T>(future: F) -> LockResult<T>
where
    F: std::future::Future<Output = LockResult<T>>,
{
    with_timeout(DEFAULT_QUERY_TIMEOUT, future).await
}
