//! Lock transition error types.

use super::models::{TournamentId, TournamentStatus};
use std::time::Duration;
use thiserror::Error;

/// Lock transition errors
#[derive(Debug, Error)]
pub enum LockError {
    /// Database error
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Concurrent writer won the race; safe to retry
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// Every attempt ended in a conflict or timeout
    #[error("Lock transition gave up after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// Operation timed out
    #[error("Database operation timed out after {0:?}")]
    Timeout(Duration),

    /// A stored value could not be mapped onto the model
    #[error("Invalid stored value: {0}")]
    Decode(String),

    /// Round matches already carry results and must not be replaced
    #[error("Round {round} of tournament {tournament_id} already has results")]
    RoundAlreadyPlayed {
        tournament_id: TournamentId,
        round: u32,
    },

    /// Status may only move forward
    #[error("Invalid tournament transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: TournamentStatus,
        to: TournamentStatus,
    },
}

impl From<sqlx::Error> for LockError {
    fn from(err: sqlx::Error) -> Self {
        // serialization_failure / deadlock_detected
        if let sqlx::Error::Database(db_err) = &err
            && matches!(db_err.code().as_deref(), Some("40001" | "40P01"))
        {
            return LockError::Conflict(db_err.message().to_string());
        }
        LockError::Database(err)
    }
}

impl LockError {
    /// Whether another attempt inside the same invocation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, LockError::Conflict(_) | LockError::Timeout(_))
    }

    /// Whether the next sweep pass may succeed where this one failed
    pub fn is_transient(&self) -> bool {
        self.is_retryable() || matches!(self, LockError::RetriesExhausted { .. })
    }
}

/// Result type for lock transition operations
pub type LockResult<T> = Result<T, LockError>;
