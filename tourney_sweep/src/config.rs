//! Sweep configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use tourney::db::{DatabaseConfig, DatabaseConfigError};
use tourney::tournament::{LockConfig, TournamentId};

/// Complete sweep configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Retry, timeout and outbox settings
    pub lock: LockConfig,
    /// Lock only this tournament instead of sweeping
    pub tournament: Option<TournamentId>,
    /// Print the result as JSON on stdout
    pub json: bool,
}

impl SweepConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `database_url_override` - Optional database URL override (from CLI args)
    /// * `tournament` - Optional single tournament (from CLI args)
    /// * `json` - Report format (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if the database URL is missing or a pool setting is invalid
    pub fn from_env(
        database_url_override: Option<String>,
        tournament: Option<TournamentId>,
        json: bool,
    ) -> Result<Self, ConfigError> {
        let database = match database_url_override {
            Some(url) => DatabaseConfig::pool_from_env(url)?,
            None => DatabaseConfig::from_env()?,
        };

        Ok(SweepConfig {
            database,
            lock: LockConfig::from_env(),
            tournament,
            json,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed max connections ({})",
                    self.database.max_connections
                ),
            });
        }

        if self.lock.outbox_batch_size == 0 {
            return Err(ConfigError::Invalid {
                var: "OUTBOX_BATCH_SIZE".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.lock.transaction_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "LOCK_TX_TIMEOUT_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.tournament.is_some_and(|id| id <= 0) {
            return Err(ConfigError::Invalid {
                var: "--tournament".to_string(),
                reason: "Must be a positive id".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

impl From<DatabaseConfigError> for ConfigError {
    fn from(err: DatabaseConfigError) -> Self {
        match err {
            DatabaseConfigError::Missing(var) => ConfigError::MissingRequired {
                var: var.to_string(),
                hint: "Set it in the environment or .env, or pass --db-url".to_string(),
            },
            DatabaseConfigError::Invalid { var, value } => ConfigError::Invalid {
                var: var.to_string(),
                reason: format!("'{value}' does not parse"),
            },
        }
    }
}
