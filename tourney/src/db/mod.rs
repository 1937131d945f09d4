//! Database module providing the tournament store.
//!
//! The lock transition talks to storage through [`TournamentStore`]. This
//! module supplies the PostgreSQL implementation over a sqlx pool, an
//! in-memory implementation for tests and local runs, and the pool wrapper.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;

use crate::tournament::errors::{LockError, LockResult};

pub mod config;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod timeouts;

pub use config::{DatabaseConfig, DatabaseConfigError};
pub use memory::MemoryStore;
pub use postgres::PgTournamentStore;
pub use store::{StoreTransaction, TournamentStore};

use timeouts::with_default_timeout;

/// Connection pool shared by the PostgreSQL store
#[derive(Clone)]
pub struct Database {
    pool: Arc<PgPool>,
}

impl Database {
    /// Open a pool sized and timed by `config`
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tourney::db::{Database, DatabaseConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let db = Database::new(&DatabaseConfig::from_env()?).await?;
    ///     db.health_check().await?;
    ///     let _store = db.store();
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.database_url)
            .await?;

        log::debug!(
            "Database pool open ({}..{} connections)",
            config.min_connections,
            config.max_connections
        );
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Tournament store over this pool
    pub fn store(&self) -> PgTournamentStore {
        PgTournamentStore::new(Arc::clone(&self.pool))
    }

    /// Round-trip a trivial query, bounded by the default query timeout
    pub async fn health_check(&self) -> LockResult<()> {
        with_default_timeout(async {
            sqlx::query("SELECT 1").execute(self.pool.as_ref()).await?;
            Ok::<(), LockError>(())
        })
        .await
    }

    /// Wait for in-flight queries and close every connection
    pub async fn close(self) {
        self.pool.close().await;
    }
}
