//! Tournament lifecycle: models, the lock transition, the sweep that drives
//! it and the game-assignment outbox relay.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tourney::db::{Database, DatabaseConfig};
//! use tourney::{LockConfig, SystemClock, TournamentLifecycle};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&DatabaseConfig::from_env()?).await?;
//!     let lifecycle = TournamentLifecycle::new(
//!         Arc::new(db.store()),
//!         Arc::new(SystemClock),
//!         LockConfig::from_env(),
//!     );
//!
//!     let report = lifecycle.enforce_tournament_locks().await?;
//!     println!("started {} tournaments", report.started);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod errors;
pub mod models;
pub mod outbox;
pub mod sweep;

pub use config::LockConfig;
pub use engine::{LockEngine, LockPlan, plan_lock};
pub use errors::{LockError, LockResult};
pub use models::{
    AssignmentEvent, Entry, EntryId, EntryStatus, EventId, FIRST_ROUND, LockOutcome, Match,
    MatchId, MatchResult, MatchStatus, NewMatch, Tournament, TournamentId, TournamentStatus,
    UserId,
};
pub use outbox::{AssignmentError, AssignmentRelay, GameAssigner, RelayReport};
pub use sweep::{SweepReport, TournamentLifecycle};
