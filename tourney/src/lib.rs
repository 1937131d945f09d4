//! # Tourney
//!
//! Tournament lifecycle controller and Swiss pairing engine.
//!
//! A scheduled tournament sits in registration until its lock time. At or after
//! that instant exactly one transition happens: the field is finalized from the
//! checked-in entries and the tournament either starts (round-1 pairings are
//! written) or collapses (every entry is cancelled). Everything here is driven
//! by an external scheduler calling into [`TournamentLifecycle`].
//!
//! ## Core Modules
//!
//! - [`schedule`]: Clock capability and the lock/check-in time policy
//! - [`swiss`]: Standings and Swiss pairing, pure functions
//! - [`tournament`]: Models, the lock transition engine, the sweep and the
//!   game-assignment outbox relay
//! - [`db`]: Store contract with PostgreSQL and in-memory implementations
//!
//! ## Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use tourney::schedule::{compute_check_in_opens_at, compute_lock_at};
//!
//! let start = Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap();
//! assert_eq!(compute_lock_at(start), Utc.with_ymd_and_hms(2026, 3, 1, 17, 58, 0).unwrap());
//! assert_eq!(
//!     compute_check_in_opens_at(start),
//!     Utc.with_ymd_and_hms(2026, 3, 1, 17, 40, 0).unwrap()
//! );
//! ```

/// Store contract and its PostgreSQL / in-memory implementations.
pub mod db;

/// Clock capability and time policy.
pub mod schedule;

/// Standings and Swiss pairing.
pub mod swiss;

/// Tournament models, lock transition and sweep.
pub mod tournament;

pub use schedule::{Clock, FixedClock, SystemClock};
pub use swiss::{Pairing, Standing, build_standings, generate_swiss_round};
pub use tournament::{
    AssignmentError, GameAssigner, LockConfig, LockEngine, LockError, LockOutcome, LockResult,
    SweepReport, TournamentLifecycle,
};
