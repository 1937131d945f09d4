//! Store contract for the lock transition.
//!
//! The engine only talks to these traits, so the same decision code runs
//! against PostgreSQL in production and against [`MemoryStore`] in tests.
//!
//! [`MemoryStore`]: super::memory::MemoryStore

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::tournament::errors::LockResult;
use crate::tournament::models::{
    AssignmentEvent, Entry, EntryId, EntryStatus, EventId, Match, NewMatch, Tournament,
    TournamentId,
};

/// Operations on the tournament store outside any transaction
#[async_trait]
pub trait TournamentStore: Send + Sync {
    /// Open a transaction with conflict detection (serializable or equivalent)
    async fn begin(&self) -> LockResult<Box<dyn StoreTransaction>>;

    /// Tournaments still in registration whose lock time is at or before `now`,
    /// oldest lock first
    async fn due_tournaments(&self, now: DateTime<Utc>) -> LockResult<Vec<TournamentId>>;

    /// Pending game-assignment events, fewest attempts first, then oldest
    async fn pending_assignments(&self, limit: usize) -> LockResult<Vec<AssignmentEvent>>;

    /// Pending game-assignment events of one tournament, oldest first
    async fn pending_assignments_for(
        &self,
        tournament_id: TournamentId,
    ) -> LockResult<Vec<AssignmentEvent>>;

    /// Mark an event delivered
    async fn mark_assignment_dispatched(
        &self,
        event_id: EventId,
        at: DateTime<Utc>,
    ) -> LockResult<()>;

    /// Count a failed delivery attempt
    async fn record_assignment_failure(&self, event_id: EventId, error: &str) -> LockResult<()>;

    /// Count a failed attempt and stop retrying the event
    async fn abandon_assignment(
        &self,
        event_id: EventId,
        error: &str,
        at: DateTime<Utc>,
    ) -> LockResult<()>;
}

/// One atomic unit of work.
///
/// Dropping a transaction without calling [`commit`](StoreTransaction::commit)
/// discards every write made through it.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Load a tournament, locking it against concurrent transitions
    async fn load_tournament(&mut self, id: TournamentId) -> LockResult<Option<Tournament>>;

    /// Non-cancelled entries in seat priority order: checked-in first by
    /// check-in time, then registration time, then id
    async fn load_active_entries(&mut self, tournament_id: TournamentId) -> LockResult<Vec<Entry>>;

    /// Set `status` on every listed entry; returns rows touched
    async fn update_entry_status(&mut self, ids: &[EntryId], status: EntryStatus)
    -> LockResult<u64>;

    /// Matches of one round
    async fn load_matches(
        &mut self,
        tournament_id: TournamentId,
        round: u32,
    ) -> LockResult<Vec<Match>>;

    /// Delete every match of one round; returns rows removed
    async fn delete_matches(&mut self, tournament_id: TournamentId, round: u32) -> LockResult<u64>;

    /// Insert matches in one statement
    async fn insert_matches(&mut self, matches: &[NewMatch]) -> LockResult<()>;

    /// Persist status and seat count
    async fn update_tournament(&mut self, tournament: &Tournament) -> LockResult<()>;

    /// Record a game-assignment event to deliver after commit
    async fn enqueue_assignment(
        &mut self,
        tournament_id: TournamentId,
        round: u32,
        at: DateTime<Utc>,
    ) -> LockResult<EventId>;

    async fn commit(self: Box<Self>) -> LockResult<()>;

    async fn rollback(self: Box<Self>) -> LockResult<()>;
}
