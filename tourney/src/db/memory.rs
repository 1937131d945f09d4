//! In-memory store.
//!
//! Transactions hold an owned lock on the whole state for their lifetime, which
//! serializes them the way SERIALIZABLE isolation would, and write into a
//! private copy that replaces the shared state only on commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::store::{StoreTransaction, TournamentStore};
use crate::tournament::errors::{LockError, LockResult};
use crate::tournament::models::{
    AssignmentEvent, Entry, EntryId, EntryStatus, EventId, Match, MatchId, NewMatch, Tournament,
    TournamentId, order_by_seat_priority,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tournaments: BTreeMap<TournamentId, Tournament>,
    entries: BTreeMap<EntryId, Entry>,
    matches: BTreeMap<MatchId, Match>,
    outbox: BTreeMap<EventId, AssignmentEvent>,
    next_match_id: MatchId,
    next_event_id: EventId,
}

impl MemoryState {
    fn push_match(&mut self, new: &NewMatch) -> MatchId {
        self.next_match_id += 1;
        let id = self.next_match_id;
        self.matches.insert(
            id,
            Match {
                id,
                tournament_id: new.tournament_id,
                round: new.round,
                player1_id: new.player1_id,
                player2_id: new.player2_id,
                status: new.status,
                result: new.result,
                scheduled_at: new.scheduled_at,
                completed_at: new.completed_at,
            },
        );
        id
    }
}

/// Store kept entirely in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    injected_conflicts: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` commits fail with `LockError::Conflict`
    pub fn inject_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    pub async fn insert_tournament(&self, tournament: Tournament) {
        self.state
            .lock()
            .await
            .tournaments
            .insert(tournament.id, tournament);
    }

    pub async fn insert_entry(&self, entry: Entry) {
        self.state.lock().await.entries.insert(entry.id, entry);
    }

    pub async fn insert_match(&self, new: NewMatch) -> MatchId {
        self.state.lock().await.push_match(&new)
    }

    pub async fn tournament(&self, id: TournamentId) -> Option<Tournament> {
        self.state.lock().await.tournaments.get(&id).cloned()
    }

    /// Every entry of a tournament, cancelled ones included, by id
    pub async fn entries(&self, tournament_id: TournamentId) -> Vec<Entry> {
        self.state
            .lock()
            .await
            .entries
            .values()
            .filter(|e| e.tournament_id == tournament_id)
            .cloned()
            .collect()
    }

    /// Every match of a tournament, by id
    pub async fn matches(&self, tournament_id: TournamentId) -> Vec<Match> {
        self.state
            .lock()
            .await
            .matches
            .values()
            .filter(|m| m.tournament_id == tournament_id)
            .cloned()
            .collect()
    }

    /// Every outbox event, delivered or not
    pub async fn assignments(&self) -> Vec<AssignmentEvent> {
        self.state.lock().await.outbox.values().cloned().collect()
    }
}

#[async_trait]
impl TournamentStore for MemoryStore {
    async fn begin(&self) -> LockResult<Box<dyn StoreTransaction>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();

        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            injected_conflicts: Arc::clone(&self.injected_conflicts),
        }))
    }

    async fn due_tournaments(&self, now: DateTime<Utc>) -> LockResult<Vec<TournamentId>> {
        let state = self.state.lock().await;
        let mut due: Vec<&Tournament> = state
            .tournaments
            .values()
            .filter(|t| t.is_lock_due(now))
            .collect();
        due.sort_by_key(|t| (t.lock_at, t.id));
        Ok(due.into_iter().map(|t| t.id).collect())
    }

    async fn pending_assignments(&self, limit: usize) -> LockResult<Vec<AssignmentEvent>> {
        let state = self.state.lock().await;
        let mut pending: Vec<&AssignmentEvent> =
            state.outbox.values().filter(|e| e.is_pending()).collect();
        pending.sort_by_key(|e| (e.attempts, e.id));
        Ok(pending.into_iter().take(limit).cloned().collect())
    }

    async fn pending_assignments_for(
        &self,
        tournament_id: TournamentId,
    ) -> LockResult<Vec<AssignmentEvent>> {
        let state = self.state.lock().await;
        Ok(state
            .outbox
            .values()
            .filter(|e| e.tournament_id == tournament_id && e.is_pending())
            .cloned()
            .collect())
    }

    async fn mark_assignment_dispatched(
        &self,
        event_id: EventId,
        at: DateTime<Utc>,
    ) -> LockResult<()> {
        let mut state = self.state.lock().await;
        if let Some(event) = state.outbox.get_mut(&event_id) {
            event.attempts += 1;
            event.dispatched_at = Some(at);
        }
        Ok(())
    }

    async fn record_assignment_failure(&self, event_id: EventId, error: &str) -> LockResult<()> {
        let mut state = self.state.lock().await;
        if let Some(event) = state.outbox.get_mut(&event_id) {
            event.attempts += 1;
            event.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn abandon_assignment(
        &self,
        event_id: EventId,
        error: &str,
        at: DateTime<Utc>,
    ) -> LockResult<()> {
        let mut state = self.state.lock().await;
        if let Some(event) = state.outbox.get_mut(&event_id) {
            event.attempts += 1;
            event.last_error = Some(error.to_string());
            event.abandoned_at = Some(at);
        }
        Ok(())
    }
}

/// Transaction over [`MemoryStore`]
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    injected_conflicts: Arc<AtomicU32>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn load_tournament(&mut self, id: TournamentId) -> LockResult<Option<Tournament>> {
        Ok(self.working.tournaments.get(&id).cloned())
    }

    async fn load_active_entries(&mut self, tournament_id: TournamentId) -> LockResult<Vec<Entry>> {
        let mut entries: Vec<Entry> = self
            .working
            .entries
            .values()
            .filter(|e| e.tournament_id == tournament_id && e.is_active())
            .cloned()
            .collect();
        order_by_seat_priority(&mut entries);
        Ok(entries)
    }

    async fn update_entry_status(
        &mut self,
        ids: &[EntryId],
        status: EntryStatus,
    ) -> LockResult<u64> {
        let mut touched = 0;
        for id in ids {
            if let Some(entry) = self.working.entries.get_mut(id) {
                entry.status = status;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn load_matches(
        &mut self,
        tournament_id: TournamentId,
        round: u32,
    ) -> LockResult<Vec<Match>> {
        Ok(self
            .working
            .matches
            .values()
            .filter(|m| m.tournament_id == tournament_id && m.round == round)
            .cloned()
            .collect())
    }

    async fn delete_matches(&mut self, tournament_id: TournamentId, round: u32) -> LockResult<u64> {
        let before = self.working.matches.len();
        self.working
            .matches
            .retain(|_, m| !(m.tournament_id == tournament_id && m.round == round));
        Ok((before - self.working.matches.len()) as u64)
    }

    async fn insert_matches(&mut self, matches: &[NewMatch]) -> LockResult<()> {
        for new in matches {
            self.working.push_match(new);
        }
        Ok(())
    }

    async fn update_tournament(&mut self, tournament: &Tournament) -> LockResult<()> {
        if let Some(slot) = self.working.tournaments.get_mut(&tournament.id) {
            slot.status = tournament.status;
            slot.current_players = tournament.current_players;
        }
        Ok(())
    }

    async fn enqueue_assignment(
        &mut self,
        tournament_id: TournamentId,
        round: u32,
        at: DateTime<Utc>,
    ) -> LockResult<EventId> {
        self.working.next_event_id += 1;
        let id = self.working.next_event_id;
        self.working.outbox.insert(
            id,
            AssignmentEvent {
                id,
                tournament_id,
                round,
                created_at: at,
                attempts: 0,
                last_error: None,
                dispatched_at: None,
                abandoned_at: None,
            },
        );
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> LockResult<()> {
        let MemoryTransaction {
            mut guard,
            working,
            injected_conflicts,
        } = *self;

        let conflicted = injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflicted {
            return Err(LockError::Conflict(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }

        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> LockResult<()> {
        Ok(())
    }
}
