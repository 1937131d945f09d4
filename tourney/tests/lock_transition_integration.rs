//! Integration tests for the lock transition
//!
//! These tests drive `TournamentLifecycle` against the in-memory store and
//! check the persisted result of each lock decision.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use tourney::db::{MemoryStore, StoreTransaction, TournamentStore};
use tourney::schedule::{Clock, FixedClock, compute_lock_at};
use tourney::tournament::{
    AssignmentError, Entry, EntryId, EntryStatus, GameAssigner, LockConfig, LockError,
    LockOutcome, MatchResult, MatchStatus, NewMatch, Tournament, TournamentId,
    TournamentLifecycle, TournamentStatus,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

fn test_config() -> LockConfig {
    LockConfig {
        max_attempts: 3,
        retry_backoff: std::time::Duration::from_millis(1),
        transaction_timeout: std::time::Duration::from_secs(5),
        outbox_batch_size: 10,
        max_delivery_attempts: 3,
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    next_entry: EntryId,
}

impl Fixture {
    /// Clock one minute past lock time
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(FixedClock::new(start() - Duration::minutes(1))),
            next_entry: 0,
        }
    }

    fn lifecycle(&self) -> TournamentLifecycle {
        TournamentLifecycle::new(self.store.clone(), self.clock.clone(), test_config())
    }

    async fn tournament(&self, id: TournamentId, min_players: usize, max_players: usize) {
        self.store
            .insert_tournament(Tournament {
                id,
                status: TournamentStatus::Registration,
                start_date: start(),
                lock_at: compute_lock_at(start()),
                min_players,
                max_players,
                current_players: 0,
            })
            .await;
    }

    /// Add an entry; `checked_in` is minutes before start
    async fn entry(
        &mut self,
        tournament_id: TournamentId,
        status: EntryStatus,
        checked_in: Option<i64>,
    ) -> EntryId {
        self.next_entry += 1;
        let id = self.next_entry;
        self.store
            .insert_entry(Entry {
                id,
                tournament_id,
                user_id: 1000 + id,
                status,
                checked_in_at: checked_in.map(|m| start() - Duration::minutes(m)),
                created_at: start() - Duration::days(1) + Duration::seconds(id),
            })
            .await;
        id
    }

    async fn status_of(&self, tournament_id: TournamentId, entry_id: EntryId) -> EntryStatus {
        self.store
            .entries(tournament_id)
            .await
            .into_iter()
            .find(|e| e.id == entry_id)
            .map(|e| e.status)
            .unwrap()
    }
}

fn round_one(tournament_id: TournamentId, result: Option<MatchResult>) -> NewMatch {
    NewMatch {
        tournament_id,
        round: 1,
        player1_id: 1001,
        player2_id: Some(1002),
        status: if result.is_some() {
            MatchStatus::Completed
        } else {
            MatchStatus::Scheduled
        },
        result,
        scheduled_at: Some(start()),
        completed_at: None,
    }
}

/// Records calls and fails while `fail` is set
#[derive(Default)]
struct RecordingAssigner {
    calls: Mutex<Vec<(TournamentId, u32)>>,
    fail: Mutex<bool>,
}

#[async_trait]
impl GameAssigner for RecordingAssigner {
    async fn assign_games(
        &self,
        tournament_id: TournamentId,
        round: u32,
    ) -> Result<(), AssignmentError> {
        self.calls.lock().unwrap().push((tournament_id, round));
        if *self.fail.lock().unwrap() {
            return Err(AssignmentError::Unavailable("no game servers".to_string()));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_short_field_cancels_everything() {
    let mut fx = Fixture::new();
    fx.tournament(1, 4, 8).await;
    for minute in [10, 9, 8] {
        fx.entry(1, EntryStatus::Confirmed, Some(minute)).await;
    }

    let outcome = fx.lifecycle().enforce_tournament_lock(1).await.unwrap();

    let LockOutcome::Cancelled { tournament } = outcome else {
        panic!("expected cancellation, got {outcome:?}");
    };
    assert_eq!(tournament.status, TournamentStatus::Cancelled);
    assert_eq!(tournament.current_players, 3);

    let stored = fx.store.tournament(1).await.unwrap();
    assert_eq!(stored.status, TournamentStatus::Cancelled);
    assert!(
        fx.store
            .entries(1)
            .await
            .iter()
            .all(|e| e.status == EntryStatus::Cancelled)
    );
    assert!(fx.store.matches(1).await.is_empty());
    assert!(fx.store.assignments().await.is_empty());
}

#[tokio::test]
async fn test_single_player_gets_a_bye() {
    let mut fx = Fixture::new();
    fx.tournament(1, 1, 8).await;
    fx.entry(1, EntryStatus::Confirmed, Some(5)).await;

    let outcome = fx.lifecycle().enforce_tournament_lock(1).await.unwrap();
    assert!(matches!(outcome, LockOutcome::Started { .. }));

    let stored = fx.store.tournament(1).await.unwrap();
    assert_eq!(stored.status, TournamentStatus::InProgress);
    assert_eq!(stored.current_players, 1);

    let matches = fx.store.matches(1).await;
    assert_eq!(matches.len(), 1);
    assert!(matches[0].is_bye());
    assert_eq!(matches[0].player1_id, 1001);
    assert_eq!(matches[0].status, MatchStatus::Completed);
    assert_eq!(matches[0].result, Some(MatchResult::Player1));
    assert_eq!(matches[0].scheduled_at, Some(start()));
    assert_eq!(matches[0].completed_at, Some(fx.clock.now()));
}

#[tokio::test]
async fn test_unchecked_entry_is_not_seated() {
    let mut fx = Fixture::new();
    fx.tournament(1, 1, 8).await;
    let entry = fx.entry(1, EntryStatus::Confirmed, None).await;

    let outcome = fx.lifecycle().enforce_tournament_lock(1).await.unwrap();

    assert!(matches!(outcome, LockOutcome::Cancelled { .. }));
    assert_eq!(fx.status_of(1, entry).await, EntryStatus::Cancelled);
    assert!(fx.store.matches(1).await.is_empty());
}

#[tokio::test]
async fn test_odd_field_pairs_with_one_bye() {
    let mut fx = Fixture::new();
    fx.tournament(1, 2, 8).await;
    for minute in [15, 14, 13, 12, 11] {
        fx.entry(1, EntryStatus::Confirmed, Some(minute)).await;
    }

    let outcome = fx.lifecycle().enforce_tournament_lock(1).await.unwrap();
    let LockOutcome::Started {
        tournament,
        matches,
    } = outcome
    else {
        panic!("expected start");
    };
    assert_eq!(tournament.current_players, 5);
    assert_eq!(matches.len(), 3);

    let stored = fx.store.matches(1).await;
    assert_eq!(stored.len(), 3);
    let byes: Vec<_> = stored.iter().filter(|m| m.is_bye()).collect();
    assert_eq!(byes.len(), 1);
    assert_eq!(byes[0].player1_id, 1005);

    let games: Vec<_> = stored
        .iter()
        .filter(|m| !m.is_bye())
        .map(|m| (m.player1_id, m.player2_id))
        .collect();
    assert_eq!(games, vec![(1001, Some(1002)), (1003, Some(1004))]);
    assert!(
        stored
            .iter()
            .filter(|m| !m.is_bye())
            .all(|m| m.status == MatchStatus::Scheduled && m.completed_at.is_none())
    );
}

#[tokio::test]
async fn test_waitlist_fills_remaining_seats_in_check_in_order() {
    let mut fx = Fixture::new();
    fx.tournament(1, 2, 10).await;

    // Waitlist checked in before anyone confirmed
    let late_waitlist = fx.entry(1, EntryStatus::Waitlist, Some(18)).await;
    let early_waitlist = fx.entry(1, EntryStatus::Waitlist, Some(19)).await;
    let mut confirmed = Vec::new();
    for minute in 1..=9 {
        confirmed.push(fx.entry(1, EntryStatus::Confirmed, Some(minute)).await);
    }

    let outcome = fx.lifecycle().enforce_tournament_lock(1).await.unwrap();
    assert!(matches!(outcome, LockOutcome::Started { .. }));

    let stored = fx.store.tournament(1).await.unwrap();
    assert_eq!(stored.current_players, 10);
    assert_eq!(fx.status_of(1, early_waitlist).await, EntryStatus::Confirmed);
    assert_eq!(fx.status_of(1, late_waitlist).await, EntryStatus::Cancelled);
    for id in confirmed {
        assert_eq!(fx.status_of(1, id).await, EntryStatus::Confirmed);
    }

    let matches = fx.store.matches(1).await;
    assert_eq!(matches.len(), 5);
    assert!(matches.iter().all(|m| !m.is_bye()));
}

#[tokio::test]
async fn test_pending_and_unchecked_entries_are_cancelled_on_start() {
    let mut fx = Fixture::new();
    fx.tournament(1, 2, 8).await;
    fx.entry(1, EntryStatus::Confirmed, Some(6)).await;
    fx.entry(1, EntryStatus::Confirmed, Some(5)).await;
    let pending = fx.entry(1, EntryStatus::Pending, Some(4)).await;
    let absent = fx.entry(1, EntryStatus::Confirmed, None).await;

    fx.lifecycle().enforce_tournament_lock(1).await.unwrap();

    assert_eq!(fx.status_of(1, pending).await, EntryStatus::Cancelled);
    assert_eq!(fx.status_of(1, absent).await, EntryStatus::Cancelled);
    assert_eq!(fx.store.tournament(1).await.unwrap().current_players, 2);
}

#[tokio::test]
async fn test_enforce_is_idempotent() {
    let mut fx = Fixture::new();
    fx.tournament(1, 2, 8).await;
    for minute in [4, 3, 2] {
        fx.entry(1, EntryStatus::Confirmed, Some(minute)).await;
    }
    let lifecycle = fx.lifecycle();

    let first = lifecycle.enforce_tournament_lock(1).await.unwrap();
    assert!(matches!(first, LockOutcome::Started { .. }));
    let matches_after_first = fx.store.matches(1).await;

    fx.clock.advance(Duration::minutes(5));
    let second = lifecycle.enforce_tournament_lock(1).await.unwrap();
    let LockOutcome::Unchanged { tournament } = second else {
        panic!("expected no-op");
    };
    assert_eq!(tournament.status, TournamentStatus::InProgress);
    assert_eq!(tournament.current_players, 3);

    assert_eq!(fx.store.matches(1).await, matches_after_first);
    assert_eq!(fx.store.assignments().await.len(), 1);
}

#[tokio::test]
async fn test_not_due_yet_leaves_registration_open() {
    let mut fx = Fixture::new();
    fx.clock.set(start() - Duration::minutes(3));
    fx.tournament(1, 1, 8).await;
    fx.entry(1, EntryStatus::Confirmed, Some(5)).await;

    let outcome = fx.lifecycle().enforce_tournament_lock(1).await.unwrap();

    assert!(matches!(outcome, LockOutcome::Unchanged { .. }));
    assert_eq!(
        fx.store.tournament(1).await.unwrap().status,
        TournamentStatus::Registration
    );
    assert!(fx.store.matches(1).await.is_empty());
}

#[tokio::test]
async fn test_stale_round_one_is_replaced() {
    let mut fx = Fixture::new();
    fx.tournament(1, 2, 8).await;
    fx.entry(1, EntryStatus::Confirmed, Some(3)).await;
    fx.entry(1, EntryStatus::Confirmed, Some(2)).await;
    fx.store.insert_match(round_one(1, None)).await;
    fx.store.insert_match(round_one(1, None)).await;

    fx.lifecycle().enforce_tournament_lock(1).await.unwrap();

    let matches = fx.store.matches(1).await;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].player1_id, 1001);
    assert_eq!(matches[0].player2_id, Some(1002));
    assert!(matches[0].id > 2);
}

#[tokio::test]
async fn test_played_round_one_blocks_the_start() {
    let mut fx = Fixture::new();
    fx.tournament(1, 2, 8).await;
    let first = fx.entry(1, EntryStatus::Confirmed, Some(3)).await;
    let absent = fx.entry(1, EntryStatus::Confirmed, None).await;
    fx.entry(1, EntryStatus::Confirmed, Some(2)).await;
    fx.store
        .insert_match(round_one(1, Some(MatchResult::Draw)))
        .await;

    let err = fx.lifecycle().enforce_tournament_lock(1).await.unwrap_err();

    assert!(matches!(
        err,
        LockError::RoundAlreadyPlayed {
            tournament_id: 1,
            round: 1
        }
    ));
    assert!(!err.is_transient());
    assert_eq!(
        fx.store.tournament(1).await.unwrap().status,
        TournamentStatus::Registration
    );
    assert_eq!(fx.status_of(1, first).await, EntryStatus::Confirmed);
    assert_eq!(fx.status_of(1, absent).await, EntryStatus::Confirmed);
    assert_eq!(fx.store.matches(1).await.len(), 1);
    assert!(fx.store.assignments().await.is_empty());
}

#[tokio::test]
async fn test_conflicts_are_retried() {
    let mut fx = Fixture::new();
    fx.tournament(1, 1, 8).await;
    fx.entry(1, EntryStatus::Confirmed, Some(3)).await;
    fx.store.inject_conflicts(2);

    let outcome = fx.lifecycle().enforce_tournament_lock(1).await.unwrap();

    assert!(matches!(outcome, LockOutcome::Started { .. }));
    assert_eq!(fx.store.matches(1).await.len(), 1);
    assert_eq!(fx.store.assignments().await.len(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_write_nothing() {
    let mut fx = Fixture::new();
    fx.tournament(1, 1, 8).await;
    let entry = fx.entry(1, EntryStatus::Confirmed, Some(3)).await;
    fx.store.inject_conflicts(3);

    let err = fx.lifecycle().enforce_tournament_lock(1).await.unwrap_err();

    assert!(matches!(err, LockError::RetriesExhausted { attempts: 3 }));
    assert!(err.is_transient());
    assert_eq!(
        fx.store.tournament(1).await.unwrap().status,
        TournamentStatus::Registration
    );
    assert_eq!(fx.status_of(1, entry).await, EntryStatus::Confirmed);
    assert!(fx.store.matches(1).await.is_empty());
    assert!(fx.store.assignments().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_invocations_start_once() {
    let mut fx = Fixture::new();
    fx.tournament(1, 2, 8).await;
    for minute in [4, 3, 2, 1] {
        fx.entry(1, EntryStatus::Confirmed, Some(minute)).await;
    }
    let lifecycle = fx.lifecycle();

    let (a, b) = tokio::join!(
        lifecycle.enforce_tournament_lock(1),
        lifecycle.enforce_tournament_lock(1)
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    let started = outcomes
        .iter()
        .filter(|o| matches!(o, LockOutcome::Started { .. }))
        .count();
    let unchanged = outcomes
        .iter()
        .filter(|o| matches!(o, LockOutcome::Unchanged { .. }))
        .count();
    assert_eq!((started, unchanged), (1, 1));
    assert_eq!(fx.store.matches(1).await.len(), 2);
    assert_eq!(fx.store.assignments().await.len(), 1);
}

#[tokio::test]
async fn test_sweep_isolates_failures() {
    let mut fx = Fixture::new();

    // Starts
    fx.tournament(1, 2, 8).await;
    fx.entry(1, EntryStatus::Confirmed, Some(3)).await;
    fx.entry(1, EntryStatus::Confirmed, Some(2)).await;

    // Round 1 already has a result
    fx.tournament(2, 2, 8).await;
    fx.entry(2, EntryStatus::Confirmed, Some(3)).await;
    fx.entry(2, EntryStatus::Confirmed, Some(2)).await;
    fx.store
        .insert_match(round_one(2, Some(MatchResult::Player2)))
        .await;

    // Too small
    fx.tournament(3, 4, 8).await;
    fx.entry(3, EntryStatus::Confirmed, Some(3)).await;

    // Not due
    fx.store
        .insert_tournament(Tournament {
            id: 4,
            status: TournamentStatus::Registration,
            start_date: start() + Duration::hours(1),
            lock_at: compute_lock_at(start() + Duration::hours(1)),
            min_players: 1,
            max_players: 8,
            current_players: 0,
        })
        .await;

    let report = fx.lifecycle().enforce_tournament_locks().await.unwrap();

    assert_eq!(report.started, 1);
    assert_eq!(report.cancelled, 1);
    assert_eq!(report.unchanged, 0);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, 2);
    assert!(report.failed[0].1.contains("already has results"));
    assert_eq!(report.processed(), 3);

    let status = |id| {
        let store = fx.store.clone();
        async move { store.tournament(id).await.unwrap().status }
    };
    assert_eq!(status(1).await, TournamentStatus::InProgress);
    assert_eq!(status(2).await, TournamentStatus::Registration);
    assert_eq!(status(3).await, TournamentStatus::Cancelled);
    assert_eq!(status(4).await, TournamentStatus::Registration);

    // Without an assigner the start's event waits for the host's relay
    assert_eq!(report.assignments_dispatched, 0);
    let pending = fx.lifecycle().pending_assignments().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].tournament_id, 1);
}

#[tokio::test]
async fn test_assignment_failure_keeps_start_and_retries_on_sweep() {
    let mut fx = Fixture::new();
    fx.tournament(1, 2, 8).await;
    fx.entry(1, EntryStatus::Confirmed, Some(3)).await;
    fx.entry(1, EntryStatus::Confirmed, Some(2)).await;

    let assigner = Arc::new(RecordingAssigner::default());
    *assigner.fail.lock().unwrap() = true;
    let lifecycle = fx.lifecycle().with_assigner(assigner.clone());

    let outcome = lifecycle.enforce_tournament_lock(1).await.unwrap();
    assert!(matches!(outcome, LockOutcome::Started { .. }));
    assert_eq!(
        fx.store.tournament(1).await.unwrap().status,
        TournamentStatus::InProgress
    );

    let events = fx.store.assignments().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].attempts, 1);
    assert!(events[0].dispatched_at.is_none());
    assert!(events[0].last_error.is_some());

    *assigner.fail.lock().unwrap() = false;
    let report = lifecycle.enforce_tournament_locks().await.unwrap();
    assert_eq!(report.processed(), 0);
    assert_eq!(report.assignments_dispatched, 1);
    assert_eq!(report.assignments_failed, 0);

    let events = fx.store.assignments().await;
    assert_eq!(events[0].dispatched_at, Some(fx.clock.now()));
    assert_eq!(*assigner.calls.lock().unwrap(), vec![(1, 1), (1, 1)]);
    assert!(fx.store.pending_assignments(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_start_delivers_past_a_stuck_outbox_head() {
    let mut fx = Fixture::new();
    fx.tournament(1, 2, 8).await;
    fx.entry(1, EntryStatus::Confirmed, Some(3)).await;
    fx.entry(1, EntryStatus::Confirmed, Some(2)).await;

    // An older event the host keeps failing on
    let mut tx: Box<dyn StoreTransaction> = fx.store.begin().await.unwrap();
    let stuck = tx.enqueue_assignment(9, 1, fx.clock.now()).await.unwrap();
    tx.commit().await.unwrap();
    fx.store
        .record_assignment_failure(stuck, "host down")
        .await
        .unwrap();

    let assigner = Arc::new(RecordingAssigner::default());
    let config = LockConfig {
        outbox_batch_size: 1,
        ..test_config()
    };
    let lifecycle = TournamentLifecycle::new(fx.store.clone(), fx.clock.clone(), config)
        .with_assigner(assigner.clone());

    let outcome = lifecycle.enforce_tournament_lock(1).await.unwrap();
    assert!(matches!(outcome, LockOutcome::Started { .. }));
    assert_eq!(*assigner.calls.lock().unwrap(), vec![(1, 1)]);

    let events = fx.store.assignments().await;
    let started = events.iter().find(|e| e.tournament_id == 1).unwrap();
    assert_eq!(started.dispatched_at, Some(fx.clock.now()));

    let pending = fx.store.pending_assignments(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, stuck);
}

#[tokio::test]
async fn test_cancellation_never_notifies_the_host() {
    let mut fx = Fixture::new();
    fx.tournament(1, 3, 8).await;
    fx.entry(1, EntryStatus::Confirmed, Some(3)).await;

    let assigner = Arc::new(RecordingAssigner::default());
    let lifecycle = fx.lifecycle().with_assigner(assigner.clone());

    let report = lifecycle.enforce_tournament_locks().await.unwrap();

    assert_eq!(report.cancelled, 1);
    assert_eq!(report.assignments_dispatched, 0);
    assert!(assigner.calls.lock().unwrap().is_empty());
    assert!(fx.store.assignments().await.is_empty());
}
