//! Lock transition engine.
//!
//! At lock time a tournament in registration either starts with a finalized
//! field and a paired first round, or collapses with every entry cancelled.
//! The whole decision runs in one store transaction and is retried on
//! serialization conflicts.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::config::LockConfig;
use super::errors::{LockError, LockResult};
use super::models::{
    Entry, EntryId, EntryStatus, FIRST_ROUND, LockOutcome, NewMatch, Tournament, TournamentId,
    TournamentStatus, UserId, order_by_seat_priority,
};
use crate::db::store::{StoreTransaction, TournamentStore};
use crate::db::timeouts::with_timeout;
use crate::schedule::Clock;
use crate::swiss::generate_swiss_round;

/// Decision taken for a due tournament, before anything is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockPlan {
    /// Too few checked-in players
    Cancel {
        /// Every non-cancelled entry
        cancel: Vec<EntryId>,
        /// Non-cancelled entries before selection
        current_players: usize,
    },
    /// Field finalized
    Start {
        /// Seated entries in seat order
        seated: Vec<Entry>,
        /// Seated waitlist entries to confirm
        promote: Vec<EntryId>,
        /// Non-cancelled entries left without a seat
        cancel: Vec<EntryId>,
    },
}

/// Decide the outcome of locking `tournament` with its `entries`.
///
/// Seats go to checked-in confirmed entries first, then checked-in waitlist
/// entries, each group in seat priority order, up to `max_players`. Entries
/// that never checked in are not seated whatever their status, and neither
/// are pending ones.
pub fn plan_lock(tournament: &Tournament, entries: &[Entry]) -> LockPlan {
    let mut active: Vec<Entry> = entries.iter().filter(|e| e.is_active()).cloned().collect();
    order_by_seat_priority(&mut active);

    let checked_in = |status: EntryStatus| {
        active
            .iter()
            .filter(move |e| e.status == status && e.is_checked_in())
    };
    let seated: Vec<Entry> = checked_in(EntryStatus::Confirmed)
        .chain(checked_in(EntryStatus::Waitlist))
        .take(tournament.max_players)
        .cloned()
        .collect();

    if seated.len() < tournament.min_players {
        return LockPlan::Cancel {
            cancel: active.iter().map(|e| e.id).collect(),
            current_players: active.len(),
        };
    }

    let promote = seated
        .iter()
        .filter(|e| e.status == EntryStatus::Waitlist)
        .map(|e| e.id)
        .collect();
    let cancel = active
        .iter()
        .filter(|e| !seated.iter().any(|s| s.id == e.id))
        .map(|e| e.id)
        .collect();

    LockPlan::Start {
        seated,
        promote,
        cancel,
    }
}

/// Runs the lock transition against a store
pub struct LockEngine {
    store: Arc<dyn TournamentStore>,
    clock: Arc<dyn Clock>,
    config: LockConfig,
}

impl LockEngine {
    /// Create a new engine
    ///
    /// # Arguments
    ///
    /// * `store` - Tournament store
    /// * `clock` - Source of "now"
    /// * `config` - Retry and timeout settings
    pub fn new(store: Arc<dyn TournamentStore>, clock: Arc<dyn Clock>, config: LockConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Retry, timeout and outbox settings in use
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Lock a tournament if its lock time has passed.
    ///
    /// Safe to call any number of times: a tournament that is not due or has
    /// already left registration comes back as [`LockOutcome::Unchanged`].
    ///
    /// # Errors
    ///
    /// * `LockError::RetriesExhausted` - Every attempt hit a conflict or timeout
    /// * `LockError::RoundAlreadyPlayed` - Round 1 already has results
    /// * `LockError::Database` - Any other store failure
    pub async fn enforce(&self, tournament_id: TournamentId) -> LockResult<LockOutcome> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match with_timeout(self.config.transaction_timeout, self.attempt(tournament_id)).await
            {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_retryable() => {
                    if attempt >= self.config.max_attempts {
                        log::warn!(
                            "Lock of tournament {} gave up after {} attempts: {}",
                            tournament_id,
                            attempt,
                            err
                        );
                        return Err(LockError::RetriesExhausted { attempts: attempt });
                    }

                    let backoff = self.config.backoff_for(attempt);
                    log::debug!(
                        "Lock of tournament {} attempt {} failed ({}), retrying in {:?}",
                        tournament_id,
                        attempt,
                        err,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt(&self, tournament_id: TournamentId) -> LockResult<LockOutcome> {
        let mut tx = self.store.begin().await?;

        let Some(tournament) = tx.load_tournament(tournament_id).await? else {
            tx.rollback().await?;
            return Ok(LockOutcome::NotFound { tournament_id });
        };

        let entries = tx.load_active_entries(tournament_id).await?;
        let now = self.clock.now();

        if !tournament.is_lock_due(now) {
            tx.rollback().await?;
            let current_players = entries.iter().filter(|e| e.holds_seat()).count();
            return Ok(LockOutcome::Unchanged {
                tournament: Tournament {
                    current_players,
                    ..tournament
                },
            });
        }

        match plan_lock(&tournament, &entries) {
            LockPlan::Cancel {
                cancel,
                current_players,
            } => {
                tx.update_entry_status(&cancel, EntryStatus::Cancelled)
                    .await?;
                let cancelled = tournament.transition(TournamentStatus::Cancelled, current_players)?;
                tx.update_tournament(&cancelled).await?;
                tx.commit().await?;

                log::info!(
                    "Tournament {} cancelled at lock: {} entries, {} required",
                    tournament_id,
                    current_players,
                    tournament.min_players
                );
                Ok(LockOutcome::Cancelled {
                    tournament: cancelled,
                })
            }
            LockPlan::Start {
                seated,
                promote,
                cancel,
            } => {
                tx.update_entry_status(&promote, EntryStatus::Confirmed)
                    .await?;
                tx.update_entry_status(&cancel, EntryStatus::Cancelled)
                    .await?;

                let matches = replace_first_round(tx.as_mut(), &tournament, &seated, now).await?;
                let started = tournament.transition(TournamentStatus::InProgress, seated.len())?;
                tx.update_tournament(&started).await?;
                tx.enqueue_assignment(tournament_id, FIRST_ROUND, now)
                    .await?;
                tx.commit().await?;

                log::info!(
                    "Tournament {} started with {} players ({} promoted, {} cancelled), {} round 1 matches",
                    tournament_id,
                    seated.len(),
                    promote.len(),
                    cancel.len(),
                    matches.len()
                );
                Ok(LockOutcome::Started {
                    tournament: started,
                    matches,
                })
            }
        }
    }
}

/// Delete any round 1 rows and insert fresh pairings for `seated`.
async fn replace_first_round(
    tx: &mut dyn StoreTransaction,
    tournament: &Tournament,
    seated: &[Entry],
    now: DateTime<Utc>,
) -> LockResult<Vec<NewMatch>> {
    let existing = tx.load_matches(tournament.id, FIRST_ROUND).await?;
    if existing.iter().any(|m| !m.is_bye() && m.result.is_some()) {
        return Err(LockError::RoundAlreadyPlayed {
            tournament_id: tournament.id,
            round: FIRST_ROUND,
        });
    }

    let removed = tx.delete_matches(tournament.id, FIRST_ROUND).await?;
    if removed > 0 {
        log::debug!(
            "Replaced {} stale round 1 matches of tournament {}",
            removed,
            tournament.id
        );
    }

    let players: Vec<UserId> = seated.iter().map(|e| e.user_id).collect();
    let matches: Vec<NewMatch> = generate_swiss_round(&players, &[], FIRST_ROUND)
        .iter()
        .map(|p| NewMatch::from_pairing(tournament.id, p, tournament.start_date, now))
        .collect();
    tx.insert_matches(&matches).await?;

    Ok(matches)
}
