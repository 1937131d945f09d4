//! Game-assignment outbox relay.
//!
//! Starting a tournament writes an assignment event in the same transaction as
//! the round 1 pairings. The relay delivers those events to the game host once
//! they are committed. A failed delivery stays pending with its error recorded
//! and is retried on a later pass; it never undoes the start. Events the host
//! rejects, or that run out of attempts, are abandoned and never retried.
//! Retried events queue behind fresh ones so a stuck event cannot hold up
//! delivery for other tournaments.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use super::config::LockConfig;
use super::errors::LockResult;
use super::models::{AssignmentEvent, TournamentId};
use crate::db::store::TournamentStore;
use crate::schedule::Clock;

/// Failure reported by the game host
#[derive(Debug, Error)]
pub enum AssignmentError {
    /// The host refused the round; retrying unchanged will not help
    #[error("Assignment rejected: {0}")]
    Rejected(String),

    #[error("Game host unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AssignmentError {
    /// Whether a later delivery of the same event may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AssignmentError::Rejected(_))
    }
}

/// External collaborator that assigns games for a paired round
#[async_trait]
pub trait GameAssigner: Send + Sync {
    async fn assign_games(
        &self,
        tournament_id: TournamentId,
        round: u32,
    ) -> Result<(), AssignmentError>;
}

/// Counts from one relay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayReport {
    pub dispatched: usize,
    /// Failed and left pending for another attempt
    pub failed: usize,
    /// Failed and given up on
    pub abandoned: usize,
}

/// Delivers pending outbox events to a [`GameAssigner`]
pub struct AssignmentRelay {
    store: Arc<dyn TournamentStore>,
    assigner: Arc<dyn GameAssigner>,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    max_attempts: u32,
}

impl AssignmentRelay {
    /// Create a new relay
    ///
    /// # Arguments
    ///
    /// * `store` - Store holding the outbox
    /// * `assigner` - Game host
    /// * `clock` - Source of the dispatch timestamp
    /// * `config` - Batch size and delivery attempt limit
    pub fn new(
        store: Arc<dyn TournamentStore>,
        assigner: Arc<dyn GameAssigner>,
        clock: Arc<dyn Clock>,
        config: &LockConfig,
    ) -> Self {
        Self {
            store,
            assigner,
            clock,
            batch_size: config.outbox_batch_size,
            max_attempts: config.max_delivery_attempts,
        }
    }

    /// Deliver up to one batch of pending events, least-attempted first
    pub async fn dispatch_pending(&self) -> LockResult<RelayReport> {
        let events = self.store.pending_assignments(self.batch_size).await?;
        self.dispatch(events).await
    }

    /// Deliver every pending event of one tournament
    pub async fn dispatch_for(&self, tournament_id: TournamentId) -> LockResult<RelayReport> {
        let events = self.store.pending_assignments_for(tournament_id).await?;
        self.dispatch(events).await
    }

    async fn dispatch(&self, events: Vec<AssignmentEvent>) -> LockResult<RelayReport> {
        let mut report = RelayReport::default();

        for event in events {
            match self
                .assigner
                .assign_games(event.tournament_id, event.round)
                .await
            {
                Ok(()) => {
                    self.store
                        .mark_assignment_dispatched(event.id, self.clock.now())
                        .await?;
                    report.dispatched += 1;
                    log::info!(
                        "Assigned games for tournament {} round {}",
                        event.tournament_id,
                        event.round
                    );
                }
                Err(e) if e.is_retryable() && event.attempts + 1 < self.max_attempts => {
                    log::warn!(
                        "Game assignment for tournament {} round {} failed (attempt {}): {}",
                        event.tournament_id,
                        event.round,
                        event.attempts + 1,
                        e
                    );
                    self.store
                        .record_assignment_failure(event.id, &e.to_string())
                        .await?;
                    report.failed += 1;
                }
                Err(e) => {
                    log::error!(
                        "Giving up on game assignment for tournament {} round {} after {} attempts: {}",
                        event.tournament_id,
                        event.round,
                        event.attempts + 1,
                        e
                    );
                    self.store
                        .abandon_assignment(event.id, &e.to_string(), self.clock.now())
                        .await?;
                    report.abandoned += 1;
                }
            }
        }

        Ok(report)
    }
}
