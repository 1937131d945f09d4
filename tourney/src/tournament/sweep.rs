//! Lock sweep and the lifecycle entry points.

use serde::Serialize;
use std::sync::Arc;

use super::config::LockConfig;
use super::engine::LockEngine;
use super::errors::LockResult;
use super::models::{AssignmentEvent, LockOutcome, TournamentId};
use super::outbox::{AssignmentRelay, GameAssigner};
use crate::db::store::TournamentStore;
use crate::db::timeouts::with_default_timeout;
use crate::schedule::Clock;

/// Summary of one sweep pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub started: usize,
    pub cancelled: usize,
    /// Due when listed but already handled, or gone, by the time it was locked
    pub unchanged: usize,
    /// Tournaments whose transition errored, with the error text
    pub failed: Vec<(TournamentId, String)>,
    pub assignments_dispatched: usize,
    pub assignments_failed: usize,
    pub assignments_abandoned: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: &LockOutcome) {
        match outcome {
            LockOutcome::Started { .. } => self.started += 1,
            LockOutcome::Cancelled { .. } => self.cancelled += 1,
            LockOutcome::Unchanged { .. } | LockOutcome::NotFound { .. } => self.unchanged += 1,
        }
    }

    /// Tournaments looked at, failed ones included
    pub fn processed(&self) -> usize {
        self.started + self.cancelled + self.unchanged + self.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Entry points the scheduler and read paths call into
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tourney::db::MemoryStore;
/// use tourney::{LockConfig, SystemClock, TournamentLifecycle};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let lifecycle = TournamentLifecycle::new(
///     Arc::new(MemoryStore::new()),
///     Arc::new(SystemClock),
///     LockConfig::default(),
/// );
///
/// let report = lifecycle.enforce_tournament_locks().await?;
/// assert_eq!(report.processed(), 0);
/// # Ok(())
/// # }
/// ```
pub struct TournamentLifecycle {
    store: Arc<dyn TournamentStore>,
    clock: Arc<dyn Clock>,
    engine: LockEngine,
    relay: Option<AssignmentRelay>,
}

impl TournamentLifecycle {
    /// Create a lifecycle without a game host; assignment events stay pending
    ///
    /// # Arguments
    ///
    /// * `store` - Tournament store
    /// * `clock` - Source of "now"
    /// * `config` - Retry, timeout and outbox settings
    pub fn new(store: Arc<dyn TournamentStore>, clock: Arc<dyn Clock>, config: LockConfig) -> Self {
        let engine = LockEngine::new(Arc::clone(&store), Arc::clone(&clock), config);
        Self {
            store,
            clock,
            engine,
            relay: None,
        }
    }

    /// Relay assignment events to `assigner` after each start and each sweep
    pub fn with_assigner(mut self, assigner: Arc<dyn GameAssigner>) -> Self {
        self.relay = Some(AssignmentRelay::new(
            Arc::clone(&self.store),
            assigner,
            Arc::clone(&self.clock),
            self.engine.config(),
        ));
        self
    }

    pub fn engine(&self) -> &LockEngine {
        &self.engine
    }

    /// Lock one tournament if due. Idempotent.
    ///
    /// A start is followed by an attempt to deliver its assignment event;
    /// a delivery failure is logged and left for the next sweep.
    pub async fn enforce_tournament_lock(
        &self,
        tournament_id: TournamentId,
    ) -> LockResult<LockOutcome> {
        let outcome = self.engine.enforce(tournament_id).await?;

        if let LockOutcome::Started { .. } = outcome
            && let Some(relay) = &self.relay
        {
            match relay.dispatch_for(tournament_id).await {
                Ok(report) if report.failed > 0 => log::warn!(
                    "Tournament {} started but game assignment is pending retry",
                    tournament_id
                ),
                Ok(report) if report.abandoned > 0 => log::error!(
                    "Tournament {} started but the game host refused its assignment",
                    tournament_id
                ),
                Ok(_) => {}
                Err(e) => log::error!(
                    "Failed to relay assignment for tournament {}: {}",
                    tournament_id,
                    e
                ),
            }
        }

        Ok(outcome)
    }

    /// Lock every due tournament, then relay pending assignment events.
    ///
    /// A tournament that fails is recorded in the report and does not stop
    /// the others.
    ///
    /// # Errors
    ///
    /// Only when the list of due tournaments cannot be read in time.
    pub async fn enforce_tournament_locks(&self) -> LockResult<SweepReport> {
        let due = with_default_timeout(self.store.due_tournaments(self.clock.now())).await?;
        let mut report = SweepReport::default();

        if !due.is_empty() {
            log::info!("Lock sweep found {} due tournaments", due.len());
        }

        for tournament_id in due {
            match self.engine.enforce(tournament_id).await {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    log::error!("Lock of tournament {} failed: {}", tournament_id, e);
                    report.failed.push((tournament_id, e.to_string()));
                }
            }
        }

        if let Some(relay) = &self.relay {
            match relay.dispatch_pending().await {
                Ok(relayed) => {
                    report.assignments_dispatched = relayed.dispatched;
                    report.assignments_failed = relayed.failed;
                    report.assignments_abandoned = relayed.abandoned;
                }
                Err(e) => log::error!("Assignment relay failed: {}", e),
            }
        }

        log::debug!("Lock sweep finished: {:?}", report);
        Ok(report)
    }

    /// Assignment events still to deliver, up to one outbox batch
    pub async fn pending_assignments(&self) -> LockResult<Vec<AssignmentEvent>> {
        with_default_timeout(
            self.store
                .pending_assignments(self.engine.config().outbox_batch_size),
        )
        .await
    }
}
