//! One-shot tournament lock sweep.
//!
//! Meant to be run by cron or a systemd timer every minute or so. Each run
//! locks every tournament whose lock time has passed, reports how many
//! game-assignment events are still waiting for the assignment worker, and
//! exits non-zero if any tournament could not be locked.

mod config;
mod logging;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Error};
use pico_args::Arguments;
use tourney::db::Database;
use tourney::tournament::{LockOutcome, SweepReport, TournamentId, TournamentLifecycle};
use tourney::SystemClock;
use tracing::{error, info, warn};

use config::SweepConfig;

const HELP: &str = "\
Lock every tournament whose lock time has passed

USAGE:
  tourney_sweep [OPTIONS]

OPTIONS:
  --tournament ID          Lock only this tournament
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  --json                   Print the result as JSON on stdout
  -h, --help               Print help information

ENVIRONMENT:
  DATABASE_URL             PostgreSQL connection string
  DB_MAX_CONNECTIONS       Pool size                              [default: 5]
  LOCK_MAX_ATTEMPTS        Attempts per tournament on conflicts   [default: 3]
  LOCK_RETRY_BACKOFF_MS    Backoff unit between attempts          [default: 50]
  LOCK_TX_TIMEOUT_SECS     Timeout of one lock transaction        [default: 10]
  OUTBOX_BATCH_SIZE        Assignment events inspected per run    [default: 100]
  OUTBOX_MAX_ATTEMPTS      Deliveries per event before giving up  [default: 5]
  RUST_LOG                 Log filter                             [default: info,sqlx=warn]

EXIT STATUS:
  0 when every due tournament was handled, 1 otherwise
";

struct Args {
    database_url: Option<String>,
    tournament: Option<TournamentId>,
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(ExitCode::SUCCESS);
    }

    let args = Args {
        database_url: pargs.opt_value_from_str("--db-url")?,
        tournament: pargs.opt_value_from_str("--tournament")?,
        json: pargs.contains("--json"),
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        anyhow::bail!("Unexpected arguments: {:?}", remaining);
    }

    logging::init();

    let config = SweepConfig::from_env(args.database_url, args.tournament, args.json)?;
    config.validate()?;

    let db = Database::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    db.health_check()
        .await
        .context("Database did not answer the health check")?;

    let lifecycle = TournamentLifecycle::new(
        Arc::new(db.store()),
        Arc::new(SystemClock),
        config.lock.clone(),
    );

    let succeeded = match config.tournament {
        Some(tournament_id) => lock_one(&lifecycle, tournament_id, config.json).await?,
        None => sweep(&lifecycle, config.json).await?,
    };

    match lifecycle.pending_assignments().await {
        Ok(pending) if pending.is_empty() => {}
        Ok(pending) => {
            let retried = pending.iter().filter(|e| e.attempts > 0).count();
            info!(
                "{} game assignment events pending ({} already retried)",
                pending.len(),
                retried
            );
        }
        Err(e) => warn!("Could not read the assignment outbox: {}", e),
    }

    db.close().await;

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn sweep(lifecycle: &TournamentLifecycle, json: bool) -> Result<bool, Error> {
    let report = lifecycle
        .enforce_tournament_locks()
        .await
        .context("Failed to list due tournaments")?;

    info!("{}", summary(&report));
    for (tournament_id, reason) in &report.failed {
        error!("Tournament {} was not locked: {}", tournament_id, reason);
    }

    if json {
        println!("{}", serde_json::to_string(&report)?);
    }

    Ok(!report.has_failures())
}

async fn lock_one(
    lifecycle: &TournamentLifecycle,
    tournament_id: TournamentId,
    json: bool,
) -> Result<bool, Error> {
    let outcome = match lifecycle.enforce_tournament_lock(tournament_id).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Tournament {} was not locked: {}", tournament_id, e);
            return Ok(false);
        }
    };

    match &outcome {
        LockOutcome::NotFound { .. } => warn!("Tournament {} does not exist", tournament_id),
        LockOutcome::Unchanged { tournament } => info!(
            "Tournament {} unchanged ({:?}, {} seats held)",
            tournament_id, tournament.status, tournament.current_players
        ),
        LockOutcome::Cancelled { tournament } => info!(
            "Tournament {} cancelled with {} entries",
            tournament_id, tournament.current_players
        ),
        LockOutcome::Started {
            tournament,
            matches,
        } => info!(
            "Tournament {} started: {} players, {} round 1 matches",
            tournament_id,
            tournament.current_players,
            matches.len()
        ),
    }

    if json {
        println!("{}", serde_json::to_string(&outcome)?);
    }

    Ok(!matches!(outcome, LockOutcome::NotFound { .. }))
}

fn summary(report: &SweepReport) -> String {
    format!(
        "Lock sweep: {} due, {} started, {} cancelled, {} unchanged, {} failed",
        report.processed(),
        report.started,
        report.cancelled,
        report.unchanged,
        report.failed.len()
    )
}
