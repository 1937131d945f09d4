//! PostgreSQL store.
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use std::sync::Arc;

use super::store::{StoreTransaction, TournamentStore};
use crate::tournament::errors::{LockError, LockResult};
use crate::tournament::models::{
    AssignmentEvent, Entry, EntryId, EntryStatus, EventId, Match, NewMatch, Tournament,
    TournamentId, TournamentStatus,
};

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgTournamentStore {
    pool: Arc<PgPool>,
}

impl PgTournamentStore {
    /// Create a new store
    ///
    /// # Arguments
    ///
    /// * `pool` - Database connection pool
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

fn count_column(row: &PgRow, column: &str) -> LockResult<usize> {
    let value: i32 = row.try_get(column)?;
    usize::try_from(value).map_err(|_| LockError::Decode(format!("{column} = {value}")))
}

fn u32_column(row: &PgRow, column: &str) -> LockResult<u32> {
    let value: i32 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| LockError::Decode(format!("{column} = {value}")))
}

fn round_param(round: u32) -> LockResult<i32> {
    i32::try_from(round).map_err(|_| LockError::Decode(format!("round {round} out of range")))
}

fn count_param(count: usize) -> LockResult<i32> {
    i32::try_from(count).map_err(|_| LockError::Decode(format!("count {count} out of range")))
}

fn tournament_from_row(row: &PgRow) -> LockResult<Tournament> {
    let status: String = row.try_get("status")?;
    Ok(Tournament {
        id: row.try_get("id")?,
        status: status.parse()?,
        start_date: row.try_get("start_date")?,
        lock_at: row.try_get("lock_at")?,
        min_players: count_column(row, "min_players")?,
        max_players: count_column(row, "max_players")?,
        current_players: count_column(row, "current_players")?,
    })
}

fn entry_from_row(row: &PgRow) -> LockResult<Entry> {
    let status: String = row.try_get("status")?;
    Ok(Entry {
        id: row.try_get("id")?,
        tournament_id: row.try_get("tournament_id")?,
        user_id: row.try_get("user_id")?,
        status: status.parse()?,
        checked_in_at: row.try_get("checked_in_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn match_from_row(row: &PgRow) -> LockResult<Match> {
    let status: String = row.try_get("status")?;
    let result: Option<String> = row.try_get("result")?;
    Ok(Match {
        id: row.try_get("id")?,
        tournament_id: row.try_get("tournament_id")?,
        round: u32_column(row, "round")?,
        player1_id: row.try_get("player1_id")?,
        player2_id: row.try_get("player2_id")?,
        status: status.parse()?,
        result: result.map(|r| r.parse()).transpose()?,
        scheduled_at: row.try_get("scheduled_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn event_from_row(row: &PgRow) -> LockResult<AssignmentEvent> {
    Ok(AssignmentEvent {
        id: row.try_get("id")?,
        tournament_id: row.try_get("tournament_id")?,
        round: u32_column(row, "round")?,
        created_at: row.try_get("created_at")?,
        attempts: u32_column(row, "attempts")?,
        last_error: row.try_get("last_error")?,
        dispatched_at: row.try_get("dispatched_at")?,
        abandoned_at: row.try_get("abandoned_at")?,
    })
}

#[async_trait]
impl TournamentStore for PgTournamentStore {
    async fn begin(&self) -> LockResult<Box<dyn StoreTransaction>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgStoreTransaction { tx }))
    }

    async fn due_tournaments(&self, now: DateTime<Utc>) -> LockResult<Vec<TournamentId>> {
        let rows = sqlx::query(
            r#"
            SELECT id
            FROM tournaments
            WHERE status = $1 AND lock_at <= $2
            ORDER BY lock_at, id
            "#,
        )
        .bind(TournamentStatus::Registration.as_str())
        .bind(now)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter()
            .map(|row| row.try_get("id").map_err(LockError::from))
            .collect()
    }

    async fn pending_assignments(&self, limit: usize) -> LockResult<Vec<AssignmentEvent>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT id, tournament_id, round, created_at, attempts, last_error,
                   dispatched_at, abandoned_at
            FROM game_assignment_outbox
            WHERE dispatched_at IS NULL AND abandoned_at IS NULL
            ORDER BY attempts, id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    async fn pending_assignments_for(
        &self,
        tournament_id: TournamentId,
    ) -> LockResult<Vec<AssignmentEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tournament_id, round, created_at, attempts, last_error,
                   dispatched_at, abandoned_at
            FROM game_assignment_outbox
            WHERE tournament_id = $1 AND dispatched_at IS NULL AND abandoned_at IS NULL
            ORDER BY id
            "#,
        )
        .bind(tournament_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    async fn mark_assignment_dispatched(
        &self,
        event_id: EventId,
        at: DateTime<Utc>,
    ) -> LockResult<()> {
        sqlx::query(
            "UPDATE game_assignment_outbox SET dispatched_at = $1, attempts = attempts + 1 WHERE id = $2",
        )
        .bind(at)
        .bind(event_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn record_assignment_failure(&self, event_id: EventId, error: &str) -> LockResult<()> {
        sqlx::query(
            "UPDATE game_assignment_outbox SET last_error = $1, attempts = attempts + 1 WHERE id = $2",
        )
        .bind(error)
        .bind(event_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn abandon_assignment(
        &self,
        event_id: EventId,
        error: &str,
        at: DateTime<Utc>,
    ) -> LockResult<()> {
        sqlx::query(
            r#"
            UPDATE game_assignment_outbox
            SET last_error = $1, abandoned_at = $2, attempts = attempts + 1
            WHERE id = $3
            "#,
        )
        .bind(error)
        .bind(at)
        .bind(event_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }
}

/// Serializable transaction over [`PgTournamentStore`]
pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn load_tournament(&mut self, id: TournamentId) -> LockResult<Option<Tournament>> {
        let row = sqlx::query(
            r#"
            SELECT id, status, start_date, lock_at, min_players, max_players, current_players
            FROM tournaments
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(tournament_from_row).transpose()
    }

    async fn load_active_entries(&mut self, tournament_id: TournamentId) -> LockResult<Vec<Entry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tournament_id, user_id, status, checked_in_at, created_at
            FROM tournament_entries
            WHERE tournament_id = $1 AND status <> $2
            ORDER BY checked_in_at ASC NULLS LAST, created_at ASC, id ASC
            FOR UPDATE
            "#,
        )
        .bind(tournament_id)
        .bind(EntryStatus::Cancelled.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn update_entry_status(
        &mut self,
        ids: &[EntryId],
        status: EntryStatus,
    ) -> LockResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE tournament_entries SET status = $1, updated_at = NOW() WHERE id = ANY($2)",
        )
        .bind(status.as_str())
        .bind(ids)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn load_matches(
        &mut self,
        tournament_id: TournamentId,
        round: u32,
    ) -> LockResult<Vec<Match>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tournament_id, round, player1_id, player2_id, status, result,
                   scheduled_at, completed_at
            FROM tournament_matches
            WHERE tournament_id = $1 AND round = $2
            ORDER BY id
            "#,
        )
        .bind(tournament_id)
        .bind(round_param(round)?)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(match_from_row).collect()
    }

    async fn delete_matches(&mut self, tournament_id: TournamentId, round: u32) -> LockResult<u64> {
        let result =
            sqlx::query("DELETE FROM tournament_matches WHERE tournament_id = $1 AND round = $2")
                .bind(tournament_id)
                .bind(round_param(round)?)
                .execute(&mut *self.tx)
                .await?;

        Ok(result.rows_affected())
    }

    async fn insert_matches(&mut self, matches: &[NewMatch]) -> LockResult<()> {
        if matches.is_empty() {
            return Ok(());
        }

        let rounds = matches
            .iter()
            .map(|m| round_param(m.round))
            .collect::<LockResult<Vec<i32>>>()?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO tournament_matches \
             (tournament_id, round, player1_id, player2_id, status, result, scheduled_at, completed_at) ",
        );
        builder.push_values(matches.iter().zip(rounds), |mut row, (m, round)| {
            row.push_bind(m.tournament_id)
                .push_bind(round)
                .push_bind(m.player1_id)
                .push_bind(m.player2_id)
                .push_bind(m.status.as_str())
                .push_bind(m.result.map(|r| r.as_str()))
                .push_bind(m.scheduled_at)
                .push_bind(m.completed_at);
        });

        builder.build().execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn update_tournament(&mut self, tournament: &Tournament) -> LockResult<()> {
        sqlx::query(
            "UPDATE tournaments SET status = $1, current_players = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(tournament.status.as_str())
        .bind(count_param(tournament.current_players)?)
        .bind(tournament.id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn enqueue_assignment(
        &mut self,
        tournament_id: TournamentId,
        round: u32,
        at: DateTime<Utc>,
    ) -> LockResult<EventId> {
        let row = sqlx::query(
            r#"
            INSERT INTO game_assignment_outbox (tournament_id, round, created_at)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(tournament_id)
        .bind(round_param(round)?)
        .bind(at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.try_get("id")?)
    }

    async fn commit(self: Box<Self>) -> LockResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> LockResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
