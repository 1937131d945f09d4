//! Tournament data models.

use super::errors::{LockError, LockResult};
use crate::swiss::Pairing;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Tournament ID type
pub type TournamentId = i64;

/// User ID type
pub type UserId = i64;

/// Entry ID type
pub type EntryId = i64;

/// Match ID type
pub type MatchId = i64;

/// Outbox event ID type
pub type EventId = i64;

/// Rounds are numbered from 1
pub const FIRST_ROUND: u32 = 1;

macro_rules! db_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Text stored in the database for this value
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = LockError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(LockError::Decode(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Tournament lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TournamentStatus {
    /// Accepting registrations and check-ins
    Registration,
    /// Field locked, round 1 paired
    InProgress,
    /// Settled
    Completed,
    /// Collapsed at lock time
    Cancelled,
}

db_enum!(TournamentStatus {
    Registration => "REGISTRATION",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

impl TournamentStatus {
    /// Forward-only lifecycle; nothing ever returns to registration.
    pub fn can_transition_to(self, next: TournamentStatus) -> bool {
        use TournamentStatus::*;
        matches!(
            (self, next),
            (Registration, InProgress)
                | (Registration, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
        )
    }
}

/// Registration entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Pending,
    Confirmed,
    Waitlist,
    Cancelled,
}

db_enum!(EntryStatus {
    Pending => "PENDING",
    Confirmed => "CONFIRMED",
    Waitlist => "WAITLIST",
    Cancelled => "CANCELLED",
});

/// Match status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Scheduled,
    InProgress,
    Completed,
}

db_enum!(MatchStatus {
    Scheduled => "SCHEDULED",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
});

/// Match result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchResult {
    Player1,
    Player2,
    Draw,
}

db_enum!(MatchResult {
    Player1 => "PLAYER1",
    Player2 => "PLAYER2",
    Draw => "DRAW",
});

/// A scheduled competition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    /// Tournament ID
    pub id: TournamentId,
    /// Current status
    pub status: TournamentStatus,
    /// Scheduled start
    pub start_date: DateTime<Utc>,
    /// Persisted lock instant (start_date - 2m)
    pub lock_at: DateTime<Utc>,
    /// Seats needed to start
    pub min_players: usize,
    /// Seat cap
    pub max_players: usize,
    /// Denormalized seat count
    pub current_players: usize,
}

impl Tournament {
    /// Whether the lock transition should run at `now`
    pub fn is_lock_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TournamentStatus::Registration && self.lock_at <= now
    }

    /// Copy of this tournament moved to `next` with the given seat count
    ///
    /// # Errors
    ///
    /// * `LockError::InvalidTransition` - `next` is not reachable from the current status
    pub fn transition(&self, next: TournamentStatus, current_players: usize) -> LockResult<Self> {
        if !self.status.can_transition_to(next) {
            return Err(LockError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        Ok(Self {
            status: next,
            current_players,
            ..self.clone()
        })
    }
}

/// One user's registration in one tournament
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub tournament_id: TournamentId,
    pub user_id: UserId,
    pub status: EntryStatus,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    pub fn is_checked_in(&self) -> bool {
        self.checked_in_at.is_some()
    }

    /// Entries that still count toward the field
    pub fn is_active(&self) -> bool {
        self.status != EntryStatus::Cancelled
    }

    /// Entries that hold a seat while registration is open
    pub fn holds_seat(&self) -> bool {
        matches!(self.status, EntryStatus::Confirmed | EntryStatus::Pending)
    }
}

/// Sort entries into seat priority: earliest check-in first, unchecked last,
/// then earliest registration, then id.
pub fn order_by_seat_priority(entries: &mut [Entry]) {
    entries.sort_by(|a, b| {
        a.checked_in_at
            .is_none()
            .cmp(&b.checked_in_at.is_none())
            .then(a.checked_in_at.cmp(&b.checked_in_at))
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

/// A stored pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub round: u32,
    pub player1_id: UserId,
    /// `None` marks a bye
    pub player2_id: Option<UserId>,
    pub status: MatchStatus,
    pub result: Option<MatchResult>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn is_bye(&self) -> bool {
        self.player2_id.is_none()
    }

    /// Lightweight view used by standings and pairing
    pub fn to_pairing(&self) -> Pairing {
        Pairing {
            round: self.round,
            player1_id: self.player1_id,
            player2_id: self.player2_id,
            status: self.status,
            result: self.result,
        }
    }
}

/// A match row about to be inserted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMatch {
    pub tournament_id: TournamentId,
    pub round: u32,
    pub player1_id: UserId,
    pub player2_id: Option<UserId>,
    pub status: MatchStatus,
    pub result: Option<MatchResult>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl NewMatch {
    /// Build the row for `pairing`. Byes are stamped completed at `now`.
    pub fn from_pairing(
        tournament_id: TournamentId,
        pairing: &Pairing,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tournament_id,
            round: pairing.round,
            player1_id: pairing.player1_id,
            player2_id: pairing.player2_id,
            status: pairing.status,
            result: pairing.result,
            scheduled_at: Some(scheduled_at),
            completed_at: pairing.is_bye().then_some(now),
        }
    }

    pub fn is_bye(&self) -> bool {
        self.player2_id.is_none()
    }
}

/// A game-assignment notification waiting in the outbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentEvent {
    pub id: EventId,
    pub tournament_id: TournamentId,
    pub round: u32,
    pub created_at: DateTime<Utc>,
    /// Delivery attempts so far
    pub attempts: u32,
    pub last_error: Option<String>,
    pub dispatched_at: Option<DateTime<Utc>>,
    /// Set once delivery is given up; never retried after that
    pub abandoned_at: Option<DateTime<Utc>>,
}

impl AssignmentEvent {
    /// Neither delivered nor abandoned
    pub fn is_pending(&self) -> bool {
        self.dispatched_at.is_none() && self.abandoned_at.is_none()
    }
}

/// What a lock transition invocation did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LockOutcome {
    /// No tournament with that id
    NotFound { tournament_id: TournamentId },
    /// Not due yet or already transitioned; `current_players` reflects
    /// confirmed + pending entries
    Unchanged { tournament: Tournament },
    /// Too few checked-in entries; every entry cancelled
    Cancelled { tournament: Tournament },
    /// Field finalized and round 1 paired
    Started {
        tournament: Tournament,
        matches: Vec<NewMatch>,
    },
}

impl LockOutcome {
    /// The tournament after the invocation, if it exists
    pub fn tournament(&self) -> Option<&Tournament> {
        match self {
            LockOutcome::NotFound { .. } => None,
            LockOutcome::Unchanged { tournament }
            | LockOutcome::Cancelled { tournament }
            | LockOutcome::Started { tournament, .. } => Some(tournament),
        }
    }
}
