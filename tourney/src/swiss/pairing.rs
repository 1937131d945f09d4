//! Swiss round generation.

use super::standings::build_standings;
use crate::tournament::models::{MatchResult, MatchStatus, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A match without storage identity: who plays whom in which round, and how
/// it ended if it has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    pub round: u32,
    pub player1_id: UserId,
    /// `None` marks a bye
    pub player2_id: Option<UserId>,
    pub status: MatchStatus,
    pub result: Option<MatchResult>,
}

impl Pairing {
    /// A game still to be played
    pub fn scheduled(round: u32, player1_id: UserId, player2_id: UserId) -> Self {
        Self {
            round,
            player1_id,
            player2_id: Some(player2_id),
            status: MatchStatus::Scheduled,
            result: None,
        }
    }

    /// A bye: created already completed and won by `player_id`
    pub fn bye(round: u32, player_id: UserId) -> Self {
        Self {
            round,
            player1_id: player_id,
            player2_id: None,
            status: MatchStatus::Completed,
            result: Some(MatchResult::Player1),
        }
    }

    /// A finished game
    pub fn decided(round: u32, player1_id: UserId, player2_id: UserId, result: MatchResult) -> Self {
        Self {
            round,
            player1_id,
            player2_id: Some(player2_id),
            status: MatchStatus::Completed,
            result: Some(result),
        }
    }

    pub fn is_bye(&self) -> bool {
        self.player2_id.is_none()
    }

    /// Whether `user_id` sits on either side
    pub fn involves(&self, user_id: UserId) -> bool {
        self.player1_id == user_id || self.player2_id == Some(user_id)
    }
}

/// Number of Swiss rounds needed to separate a single winner from
/// `player_count` players: ceil(log2(n)).
pub fn recommended_rounds(player_count: usize) -> u32 {
    match player_count {
        0 => 0,
        1 => 1,
        n => usize::BITS - (n - 1).leading_zeros(),
    }
}

/// Generate pairings for `round`.
///
/// Players are paired top-down in standings order, each with the first
/// remaining player they have not met yet. When everyone left has already met
/// the player being paired, the first remaining player is taken anyway: a round
/// always fully pairs. An odd pool gives a bye to the lowest-ranked player who
/// has not had one, or to the lowest-ranked player if all of them have.
pub fn generate_swiss_round(entrants: &[UserId], matches: &[Pairing], round: u32) -> Vec<Pairing> {
    let standings = build_standings(entrants, matches);

    let mut history: HashMap<UserId, HashSet<UserId>> = HashMap::new();
    for game in matches {
        if let Some(player2_id) = game.player2_id {
            history
                .entry(game.player1_id)
                .or_default()
                .insert(player2_id);
            history
                .entry(player2_id)
                .or_default()
                .insert(game.player1_id);
        }
    }

    // With no history every standing ties and falls back to entrant order.
    let mut pool: Vec<UserId> = standings.iter().map(|s| s.user_id).collect();
    let mut pairings = Vec::with_capacity(pool.len() / 2 + 1);

    if pool.len() % 2 == 1 {
        let bye = standings
            .iter()
            .rev()
            .find(|s| !s.had_bye)
            .or_else(|| standings.last())
            .map(|s| s.user_id);

        if let Some(player_id) = bye {
            pool.retain(|&p| p != player_id);
            pairings.push(Pairing::bye(round, player_id));
        }
    }

    while pool.len() >= 2 {
        let player1_id = pool.remove(0);
        let faced = history.get(&player1_id);
        let candidate = pool
            .iter()
            .position(|c| faced.is_none_or(|f| !f.contains(c)))
            .unwrap_or(0);
        let player2_id = pool.remove(candidate);
        pairings.push(Pairing::scheduled(round, player1_id, player2_id));
    }

    pairings
}
