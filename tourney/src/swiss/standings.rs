//! Standings calculation.
//!
//! Ordering is a total order:
//! 1. points, highest first
//! 2. Buchholz (sum of the points of every non-bye opponent), highest first
//! 3. players who never had a bye before players who did
//! 4. position in the entrant list
//!
//! Points are tracked in half-point units so that draws compare exactly.

use super::pairing::Pairing;
use crate::tournament::models::{MatchResult, UserId};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{HashMap, hash_map};

/// One player's derived record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub user_id: UserId,
    /// Points in half-point units (win = 2, draw = 1)
    pub half_points: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub had_bye: bool,
    /// Opponents' points in half-point units
    pub buchholz_half_points: u32,
}

impl Standing {
    fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            half_points: 0,
            wins: 0,
            draws: 0,
            losses: 0,
            had_bye: false,
            buchholz_half_points: 0,
        }
    }

    /// Points as displayed: win 1, draw 0.5, loss 0
    pub fn points(&self) -> f64 {
        f64::from(self.half_points) / 2.0
    }

    pub fn buchholz(&self) -> f64 {
        f64::from(self.buchholz_half_points) / 2.0
    }

    fn record_win(&mut self) {
        self.wins += 1;
        self.half_points += 2;
    }

    fn record_draw(&mut self) {
        self.draws += 1;
        self.half_points += 1;
    }

    fn record_loss(&mut self) {
        self.losses += 1;
    }
}

/// Build ranked standings, best first.
///
/// Every entrant appears exactly once (duplicates keep their first position),
/// including entrants with no games. Only matches with a result are scored.
/// A bye scores as a win for `player1` and records nothing for the absent side.
pub fn build_standings(entrants: &[UserId], matches: &[Pairing]) -> Vec<Standing> {
    let mut seat: HashMap<UserId, usize> = HashMap::with_capacity(entrants.len());
    let mut standings: Vec<Standing> = Vec::with_capacity(entrants.len());
    for &user_id in entrants {
        if let hash_map::Entry::Vacant(slot) = seat.entry(user_id) {
            slot.insert(standings.len());
            standings.push(Standing::new(user_id));
        }
    }

    let mut opponents: Vec<Vec<usize>> = vec![Vec::new(); standings.len()];

    for game in matches {
        let p1 = seat.get(&game.player1_id).copied();

        let Some(player2_id) = game.player2_id else {
            if let Some(p1) = p1 {
                standings[p1].had_bye = true;
                standings[p1].record_win();
            }
            continue;
        };
        let p2 = seat.get(&player2_id).copied();

        let Some(result) = game.result else {
            continue;
        };

        let (first, second): (fn(&mut Standing), fn(&mut Standing)) = match result {
            MatchResult::Player1 => (Standing::record_win, Standing::record_loss),
            MatchResult::Player2 => (Standing::record_loss, Standing::record_win),
            MatchResult::Draw => (Standing::record_draw, Standing::record_draw),
        };
        if let Some(i) = p1 {
            first(&mut standings[i]);
        }
        if let Some(i) = p2 {
            second(&mut standings[i]);
        }

        if let (Some(a), Some(b)) = (p1, p2) {
            opponents[a].push(b);
            opponents[b].push(a);
        }
    }

    let buchholz: Vec<u32> = opponents
        .iter()
        .map(|faced| faced.iter().map(|&o| standings[o].half_points).sum())
        .collect();
    for (standing, score) in standings.iter_mut().zip(buchholz) {
        standing.buchholz_half_points = score;
    }

    let mut ranked: Vec<(usize, Standing)> = standings.into_iter().enumerate().collect();
    ranked.sort_by_key(|(position, s)| {
        (
            Reverse(s.half_points),
            Reverse(s.buchholz_half_points),
            s.had_bye,
            *position,
        )
    });
    ranked.into_iter().map(|(_, s)| s).collect()
}
