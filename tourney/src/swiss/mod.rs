//! Swiss-system standings and pairing.
//!
//! Both halves are pure: they take the entrant list and the match history and
//! recompute everything from scratch on every call.
//!
//! ## Example
//!
//! ```
//! use tourney::swiss::{Pairing, generate_swiss_round};
//! use tourney::tournament::models::MatchResult;
//!
//! let entrants = [1, 2, 3, 4];
//! let round_one = generate_swiss_round(&entrants, &[], 1);
//! assert_eq!(round_one.len(), 2);
//!
//! // 1 beat 2, 3 drew 4
//! let history = vec![
//!     Pairing::decided(1, 1, 2, MatchResult::Player1),
//!     Pairing::decided(1, 3, 4, MatchResult::Draw),
//! ];
//! let round_two = generate_swiss_round(&entrants, &history, 2);
//! assert_eq!(round_two[0].player1_id, 1);
//! assert_eq!(round_two[0].player2_id, Some(3));
//! ```

pub mod pairing;
pub mod standings;

pub use pairing::{Pairing, generate_swiss_round, recommended_rounds};
pub use standings::{Standing, build_standings};
