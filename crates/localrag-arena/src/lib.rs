//! Pairwise model comparison and the Elo ledger that ranks the results.

pub mod compare;
pub mod ledger;

pub use compare::{Arena, Round};
pub use ledger::{expected_score, updated_ratings, LeaderboardEntry, Outcome, RatingLedger, DEFAULT_RATING, K_FACTOR};
