//! Score computation.
//!
//! Scores are never stored. They are derived from the options of revealed
//! rounds whenever a read model needs them.

use crate::types::{RoundOption, UserId};
use std::collections::BTreeMap;

/// Per vote, for the image author when players pick the real prompt
pub const CORRECT_AUTHOR_SCORE: i64 = 1000;
/// Per vote, for a decoy author whose prompt fooled someone
pub const ALT_AUTHOR_SCORE: i64 = 500;
/// For each player who picked the real prompt
pub const CORRECT_GUESSER_SCORE: i64 = 200;

/// Score changes caused by one option of a revealed round.
///
/// The option's author always has an entry, zero if nobody picked it.
pub fn score_deltas(is_option_by_round_author: bool, option: &RoundOption) -> BTreeMap<UserId, i64> {
    let per_vote = if is_option_by_round_author {
        CORRECT_AUTHOR_SCORE
    } else {
        ALT_AUTHOR_SCORE
    };

    let mut deltas = BTreeMap::new();
    deltas.insert(
        option.author_id.clone(),
        option.votes.len() as i64 * per_vote,
    );

    if is_option_by_round_author {
        for voter in &option.votes {
            deltas.insert(voter.clone(), CORRECT_GUESSER_SCORE);
        }
    }

    deltas
}

/// Fold one option's deltas into running totals
pub fn accumulate(totals: &mut BTreeMap<UserId, i64>, deltas: BTreeMap<UserId, i64>) {
    for (user_id, delta) in deltas {
        *totals.entry(user_id).or_insert(0) += delta;
    }
}
