//! Scoring and selection of completed attempts.
//!
//! The engine only depends on [`ScoringPolicy`], so alternate formulas (for
//! example weighting cost or duration) can be swapped in without touching it.

use crate::core::types::{Attempt, AttemptStatus, UNSCORED};

/// Reward for an attempt whose validation exited zero.
pub const PASS_REWARD: f64 = 100.0;
/// Penalty for an attempt whose validation failed.
pub const FAIL_PENALTY: f64 = 10.0;
/// Diff characters per point of penalty.
pub const DIFF_CHARS_PER_POINT: f64 = 1000.0;

pub trait ScoringPolicy {
    /// Map an attempt to a finite, comparable score.
    fn score(&self, attempt: &Attempt) -> f64;

    /// Pick the winner among `attempts`, or `None` if nothing is eligible.
    fn select_best<'a>(&self, attempts: &'a [Attempt]) -> Option<&'a Attempt>;
}

/// Pass/fail scoring with a mild penalty on diff volume.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScoringPolicy;

impl ScoringPolicy for DefaultScoringPolicy {
    fn score(&self, attempt: &Attempt) -> f64 {
        let Some(result) = &attempt.result else {
            return UNSCORED;
        };

        let mut score = if result.exit_code == 0 {
            PASS_REWARD
        } else {
            -FAIL_PENALTY
        };
        if let Some(diff) = &result.diff {
            score -= diff.chars().count() as f64 / DIFF_CHARS_PER_POINT;
        }
        score
    }

    fn select_best<'a>(&self, attempts: &'a [Attempt]) -> Option<&'a Attempt> {
        // Strict comparison keeps the first attempt among equal scores.
        attempts
            .iter()
            .filter(|attempt| {
                attempt.status == AttemptStatus::Completed && !attempt.exclude_from_selection
            })
            .fold(None, |best: Option<&Attempt>, candidate| match best {
                Some(current) if candidate.score <= current.score => Some(current),
                _ => Some(candidate),
            })
    }
}
