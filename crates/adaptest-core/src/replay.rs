//! Attempt state recovery from the graded-question log.
//!
//! The current level and the running totals of an attempt are derived data:
//! both can be recomputed from the ordered answer log, so an interrupted
//! attempt resumes without trusting a separately stored running total.

use crate::error::{ConfigError, DomainError};
use crate::estimator::AttemptTotals;
use crate::model::GradedQuestionRecord;
use crate::stepper::compute_next_difficulty;

/// Returned by [`current_difficulty_level`] for an empty log.
pub const NO_HISTORY: i64 = 0;

/// Graded prefix of the log: trailing records still awaiting a grade are
/// dropped.
pub fn graded_prefix(history: &[GradedQuestionRecord]) -> &[GradedQuestionRecord] {
    let end = history
        .iter()
        .rposition(|r| r.correct.is_some())
        .map_or(0, |i| i + 1);
    &history[..end]
}

fn check_bounds(low: i64, high: i64) -> Result<(), ConfigError> {
    if low >= high {
        return Err(ConfigError::InvalidBounds { low, high });
    }
    Ok(())
}

/// Replay the answer log from `starting_level` and return the level the next
/// question should be asked at, or [`NO_HISTORY`] if nothing has been graded.
///
/// A pending record in the middle of the log still advances the position but
/// not the level.
pub fn current_difficulty_level(
    history: &[GradedQuestionRecord],
    starting_level: i64,
    low: i64,
    high: i64,
) -> Result<i64, ReplayError> {
    check_bounds(low, high)?;
    let graded = graded_prefix(history);
    if graded.is_empty() {
        return Ok(NO_HISTORY);
    }

    graded
        .iter()
        .enumerate()
        .try_fold(starting_level, |level, (index, record)| {
            match record.correct {
                Some(correct) => {
                    compute_next_difficulty(level, index as u32 + 1, correct, low, high)
                }
                None => Ok(level),
            }
        })
        .map_err(ReplayError::from)
}

/// Rebuild the running totals from the answer log.
pub fn replay_totals(
    history: &[GradedQuestionRecord],
    low: i64,
    high: i64,
) -> Result<AttemptTotals, ReplayError> {
    check_bounds(low, high)?;
    let mut totals = AttemptTotals::default();
    for record in graded_prefix(history) {
        if let Some(correct) = record.correct {
            totals.record(record.difficulty_level, correct, low, high);
        }
    }
    Ok(totals)
}

/// Failure while replaying an answer log.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReplayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}
