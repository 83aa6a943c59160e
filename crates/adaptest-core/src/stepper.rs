//! Next-difficulty computation.
//!
//! The step happens in logit space with size `2 / questions_attempted`, so
//! early answers move the level a lot and later answers fine-tune it. A level
//! sitting on a boundary has an infinite logit; a step in the same direction
//! keeps it there.

use crate::error::DomainError;
use crate::scale::{linear_to_logit, logit_to_linear};

/// Numerator of the diminishing step size.
pub const STEP_NUMERATOR: f64 = 2.0;

/// Compute the level of the next question.
///
/// `questions_attempted` includes the question just answered and must be at
/// least 1. Levels outside `[low, high]` are clamped before stepping, and the
/// result always lies in `[low, high]`.
pub fn compute_next_difficulty(
    level: i64,
    questions_attempted: u32,
    correct: bool,
    low: i64,
    high: i64,
) -> Result<i64, DomainError> {
    if questions_attempted == 0 {
        return Err(DomainError::NoQuestionsAttempted);
    }

    let (low_f, high_f) = (low as f64, high as f64);
    let current = level.clamp(low.min(high), high.max(low)) as f64;
    let current_logit = linear_to_logit(current, low_f, high_f);

    let step = STEP_NUMERATOR / questions_attempted as f64;
    let next_logit = if correct {
        current_logit + step
    } else {
        current_logit - step
    };

    let next = logit_to_linear(next_logit, low_f, high_f).round();
    let clamped = if next.is_nan() {
        current
    } else {
        next.clamp(low_f, high_f)
    };

    tracing::trace!(
        level,
        questions_attempted,
        correct,
        next = clamped,
        "stepped difficulty"
    );
    Ok(clamped as i64)
}
