//! Ability measure and standard error from attempt totals.
//!
//! Both estimates are undefined until the test-taker has answered at least
//! one question right and one wrong. That case is reported as
//! [`InsufficientEvidence`] rather than as an infinite or NaN score.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, InsufficientEvidence};
use crate::scale::{linear_to_logit, logit_to_linear, logit_to_percent, round_to};

/// Decimal places kept for measure and standard error.
pub const ESTIMATE_PRECISION: i32 = 5;

/// Running totals of an attempt, enough to estimate ability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptTotals {
    pub questions_attempted: u32,
    /// Sum of the logit difficulties of every graded question.
    pub difficulty_sum_logits: f64,
    pub sum_correct: u32,
    pub sum_incorrect: u32,
}

impl AttemptTotals {
    /// Fold one graded answer at `level` into the totals.
    pub fn record(&mut self, level: i64, correct: bool, low: i64, high: i64) {
        self.questions_attempted += 1;
        self.difficulty_sum_logits += linear_to_logit(level as f64, low as f64, high as f64);
        if correct {
            self.sum_correct += 1;
        } else {
            self.sum_incorrect += 1;
        }
    }

    /// Whether every attempted question has been counted as right or wrong.
    pub fn is_consistent(&self) -> bool {
        u64::from(self.sum_correct) + u64::from(self.sum_incorrect)
            == u64::from(self.questions_attempted)
    }
}

/// Measure and standard error of an attempt, both in logits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbilityEstimate {
    pub measure_logits: f64,
    pub standard_error_logits: f64,
}

impl AbilityEstimate {
    /// Ability on the linear difficulty scale.
    pub fn display_ability(&self, low: i64, high: i64) -> f64 {
        logit_to_linear(self.measure_logits, low as f64, high as f64)
    }

    /// Standard error as a percentage of the scale.
    pub fn display_error_percent(&self) -> Result<f64, DomainError> {
        Ok(logit_to_percent(self.standard_error_logits)? * 100.0)
    }
}

fn check_evidence(
    questions_attempted: u32,
    sum_correct: u32,
    sum_incorrect: u32,
) -> Result<(), InsufficientEvidence> {
    if questions_attempted == 0 {
        return Err(InsufficientEvidence::NoQuestions);
    }
    if sum_correct == 0 {
        return Err(InsufficientEvidence::NoCorrectAnswers);
    }
    if sum_incorrect == 0 {
        return Err(InsufficientEvidence::NoIncorrectAnswers);
    }
    Ok(())
}

/// Ability measure in logits: mean difficulty plus the log-odds of success.
pub fn estimate_measure(
    difficulty_sum_logits: f64,
    questions_attempted: u32,
    sum_correct: u32,
    sum_incorrect: u32,
) -> Result<f64, InsufficientEvidence> {
    check_evidence(questions_attempted, sum_correct, sum_incorrect)?;
    let mean_difficulty = difficulty_sum_logits / questions_attempted as f64;
    let odds = sum_correct as f64 / sum_incorrect as f64;
    Ok(round_to(mean_difficulty + odds.ln(), ESTIMATE_PRECISION))
}

/// Standard error of the measure in logits.
pub fn estimate_standard_error(
    questions_attempted: u32,
    sum_correct: u32,
    sum_incorrect: u32,
) -> Result<f64, InsufficientEvidence> {
    check_evidence(questions_attempted, sum_correct, sum_incorrect)?;
    let n = questions_attempted as f64;
    let variance = n / (sum_correct as f64 * sum_incorrect as f64);
    Ok(round_to(variance.sqrt(), ESTIMATE_PRECISION))
}

/// Measure and standard error together.
pub fn estimate(totals: &AttemptTotals) -> Result<AbilityEstimate, InsufficientEvidence> {
    Ok(AbilityEstimate {
        measure_logits: estimate_measure(
            totals.difficulty_sum_logits,
            totals.questions_attempted,
            totals.sum_correct,
            totals.sum_incorrect,
        )?,
        standard_error_logits: estimate_standard_error(
            totals.questions_attempted,
            totals.sum_correct,
            totals.sum_incorrect,
        )?,
    })
}
