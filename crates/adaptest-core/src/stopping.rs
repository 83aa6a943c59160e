//! Stop/continue decision after each graded answer.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::estimator::{estimate, AbilityEstimate, AttemptTotals};
use crate::model::{ActivityConfig, StopReason};
use crate::scale::percent_to_logit;

/// Question limits and precision target of an activity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoppingPolicy {
    pub minimum_questions: u32,
    pub maximum_questions: u32,
    /// Target standard error converted to logits.
    pub target_error_logits: f64,
}

/// Why an estimate was not produced on a continuing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unevaluated {
    /// The minimum number of questions has not been asked yet.
    BelowMinimum,
    /// All answers so far are right, or all are wrong.
    InsufficientEvidence,
    /// Right and wrong counts do not add up to the questions attempted.
    InconsistentTotals,
}

/// Outcome of one stopping check.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use]
pub enum StopDecision {
    /// The answer has no grade yet; nothing advances.
    CannotEvaluate,
    /// Keep asking questions.
    Continue {
        next_level: i64,
        estimate: Result<AbilityEstimate, Unevaluated>,
    },
    /// The attempt is complete.
    Stop {
        reason: StopReason,
        estimate: AbilityEstimate,
    },
}

impl StoppingPolicy {
    pub fn new(
        minimum_questions: u32,
        maximum_questions: u32,
        target_error_fraction: f64,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            minimum_questions,
            maximum_questions,
            target_error_logits: percent_to_logit(target_error_fraction)?,
        })
    }

    pub fn for_activity(activity: &ActivityConfig) -> Result<Self, DomainError> {
        Self::new(
            activity.minimum_questions,
            activity.maximum_questions,
            activity.target_error_fraction(),
        )
    }

    pub fn minimum_reached(&self, questions_attempted: u32) -> bool {
        questions_attempted >= self.minimum_questions
    }

    pub fn maximum_reached(&self, questions_attempted: u32) -> bool {
        questions_attempted >= self.maximum_questions
    }

    /// Decide whether the attempt continues.
    ///
    /// `totals` already include the latest answer; `correct` is its grade and
    /// `next_level` the provisional level of the next question.
    pub fn evaluate(
        &self,
        totals: &AttemptTotals,
        correct: Option<bool>,
        next_level: i64,
    ) -> StopDecision {
        if correct.is_none() {
            return StopDecision::CannotEvaluate;
        }

        let attempted = totals.questions_attempted;
        if !self.minimum_reached(attempted) {
            return StopDecision::Continue {
                next_level,
                estimate: Err(Unevaluated::BelowMinimum),
            };
        }

        if !totals.is_consistent() {
            tracing::error!(
                questions_attempted = attempted,
                sum_correct = totals.sum_correct,
                sum_incorrect = totals.sum_incorrect,
                "graded answers do not add up to questions attempted"
            );
            return StopDecision::Continue {
                next_level,
                estimate: Err(Unevaluated::InconsistentTotals),
            };
        }

        let estimate = match estimate(totals) {
            Ok(estimate) => estimate,
            Err(reason) => {
                tracing::debug!(%reason, "cannot estimate ability yet");
                return StopDecision::Continue {
                    next_level,
                    estimate: Err(Unevaluated::InsufficientEvidence),
                };
            }
        };

        if estimate.standard_error_logits <= self.target_error_logits {
            StopDecision::Stop {
                reason: StopReason::StandardErrorReached,
                estimate,
            }
        } else if self.maximum_reached(attempted) {
            StopDecision::Stop {
                reason: StopReason::MaximumQuestions,
                estimate,
            }
        } else {
            StopDecision::Continue {
                next_level,
                estimate: Ok(estimate),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(attempted: u32, correct: u32, incorrect: u32) -> AttemptTotals {
        AttemptTotals {
            questions_attempted: attempted,
            difficulty_sum_logits: 0.0,
            sum_correct: correct,
            sum_incorrect: incorrect,
        }
    }

    fn policy() -> StoppingPolicy {
        StoppingPolicy::new(5, 20, 0.05).unwrap()
    }

    #[test]
    fn ungraded_answer_cannot_be_evaluated() {
        assert_eq!(
            policy().evaluate(&totals(6, 3, 3), None, 4),
            StopDecision::CannotEvaluate
        );
    }

    #[test]
    fn below_minimum_continues_regardless_of_error() {
        let decision = policy().evaluate(&totals(4, 2, 2), Some(true), 6);
        assert_eq!(
            decision,
            StopDecision::Continue {
                next_level: 6,
                estimate: Err(Unevaluated::BelowMinimum)
            }
        );
    }

    #[test]
    fn all_correct_is_insufficient_evidence() {
        let decision = policy().evaluate(&totals(6, 6, 0), Some(true), 9);
        assert!(matches!(
            decision,
            StopDecision::Continue {
                estimate: Err(Unevaluated::InsufficientEvidence),
                ..
            }
        ));
    }

    #[test]
    fn inconsistent_totals_continue() {
        let decision = policy().evaluate(&totals(8, 3, 3), Some(false), 2);
        assert!(matches!(
            decision,
            StopDecision::Continue {
                estimate: Err(Unevaluated::InconsistentTotals),
                ..
            }
        ));
    }

    #[test]
    fn wide_error_keeps_going() {
        // se = sqrt(6 / 9) = 0.816 > 0.2
        let decision = policy().evaluate(&totals(6, 3, 3), Some(true), 5);
        assert!(matches!(
            decision,
            StopDecision::Continue { estimate: Ok(_), .. }
        ));
    }

    #[test]
    fn maximum_questions_stops() {
        let decision = policy().evaluate(&totals(20, 10, 10), Some(true), 5);
        assert!(matches!(
            decision,
            StopDecision::Stop {
                reason: StopReason::MaximumQuestions,
                ..
            }
        ));
    }

    #[test]
    fn precise_estimate_stops() {
        // se = sqrt(20 / 100) = 0.447; a 10% target is 0.401 logits.
        let loose = StoppingPolicy::new(5, 50, 0.10).unwrap();
        assert!(matches!(
            loose.evaluate(&totals(20, 10, 10), Some(false), 5),
            StopDecision::Continue { .. }
        ));
        // se = sqrt(40 / 400) = 0.316
        match loose.evaluate(&totals(40, 20, 20), Some(false), 5) {
            StopDecision::Stop { reason, estimate } => {
                assert_eq!(reason, StopReason::StandardErrorReached);
                assert_eq!(estimate.standard_error_logits, 0.31623);
            }
            other => panic!("expected stop, got {other:?}"),
        }
    }

    #[test]
    fn target_out_of_domain_rejected() {
        assert!(StoppingPolicy::new(1, 2, 0.5).is_err());
    }
}
