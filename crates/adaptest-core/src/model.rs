//! Core data model types for adaptest.
//!
//! Activities configure the difficulty scale and stopping limits, attempts
//! carry the running state of one test-taker, and graded records form the
//! answer log an attempt can be replayed from.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::estimator::{AbilityEstimate, AttemptTotals};

/// Identifier of a question in the external pool.
pub type QuestionId = String;

/// Immutable configuration of one adaptive activity instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Activity instance identifier.
    pub instance_id: u64,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Easiest difficulty level.
    pub lowest_level: i64,
    /// Hardest difficulty level.
    pub highest_level: i64,
    /// Level of the first question.
    pub starting_level: i64,
    /// Questions asked before the attempt may stop.
    pub minimum_questions: u32,
    /// Hard ceiling on questions per attempt.
    pub maximum_questions: u32,
    /// Standard error, as a whole percentage, that ends the attempt.
    pub target_standard_error_percent: f64,
    /// Prefix of difficulty tags, e.g. `adpq_` for `adpq_7`.
    pub tag_prefix: String,
    /// Further tag families counted alongside `tag_prefix`.
    #[serde(default)]
    pub extra_tag_prefixes: Vec<String>,
    /// Pool categories questions are drawn from.
    pub category_ids: BTreeSet<String>,
    /// Attempts each user may start; 0 means unlimited.
    #[serde(default)]
    pub attempts_allowed: u32,
}

impl ActivityConfig {
    /// Check every invariant of the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance_id == 0 {
            return Err(ConfigError::NonPositiveId {
                field: "instance_id",
            });
        }
        for (field, value) in [
            ("lowest_level", self.lowest_level),
            ("highest_level", self.highest_level),
            ("starting_level", self.starting_level),
        ] {
            if value <= 0 {
                return Err(ConfigError::NonPositiveLevel { field, value });
            }
        }
        if self.lowest_level >= self.highest_level {
            return Err(ConfigError::InvalidBounds {
                low: self.lowest_level,
                high: self.highest_level,
            });
        }
        if !(self.lowest_level..=self.highest_level).contains(&self.starting_level) {
            return Err(ConfigError::StartingLevelOutOfBounds {
                level: self.starting_level,
                low: self.lowest_level,
                high: self.highest_level,
            });
        }
        if self.minimum_questions >= self.maximum_questions {
            return Err(ConfigError::InvalidQuestionLimits {
                minimum: self.minimum_questions,
                maximum: self.maximum_questions,
            });
        }
        if !(0.0..50.0).contains(&self.target_standard_error_percent) {
            return Err(ConfigError::InvalidTargetError(
                self.target_standard_error_percent,
            ));
        }
        if self.tag_families().any(|prefix| prefix.trim().is_empty()) {
            return Err(ConfigError::EmptyTagPrefix);
        }
        if self.category_ids.is_empty() {
            return Err(ConfigError::NoCategories);
        }
        Ok(())
    }

    /// The difficulty scale as `(low, high)`.
    pub fn bounds(&self) -> (i64, i64) {
        (self.lowest_level, self.highest_level)
    }

    /// Target standard error as a fraction in `[0, 0.5)`.
    pub fn target_error_fraction(&self) -> f64 {
        self.target_standard_error_percent / 100.0
    }

    /// All tag prefixes, primary first.
    pub fn tag_families(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.tag_prefix.as_str())
            .chain(self.extra_tag_prefixes.iter().map(String::as_str))
    }
}

/// Lifecycle of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptStatus::InProgress => write!(f, "in progress"),
            AttemptStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Why an attempt was completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum StopReason {
    /// Standard error fell to the configured target.
    StandardErrorReached,
    /// The maximum number of questions was asked.
    MaximumQuestions,
    /// No unused question exists at any level in range.
    NoEligibleQuestions { level: i64 },
    /// Finalized by a closing action rather than by the algorithm.
    ClosedByAdministrator,
}

impl StopReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            StopReason::StandardErrorReached => "standard_error_reached",
            StopReason::MaximumQuestions => "maximum_questions",
            StopReason::NoEligibleQuestions { .. } => "no_eligible_questions",
            StopReason::ClosedByAdministrator => "closed_by_administrator",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::StandardErrorReached => {
                write!(f, "Standard error of the ability measure is within the target")
            }
            StopReason::MaximumQuestions => {
                write!(f, "Reached the maximum number of questions")
            }
            StopReason::NoEligibleQuestions { level } => {
                write!(f, "Unable to fetch a question near level {level}")
            }
            StopReason::ClosedByAdministrator => write!(f, "Attempt closed"),
        }
    }
}

/// Running state of one test-taker's attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptState {
    pub id: u64,
    pub activity_id: u64,
    pub user_id: String,
    /// Level of the question currently being asked.
    pub level: i64,
    /// Question handed out and not yet answered.
    #[serde(default)]
    pub current_question: Option<QuestionId>,
    pub questions_attempted: u32,
    pub difficulty_sum_logits: f64,
    pub sum_correct: u32,
    pub sum_incorrect: u32,
    pub measure_logits: f64,
    pub standard_error_logits: f64,
    pub status: AttemptStatus,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl AttemptState {
    /// Start a fresh attempt at the activity's starting level.
    pub fn new(
        id: u64,
        user_id: impl Into<String>,
        activity: &ActivityConfig,
    ) -> Result<Self, ConfigError> {
        if id == 0 {
            return Err(ConfigError::NonPositiveId { field: "attempt id" });
        }
        activity.validate()?;
        Ok(Self {
            id,
            activity_id: activity.instance_id,
            user_id: user_id.into(),
            level: activity.starting_level,
            current_question: None,
            questions_attempted: 0,
            difficulty_sum_logits: 0.0,
            sum_correct: 0,
            sum_incorrect: 0,
            measure_logits: 0.0,
            standard_error_logits: 0.0,
            status: AttemptStatus::InProgress,
            stop_reason: None,
            started_at: Utc::now(),
            finished_at: None,
        })
    }

    pub fn totals(&self) -> AttemptTotals {
        AttemptTotals {
            questions_attempted: self.questions_attempted,
            difficulty_sum_logits: self.difficulty_sum_logits,
            sum_correct: self.sum_correct,
            sum_incorrect: self.sum_incorrect,
        }
    }

    pub fn set_totals(&mut self, totals: AttemptTotals) {
        self.questions_attempted = totals.questions_attempted;
        self.difficulty_sum_logits = totals.difficulty_sum_logits;
        self.sum_correct = totals.sum_correct;
        self.sum_incorrect = totals.sum_incorrect;
    }

    pub fn apply_estimate(&mut self, estimate: &AbilityEstimate) {
        self.measure_logits = estimate.measure_logits;
        self.standard_error_logits = estimate.standard_error_logits;
    }

    pub fn is_completed(&self) -> bool {
        self.status == AttemptStatus::Completed
    }

    /// Mark the attempt completed. Only the first call has any effect.
    pub fn complete(&mut self, reason: StopReason) -> bool {
        if self.is_completed() {
            return false;
        }
        self.status = AttemptStatus::Completed;
        self.current_question = None;
        self.stop_reason = Some(reason);
        self.finished_at = Some(Utc::now());
        true
    }
}

/// One entry of an attempt's answer log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedQuestionRecord {
    pub question_id: QuestionId,
    /// Difficulty level the question is tagged with.
    pub difficulty_level: i64,
    /// `None` while grading is still pending.
    pub correct: Option<bool>,
    /// Position of the question in the attempt, starting at 1.
    pub slot_order: u32,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn activity() -> ActivityConfig {
        ActivityConfig {
            instance_id: 1,
            name: "Fractions".into(),
            lowest_level: 1,
            highest_level: 10,
            starting_level: 5,
            minimum_questions: 3,
            maximum_questions: 20,
            target_standard_error_percent: 5.0,
            tag_prefix: "adpq_".into(),
            extra_tag_prefixes: vec![],
            category_ids: ["fractions".to_string()].into_iter().collect(),
            attempts_allowed: 0,
        }
    }

    pub fn record(slot: u32, level: i64, correct: Option<bool>) -> GradedQuestionRecord {
        GradedQuestionRecord {
            question_id: format!("q{slot}"),
            difficulty_level: level,
            correct,
            slot_order: slot,
        }
    }
}
