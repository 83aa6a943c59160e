//! Error types for the adaptive testing core.
//!
//! Configuration and domain errors abort the current operation. Insufficient
//! evidence is a recoverable condition that callers branch on. `AttemptError`
//! is raised by the engine and wrapped in `anyhow`, so callers can downcast it
//! instead of matching on strings.

use thiserror::Error;

/// Invalid activity or attempt configuration, detected at construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A level bound or starting level was zero or negative.
    #[error("{field} must be positive, got {value}")]
    NonPositiveLevel { field: &'static str, value: i64 },

    /// Attempt or activity ids start at 1.
    #[error("{field} must be positive")]
    NonPositiveId { field: &'static str },

    /// The difficulty scale is empty or inverted.
    #[error("lowest level {low} must be below highest level {high}")]
    InvalidBounds { low: i64, high: i64 },

    /// The starting level lies outside the scale.
    #[error("starting level {level} is outside [{low}, {high}]")]
    StartingLevelOutOfBounds { level: i64, low: i64, high: i64 },

    /// Minimum question count is not below the maximum.
    #[error("minimum questions {minimum} must be below maximum questions {maximum}")]
    InvalidQuestionLimits { minimum: u32, maximum: u32 },

    /// Target standard error must be in [0, 50) percent.
    #[error("target standard error {0}% is outside [0, 50)")]
    InvalidTargetError(f64),

    /// Tag prefixes identify difficulty tags and cannot be blank.
    #[error("tag prefix must not be empty")]
    EmptyTagPrefix,

    /// No pool categories configured.
    #[error("at least one question category is required")]
    NoCategories,
}

/// A scale function was called outside its mathematical domain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("error fraction {0} is outside [0, 0.5)")]
    PercentOutOfRange(f64),

    #[error("standard error logit {0} is negative")]
    NegativeLogit(f64),

    #[error("questions attempted must be at least 1 to step difficulty")]
    NoQuestionsAttempted,
}

/// Not enough answers to discriminate ability yet.
///
/// Returned instead of a division-by-zero estimate; the attempt simply
/// continues without a score update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InsufficientEvidence {
    #[error("no questions have been attempted")]
    NoQuestions,

    #[error("no correct answers yet")]
    NoCorrectAnswers,

    #[error("no incorrect answers yet")]
    NoIncorrectAnswers,
}

/// Attempt lifecycle failures raised by the engine.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("activity {0} not found")]
    ActivityNotFound(u64),

    #[error("attempt {0} not found")]
    AttemptNotFound(u64),

    #[error("attempt {0} is already completed")]
    AlreadyCompleted(u64),

    #[error("user {user_id} has used all {allowed} attempts for activity {activity_id}")]
    AttemptLimitReached {
        activity_id: u64,
        user_id: String,
        allowed: u32,
    },

    #[error("question {question_id} was already answered in attempt {attempt_id}")]
    AlreadyAnswered {
        attempt_id: u64,
        question_id: String,
    },

    #[error(
        "attempt {attempt_id} is asking {expected} at level {expected_level}, \
         got {got} at level {got_level}"
    )]
    UnexpectedQuestion {
        attempt_id: u64,
        expected: String,
        expected_level: i64,
        got: String,
        got_level: i64,
    },
}
