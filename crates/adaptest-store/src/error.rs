//! Store error types.

use thiserror::Error;

/// Errors raised by the in-memory store and the pool loader.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Two pool entries share an id.
    #[error("duplicate question id: {0}")]
    DuplicateQuestion(String),

    /// A pool entry has a blank id.
    #[error("question #{0} has an empty id")]
    EmptyQuestionId(usize),

    /// An answer was committed for an attempt that was never saved.
    #[error("attempt {0} is not in the store")]
    UnknownAttempt(u64),

    /// A graded record does not extend the answer log by one slot.
    #[error("attempt {attempt_id}: expected slot {expected}, got {got}")]
    SlotOutOfOrder {
        attempt_id: u64,
        expected: u32,
        got: u32,
    },

    /// A commit failure injected by a test.
    #[error("injected commit failure for attempt {0}")]
    InjectedFailure(u64),
}
