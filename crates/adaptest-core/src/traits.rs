//! Collaborator traits for the question pool, attempt store and session cache.
//!
//! These async traits are implemented by `adaptest-store` for in-memory use
//! and by the surrounding application for real persistence.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::model::{ActivityConfig, AttemptState, GradedQuestionRecord, QuestionId};
use crate::selector::AvailabilityMap;

// ---------------------------------------------------------------------------
// Question pool
// ---------------------------------------------------------------------------

/// Tag-based question repository.
#[async_trait]
pub trait QuestionPool: Send + Sync {
    /// Number of questions carrying `tag` in any of `categories`.
    async fn count_tagged(&self, tag: &str, categories: &BTreeSet<String>) -> anyhow::Result<u32>;

    /// Ids of questions carrying `tag` in any of `categories`, minus `exclude`.
    async fn question_ids_tagged(
        &self,
        tag: &str,
        categories: &BTreeSet<String>,
        exclude: &BTreeSet<QuestionId>,
    ) -> anyhow::Result<Vec<QuestionId>>;
}

// ---------------------------------------------------------------------------
// Attempt store
// ---------------------------------------------------------------------------

/// Persistence for activities, attempts and their answer logs.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Load an activity configuration by instance id.
    async fn load_activity(&self, activity_id: u64) -> anyhow::Result<Option<ActivityConfig>>;

    /// Allocate a fresh attempt id (starting at 1).
    async fn next_attempt_id(&self) -> anyhow::Result<u64>;

    /// Number of attempts a user has started on an activity.
    async fn count_attempts(&self, activity_id: u64, user_id: &str) -> anyhow::Result<u32>;

    async fn load_attempt(&self, attempt_id: u64) -> anyhow::Result<Option<AttemptState>>;

    /// Insert or overwrite an attempt.
    async fn save_attempt(&self, attempt: &AttemptState) -> anyhow::Result<()>;

    /// Save the attempt and append its graded record in one atomic update.
    async fn commit_answer(
        &self,
        attempt: &AttemptState,
        record: &GradedQuestionRecord,
    ) -> anyhow::Result<()>;

    /// The answer log of an attempt, ordered by slot.
    async fn graded_history(&self, attempt_id: u64) -> anyhow::Result<Vec<GradedQuestionRecord>>;
}

// ---------------------------------------------------------------------------
// Session cache
// ---------------------------------------------------------------------------

/// Session-scoped storage for the per-activity availability map.
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn availability(&self, activity_id: u64) -> anyhow::Result<Option<AvailabilityMap>>;

    async fn store_availability(
        &self,
        activity_id: u64,
        availability: &AvailabilityMap,
    ) -> anyhow::Result<()>;
}
