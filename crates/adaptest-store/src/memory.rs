//! In-memory collaborators for running the engine without a database.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use adaptest_core::model::{ActivityConfig, AttemptState, GradedQuestionRecord, QuestionId};
use adaptest_core::selector::AvailabilityMap;
use adaptest_core::traits::{AttemptStore, QuestionPool, SessionCache};

use crate::error::StoreError;
use crate::pool::PoolQuestion;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Attempt store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreInner {
    activities: HashMap<u64, ActivityConfig>,
    attempts: HashMap<u64, AttemptState>,
    histories: HashMap<u64, Vec<GradedQuestionRecord>>,
}

/// Attempt store backed by hash maps behind a single lock, so an answer
/// commit updates the attempt and its log together.
pub struct InMemoryAttemptStore {
    inner: Mutex<StoreInner>,
    next_id: AtomicU64,
    commit_count: AtomicU32,
    fail_next_commit: AtomicBool,
}

impl Default for InMemoryAttemptStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            next_id: AtomicU64::new(1),
            commit_count: AtomicU32::new(0),
            fail_next_commit: AtomicBool::new(false),
        }
    }

    /// Create a store holding the given activities.
    pub fn with_activities(activities: impl IntoIterator<Item = ActivityConfig>) -> Self {
        let store = Self::new();
        for activity in activities {
            store.insert_activity(activity);
        }
        store
    }

    /// Add or replace an activity.
    pub fn insert_activity(&self, activity: ActivityConfig) {
        lock(&self.inner)
            .activities
            .insert(activity.instance_id, activity);
    }

    /// Number of successful answer commits.
    pub fn commit_count(&self) -> u32 {
        self.commit_count.load(Ordering::Relaxed)
    }

    /// Make the next `commit_answer` fail without writing anything.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::Relaxed);
    }

    /// All attempts, ordered by id.
    pub fn attempts(&self) -> Vec<AttemptState> {
        let mut attempts: Vec<_> = lock(&self.inner).attempts.values().cloned().collect();
        attempts.sort_by_key(|a| a.id);
        attempts
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn load_activity(&self, activity_id: u64) -> anyhow::Result<Option<ActivityConfig>> {
        Ok(lock(&self.inner).activities.get(&activity_id).cloned())
    }

    async fn next_attempt_id(&self) -> anyhow::Result<u64> {
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn count_attempts(&self, activity_id: u64, user_id: &str) -> anyhow::Result<u32> {
        let count = lock(&self.inner)
            .attempts
            .values()
            .filter(|a| a.activity_id == activity_id && a.user_id == user_id)
            .count();
        Ok(count as u32)
    }

    async fn load_attempt(&self, attempt_id: u64) -> anyhow::Result<Option<AttemptState>> {
        Ok(lock(&self.inner).attempts.get(&attempt_id).cloned())
    }

    async fn save_attempt(&self, attempt: &AttemptState) -> anyhow::Result<()> {
        lock(&self.inner).attempts.insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn commit_answer(
        &self,
        attempt: &AttemptState,
        record: &GradedQuestionRecord,
    ) -> anyhow::Result<()> {
        if self.fail_next_commit.swap(false, Ordering::Relaxed) {
            return Err(StoreError::InjectedFailure(attempt.id).into());
        }

        let mut inner = lock(&self.inner);
        if !inner.attempts.contains_key(&attempt.id) {
            return Err(StoreError::UnknownAttempt(attempt.id).into());
        }

        let expected = inner.histories.get(&attempt.id).map_or(0, Vec::len) as u32 + 1;
        if record.slot_order != expected {
            return Err(StoreError::SlotOutOfOrder {
                attempt_id: attempt.id,
                expected,
                got: record.slot_order,
            }
            .into());
        }

        inner
            .histories
            .entry(attempt.id)
            .or_default()
            .push(record.clone());
        inner.attempts.insert(attempt.id, attempt.clone());
        self.commit_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn graded_history(&self, attempt_id: u64) -> anyhow::Result<Vec<GradedQuestionRecord>> {
        let mut history = lock(&self.inner)
            .histories
            .get(&attempt_id)
            .cloned()
            .unwrap_or_default();
        history.sort_by_key(|r| r.slot_order);
        Ok(history)
    }
}

// ---------------------------------------------------------------------------
// Question pool
// ---------------------------------------------------------------------------

/// Question pool over a list of tagged questions.
#[derive(Debug)]
pub struct InMemoryQuestionPool {
    questions: Mutex<Vec<PoolQuestion>>,
}

impl InMemoryQuestionPool {
    pub fn new(questions: Vec<PoolQuestion>) -> Self {
        Self {
            questions: Mutex::new(questions),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.questions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a question, as when an author deletes it mid-session.
    pub fn retire(&self, question_id: &str) -> bool {
        let mut questions = lock(&self.questions);
        let before = questions.len();
        questions.retain(|q| q.id != question_id);
        questions.len() != before
    }
}

#[async_trait]
impl QuestionPool for InMemoryQuestionPool {
    async fn count_tagged(&self, tag: &str, categories: &BTreeSet<String>) -> anyhow::Result<u32> {
        let count = lock(&self.questions)
            .iter()
            .filter(|q| q.matches(tag, categories))
            .count();
        Ok(count as u32)
    }

    async fn question_ids_tagged(
        &self,
        tag: &str,
        categories: &BTreeSet<String>,
        exclude: &BTreeSet<QuestionId>,
    ) -> anyhow::Result<Vec<QuestionId>> {
        Ok(lock(&self.questions)
            .iter()
            .filter(|q| q.matches(tag, categories) && !exclude.contains(&q.id))
            .map(|q| q.id.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Session cache
// ---------------------------------------------------------------------------

/// Per-session availability maps keyed by activity.
#[derive(Default)]
pub struct InMemorySessionCache {
    maps: Mutex<HashMap<u64, AvailabilityMap>>,
    store_count: AtomicU32,
}

impl InMemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times a map was written back.
    pub fn store_count(&self) -> u32 {
        self.store_count.load(Ordering::Relaxed)
    }

    /// Drop every cached map, as at the end of a session.
    pub fn clear(&self) {
        lock(&self.maps).clear();
    }
}

#[async_trait]
impl SessionCache for InMemorySessionCache {
    async fn availability(&self, activity_id: u64) -> anyhow::Result<Option<AvailabilityMap>> {
        Ok(lock(&self.maps).get(&activity_id).cloned())
    }

    async fn store_availability(
        &self,
        activity_id: u64,
        availability: &AvailabilityMap,
    ) -> anyhow::Result<()> {
        self.store_count.fetch_add(1, Ordering::Relaxed);
        lock(&self.maps).insert(activity_id, availability.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptest_core::model::AttemptStatus;

    fn question(id: &str, category: &str, tags: &[&str]) -> PoolQuestion {
        PoolQuestion {
            id: id.into(),
            category: category.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn activity() -> ActivityConfig {
        ActivityConfig {
            instance_id: 4,
            name: "Ratios".into(),
            lowest_level: 1,
            highest_level: 10,
            starting_level: 5,
            minimum_questions: 2,
            maximum_questions: 10,
            target_standard_error_percent: 5.0,
            tag_prefix: "adpq_".into(),
            extra_tag_prefixes: vec![],
            category_ids: ["ratios".to_string()].into(),
            attempts_allowed: 0,
        }
    }

    fn record(slot: u32) -> GradedQuestionRecord {
        GradedQuestionRecord {
            question_id: format!("q{slot}"),
            difficulty_level: 5,
            correct: Some(true),
            slot_order: slot,
        }
    }

    #[tokio::test]
    async fn pool_filters_by_tag_and_category() {
        let pool = InMemoryQuestionPool::new(vec![
            question("a", "ratios", &["adpq_3"]),
            question("b", "ratios", &["adpq_3", "review"]),
            question("c", "geometry", &["adpq_3"]),
            question("d", "ratios", &["adpq_4"]),
        ]);
        let categories: BTreeSet<String> = ["ratios".to_string()].into();

        assert_eq!(pool.count_tagged("adpq_3", &categories).await.unwrap(), 2);
        let exclude: BTreeSet<QuestionId> = ["a".to_string()].into();
        let ids = pool
            .question_ids_tagged("adpq_3", &categories, &exclude)
            .await
            .unwrap();
        assert_eq!(ids, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn retired_question_disappears() {
        let pool = InMemoryQuestionPool::new(vec![question("a", "ratios", &["adpq_3"])]);
        assert!(pool.retire("a"));
        assert!(!pool.retire("a"));
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn commit_appends_and_saves_together() {
        let store = InMemoryAttemptStore::with_activities([activity()]);
        let id = store.next_attempt_id().await.unwrap();
        assert_eq!(id, 1);

        let mut attempt = AttemptState::new(id, "sam", &activity()).unwrap();
        store.save_attempt(&attempt).await.unwrap();

        attempt.questions_attempted = 1;
        store.commit_answer(&attempt, &record(1)).await.unwrap();

        let loaded = store.load_attempt(id).await.unwrap().unwrap();
        assert_eq!(loaded.questions_attempted, 1);
        assert_eq!(loaded.status, AttemptStatus::InProgress);
        assert_eq!(store.graded_history(id).await.unwrap(), vec![record(1)]);
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn out_of_order_slot_rejected() {
        let store = InMemoryAttemptStore::new();
        let attempt = AttemptState::new(1, "sam", &activity()).unwrap();
        store.save_attempt(&attempt).await.unwrap();

        let err = store.commit_answer(&attempt, &record(2)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::SlotOutOfOrder {
                expected: 1,
                got: 2,
                ..
            })
        ));
        assert!(store.graded_history(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_for_unknown_attempt_rejected() {
        let store = InMemoryAttemptStore::new();
        let attempt = AttemptState::new(9, "sam", &activity()).unwrap();
        let err = store.commit_answer(&attempt, &record(1)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::UnknownAttempt(9))
        ));
    }

    #[tokio::test]
    async fn injected_failure_writes_nothing() {
        let store = InMemoryAttemptStore::new();
        let attempt = AttemptState::new(1, "sam", &activity()).unwrap();
        store.save_attempt(&attempt).await.unwrap();

        store.fail_next_commit();
        assert!(store.commit_answer(&attempt, &record(1)).await.is_err());
        assert!(store.graded_history(1).await.unwrap().is_empty());

        store.commit_answer(&attempt, &record(1)).await.unwrap();
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn attempts_counted_per_user_and_activity() {
        let store = InMemoryAttemptStore::new();
        for (id, user) in [(1, "sam"), (2, "sam"), (3, "kim")] {
            let attempt = AttemptState::new(id, user, &activity()).unwrap();
            store.save_attempt(&attempt).await.unwrap();
        }
        assert_eq!(store.count_attempts(4, "sam").await.unwrap(), 2);
        assert_eq!(store.count_attempts(4, "kim").await.unwrap(), 1);
        assert_eq!(store.count_attempts(5, "sam").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn session_cache_round_trip() {
        let cache = InMemorySessionCache::new();
        assert!(cache.availability(4).await.unwrap().is_none());

        let map: AvailabilityMap = [(1, 2), (2, 0)].into_iter().collect();
        cache.store_availability(4, &map).await.unwrap();
        assert_eq!(cache.availability(4).await.unwrap(), Some(map));
        assert_eq!(cache.store_count(), 1);

        cache.clear();
        assert!(cache.availability(4).await.unwrap().is_none());
    }
}
