//! Attempt engine orchestrator.
//!
//! Drives one attempt through its lifecycle: picks the first question, folds
//! each graded answer into the running totals, steps the difficulty, checks
//! the stopping policy and asks the selector for the next question. All
//! persistence goes through the collaborator traits; the availability map is
//! read from and written back to the caller's session cache explicitly.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::AttemptError;
use crate::estimator::{estimate, AbilityEstimate, AttemptTotals};
use crate::model::{
    ActivityConfig, AttemptState, GradedQuestionRecord, QuestionId, StopReason,
};
use crate::replay::{current_difficulty_level, replay_totals, NO_HISTORY};
use crate::report::AttemptReport;
use crate::selector::{QuestionSelector, Selection};
use crate::stepper::compute_next_difficulty;
use crate::stopping::{StopDecision, StoppingPolicy, Unevaluated};
use crate::traits::{AttemptStore, QuestionPool, SessionCache};

/// Configuration for the attempt engine.
#[derive(Debug, Clone, Default)]
pub struct AttemptEngineConfig {
    /// Seed for choosing among equally eligible questions. `None` seeds from
    /// the operating system.
    pub seed: Option<u64>,
}

/// An answer submitted for the question currently asked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnsweredQuestion {
    pub question_id: QuestionId,
    /// Difficulty level the question is tagged with.
    pub level: i64,
    /// `None` if grading has not finished.
    pub correct: Option<bool>,
}

/// The question to ask next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextQuestion {
    pub question_id: QuestionId,
    pub level: i64,
    /// Position in the attempt, starting at 1.
    pub slot: u32,
}

/// Where an attempt stands after a request.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum AttemptProgress {
    /// Ask this question next.
    Question {
        attempt: AttemptState,
        question: NextQuestion,
        estimate: Result<AbilityEstimate, Unevaluated>,
    },
    /// The answer is not graded yet; nothing was recorded.
    Ungraded { attempt: AttemptState },
    /// The attempt is over.
    Completed { attempt: AttemptState },
}

impl AttemptProgress {
    pub fn attempt(&self) -> &AttemptState {
        match self {
            AttemptProgress::Question { attempt, .. }
            | AttemptProgress::Ungraded { attempt }
            | AttemptProgress::Completed { attempt } => attempt,
        }
    }
}

/// The central attempt engine.
pub struct AttemptEngine {
    store: Arc<dyn AttemptStore>,
    pool: Arc<dyn QuestionPool>,
    rng: Mutex<ChaCha8Rng>,
}

impl AttemptEngine {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        pool: Arc<dyn QuestionPool>,
        config: AttemptEngineConfig,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            store,
            pool,
            rng: Mutex::new(rng),
        }
    }

    async fn activity(&self, activity_id: u64) -> Result<ActivityConfig> {
        let activity = self
            .store
            .load_activity(activity_id)
            .await?
            .ok_or(AttemptError::ActivityNotFound(activity_id))?;
        activity.validate()?;
        Ok(activity)
    }

    async fn attempt(&self, attempt_id: u64) -> Result<AttemptState> {
        Ok(self
            .store
            .load_attempt(attempt_id)
            .await?
            .ok_or(AttemptError::AttemptNotFound(attempt_id))?)
    }

    async fn in_progress_attempt(&self, attempt_id: u64) -> Result<AttemptState> {
        let attempt = self.attempt(attempt_id).await?;
        if attempt.is_completed() {
            return Err(AttemptError::AlreadyCompleted(attempt_id).into());
        }
        Ok(attempt)
    }

    fn pick(&self, question_ids: &[QuestionId]) -> Option<QuestionId> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        question_ids.choose(&mut *rng).cloned()
    }

    /// Select and claim a question near `target_level`.
    ///
    /// Decrements availability for the chosen level and writes the map back
    /// to the session cache when it changed. A new attempt recounts the pool
    /// instead of inheriting counts an earlier attempt used up.
    async fn claim_question(
        &self,
        session: &dyn SessionCache,
        activity: &ActivityConfig,
        target_level: i64,
        exclude: &BTreeSet<QuestionId>,
        slot: u32,
        new_attempt: bool,
    ) -> Result<Option<NextQuestion>> {
        let cached = session
            .availability(activity.instance_id)
            .await?
            .unwrap_or_default();
        let mut selector = QuestionSelector::for_activity(self.pool.as_ref(), activity, cached)?;
        if new_attempt {
            selector.request_rebuild();
        }

        let question = match selector.fetch_questions(target_level, exclude).await? {
            Selection::Found {
                level,
                question_ids,
            } => match self.pick(&question_ids) {
                Some(question_id) => {
                    selector.decrement(level);
                    Some(NextQuestion {
                        question_id,
                        level,
                        slot,
                    })
                }
                None => None,
            },
            Selection::Exhausted { .. } => None,
        };

        if selector.is_dirty() {
            session
                .store_availability(activity.instance_id, selector.availability())
                .await?;
        }
        Ok(question)
    }

    /// Start a new attempt and return its first question.
    pub async fn start_attempt(
        &self,
        session: &dyn SessionCache,
        activity_id: u64,
        user_id: &str,
    ) -> Result<AttemptProgress> {
        let activity = self.activity(activity_id).await?;

        if activity.attempts_allowed > 0 {
            let used = self.store.count_attempts(activity_id, user_id).await?;
            if used >= activity.attempts_allowed {
                return Err(AttemptError::AttemptLimitReached {
                    activity_id,
                    user_id: user_id.to_string(),
                    allowed: activity.attempts_allowed,
                }
                .into());
            }
        }

        let id = self.store.next_attempt_id().await?;
        let mut attempt = AttemptState::new(id, user_id, &activity)?;
        tracing::info!(attempt_id = id, activity_id, user_id, "attempt started");

        let first = self
            .claim_question(
                session,
                &activity,
                activity.starting_level,
                &BTreeSet::new(),
                1,
                true,
            )
            .await?;

        match first {
            Some(question) => {
                attempt.level = question.level;
                attempt.current_question = Some(question.question_id.clone());
                self.store.save_attempt(&attempt).await?;
                Ok(AttemptProgress::Question {
                    attempt,
                    question,
                    estimate: Err(Unevaluated::BelowMinimum),
                })
            }
            None => {
                attempt.complete(StopReason::NoEligibleQuestions {
                    level: activity.starting_level,
                });
                self.store.save_attempt(&attempt).await?;
                tracing::warn!(attempt_id = id, "no questions available for a new attempt");
                Ok(AttemptProgress::Completed { attempt })
            }
        }
    }

    /// Grade the current question and decide what happens next.
    ///
    /// The answer must be for the question the attempt is currently asking,
    /// and a question can only be answered once.
    pub async fn submit_answer(
        &self,
        session: &dyn SessionCache,
        attempt_id: u64,
        answer: &AnsweredQuestion,
    ) -> Result<AttemptProgress> {
        let mut attempt = self.in_progress_attempt(attempt_id).await?;

        let mut exclude = self.answered_ids(attempt_id).await?;
        if exclude.contains(&answer.question_id) {
            return Err(AttemptError::AlreadyAnswered {
                attempt_id,
                question_id: answer.question_id.clone(),
            }
            .into());
        }
        if let Some(expected) = &attempt.current_question {
            if *expected != answer.question_id || attempt.level != answer.level {
                return Err(AttemptError::UnexpectedQuestion {
                    attempt_id,
                    expected: expected.clone(),
                    expected_level: attempt.level,
                    got: answer.question_id.clone(),
                    got_level: answer.level,
                }
                .into());
            }
        }

        let activity = self.activity(attempt.activity_id).await?;
        let policy = StoppingPolicy::for_activity(&activity)?;
        let (low, high) = activity.bounds();

        let mut totals = attempt.totals();
        let next_level = match answer.correct {
            Some(correct) => {
                totals.record(answer.level, correct, low, high);
                compute_next_difficulty(answer.level, totals.questions_attempted, correct, low, high)?
            }
            None => attempt.level,
        };

        let estimate = match policy.evaluate(&totals, answer.correct, next_level) {
            StopDecision::CannotEvaluate => {
                tracing::info!(
                    attempt_id,
                    question_id = %answer.question_id,
                    "answer not graded yet, nothing recorded"
                );
                return Ok(AttemptProgress::Ungraded { attempt });
            }
            StopDecision::Stop { reason, estimate } => {
                attempt.set_totals(totals);
                attempt.apply_estimate(&estimate);
                let record = graded_record(answer, &totals);
                return self.finish(attempt, &record, reason).await;
            }
            StopDecision::Continue { estimate, .. } => estimate,
        };

        attempt.set_totals(totals);
        if let Ok(estimate) = &estimate {
            attempt.apply_estimate(estimate);
        }
        let record = graded_record(answer, &totals);

        tracing::debug!(
            attempt_id,
            level = answer.level,
            correct = ?answer.correct,
            next_level,
            questions_attempted = totals.questions_attempted,
            "answer graded"
        );

        // The stopping policy cannot stop without an estimate, but the
        // question ceiling still holds.
        if policy.maximum_reached(totals.questions_attempted) {
            return self
                .finish(attempt, &record, StopReason::MaximumQuestions)
                .await;
        }

        exclude.insert(record.question_id.clone());

        let next = self
            .claim_question(
                session,
                &activity,
                next_level,
                &exclude,
                totals.questions_attempted + 1,
                false,
            )
            .await?;

        match next {
            Some(question) => {
                attempt.level = question.level;
                attempt.current_question = Some(question.question_id.clone());
                self.store.commit_answer(&attempt, &record).await?;
                Ok(AttemptProgress::Question {
                    attempt,
                    question,
                    estimate,
                })
            }
            None => {
                self.finish(
                    attempt,
                    &record,
                    StopReason::NoEligibleQuestions { level: next_level },
                )
                .await
            }
        }
    }

    async fn answered_ids(&self, attempt_id: u64) -> Result<BTreeSet<QuestionId>> {
        Ok(self
            .store
            .graded_history(attempt_id)
            .await?
            .into_iter()
            .map(|r| r.question_id)
            .collect())
    }

    async fn finish(
        &self,
        mut attempt: AttemptState,
        record: &GradedQuestionRecord,
        reason: StopReason,
    ) -> Result<AttemptProgress> {
        attempt.complete(reason);
        self.store.commit_answer(&attempt, record).await?;
        tracing::info!(
            attempt_id = attempt.id,
            reason = reason.code(),
            questions_attempted = attempt.questions_attempted,
            measure = attempt.measure_logits,
            standard_error = attempt.standard_error_logits,
            "attempt completed"
        );
        Ok(AttemptProgress::Completed { attempt })
    }

    /// Resume an interrupted attempt from its answer log.
    ///
    /// Totals and the current level are recomputed by replaying the log; the
    /// stored running totals are overwritten if they disagree. A question
    /// already handed out is asked again without claiming another.
    pub async fn resume_attempt(
        &self,
        session: &dyn SessionCache,
        attempt_id: u64,
    ) -> Result<AttemptProgress> {
        let mut attempt = self.attempt(attempt_id).await?;
        if attempt.is_completed() {
            return Ok(AttemptProgress::Completed { attempt });
        }

        let activity = self.activity(attempt.activity_id).await?;
        let (low, high) = activity.bounds();
        let history = self.store.graded_history(attempt_id).await?;

        let totals = replay_totals(&history, low, high)?;
        if totals != attempt.totals() {
            tracing::warn!(
                attempt_id,
                stored = ?attempt.totals(),
                replayed = ?totals,
                "stored totals disagree with answer log, using the log"
            );
            attempt.set_totals(totals);
        }

        let estimate = estimate(&totals).map_err(|_| Unevaluated::InsufficientEvidence);
        if let Ok(estimate) = &estimate {
            attempt.apply_estimate(estimate);
        }

        let level = match current_difficulty_level(&history, activity.starting_level, low, high)? {
            NO_HISTORY => activity.starting_level,
            level => level,
        };

        let exclude: BTreeSet<QuestionId> = history.into_iter().map(|r| r.question_id).collect();

        // Ask the question already handed out again rather than claiming
        // another one.
        if let Some(question_id) = attempt.current_question.clone() {
            if !exclude.contains(&question_id) {
                self.store.save_attempt(&attempt).await?;
                tracing::info!(attempt_id, level = attempt.level, "attempt resumed");
                let question = NextQuestion {
                    question_id,
                    level: attempt.level,
                    slot: totals.questions_attempted + 1,
                };
                return Ok(AttemptProgress::Question {
                    attempt,
                    question,
                    estimate,
                });
            }
        }

        let next = self
            .claim_question(
                session,
                &activity,
                level,
                &exclude,
                totals.questions_attempted + 1,
                false,
            )
            .await?;

        match next {
            Some(question) => {
                attempt.level = question.level;
                attempt.current_question = Some(question.question_id.clone());
                self.store.save_attempt(&attempt).await?;
                tracing::info!(attempt_id, level = question.level, "attempt resumed");
                Ok(AttemptProgress::Question {
                    attempt,
                    question,
                    estimate,
                })
            }
            None => {
                attempt.complete(StopReason::NoEligibleQuestions { level });
                self.store.save_attempt(&attempt).await?;
                Ok(AttemptProgress::Completed { attempt })
            }
        }
    }

    /// Finalize an abandoned attempt, keeping whatever estimate it has.
    pub async fn close_attempt(&self, attempt_id: u64) -> Result<AttemptState> {
        let mut attempt = self.in_progress_attempt(attempt_id).await?;
        if let Ok(estimate) = estimate(&attempt.totals()) {
            attempt.apply_estimate(&estimate);
        }
        attempt.complete(StopReason::ClosedByAdministrator);
        self.store.save_attempt(&attempt).await?;
        tracing::info!(attempt_id, "attempt closed");
        Ok(attempt)
    }

    /// Summarize an attempt on the activity's display scale.
    pub async fn attempt_report(&self, attempt_id: u64) -> Result<AttemptReport> {
        let attempt = self.attempt(attempt_id).await?;
        let activity = self.activity(attempt.activity_id).await?;
        let history = self.store.graded_history(attempt_id).await?;
        Ok(AttemptReport::build(&activity, &attempt, history))
    }
}

fn graded_record(answer: &AnsweredQuestion, totals: &AttemptTotals) -> GradedQuestionRecord {
    GradedQuestionRecord {
        question_id: answer.question_id.clone(),
        difficulty_level: answer.level,
        correct: answer.correct,
        slot_order: totals.questions_attempted,
    }
}
