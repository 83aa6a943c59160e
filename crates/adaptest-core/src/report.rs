//! Attempt reports with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::estimator::{estimate, AbilityEstimate};
use crate::model::{
    ActivityConfig, AttemptState, AttemptStatus, GradedQuestionRecord, StopReason,
};
use crate::scale::{logit_to_linear, round_to};

/// A complete attempt report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Summary of the activity.
    pub activity: ActivitySummary,
    pub attempt_id: u64,
    pub user_id: String,
    pub status: AttemptStatus,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    /// Human-readable form of `stop_reason`.
    #[serde(default)]
    pub stop_message: Option<String>,
    pub questions_attempted: u32,
    pub sum_correct: u32,
    pub sum_incorrect: u32,
    /// Ability estimate, absent until there is enough evidence.
    #[serde(default)]
    pub score: Option<ScoreSummary>,
    /// The graded answer log.
    pub answers: Vec<GradedQuestionRecord>,
}

/// Summary of an activity (without pool details).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub id: u64,
    pub name: String,
    pub lowest_level: i64,
    pub highest_level: i64,
}

/// Ability estimate in logits and on the display scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSummary {
    #[serde(default)]
    pub measure_logits: Option<f64>,
    pub standard_error_logits: f64,
    /// Ability on the linear difficulty scale, rounded to one decimal.
    #[serde(default)]
    pub ability: Option<f64>,
    /// Standard error as a percentage, rounded to one decimal.
    #[serde(default)]
    pub error_percent: Option<f64>,
    /// Ability one standard error either side, on the linear scale.
    #[serde(default)]
    pub ability_range: Option<(f64, f64)>,
}

impl ScoreSummary {
    fn from_estimate(estimate: &AbilityEstimate, low: i64, high: i64) -> Self {
        let finite = |x: f64| x.is_finite().then_some(x);
        let (low_f, high_f) = (low as f64, high as f64);
        let measure = estimate.measure_logits;
        let se = estimate.standard_error_logits;

        let ability =
            (!measure.is_nan()).then(|| round_to(estimate.display_ability(low, high), 1));
        let ability_range = (!measure.is_nan()).then(|| {
            (
                round_to(logit_to_linear(measure - se, low_f, high_f), 1),
                round_to(logit_to_linear(measure + se, low_f, high_f), 1),
            )
        });

        Self {
            measure_logits: finite(measure),
            standard_error_logits: se,
            ability,
            error_percent: estimate
                .display_error_percent()
                .ok()
                .map(|p| round_to(p, 1)),
            ability_range,
        }
    }
}

impl AttemptReport {
    /// Build a report from an attempt and its answer log.
    pub fn build(
        activity: &ActivityConfig,
        attempt: &AttemptState,
        answers: Vec<GradedQuestionRecord>,
    ) -> Self {
        let (low, high) = activity.bounds();
        let score = estimate(&attempt.totals())
            .ok()
            .map(|e| ScoreSummary::from_estimate(&e, low, high));

        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            activity: ActivitySummary {
                id: activity.instance_id,
                name: activity.name.clone(),
                lowest_level: low,
                highest_level: high,
            },
            attempt_id: attempt.id,
            user_id: attempt.user_id.clone(),
            status: attempt.status,
            stop_reason: attempt.stop_reason,
            stop_message: attempt.stop_reason.map(|r| r.to_string()),
            questions_attempted: attempt.questions_attempted,
            sum_correct: attempt.sum_correct,
            sum_incorrect: attempt.sum_incorrect,
            score,
            answers,
        }
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: AttemptReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }
}
