//! TOML activity parser.
//!
//! Loads activity configurations from TOML files and directories, and checks
//! them for settings that are valid but likely unintended.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::ActivityConfig;

/// Intermediate TOML structure for activity files.
#[derive(Debug, Deserialize)]
struct TomlActivityFile {
    activity: ActivityConfig,
}

/// Parse a single TOML file into an `ActivityConfig`.
pub fn parse_activity(path: &Path) -> Result<ActivityConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read activity file: {}", path.display()))?;

    parse_activity_str(&content, path)
}

/// Parse a TOML string into an `ActivityConfig` (useful for testing).
pub fn parse_activity_str(content: &str, source_path: &Path) -> Result<ActivityConfig> {
    let parsed: TomlActivityFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    parsed
        .activity
        .validate()
        .with_context(|| format!("invalid activity in {}", source_path.display()))?;

    Ok(parsed.activity)
}

/// Recursively load all `.toml` activity files from a directory.
pub fn load_activity_directory(dir: &Path) -> Result<Vec<ActivityConfig>> {
    let mut activities = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            activities.extend(load_activity_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_activity(&path) {
                Ok(activity) => activities.push(activity),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    activities.sort_by_key(|a| a.instance_id);
    Ok(activities)
}

/// A warning from activity validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The activity the warning applies to.
    pub activity_id: u64,
    /// Warning message.
    pub message: String,
}

/// Check an activity for settings that make the test behave poorly.
pub fn validate_activity(activity: &ActivityConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn = |message: String| {
        warnings.push(ValidationWarning {
            activity_id: activity.instance_id,
            message,
        })
    };

    // An estimate needs at least one right and one wrong answer
    if activity.minimum_questions < 2 {
        warn(format!(
            "minimum_questions is {}; no estimate exists before two answers",
            activity.minimum_questions
        ));
    }

    // A boundary start has an infinite logit and never moves
    if activity.starting_level == activity.lowest_level
        || activity.starting_level == activity.highest_level
    {
        warn(format!(
            "starting_level {} is on the scale boundary; difficulty will never move",
            activity.starting_level
        ));
    }

    if activity.target_standard_error_percent == 0.0 {
        warn("target_standard_error_percent is 0; attempts only stop at maximum_questions".into());
    }

    let mut seen = HashSet::new();
    for prefix in activity.tag_families() {
        if !seen.insert(prefix) {
            warn(format!("tag prefix '{prefix}' is listed twice; counts will double"));
        }
    }

    warnings
}

/// Check a set of activities for conflicts between them.
pub fn validate_activities(activities: &[ActivityConfig]) -> Vec<ValidationWarning> {
    let mut warnings: Vec<ValidationWarning> =
        activities.iter().flat_map(validate_activity).collect();

    let mut seen_ids = HashSet::new();
    for activity in activities {
        if !seen_ids.insert(activity.instance_id) {
            warnings.push(ValidationWarning {
                activity_id: activity.instance_id,
                message: format!("duplicate activity instance_id: {}", activity.instance_id),
            });
        }
    }

    warnings
}
