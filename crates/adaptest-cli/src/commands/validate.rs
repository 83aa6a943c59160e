//! The `adaptest validate` command.

use std::path::PathBuf;

use anyhow::Result;

use adaptest_core::parser;
use adaptest_store::load_config;

pub fn execute(activity_path: Option<PathBuf>) -> Result<()> {
    let activity_path = match activity_path {
        Some(path) => path,
        None => load_config()?.activities_dir,
    };

    let activities = if activity_path.is_dir() {
        parser::load_activity_directory(&activity_path)?
    } else {
        vec![parser::parse_activity(&activity_path)?]
    };

    anyhow::ensure!(
        !activities.is_empty(),
        "no valid activities found in {}",
        activity_path.display()
    );

    for activity in &activities {
        println!(
            "Activity {}: {} (levels {}-{}, {}-{} questions)",
            activity.instance_id,
            activity.name,
            activity.lowest_level,
            activity.highest_level,
            activity.minimum_questions,
            activity.maximum_questions,
        );
    }

    let warnings = parser::validate_activities(&activities);
    for w in &warnings {
        println!("  [{}] WARNING: {}", w.activity_id, w.message);
    }

    if warnings.is_empty() {
        println!("All activities valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
