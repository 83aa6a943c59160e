//! The `adaptest init` command.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("adaptest.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("activities")?;
    write_if_missing(Path::new("activities/sample.toml"), SAMPLE_ACTIVITY)?;

    std::fs::create_dir_all("pools")?;
    write_if_missing(Path::new("pools/sample.toml"), &sample_pool())?;

    println!("\nNext steps:");
    println!("  1. Edit activities/sample.toml and pools/sample.toml");
    println!("  2. Run: adaptest validate --activity activities");
    println!("  3. Run: adaptest simulate --activity activities/sample.toml --ability 6.5");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

/// Two questions per level, tagged `adpq_<level>`.
fn sample_pool() -> String {
    let mut pool = String::from("# Sample question pool\n");
    for level in 1..=10 {
        for n in 1..=2 {
            let _ = write!(pool, "\n[[questions]]\nid = \"sample-{level:02}-{n}\"\n");
            let _ = writeln!(pool, "category = \"sample\"\ntags = [\"adpq_{level}\"]");
        }
    }
    pool
}

const SAMPLE_CONFIG: &str = r#"# adaptest configuration

activities_dir = "./activities"
pool = "./pools/sample.toml"
output_dir = "./adaptest-results"
runs = 20
# seed = 42
"#;

const SAMPLE_ACTIVITY: &str = r#"[activity]
instance_id = 1
name = "Sample activity"
lowest_level = 1
highest_level = 10
starting_level = 5
minimum_questions = 5
maximum_questions = 15
target_standard_error_percent = 15.0
tag_prefix = "adpq_"
category_ids = ["sample"]
attempts_allowed = 0
"#;
