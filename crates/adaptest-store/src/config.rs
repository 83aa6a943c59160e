//! Tool configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level adaptest configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptestConfig {
    /// Directory searched for activity files.
    #[serde(default = "default_activities_dir")]
    pub activities_dir: PathBuf,
    /// Default question pool file.
    #[serde(default)]
    pub pool: Option<PathBuf>,
    /// Output directory for attempt reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Seed for question picking and simulated answers.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Simulated test-takers per `simulate` run.
    #[serde(default = "default_runs")]
    pub runs: u32,
}

fn default_activities_dir() -> PathBuf {
    PathBuf::from("./activities")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./adaptest-results")
}
fn default_runs() -> u32 {
    20
}

impl Default for AdaptestConfig {
    fn default() -> Self {
        Self {
            activities_dir: default_activities_dir(),
            pool: None,
            output_dir: default_output_dir(),
            seed: None,
            runs: default_runs(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = lookup(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_path(path: &Path, lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    PathBuf::from(resolve_env_vars(&path.to_string_lossy(), lookup))
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `adaptest.toml` in the current directory
/// 2. `~/.config/adaptest/config.toml`
///
/// Environment variable overrides: `ADAPTEST_SEED`, `ADAPTEST_OUTPUT_DIR`.
pub fn load_config() -> Result<AdaptestConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<AdaptestConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("adaptest.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<AdaptestConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => AdaptestConfig::default(),
    };

    apply_env(config, |name| std::env::var(name).ok())
}

/// Apply environment overrides and `${VAR}` expansion in paths.
fn apply_env(
    mut config: AdaptestConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AdaptestConfig> {
    if let Some(seed) = lookup("ADAPTEST_SEED") {
        let seed = seed
            .trim()
            .parse()
            .with_context(|| format!("ADAPTEST_SEED is not a number: {seed}"))?;
        config.seed = Some(seed);
    }

    if let Some(dir) = lookup("ADAPTEST_OUTPUT_DIR") {
        config.output_dir = PathBuf::from(dir);
    }

    config.activities_dir = resolve_path(&config.activities_dir, &lookup);
    config.output_dir = resolve_path(&config.output_dir, &lookup);
    config.pool = config.pool.map(|p| resolve_path(&p, &lookup));

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("adaptest"))
}
