//! TOML question-pool loader.
//!
//! A pool file lists questions with their category and tags:
//!
//! ```toml
//! [[questions]]
//! id = "frac-001"
//! category = "fractions"
//! tags = ["adpq_4"]
//! ```

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::memory::InMemoryQuestionPool;

/// A question as the selector sees it: an id, a category and its tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolQuestion {
    pub id: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PoolQuestion {
    /// Whether the question carries `tag` and belongs to one of `categories`.
    pub fn matches(&self, tag: &str, categories: &BTreeSet<String>) -> bool {
        categories.contains(&self.category) && self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Deserialize)]
struct TomlPoolFile {
    #[serde(default)]
    questions: Vec<PoolQuestion>,
}

/// Load a question pool from a TOML file.
pub fn load_pool(path: &Path) -> Result<InMemoryQuestionPool> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question pool: {}", path.display()))?;
    let questions = parse_pool_str(&content, path)?;
    tracing::debug!(path = %path.display(), questions = questions.len(), "loaded question pool");
    Ok(InMemoryQuestionPool::new(questions))
}

/// Parse pool TOML into its questions, rejecting blank and duplicate ids.
pub fn parse_pool_str(content: &str, source_path: &Path) -> Result<Vec<PoolQuestion>> {
    let parsed: TomlPoolFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let mut seen = HashSet::new();
    for (index, question) in parsed.questions.iter().enumerate() {
        if question.id.trim().is_empty() {
            return Err(StoreError::EmptyQuestionId(index + 1))
                .with_context(|| format!("invalid pool {}", source_path.display()));
        }
        if !seen.insert(question.id.as_str()) {
            return Err(StoreError::DuplicateQuestion(question.id.clone()))
                .with_context(|| format!("invalid pool {}", source_path.display()));
        }
        if question.tags.is_empty() {
            tracing::warn!(
                question = %question.id,
                "question has no tags and can never be selected"
            );
        }
    }

    Ok(parsed.questions)
}
