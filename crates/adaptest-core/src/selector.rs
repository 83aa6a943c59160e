//! Adaptive question selection.
//!
//! The selector looks for unused questions tagged at a target level. When the
//! target level has none left it searches outwards, alternating one level
//! harder and one level easier, until it finds a level that still has
//! questions or runs off both ends of the scale.
//!
//! Availability counts are kept in an [`AvailabilityMap`] that the caller owns
//! and persists. The selector never decrements on its own: the caller reports
//! each consumed question through [`QuestionSelector::decrement`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{ActivityConfig, QuestionId};
use crate::traits::QuestionPool;

/// Upper bound on the fallback search radius.
pub const MAX_SEARCH_RADIUS: i64 = 100_000;

/// Count of unused questions per difficulty level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AvailabilityMap(BTreeMap<i64, u32>);

impl AvailabilityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Questions left at `level`; unknown levels count as zero.
    pub fn get(&self, level: i64) -> u32 {
        self.0.get(&level).copied().unwrap_or(0)
    }

    pub fn set(&mut self, level: i64, count: u32) {
        self.0.insert(level, count);
    }

    /// Add `count` to the level's tally.
    pub fn add(&mut self, level: i64, count: u32) {
        *self.0.entry(level).or_insert(0) += count;
    }

    /// Consume one question at `level`. Returns `false` if none were left.
    pub fn decrement(&mut self, level: i64) -> bool {
        match self.0.get_mut(&level) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Questions left across all levels.
    pub fn total(&self) -> u64 {
        self.0.values().map(|&c| u64::from(c)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, u32)> + '_ {
        self.0.iter().map(|(&level, &count)| (level, count))
    }
}

impl FromIterator<(i64, u32)> for AvailabilityMap {
    fn from_iter<I: IntoIterator<Item = (i64, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Result of a question search.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Selection {
    /// Eligible questions at `level`.
    Found {
        level: i64,
        question_ids: Vec<QuestionId>,
    },
    /// No level in range has unused questions; the attempt cannot continue.
    Exhausted { level: i64 },
}

/// Finds eligible questions for a target difficulty.
pub struct QuestionSelector<'a> {
    pool: &'a dyn QuestionPool,
    low: i64,
    high: i64,
    tag_prefixes: Vec<String>,
    categories: BTreeSet<String>,
    availability: AvailabilityMap,
    rebuild: bool,
    changed: bool,
    level: i64,
}

impl<'a> QuestionSelector<'a> {
    pub fn new(
        pool: &'a dyn QuestionPool,
        low: i64,
        high: i64,
        tag_prefixes: Vec<String>,
        categories: BTreeSet<String>,
        availability: AvailabilityMap,
    ) -> Result<Self, ConfigError> {
        if low >= high {
            return Err(ConfigError::InvalidBounds { low, high });
        }
        if tag_prefixes.is_empty() || tag_prefixes.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::EmptyTagPrefix);
        }
        Ok(Self {
            pool,
            low,
            high,
            tag_prefixes,
            categories,
            availability,
            rebuild: false,
            changed: false,
            level: low,
        })
    }

    /// Selector over an activity's scale, tags and categories.
    pub fn for_activity(
        pool: &'a dyn QuestionPool,
        activity: &ActivityConfig,
        availability: AvailabilityMap,
    ) -> Result<Self, ConfigError> {
        Self::new(
            pool,
            activity.lowest_level,
            activity.highest_level,
            activity.tag_families().map(str::to_owned).collect(),
            activity.category_ids.clone(),
            availability,
        )
    }

    /// Recount availability from the pool on the next fetch.
    pub fn request_rebuild(&mut self) {
        self.rebuild = true;
    }

    /// Level of the most recent selection.
    pub fn level(&self) -> i64 {
        self.level
    }

    pub fn availability(&self) -> &AvailabilityMap {
        &self.availability
    }

    pub fn into_availability(self) -> AvailabilityMap {
        self.availability
    }

    /// Whether the availability map changed since construction.
    pub fn is_dirty(&self) -> bool {
        self.changed
    }

    /// Record that one question at `level` was used.
    pub fn decrement(&mut self, level: i64) {
        if self.availability.decrement(level) {
            self.changed = true;
        } else {
            tracing::warn!(level, "decrement on a level with no questions left");
        }
    }

    fn tag(prefix: &str, level: i64) -> String {
        format!("{prefix}{level}")
    }

    fn in_bounds(&self, level: i64) -> bool {
        (self.low..=self.high).contains(&level)
    }

    /// Count questions per level and tag family, accumulating across families.
    async fn populate(&mut self) -> anyhow::Result<()> {
        let mut availability = AvailabilityMap::new();
        for level in self.low..=self.high {
            availability.set(level, 0);
            for prefix in &self.tag_prefixes {
                let count = self
                    .pool
                    .count_tagged(&Self::tag(prefix, level), &self.categories)
                    .await?;
                availability.add(level, count);
            }
        }
        tracing::debug!(
            low = self.low,
            high = self.high,
            total = availability.total(),
            "built question availability"
        );
        self.availability = availability;
        self.rebuild = false;
        self.changed = true;
        Ok(())
    }

    async fn ids_at(
        &self,
        level: i64,
        exclude: &BTreeSet<QuestionId>,
    ) -> anyhow::Result<Vec<QuestionId>> {
        let mut seen = BTreeSet::new();
        let mut ids = Vec::new();
        for prefix in &self.tag_prefixes {
            let tagged = self
                .pool
                .question_ids_tagged(&Self::tag(prefix, level), &self.categories, exclude)
                .await?;
            for id in tagged {
                if !exclude.contains(&id) && seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// Try one level; on cache drift zero the level and report nothing found.
    async fn try_level(
        &mut self,
        level: i64,
        exclude: &BTreeSet<QuestionId>,
    ) -> anyhow::Result<Option<Vec<QuestionId>>> {
        if !self.in_bounds(level) || self.availability.get(level) == 0 {
            return Ok(None);
        }
        let ids = self.ids_at(level, exclude).await?;
        if ids.is_empty() {
            tracing::warn!(
                level,
                cached = self.availability.get(level),
                "availability cache drifted from pool, clearing level"
            );
            self.availability.set(level, 0);
            self.changed = true;
            return Ok(None);
        }
        Ok(Some(ids))
    }

    /// Find eligible questions at `target_level`, or at the nearest level with
    /// questions left, trying harder before easier at equal distance.
    pub async fn fetch_questions(
        &mut self,
        target_level: i64,
        exclude: &BTreeSet<QuestionId>,
    ) -> anyhow::Result<Selection> {
        if self.availability.is_empty() || self.rebuild {
            self.populate().await?;
        }

        self.level = target_level;
        if let Some(question_ids) = self.try_level(target_level, exclude).await? {
            return Ok(Selection::Found {
                level: target_level,
                question_ids,
            });
        }

        for radius in 1..=MAX_SEARCH_RADIUS {
            let harder = target_level + radius;
            let easier = target_level - radius;
            if harder > self.high && easier < self.low {
                break;
            }
            for candidate in [harder, easier] {
                if let Some(question_ids) = self.try_level(candidate, exclude).await? {
                    tracing::debug!(
                        target_level,
                        level = candidate,
                        "no questions at target level, using nearest level"
                    );
                    self.level = candidate;
                    return Ok(Selection::Found {
                        level: candidate,
                        question_ids,
                    });
                }
            }
        }

        tracing::info!(target_level, "no eligible questions left in range");
        Ok(Selection::Exhausted {
            level: target_level,
        })
    }
}
