use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::{Display, EnumString};

/// The ruleset a score was set in. Aggregates and best-score contexts are
/// always partitioned by ruleset; scores in different rulesets never
/// interact, even on the same beatmap.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Ruleset {
    Osu,
    Taiko,
    Catch,
    Mania,
}

/// Score rank, ordered worst to best. Only ranks of A and above occupy
/// rank-count buckets on the user aggregate.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
pub enum ScoreRank {
    D,
    C,
    B,
    A,
    S,
    /// S with full hidden-style modifiers ("silver S").
    SH,
    X,
    /// X with full hidden-style modifiers ("silver SS").
    XH,
}

impl ScoreRank {
    /// Whether this rank is tracked in a rank-count bucket.
    pub fn is_tracked(&self) -> bool {
        *self >= ScoreRank::A
    }
}

/// Judgement kinds a hit can be scored as.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Judgement {
    Miss,
    Meh,
    Ok,
    Good,
    Great,
    Perfect,
}

/// A mod applied to a score. Only the rate setting is meaningful to this
/// service; all other mod settings travel through untouched inside the
/// original payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreMod {
    pub acronym: String,
    /// Explicit rate override (e.g. DT at 1.4x). When absent the acronym's
    /// default rate applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
}

impl ScoreMod {
    pub fn new(acronym: impl Into<String>) -> Self {
        Self {
            acronym: acronym.into(),
            rate: None,
        }
    }

    pub fn with_rate(acronym: impl Into<String>, rate: f64) -> Self {
        Self {
            acronym: acronym.into(),
            rate: Some(rate),
        }
    }
}

/// Immutable record of a single play, as delivered over the queue.
///
/// `id` is the monotonically increasing unique identifier the pipeline
/// dedups on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreEvent {
    pub id: u64,
    pub user_id: u64,
    pub beatmap_id: u64,
    pub beatmap_set_id: u64,
    pub ruleset: Ruleset,
    #[serde(default)]
    pub mods: Vec<ScoreMod>,
    /// Achieved judgement counts.
    #[serde(default)]
    pub statistics: HashMap<Judgement, u32>,
    /// Maximum attainable judgement counts for the play.
    #[serde(default)]
    pub maximum_statistics: HashMap<Judgement, u32>,
    pub total_score: u64,
    pub rank: ScoreRank,
    pub passed: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ScoreEvent {
    /// Total number of achieved hits across all judgements.
    pub fn total_hits(&self) -> u64 {
        self.statistics.values().map(|c| *c as u64).sum()
    }

    /// Total number of attainable hits across all judgements.
    pub fn maximum_hits(&self) -> u64 {
        self.maximum_statistics.values().map(|c| *c as u64).sum()
    }

    /// Fraction of attainable hits the player actually hit, or `None` when
    /// the play has no attainable hits recorded.
    pub fn hit_ratio(&self) -> Option<f64> {
        let maximum = self.maximum_hits();
        if maximum == 0 {
            return None;
        }
        Some(self.total_hits() as f64 / maximum as f64)
    }
}
