use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ProcessingError;
use crate::score::{Judgement, Ruleset, ScoreEvent, ScoreRank};

/// Version bookkeeping for a single score event. One row per score id,
/// created on first successful processing, updated in place on every
/// reprocess, never deleted while the score exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessHistory {
    pub score_id: u64,
    pub processed_version: u32,
    /// Per-processor revert payloads, keyed by processor name. Each
    /// processor stores whatever it needs to undo its own effect exactly.
    #[serde(default)]
    pub reverts: HashMap<String, serde_json::Value>,
}

/// Per-user, per-ruleset aggregate statistics. Mutated exclusively through
/// [`AggregateDelta`]s applied by the stats repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatisticsAggregate {
    pub user_id: u64,
    pub ruleset: Ruleset,
    pub playcount: u64,
    pub seconds_played: u64,
    /// Running totals per judgement kind.
    #[serde(default)]
    pub hit_totals: HashMap<Judgement, u64>,
    /// Rank-count buckets. Only A and above are ever present.
    #[serde(default)]
    pub rank_counts: HashMap<ScoreRank, u64>,
}

impl UserStatisticsAggregate {
    pub fn new(user_id: u64, ruleset: Ruleset) -> Self {
        Self {
            user_id,
            ruleset,
            playcount: 0,
            seconds_played: 0,
            hit_totals: HashMap::new(),
            rank_counts: HashMap::new(),
        }
    }

    pub fn rank_count(&self, rank: ScoreRank) -> u64 {
        self.rank_counts.get(&rank).copied().unwrap_or_default()
    }

    /// Applies a delta, failing with [`ProcessingError::RuleViolation`] when
    /// any counter would go negative. Zeroed bucket entries are dropped so
    /// an untouched aggregate and a fully reverted one compare equal.
    pub fn apply_delta(&mut self, delta: &AggregateDelta) -> Result<(), ProcessingError> {
        self.playcount = checked_add("playcount", self.playcount, delta.playcount)?;
        self.seconds_played =
            checked_add("seconds_played", self.seconds_played, delta.seconds_played)?;

        for (judgement, amount) in &delta.hit_totals {
            let current = self.hit_totals.get(judgement).copied().unwrap_or_default();
            let updated = checked_add(&format!("hit_totals[{judgement}]"), current, *amount)?;
            if updated == 0 {
                self.hit_totals.remove(judgement);
            } else {
                self.hit_totals.insert(*judgement, updated);
            }
        }

        for (rank, amount) in &delta.rank_counts {
            let current = self.rank_counts.get(rank).copied().unwrap_or_default();
            let updated = checked_add(&format!("rank_counts[{rank}]"), current, *amount)?;
            if updated == 0 {
                self.rank_counts.remove(rank);
            } else {
                self.rank_counts.insert(*rank, updated);
            }
        }

        Ok(())
    }
}

fn checked_add(field: &str, current: u64, amount: i64) -> Result<u64, ProcessingError> {
    let updated = current as i64 + amount;
    if updated < 0 {
        return Err(ProcessingError::RuleViolation(format!(
            "{field} would become negative ({current} {amount:+})"
        )));
    }
    Ok(updated as u64)
}

/// The set of increments a processor wants applied to a user aggregate.
/// Deltas merge additively, so the pipeline can collect one per processor
/// and commit the sum atomically.
#[derive(Debug, Clone, Default)]
pub struct AggregateDelta {
    pub playcount: i64,
    pub seconds_played: i64,
    pub hit_totals: HashMap<Judgement, i64>,
    pub rank_counts: HashMap<ScoreRank, i64>,
}

impl AggregateDelta {
    pub fn is_empty(&self) -> bool {
        self.playcount == 0
            && self.seconds_played == 0
            && self.hit_totals.values().all(|v| *v == 0)
            && self.rank_counts.values().all(|v| *v == 0)
    }

    pub fn merge(&mut self, other: AggregateDelta) {
        self.playcount += other.playcount;
        self.seconds_played += other.seconds_played;
        for (judgement, amount) in other.hit_totals {
            *self.hit_totals.entry(judgement).or_default() += amount;
        }
        for (rank, amount) in other.rank_counts {
            *self.rank_counts.entry(rank).or_default() += amount;
        }
    }
}

/// Key for best-score tracking: one record at most per (user, beatmap,
/// ruleset) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScoreContext {
    pub user_id: u64,
    pub beatmap_id: u64,
    pub ruleset: Ruleset,
}

impl ScoreContext {
    pub fn of(event: &ScoreEvent) -> Self {
        Self {
            user_id: event.user_id,
            beatmap_id: event.beatmap_id,
            ruleset: event.ruleset,
        }
    }
}

/// The currently counting score for a context: always the highest
/// `total_score` among processed, non-reverted scores, ties broken by
/// most-recently-processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestScoreRecord {
    pub score_id: u64,
    pub total_score: u64,
    pub rank: ScoreRank,
}

/// Everything one `process` call wants persisted, committed atomically by
/// the repository: either all of it lands or none of it does.
#[derive(Debug, Clone)]
pub struct UnitOfWork {
    pub history: ProcessHistory,
    pub user_id: u64,
    pub ruleset: Ruleset,
    pub delta: AggregateDelta,
    /// Best-score replacements staged during this unit of work. `None`
    /// removes the record for the context.
    pub best_scores: HashMap<ScoreContext, Option<BestScoreRecord>>,
}
