// Event processing pipeline core
//
// This module owns the contract every statistic processor implements, the
// version bookkeeping that makes at-least-once delivery safe, and the
// pipeline that coordinates them.

pub use errors::ProcessingError;
pub use models::{
    AggregateDelta, BestScoreRecord, ProcessHistory, ScoreContext, UnitOfWork,
    UserStatisticsAggregate,
};
pub use pipeline::{PipelineBuilder, ProcessOutcome, ScoreStatisticsPipeline};
pub use repository::{InMemoryStatsRepository, PostgresStatsRepository, StatsRepository};

mod errors;
mod models;
mod pipeline;
mod repository;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use crate::beatmaps::BeatmapLookup;
use crate::score::ScoreEvent;

/// What a single processor wants to happen as a result of one apply or
/// revert: an aggregate delta, plus (on apply) the data it will need to
/// undo itself later.
#[derive(Debug, Default)]
pub struct ProcessorOutput {
    pub delta: AggregateDelta,
    /// Stored in [`ProcessHistory`] under the processor's name; handed back
    /// verbatim on revert. `None` when the processor can invert from the
    /// event alone.
    pub revert: Option<serde_json::Value>,
}

impl ProcessorOutput {
    pub fn delta(delta: AggregateDelta) -> Self {
        Self {
            delta,
            revert: None,
        }
    }
}

/// Read access to collaborator state during one unit of work.
///
/// Best-score reads go through here rather than straight to the repository:
/// replacements staged earlier in the same unit of work (including a revert
/// that precedes a reapply) must be visible to later processors even though
/// nothing has been committed yet.
pub struct ProcessorContext {
    beatmaps: Arc<dyn BeatmapLookup>,
    stats: Arc<dyn StatsRepository>,
    staged_best: AsyncMutex<HashMap<ScoreContext, Option<BestScoreRecord>>>,
}

impl ProcessorContext {
    pub fn new(beatmaps: Arc<dyn BeatmapLookup>, stats: Arc<dyn StatsRepository>) -> Self {
        Self {
            beatmaps,
            stats,
            staged_best: AsyncMutex::new(HashMap::new()),
        }
    }

    pub fn beatmaps(&self) -> &dyn BeatmapLookup {
        self.beatmaps.as_ref()
    }

    /// The best score for a context as this unit of work currently sees it:
    /// a staged replacement if one exists, the committed record otherwise.
    pub async fn best_score(
        &self,
        context: &ScoreContext,
    ) -> Result<Option<BestScoreRecord>, ProcessingError> {
        if let Some(staged) = self.staged_best.lock().await.get(context) {
            return Ok(staged.clone());
        }
        self.stats.fetch_best_score(context).await
    }

    /// Stages a best-score replacement for commit at the end of the unit of
    /// work. `None` stages a removal.
    pub async fn stage_best_score(&self, context: ScoreContext, record: Option<BestScoreRecord>) {
        self.staged_best.lock().await.insert(context, record);
    }

    /// Drains the staged replacements into a unit of work.
    pub(crate) async fn take_staged_best(
        &self,
    ) -> HashMap<ScoreContext, Option<BestScoreRecord>> {
        std::mem::take(&mut *self.staged_best.lock().await)
    }
}

/// The contract every statistic computation implements.
///
/// Both methods must be deterministic given identical inputs: no wall-clock
/// reads, no lookups beyond the context handles. `revert` must be the exact
/// inverse of `apply` for every reachable aggregate state, using the stored
/// revert payload wherever recomputing from the event could drift.
#[async_trait]
pub trait StatProcessor: Send + Sync {
    /// Stable name, used as the revert-data key in [`ProcessHistory`].
    fn name(&self) -> &'static str;

    async fn apply(
        &self,
        event: &ScoreEvent,
        aggregate: &UserStatisticsAggregate,
        ctx: &ProcessorContext,
    ) -> Result<ProcessorOutput, ProcessingError>;

    async fn revert(
        &self,
        event: &ScoreEvent,
        aggregate: &UserStatisticsAggregate,
        revert: Option<&serde_json::Value>,
        ctx: &ProcessorContext,
    ) -> Result<ProcessorOutput, ProcessingError>;
}
