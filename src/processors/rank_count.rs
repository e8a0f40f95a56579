use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::processing::{
    AggregateDelta, BestScoreRecord, ProcessingError, ProcessorContext, ProcessorOutput,
    ScoreContext, StatProcessor, UserStatisticsAggregate,
};
use crate::score::{ScoreEvent, ScoreRank};

/// Maintains the per-(user, beatmap, ruleset) best score and the rank-count
/// buckets derived from it.
///
/// A score counts toward a rank bucket only while it is the best score for
/// its context, and only when its rank is A or above. A new score displaces
/// the current best when its total score is higher, with ties going to the
/// most recently processed score.
pub struct RankCountProcessor;

/// The superseded best score (if any), so revert can reinstate it exactly.
#[derive(Debug, Serialize, Deserialize)]
struct RankCountRevert {
    displaced: bool,
    superseded: Option<BestScoreRecord>,
}

fn bucket_delta(changes: &[(ScoreRank, i64)]) -> AggregateDelta {
    let mut rank_counts: HashMap<ScoreRank, i64> = HashMap::new();
    for (rank, amount) in changes {
        if rank.is_tracked() {
            *rank_counts.entry(*rank).or_default() += amount;
        }
    }
    AggregateDelta {
        rank_counts,
        ..AggregateDelta::default()
    }
}

#[async_trait]
impl StatProcessor for RankCountProcessor {
    fn name(&self) -> &'static str {
        "rank_count"
    }

    async fn apply(
        &self,
        event: &ScoreEvent,
        _aggregate: &UserStatisticsAggregate,
        ctx: &ProcessorContext,
    ) -> Result<ProcessorOutput, ProcessingError> {
        let context = ScoreContext::of(event);
        let current = ctx.best_score(&context).await?;

        // Equal scores displace: the newest processed score wins ties.
        let displaces = current
            .as_ref()
            .map_or(true, |best| event.total_score >= best.total_score);

        if !displaces {
            let revert = serde_json::to_value(RankCountRevert {
                displaced: false,
                superseded: None,
            })
            .map_err(|e| ProcessingError::Store(e.to_string()))?;
            return Ok(ProcessorOutput {
                delta: AggregateDelta::default(),
                revert: Some(revert),
            });
        }

        ctx.stage_best_score(
            context,
            Some(BestScoreRecord {
                score_id: event.id,
                total_score: event.total_score,
                rank: event.rank,
            }),
        )
        .await;

        let mut changes = vec![(event.rank, 1)];
        if let Some(previous) = &current {
            changes.push((previous.rank, -1));
        }

        let revert = serde_json::to_value(RankCountRevert {
            displaced: true,
            superseded: current,
        })
        .map_err(|e| ProcessingError::Store(e.to_string()))?;

        Ok(ProcessorOutput {
            delta: bucket_delta(&changes),
            revert: Some(revert),
        })
    }

    async fn revert(
        &self,
        event: &ScoreEvent,
        _aggregate: &UserStatisticsAggregate,
        revert: Option<&serde_json::Value>,
        ctx: &ProcessorContext,
    ) -> Result<ProcessorOutput, ProcessingError> {
        let stored: RankCountRevert = match revert {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| ProcessingError::Store(format!("corrupt revert data: {e}")))?,
            // Processed before rank tracking existed; nothing to undo.
            None => return Ok(ProcessorOutput::default()),
        };

        if !stored.displaced {
            return Ok(ProcessorOutput::default());
        }

        // Deliveries carry no ordering, so a reprocessed score may have
        // been superseded since it was applied. Its displacement was
        // already undone by whichever score superseded it; undoing it
        // again would clobber the current best.
        let context = ScoreContext::of(event);
        let current = ctx.best_score(&context).await?;
        if current.as_ref().map(|best| best.score_id) != Some(event.id) {
            return Ok(ProcessorOutput::default());
        }

        let mut changes = vec![(event.rank, -1)];
        if let Some(previous) = &stored.superseded {
            changes.push((previous.rank, 1));
        }

        ctx.stage_best_score(context, stored.superseded).await;

        Ok(ProcessorOutput::delta(bucket_delta(&changes)))
    }
}
