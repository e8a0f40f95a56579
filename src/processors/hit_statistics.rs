use async_trait::async_trait;
use std::collections::HashMap;

use crate::processing::{
    AggregateDelta, ProcessingError, ProcessorContext, ProcessorOutput, StatProcessor,
    UserStatisticsAggregate,
};
use crate::score::{Judgement, ScoreEvent};

/// Accumulates per-judgement hit counts into the user's running totals.
pub struct HitStatisticsProcessor;

fn hit_delta(event: &ScoreEvent, sign: i64) -> HashMap<Judgement, i64> {
    event
        .statistics
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(judgement, count)| (*judgement, sign * *count as i64))
        .collect()
}

#[async_trait]
impl StatProcessor for HitStatisticsProcessor {
    fn name(&self) -> &'static str {
        "hit_statistics"
    }

    async fn apply(
        &self,
        event: &ScoreEvent,
        _aggregate: &UserStatisticsAggregate,
        _ctx: &ProcessorContext,
    ) -> Result<ProcessorOutput, ProcessingError> {
        Ok(ProcessorOutput::delta(AggregateDelta {
            hit_totals: hit_delta(event, 1),
            ..AggregateDelta::default()
        }))
    }

    async fn revert(
        &self,
        event: &ScoreEvent,
        aggregate: &UserStatisticsAggregate,
        _revert: Option<&serde_json::Value>,
        _ctx: &ProcessorContext,
    ) -> Result<ProcessorOutput, ProcessingError> {
        for (judgement, count) in &event.statistics {
            let total = aggregate.hit_totals.get(judgement).copied().unwrap_or(0);
            if total < *count as u64 {
                return Err(ProcessingError::RuleViolation(format!(
                    "cannot revert {count} {judgement} hits from a total of {total}"
                )));
            }
        }

        Ok(ProcessorOutput::delta(AggregateDelta {
            hit_totals: hit_delta(event, -1),
            ..AggregateDelta::default()
        }))
    }
}
