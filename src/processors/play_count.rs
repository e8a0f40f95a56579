use async_trait::async_trait;

use crate::processing::{
    AggregateDelta, ProcessingError, ProcessorContext, ProcessorOutput, StatProcessor,
    UserStatisticsAggregate,
};
use crate::score::ScoreEvent;

/// Counts plays. The simplest processor: +1 on apply, -1 on revert, no
/// revert data needed.
pub struct PlayCountProcessor;

#[async_trait]
impl StatProcessor for PlayCountProcessor {
    fn name(&self) -> &'static str {
        "play_count"
    }

    async fn apply(
        &self,
        _event: &ScoreEvent,
        _aggregate: &UserStatisticsAggregate,
        _ctx: &ProcessorContext,
    ) -> Result<ProcessorOutput, ProcessingError> {
        Ok(ProcessorOutput::delta(AggregateDelta {
            playcount: 1,
            ..AggregateDelta::default()
        }))
    }

    async fn revert(
        &self,
        _event: &ScoreEvent,
        aggregate: &UserStatisticsAggregate,
        _revert: Option<&serde_json::Value>,
        _ctx: &ProcessorContext,
    ) -> Result<ProcessorOutput, ProcessingError> {
        if aggregate.playcount == 0 {
            return Err(ProcessingError::RuleViolation(
                "cannot revert a play from a zero playcount".into(),
            ));
        }

        Ok(ProcessorOutput::delta(AggregateDelta {
            playcount: -1,
            ..AggregateDelta::default()
        }))
    }
}
