use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::processing::{
    AggregateDelta, ProcessingError, ProcessorContext, ProcessorOutput, StatProcessor,
    UserStatisticsAggregate,
};
use crate::score::{effective_rate, ScoreEvent};

/// Accumulates played seconds.
///
/// Passed plays contribute their full wall duration. Failed plays only
/// count when they were "substantial": enough score and enough of the
/// map's hits attempted; a short bail-out contributes nothing. Either way
/// the contribution is capped at the beatmap's nominal length adjusted for
/// the effective mod rate, so idling on the results screen cannot inflate
/// play time.
///
/// The exact admission thresholds are tunable; the defaults reflect
/// observed service behavior (ratio threshold near 10%).
pub struct PlayTimeProcessor {
    pub min_total_score: u64,
    pub min_hit_ratio: f64,
}

impl Default for PlayTimeProcessor {
    fn default() -> Self {
        Self {
            min_total_score: 5_000,
            min_hit_ratio: 0.10,
        }
    }
}

/// Contributed seconds are stored at apply time and subtracted verbatim on
/// revert. Recomputing from the event would reproduce them today, but a
/// future rules change must still be able to undo the old contribution
/// exactly.
#[derive(Debug, Serialize, Deserialize)]
struct PlayTimeRevert {
    seconds: i64,
}

impl PlayTimeProcessor {
    fn raw_duration_seconds(&self, event: &ScoreEvent) -> Result<f64, ProcessingError> {
        match (event.started_at, event.ended_at) {
            (Some(started), Some(ended)) if ended >= started => {
                Ok((ended - started).num_milliseconds() as f64 / 1000.0)
            }
            (Some(_), Some(_)) => Err(ProcessingError::MalformedEvent(format!(
                "score {} ended before it started",
                event.id
            ))),
            _ => Err(ProcessingError::MalformedEvent(format!(
                "score {} is missing timestamps",
                event.id
            ))),
        }
    }

    /// Whether a failed play still counts toward play time.
    fn is_substantial(&self, event: &ScoreEvent) -> bool {
        if event.total_score < self.min_total_score {
            return false;
        }
        match event.hit_ratio() {
            Some(ratio) => ratio >= self.min_hit_ratio,
            None => false,
        }
    }

    async fn contributed_seconds(
        &self,
        event: &ScoreEvent,
        ctx: &ProcessorContext,
    ) -> Result<i64, ProcessingError> {
        let raw = self.raw_duration_seconds(event)?;

        let eligible = if event.passed || self.is_substantial(event) {
            raw
        } else {
            0.0
        };

        let length = ctx.beatmaps().length_seconds(event.beatmap_id).await?;
        let cap = length / effective_rate(&event.mods);

        Ok(eligible.min(cap).floor().max(0.0) as i64)
    }
}

#[async_trait]
impl StatProcessor for PlayTimeProcessor {
    fn name(&self) -> &'static str {
        "play_time"
    }

    async fn apply(
        &self,
        event: &ScoreEvent,
        _aggregate: &UserStatisticsAggregate,
        ctx: &ProcessorContext,
    ) -> Result<ProcessorOutput, ProcessingError> {
        let seconds = self.contributed_seconds(event, ctx).await?;

        let revert = serde_json::to_value(PlayTimeRevert { seconds })
            .map_err(|e| ProcessingError::Store(e.to_string()))?;

        Ok(ProcessorOutput {
            delta: AggregateDelta {
                seconds_played: seconds,
                ..AggregateDelta::default()
            },
            revert: Some(revert),
        })
    }

    async fn revert(
        &self,
        _event: &ScoreEvent,
        _aggregate: &UserStatisticsAggregate,
        revert: Option<&serde_json::Value>,
        _ctx: &ProcessorContext,
    ) -> Result<ProcessorOutput, ProcessingError> {
        // A score processed before this processor existed contributed
        // nothing, so there is nothing to undo.
        let seconds = match revert {
            Some(value) => {
                let stored: PlayTimeRevert = serde_json::from_value(value.clone())
                    .map_err(|e| ProcessingError::Store(format!("corrupt revert data: {e}")))?;
                stored.seconds
            }
            None => 0,
        };

        Ok(ProcessorOutput::delta(AggregateDelta {
            seconds_played: -seconds,
            ..AggregateDelta::default()
        }))
    }
}
