use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{ScoreEnvelope, ScoreQueue};
use crate::processing::ScoreStatisticsPipeline;

/// Configuration for the consumer worker pool.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Number of concurrent workers pulling from the queue.
    pub workers: usize,
    /// Pause before requeueing after a transient store failure, so a store
    /// outage does not spin the queue.
    pub requeue_delay: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            requeue_delay: Duration::from_millis(500),
        }
    }
}

/// Pulls envelopes off the transport and runs them through the pipeline.
///
/// Malformed payloads are dropped with a dead-letter count (the transport
/// collaborator owns the real dead-letter queue); transient store failures
/// requeue the envelope; rule violations are logged and dropped so one
/// poisoned event cannot wedge the queue.
pub struct ScoreConsumer {
    queue: Arc<dyn ScoreQueue>,
    pipeline: Arc<ScoreStatisticsPipeline>,
    config: ConsumerConfig,
    dead_lettered: Arc<AtomicU64>,
}

impl ScoreConsumer {
    pub fn new(
        queue: Arc<dyn ScoreQueue>,
        pipeline: Arc<ScoreStatisticsPipeline>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            queue,
            pipeline,
            config,
            dead_lettered: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn dead_lettered(&self) -> u64 {
        self.dead_lettered.load(Ordering::Relaxed)
    }

    /// Runs the worker pool until the queue shuts down.
    pub async fn run(&self) {
        info!(workers = self.config.workers, "Starting score consumer");

        let workers = (0..self.config.workers).map(|worker| {
            let queue = self.queue.clone();
            let pipeline = self.pipeline.clone();
            let dead_lettered = self.dead_lettered.clone();
            let requeue_delay = self.config.requeue_delay;

            tokio::spawn(async move {
                while let Some(envelope) = queue.poll().await {
                    Self::handle_delivery(
                        &queue,
                        &pipeline,
                        &dead_lettered,
                        requeue_delay,
                        envelope,
                    )
                    .await;
                }
                debug!(worker, "Queue closed, worker stopping");
            })
        });

        join_all(workers).await;
        info!("Score consumer stopped");
    }

    async fn handle_delivery(
        queue: &Arc<dyn ScoreQueue>,
        pipeline: &Arc<ScoreStatisticsPipeline>,
        dead_lettered: &AtomicU64,
        requeue_delay: Duration,
        envelope: ScoreEnvelope,
    ) {
        let delivery_id = envelope.delivery_id;

        let event = match envelope.decode() {
            Ok(event) => event,
            Err(e) => {
                error!(%delivery_id, error = %e, "Dead-lettering malformed payload");
                dead_lettered.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        match pipeline.process(&event).await {
            Ok(outcome) => {
                debug!(%delivery_id, score_id = event.id, ?outcome, "Delivery handled");
            }
            Err(e) if e.is_transient() => {
                warn!(%delivery_id, score_id = event.id, error = %e, "Transient failure, requeueing");
                tokio::time::sleep(requeue_delay).await;
                if queue.requeue(envelope).await.is_err() {
                    error!(%delivery_id, "Queue closed while requeueing; delivery lost");
                }
            }
            Err(e) => {
                error!(%delivery_id, score_id = event.id, error = %e, "Dropping unprocessable event");
                dead_lettered.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beatmaps::InMemoryBeatmapLookup;
    use crate::processing::{InMemoryStatsRepository, StatsRepository};
    use crate::queue::InMemoryScoreQueue;
    use crate::score::{Judgement, Ruleset, ScoreEvent, ScoreRank};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::collections::HashMap;

    fn event(id: u64) -> ScoreEvent {
        let started = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        ScoreEvent {
            id,
            user_id: 1,
            beatmap_id: 1,
            beatmap_set_id: 1,
            ruleset: Ruleset::Osu,
            mods: vec![],
            statistics: HashMap::from([(Judgement::Great, 100)]),
            maximum_statistics: HashMap::from([(Judgement::Great, 100)]),
            total_score: 600_000,
            rank: ScoreRank::A,
            passed: true,
            started_at: Some(started),
            ended_at: Some(started + ChronoDuration::seconds(120)),
        }
    }

    #[tokio::test]
    async fn consumes_until_queue_closes() {
        let repository = Arc::new(InMemoryStatsRepository::new());
        let beatmaps = Arc::new(InMemoryBeatmapLookup::new());
        beatmaps.insert_length(1, 158.0);
        let pipeline = Arc::new(
            ScoreStatisticsPipeline::builder(repository.clone(), beatmaps.clone()).build(),
        );

        let queue = Arc::new(InMemoryScoreQueue::new());
        for id in 100..105 {
            queue
                .publish(ScoreEnvelope::for_event(&event(id)).unwrap())
                .await
                .unwrap();
        }

        let consumer = ScoreConsumer::new(
            queue.clone(),
            pipeline.clone(),
            ConsumerConfig {
                workers: 2,
                requeue_delay: Duration::from_millis(1),
            },
        );

        // Closing after the publishes lets the workers drain and stop.
        queue.close();
        consumer.run().await;

        let aggregate = repository.fetch_aggregate(1, Ruleset::Osu).await.unwrap();
        assert_eq!(aggregate.playcount, 5);
        assert_eq!(pipeline.events_applied(), 5);
        assert_eq!(consumer.dead_lettered(), 0);
    }

    #[tokio::test]
    async fn malformed_payloads_are_dead_lettered() {
        let repository = Arc::new(InMemoryStatsRepository::new());
        let beatmaps = Arc::new(InMemoryBeatmapLookup::new());
        let pipeline =
            Arc::new(ScoreStatisticsPipeline::builder(repository.clone(), beatmaps).build());

        let queue = Arc::new(InMemoryScoreQueue::new());
        queue
            .publish(ScoreEnvelope::new(serde_json::json!({"garbage": true})))
            .await
            .unwrap();

        let consumer = ScoreConsumer::new(
            queue.clone(),
            pipeline,
            ConsumerConfig {
                workers: 1,
                requeue_delay: Duration::from_millis(1),
            },
        );

        queue.close();
        consumer.run().await;

        assert_eq!(consumer.dead_lettered(), 1);
    }
}
