use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{debug, error, info, instrument};

use super::models::{AggregateDelta, ProcessHistory, UnitOfWork};
use super::repository::StatsRepository;
use super::{ProcessingError, ProcessorContext, StatProcessor};
use crate::beatmaps::BeatmapLookup;
use crate::medals::MedalAwardProcessor;
use crate::processors::{
    HitStatisticsProcessor, PlayCountProcessor, PlayTimeProcessor, RankCountProcessor,
};
use crate::score::ScoreEvent;

/// Rule version stamped onto newly processed scores. Bump this whenever any
/// processor's semantics change; already-processed scores are then reverted
/// and reapplied on their next delivery.
pub const CURRENT_RULE_VERSION: u32 = 1;

/// What `process` did with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// First application of this score.
    Applied,
    /// The score had been processed under an older rule version; its prior
    /// effect was reverted and it was applied again under current rules.
    Reprocessed,
    /// Already processed under the current rule version. No effects.
    Skipped,
}

/// The consumer-facing pipeline: dedup, versioned apply/revert, dispatch to
/// every registered processor inside one atomic unit of work, then the
/// medal stage against the freshly committed aggregate.
pub struct ScoreStatisticsPipeline {
    processors: Vec<Arc<dyn StatProcessor>>,
    medal_processor: Option<Arc<MedalAwardProcessor>>,
    repository: Arc<dyn StatsRepository>,
    beatmaps: Arc<dyn BeatmapLookup>,
    rule_version: u32,
    // Dedup boundary: concurrent deliveries of the same score id serialize
    // on the per-id mutex; distinct ids proceed in parallel. Entries are
    // dropped once the last holder releases them.
    score_locks: Arc<RwLock<HashMap<u64, Arc<AsyncMutex<()>>>>>,
    events_applied: AtomicU64,
}

impl ScoreStatisticsPipeline {
    pub fn builder(
        repository: Arc<dyn StatsRepository>,
        beatmaps: Arc<dyn BeatmapLookup>,
    ) -> PipelineBuilder {
        PipelineBuilder::new(repository, beatmaps)
    }

    /// Number of events fully applied (or reprocessed) since this process
    /// started. Resets on restart.
    pub fn events_applied(&self) -> u64 {
        self.events_applied.load(Ordering::Relaxed)
    }

    pub fn rule_version(&self) -> u32 {
        self.rule_version
    }

    /// Processes one delivered score event.
    ///
    /// Safe to call any number of times for the same event: the first
    /// delivery applies it, later deliveries under the same rule version
    /// are no-ops, and deliveries after a rule-version bump revert and
    /// reapply it.
    #[instrument(skip(self, event), fields(score_id = event.id, user_id = event.user_id))]
    pub async fn process(&self, event: &ScoreEvent) -> Result<ProcessOutcome, ProcessingError> {
        let lock = self.score_lock(event.id).await;
        let result = {
            let _guard = lock.lock().await;
            self.process_deduped(event).await
        };
        self.release_score_lock(event.id, &lock).await;
        result
    }

    async fn process_deduped(&self, event: &ScoreEvent) -> Result<ProcessOutcome, ProcessingError> {
        let history = self.repository.fetch_history(event.id).await?;
        let outcome = match &history {
            Some(history) if history.processed_version == self.rule_version => {
                debug!(
                    version = history.processed_version,
                    "Score already processed under current rules"
                );
                return Ok(ProcessOutcome::Skipped);
            }
            Some(history) => {
                debug!(
                    from_version = history.processed_version,
                    to_version = self.rule_version,
                    "Reprocessing score under new rules"
                );
                self.run_unit_of_work(event, Some(history)).await?;
                ProcessOutcome::Reprocessed
            }
            None => {
                self.run_unit_of_work(event, None).await?;
                ProcessOutcome::Applied
            }
        };

        self.events_applied.fetch_add(1, Ordering::Relaxed);
        self.run_medal_stage(event).await;

        Ok(outcome)
    }

    /// Runs revert (when reprocessing) and apply across all processors and
    /// commits the merged result atomically. Any processor error aborts
    /// before commit, leaving no partial effects.
    async fn run_unit_of_work(
        &self,
        event: &ScoreEvent,
        previous: Option<&ProcessHistory>,
    ) -> Result<(), ProcessingError> {
        let ctx = ProcessorContext::new(self.beatmaps.clone(), self.repository.clone());
        let aggregate = self
            .repository
            .fetch_aggregate(event.user_id, event.ruleset)
            .await?;

        let mut delta = AggregateDelta::default();

        if let Some(history) = previous {
            // Undo in reverse registration order, the inverse of apply.
            for processor in self.processors.iter().rev() {
                let output = processor
                    .revert(
                        event,
                        &aggregate,
                        history.reverts.get(processor.name()),
                        &ctx,
                    )
                    .await?;
                delta.merge(output.delta);
            }
        }

        let mut reverts = HashMap::new();
        for processor in &self.processors {
            let output = processor.apply(event, &aggregate, &ctx).await?;
            delta.merge(output.delta);
            if let Some(revert) = output.revert {
                reverts.insert(processor.name().to_string(), revert);
            }
        }

        let unit = UnitOfWork {
            history: ProcessHistory {
                score_id: event.id,
                processed_version: self.rule_version,
                reverts,
            },
            user_id: event.user_id,
            ruleset: event.ruleset,
            delta,
            best_scores: ctx.take_staged_best().await,
        };

        self.repository.commit(unit).await
    }

    /// Medal evaluation runs after the numeric commit so conditions can read
    /// the just-updated aggregate. Failures are logged, never propagated:
    /// awards are idempotent and retried on the next qualifying event, and
    /// the committed aggregates must not be redelivered because of them.
    async fn run_medal_stage(&self, event: &ScoreEvent) {
        let Some(medal_processor) = &self.medal_processor else {
            return;
        };

        match self
            .repository
            .fetch_aggregate(event.user_id, event.ruleset)
            .await
        {
            Ok(aggregate) => {
                if let Err(e) = medal_processor.evaluate(event, &aggregate).await {
                    error!(error = %e, score_id = event.id, "Medal evaluation failed");
                }
            }
            Err(e) => {
                error!(error = %e, score_id = event.id, "Failed to load aggregate for medal stage");
            }
        }
    }

    async fn score_lock(&self, score_id: u64) -> Arc<AsyncMutex<()>> {
        {
            let guard = self.score_locks.read().await;
            if let Some(lock) = guard.get(&score_id) {
                return lock.clone();
            }
        }

        let mut guard = self.score_locks.write().await;
        guard
            .entry(score_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drops the map entry once no other delivery holds a handle to it.
    /// Holding the map's write lock here means no concurrent `score_lock`
    /// can clone the entry between the count check and the removal.
    async fn release_score_lock(&self, score_id: u64, lock: &Arc<AsyncMutex<()>>) {
        let mut guard = self.score_locks.write().await;
        // Two handles: the map's and ours.
        if Arc::strong_count(lock) == 2 {
            guard.remove(&score_id);
        }
    }
}

pub struct PipelineBuilder {
    processors: Vec<Arc<dyn StatProcessor>>,
    medal_processor: Option<Arc<MedalAwardProcessor>>,
    repository: Arc<dyn StatsRepository>,
    beatmaps: Arc<dyn BeatmapLookup>,
    rule_version: u32,
}

impl PipelineBuilder {
    fn new(repository: Arc<dyn StatsRepository>, beatmaps: Arc<dyn BeatmapLookup>) -> Self {
        Self {
            processors: vec![
                Arc::new(PlayCountProcessor),
                Arc::new(HitStatisticsProcessor),
                Arc::new(PlayTimeProcessor::default()),
                Arc::new(RankCountProcessor),
            ],
            medal_processor: None,
            repository,
            beatmaps,
            rule_version: CURRENT_RULE_VERSION,
        }
    }

    /// Registers an additional processor after the defaults. Registration
    /// order is apply order; revert runs in the reverse.
    pub fn with_processor(mut self, processor: Arc<dyn StatProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    /// Replaces the default processor set entirely.
    pub fn with_processors(mut self, processors: Vec<Arc<dyn StatProcessor>>) -> Self {
        self.processors = processors;
        self
    }

    pub fn with_medal_processor(mut self, medal_processor: Arc<MedalAwardProcessor>) -> Self {
        self.medal_processor = Some(medal_processor);
        self
    }

    pub fn with_rule_version(mut self, rule_version: u32) -> Self {
        self.rule_version = rule_version;
        self
    }

    pub fn build(self) -> ScoreStatisticsPipeline {
        info!(
            processor_count = self.processors.len(),
            rule_version = self.rule_version,
            "Building score statistics pipeline"
        );
        ScoreStatisticsPipeline {
            processors: self.processors,
            medal_processor: self.medal_processor,
            repository: self.repository,
            beatmaps: self.beatmaps,
            rule_version: self.rule_version,
            score_locks: Arc::new(RwLock::new(HashMap::new())),
            events_applied: AtomicU64::new(0),
        }
    }
}
