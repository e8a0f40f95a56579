#![allow(dead_code)] // Test utilities may not all be used in every test

use std::sync::Arc;
use tokio::sync::mpsc;

use scorestats::beatmaps::InMemoryBeatmapLookup;
use scorestats::medals::{
    InMemoryMedalRepository, MedalAwardProcessor, MedalAwarded, MedalDefinition,
};
use scorestats::processing::{InMemoryStatsRepository, ScoreStatisticsPipeline};

pub struct TestSetup {
    pub repository: Arc<InMemoryStatsRepository>,
    pub beatmaps: Arc<InMemoryBeatmapLookup>,
    pub medal_repository: Arc<InMemoryMedalRepository>,
    pub medal_processor: Arc<MedalAwardProcessor>,
    pub pipeline: Arc<ScoreStatisticsPipeline>,
    pub medal_notifications: mpsc::UnboundedReceiver<MedalAwarded>,
}

impl TestSetup {
    /// A second pipeline over the same stores, running a different rule
    /// version. Used to exercise reprocessing.
    pub fn pipeline_with_version(&self, rule_version: u32) -> Arc<ScoreStatisticsPipeline> {
        Arc::new(
            ScoreStatisticsPipeline::builder(self.repository.clone(), self.beatmaps.clone())
                .with_rule_version(rule_version)
                .with_medal_processor(self.medal_processor.clone())
                .build(),
        )
    }
}

pub struct TestSetupBuilder {
    rule_version: u32,
    medals: Vec<MedalDefinition>,
    beatmap_lengths: Vec<(u64, f64)>,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            rule_version: 1,
            medals: vec![],
            beatmap_lengths: vec![(1, 158.0)],
        }
    }

    pub fn with_rule_version(mut self, rule_version: u32) -> Self {
        self.rule_version = rule_version;
        self
    }

    pub fn with_medal(mut self, medal: MedalDefinition) -> Self {
        self.medals.push(medal);
        self
    }

    pub fn with_beatmap_length(mut self, beatmap_id: u64, length_seconds: f64) -> Self {
        self.beatmap_lengths.push((beatmap_id, length_seconds));
        self
    }

    pub fn build(self) -> TestSetup {
        let repository = Arc::new(InMemoryStatsRepository::new());
        let beatmaps = Arc::new(InMemoryBeatmapLookup::new());
        for (beatmap_id, length) in &self.beatmap_lengths {
            beatmaps.insert_length(*beatmap_id, *length);
        }

        let medal_repository = Arc::new(InMemoryMedalRepository::new());
        let (medal_processor, medal_notifications) =
            MedalAwardProcessor::new(medal_repository.clone(), self.medals);
        let medal_processor = Arc::new(medal_processor);

        let pipeline = Arc::new(
            ScoreStatisticsPipeline::builder(repository.clone(), beatmaps.clone())
                .with_rule_version(self.rule_version)
                .with_medal_processor(medal_processor.clone())
                .build(),
        );

        TestSetup {
            repository,
            beatmaps,
            medal_repository,
            medal_processor,
            pipeline,
            medal_notifications,
        }
    }
}
