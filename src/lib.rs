// Library crate for the score statistics consumer
// This file exposes the public API for integration tests

pub mod beatmaps;
pub mod medals;
pub mod monitoring;
pub mod processing;
pub mod processors;
pub mod queue;
pub mod score;

// Re-export commonly used types for easier access in tests
pub use processing::{
    InMemoryStatsRepository, ProcessOutcome, ProcessingError, ScoreStatisticsPipeline,
    StatProcessor, StatsRepository,
};
pub use queue::{InMemoryScoreQueue, ScoreConsumer, ScoreEnvelope, ScoreQueue};
pub use score::{Judgement, Ruleset, ScoreEvent, ScoreMod, ScoreRank};
