// Score event data model
//
// A ScoreEvent is the immutable input to the processing pipeline. It is
// produced externally (by the score submission service) and delivered over
// the queue; nothing in this crate ever mutates one.

pub use models::{Judgement, Ruleset, ScoreEvent, ScoreMod, ScoreRank};
pub use mods::effective_rate;

mod models;
mod mods;
