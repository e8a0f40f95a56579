// Medal awarding
//
// Medals are evaluated after the numeric processors commit, against the
// freshly updated aggregate. An award is a one-way ratchet: once a user has
// a medal it is never revoked, and re-qualifying is a no-op.

pub use conditions::{MedalCondition, PackCompletionCondition, StreakCondition};
pub use models::{MedalAwarded, MedalDefinition};
pub use processor::MedalAwardProcessor;
pub use repository::{InMemoryMedalRepository, MedalRepository};

mod conditions;
mod models;
mod processor;
mod repository;
