pub mod builders;
pub mod setup;

// Re-export main utilities for use by test files
pub use builders::ScoreEventBuilder;
#[allow(unused_imports)]
pub use setup::{TestSetup, TestSetupBuilder};
