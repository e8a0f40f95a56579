// Beatmap metadata lookup
//
// The pipeline only needs one fact about a beatmap: its nominal length in
// seconds. The real metadata service sits behind this trait; the in-memory
// implementation serves development and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::processing::ProcessingError;

#[async_trait]
pub trait BeatmapLookup: Send + Sync {
    /// Nominal (unmodded) length of the beatmap in seconds.
    async fn length_seconds(&self, beatmap_id: u64) -> Result<f64, ProcessingError>;
}

#[derive(Default)]
pub struct InMemoryBeatmapLookup {
    lengths: Mutex<HashMap<u64, f64>>,
}

impl InMemoryBeatmapLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_length(&self, beatmap_id: u64, length_seconds: f64) {
        self.lengths
            .lock()
            .unwrap()
            .insert(beatmap_id, length_seconds);
    }
}

#[async_trait]
impl BeatmapLookup for InMemoryBeatmapLookup {
    async fn length_seconds(&self, beatmap_id: u64) -> Result<f64, ProcessingError> {
        self.lengths
            .lock()
            .unwrap()
            .get(&beatmap_id)
            .copied()
            .ok_or_else(|| {
                ProcessingError::Store(format!("unknown beatmap {beatmap_id}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_inserted_length() {
        let lookup = InMemoryBeatmapLookup::new();
        lookup.insert_length(42, 158.0);

        assert_eq!(lookup.length_seconds(42).await.unwrap(), 158.0);
    }

    #[tokio::test]
    async fn unknown_beatmap_is_a_store_error() {
        let lookup = InMemoryBeatmapLookup::new();

        let result = lookup.length_seconds(7).await;
        assert!(matches!(result, Err(ProcessingError::Store(_))));
    }
}
