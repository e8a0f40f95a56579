use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::processing::ProcessingError;
use crate::score::Ruleset;

/// Lookups and writes the medal stage needs: awarded medals, pack
/// membership, per-user beatmap-set coverage, and streak counters.
#[async_trait]
pub trait MedalRepository: Send + Sync {
    async fn is_awarded(&self, user_id: u64, medal_id: u32) -> Result<bool, ProcessingError>;

    /// Records an award. First-writer-wins: returns `true` only when the
    /// (user, medal) pair was newly inserted, so callers can notify exactly
    /// once no matter how many times evaluation runs.
    async fn record_award(
        &self,
        user_id: u64,
        medal_id: u32,
        score_id: u64,
    ) -> Result<bool, ProcessingError>;

    /// The beatmap-set ids belonging to a pack.
    async fn pack_beatmap_sets(&self, pack_id: u32) -> Result<Vec<u64>, ProcessingError>;

    /// Marks a beatmap set as cleared by the user in the given ruleset.
    async fn record_set_clear(
        &self,
        user_id: u64,
        ruleset: Ruleset,
        beatmap_set_id: u64,
    ) -> Result<(), ProcessingError>;

    /// The beatmap sets the user has cleared in the given ruleset.
    async fn cleared_beatmap_sets(
        &self,
        user_id: u64,
        ruleset: Ruleset,
    ) -> Result<HashSet<u64>, ProcessingError>;

    /// The user's best recorded daily streak.
    async fn best_streak(&self, user_id: u64) -> Result<u32, ProcessingError>;
}

#[derive(Default)]
struct InMemoryMedalState {
    awarded: HashMap<u64, HashSet<u32>>,
    packs: HashMap<u32, Vec<u64>>,
    cleared: HashMap<(u64, Ruleset), HashSet<u64>>,
    streaks: HashMap<u64, u32>,
}

/// In-memory implementation for development and tests, with seeding helpers
/// for packs and streak counters.
#[derive(Default)]
pub struct InMemoryMedalRepository {
    state: Arc<RwLock<InMemoryMedalState>>,
}

impl InMemoryMedalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_pack(&self, pack_id: u32, beatmap_set_ids: Vec<u64>) {
        self.state.write().await.packs.insert(pack_id, beatmap_set_ids);
    }

    pub async fn set_best_streak(&self, user_id: u64, streak: u32) {
        self.state.write().await.streaks.insert(user_id, streak);
    }

    pub async fn awarded_medals(&self, user_id: u64) -> HashSet<u32> {
        self.state
            .read()
            .await
            .awarded
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MedalRepository for InMemoryMedalRepository {
    async fn is_awarded(&self, user_id: u64, medal_id: u32) -> Result<bool, ProcessingError> {
        let state = self.state.read().await;
        Ok(state
            .awarded
            .get(&user_id)
            .is_some_and(|medals| medals.contains(&medal_id)))
    }

    async fn record_award(
        &self,
        user_id: u64,
        medal_id: u32,
        score_id: u64,
    ) -> Result<bool, ProcessingError> {
        let mut state = self.state.write().await;
        let newly_inserted = state.awarded.entry(user_id).or_default().insert(medal_id);
        if newly_inserted {
            debug!(user_id, medal_id, score_id, "Medal awarded");
        }
        Ok(newly_inserted)
    }

    async fn pack_beatmap_sets(&self, pack_id: u32) -> Result<Vec<u64>, ProcessingError> {
        let state = self.state.read().await;
        state
            .packs
            .get(&pack_id)
            .cloned()
            .ok_or_else(|| ProcessingError::Store(format!("unknown pack {pack_id}")))
    }

    async fn record_set_clear(
        &self,
        user_id: u64,
        ruleset: Ruleset,
        beatmap_set_id: u64,
    ) -> Result<(), ProcessingError> {
        let mut state = self.state.write().await;
        state
            .cleared
            .entry((user_id, ruleset))
            .or_default()
            .insert(beatmap_set_id);
        Ok(())
    }

    async fn cleared_beatmap_sets(
        &self,
        user_id: u64,
        ruleset: Ruleset,
    ) -> Result<HashSet<u64>, ProcessingError> {
        let state = self.state.read().await;
        Ok(state
            .cleared
            .get(&(user_id, ruleset))
            .cloned()
            .unwrap_or_default())
    }

    async fn best_streak(&self, user_id: u64) -> Result<u32, ProcessingError> {
        let state = self.state.read().await;
        Ok(state.streaks.get(&user_id).copied().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_award_is_first_writer_wins() {
        let repo = InMemoryMedalRepository::new();

        assert!(repo.record_award(1, 10, 100).await.unwrap());
        assert!(!repo.record_award(1, 10, 101).await.unwrap());
        assert!(repo.is_awarded(1, 10).await.unwrap());
        assert!(!repo.is_awarded(2, 10).await.unwrap());
    }

    #[tokio::test]
    async fn set_clears_are_partitioned_by_ruleset() {
        let repo = InMemoryMedalRepository::new();
        repo.record_set_clear(1, Ruleset::Osu, 55).await.unwrap();

        let osu = repo.cleared_beatmap_sets(1, Ruleset::Osu).await.unwrap();
        assert!(osu.contains(&55));

        let mania = repo.cleared_beatmap_sets(1, Ruleset::Mania).await.unwrap();
        assert!(mania.is_empty());
    }

    #[tokio::test]
    async fn unknown_pack_is_a_store_error() {
        let repo = InMemoryMedalRepository::new();
        let result = repo.pack_beatmap_sets(9).await;
        assert!(matches!(result, Err(ProcessingError::Store(_))));
    }
}
