use async_trait::async_trait;

use super::repository::MedalRepository;
use crate::processing::{ProcessingError, UserStatisticsAggregate};
use crate::score::ScoreEvent;

/// Predicate deciding whether a score qualifies its user for a medal.
///
/// Evaluated against the triggering event, the aggregate as updated by the
/// numeric processors, and whatever external lookups the condition needs.
/// Must not have side effects; awarding is the processor's job.
#[async_trait]
pub trait MedalCondition: Send + Sync {
    async fn evaluate(
        &self,
        event: &ScoreEvent,
        aggregate: &UserStatisticsAggregate,
        repository: &dyn MedalRepository,
    ) -> Result<bool, ProcessingError>;
}

/// Satisfied when the user's cleared beatmap sets cover every set in the
/// pack.
pub struct PackCompletionCondition {
    pub pack_id: u32,
}

#[async_trait]
impl MedalCondition for PackCompletionCondition {
    async fn evaluate(
        &self,
        event: &ScoreEvent,
        _aggregate: &UserStatisticsAggregate,
        repository: &dyn MedalRepository,
    ) -> Result<bool, ProcessingError> {
        let required = repository.pack_beatmap_sets(self.pack_id).await?;
        if required.is_empty() {
            return Ok(false);
        }

        // Cheap rejection before the coverage query: a score on a set
        // outside the pack can never complete it.
        if !required.contains(&event.beatmap_set_id) {
            return Ok(false);
        }

        let cleared = repository
            .cleared_beatmap_sets(event.user_id, event.ruleset)
            .await?;

        Ok(required.iter().all(|set| cleared.contains(set)))
    }
}

/// Satisfied when the user's best recorded streak has reached the minimum.
pub struct StreakCondition {
    pub min_streak: u32,
}

#[async_trait]
impl MedalCondition for StreakCondition {
    async fn evaluate(
        &self,
        event: &ScoreEvent,
        _aggregate: &UserStatisticsAggregate,
        repository: &dyn MedalRepository,
    ) -> Result<bool, ProcessingError> {
        let streak = repository.best_streak(event.user_id).await?;
        Ok(streak >= self.min_streak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medals::InMemoryMedalRepository;
    use crate::score::{Ruleset, ScoreRank};
    use std::collections::HashMap;

    fn event(user_id: u64, beatmap_set_id: u64) -> ScoreEvent {
        ScoreEvent {
            id: 1,
            user_id,
            beatmap_id: 1,
            beatmap_set_id,
            ruleset: Ruleset::Osu,
            mods: vec![],
            statistics: HashMap::new(),
            maximum_statistics: HashMap::new(),
            total_score: 100_000,
            rank: ScoreRank::A,
            passed: true,
            started_at: None,
            ended_at: None,
        }
    }

    fn aggregate() -> UserStatisticsAggregate {
        UserStatisticsAggregate::new(1, Ruleset::Osu)
    }

    #[tokio::test]
    async fn pack_requires_full_coverage() {
        let repo = InMemoryMedalRepository::new();
        repo.insert_pack(7, vec![10, 11, 12]).await;
        repo.record_set_clear(1, Ruleset::Osu, 10).await.unwrap();
        repo.record_set_clear(1, Ruleset::Osu, 11).await.unwrap();

        let condition = PackCompletionCondition { pack_id: 7 };
        assert!(!condition
            .evaluate(&event(1, 11), &aggregate(), &repo)
            .await
            .unwrap());

        repo.record_set_clear(1, Ruleset::Osu, 12).await.unwrap();
        assert!(condition
            .evaluate(&event(1, 12), &aggregate(), &repo)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn pack_ignores_scores_outside_the_pack() {
        let repo = InMemoryMedalRepository::new();
        repo.insert_pack(7, vec![10]).await;
        repo.record_set_clear(1, Ruleset::Osu, 10).await.unwrap();

        let condition = PackCompletionCondition { pack_id: 7 };
        assert!(!condition
            .evaluate(&event(1, 99), &aggregate(), &repo)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn pack_coverage_is_per_ruleset() {
        let repo = InMemoryMedalRepository::new();
        repo.insert_pack(7, vec![10]).await;
        repo.record_set_clear(1, Ruleset::Mania, 10).await.unwrap();

        let condition = PackCompletionCondition { pack_id: 7 };
        // The event is an osu score; mania clears do not count.
        assert!(!condition
            .evaluate(&event(1, 10), &aggregate(), &repo)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn streak_compares_against_minimum() {
        let repo = InMemoryMedalRepository::new();
        repo.set_best_streak(1, 29).await;

        let condition = StreakCondition { min_streak: 30 };
        assert!(!condition
            .evaluate(&event(1, 1), &aggregate(), &repo)
            .await
            .unwrap());

        repo.set_best_streak(1, 30).await;
        assert!(condition
            .evaluate(&event(1, 1), &aggregate(), &repo)
            .await
            .unwrap());
    }
}
