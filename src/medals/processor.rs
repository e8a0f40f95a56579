use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use super::models::{MedalAwarded, MedalDefinition};
use super::repository::MedalRepository;
use crate::processing::{ProcessingError, UserStatisticsAggregate};
use crate::score::ScoreEvent;

/// Evaluates the medal catalog against each processed score and emits one
/// [`MedalAwarded`] notification per newly qualifying (user, medal) pair.
///
/// Runs strictly after the numeric processors commit; conditions read the
/// updated aggregate. There is no revert: reprocessing a score never
/// revokes a medal, and re-qualifying is a no-op.
pub struct MedalAwardProcessor {
    medals: Vec<MedalDefinition>,
    repository: Arc<dyn MedalRepository>,
    notifications: mpsc::UnboundedSender<MedalAwarded>,
}

impl MedalAwardProcessor {
    /// Builds the processor and the receiving end of its notification
    /// channel. The host wires the receiver to whatever persists awards
    /// downstream; dropping it is fine, notification is best-effort.
    pub fn new(
        repository: Arc<dyn MedalRepository>,
        medals: Vec<MedalDefinition>,
    ) -> (Self, mpsc::UnboundedReceiver<MedalAwarded>) {
        let (notifications, receiver) = mpsc::unbounded_channel();
        (
            Self {
                medals,
                repository,
                notifications,
            },
            receiver,
        )
    }

    #[instrument(skip(self, event, aggregate), fields(score_id = event.id, user_id = event.user_id))]
    pub async fn evaluate(
        &self,
        event: &ScoreEvent,
        aggregate: &UserStatisticsAggregate,
    ) -> Result<(), ProcessingError> {
        // A passed score makes its beatmap set count as cleared for
        // coverage-style conditions, including ones evaluated right now.
        // Failed plays never contribute coverage.
        if event.passed {
            self.repository
                .record_set_clear(event.user_id, event.ruleset, event.beatmap_set_id)
                .await?;
        }

        for medal in &self.medals {
            if !medal.applies_to(event.ruleset) {
                continue;
            }
            if self.repository.is_awarded(event.user_id, medal.id).await? {
                continue;
            }

            let qualifies = medal
                .condition
                .evaluate(event, aggregate, self.repository.as_ref())
                .await?;
            if !qualifies {
                continue;
            }

            // The insert is first-writer-wins, so even racing evaluations
            // of the same user notify at most once.
            let newly_awarded = self
                .repository
                .record_award(event.user_id, medal.id, event.id)
                .await?;
            if !newly_awarded {
                continue;
            }

            info!(
                user_id = event.user_id,
                medal_id = medal.id,
                medal_name = %medal.name,
                "Medal awarded"
            );

            let notification = MedalAwarded {
                user_id: event.user_id,
                medal_id: medal.id,
                score_id: event.id,
            };
            if self.notifications.send(notification).is_err() {
                debug!(medal_id = medal.id, "No medal notification subscriber");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medals::{InMemoryMedalRepository, PackCompletionCondition, StreakCondition};
    use crate::score::{Ruleset, ScoreRank};
    use std::collections::HashMap;

    fn event(id: u64, user_id: u64, beatmap_set_id: u64, ruleset: Ruleset) -> ScoreEvent {
        ScoreEvent {
            id,
            user_id,
            beatmap_id: beatmap_set_id * 10,
            beatmap_set_id,
            ruleset,
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

    fn aggregate(user_id: u64, ruleset: Ruleset) -> UserStatisticsAggregate {
        UserStatisticsAggregate::new(user_id, ruleset)
    }

    #[tokio::test]
    async fn pack_medal_awards_exactly_once() {
        let repo = Arc::new(InMemoryMedalRepository::new());
        repo.insert_pack(7, vec![10, 11]).await;

        let medals = vec![MedalDefinition::new(
            1,
            "Pack Conqueror",
            None,
            Arc::new(PackCompletionCondition { pack_id: 7 }),
        )];
        let (processor, mut notifications) = MedalAwardProcessor::new(repo.clone(), medals);

        let first = event(100, 1, 10, Ruleset::Osu);
        processor
            .evaluate(&first, &aggregate(1, Ruleset::Osu))
            .await
            .unwrap();
        assert!(notifications.try_recv().is_err());

        let completing = event(101, 1, 11, Ruleset::Osu);
        processor
            .evaluate(&completing, &aggregate(1, Ruleset::Osu))
            .await
            .unwrap();

        let awarded = notifications.try_recv().unwrap();
        assert_eq!(awarded.medal_id, 1);
        assert_eq!(awarded.score_id, 101);

        // Further qualifying scores never notify again.
        let another = event(102, 1, 10, Ruleset::Osu);
        processor
            .evaluate(&another, &aggregate(1, Ruleset::Osu))
            .await
            .unwrap();
        assert!(notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_plays_contribute_no_pack_coverage() {
        let repo = Arc::new(InMemoryMedalRepository::new());
        repo.insert_pack(7, vec![10, 11]).await;

        let medals = vec![MedalDefinition::new(
            1,
            "Pack Conqueror",
            None,
            Arc::new(PackCompletionCondition { pack_id: 7 }),
        )];
        let (processor, mut notifications) = MedalAwardProcessor::new(repo.clone(), medals);

        processor
            .evaluate(&event(100, 1, 10, Ruleset::Osu), &aggregate(1, Ruleset::Osu))
            .await
            .unwrap();

        // A failed play on the last remaining set must not complete the
        // pack.
        let mut failed = event(101, 1, 11, Ruleset::Osu);
        failed.passed = false;
        processor
            .evaluate(&failed, &aggregate(1, Ruleset::Osu))
            .await
            .unwrap();
        assert!(notifications.try_recv().is_err());
        assert!(!repo.is_awarded(1, 1).await.unwrap());

        let cleared = repo.cleared_beatmap_sets(1, Ruleset::Osu).await.unwrap();
        assert!(!cleared.contains(&11));

        // Passing it does.
        processor
            .evaluate(&event(102, 1, 11, Ruleset::Osu), &aggregate(1, Ruleset::Osu))
            .await
            .unwrap();
        assert_eq!(notifications.try_recv().unwrap().medal_id, 1);
    }

    #[tokio::test]
    async fn ruleset_restricted_medals_skip_other_rulesets() {
        let repo = Arc::new(InMemoryMedalRepository::new());
        repo.set_best_streak(1, 50).await;

        let medals = vec![MedalDefinition::new(
            2,
            "Dedicated",
            Some(Ruleset::Mania),
            Arc::new(StreakCondition { min_streak: 30 }),
        )];
        let (processor, mut notifications) = MedalAwardProcessor::new(repo.clone(), medals);

        let osu_score = event(100, 1, 10, Ruleset::Osu);
        processor
            .evaluate(&osu_score, &aggregate(1, Ruleset::Osu))
            .await
            .unwrap();
        assert!(notifications.try_recv().is_err());

        let mania_score = event(101, 1, 10, Ruleset::Mania);
        processor
            .evaluate(&mania_score, &aggregate(1, Ruleset::Mania))
            .await
            .unwrap();
        assert_eq!(notifications.try_recv().unwrap().medal_id, 2);
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_fail_evaluation() {
        let repo = Arc::new(InMemoryMedalRepository::new());
        repo.set_best_streak(1, 50).await;

        let medals = vec![MedalDefinition::new(
            3,
            "Unwavering",
            None,
            Arc::new(StreakCondition { min_streak: 30 }),
        )];
        let (processor, notifications) = MedalAwardProcessor::new(repo.clone(), medals);
        drop(notifications);

        let score = event(100, 1, 10, Ruleset::Osu);
        processor
            .evaluate(&score, &aggregate(1, Ruleset::Osu))
            .await
            .unwrap();

        assert!(repo.is_awarded(1, 3).await.unwrap());
    }
}
