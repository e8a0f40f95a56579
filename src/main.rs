use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scorestats::beatmaps::InMemoryBeatmapLookup;
use scorestats::medals::{
    InMemoryMedalRepository, MedalAwardProcessor, MedalDefinition, PackCompletionCondition,
    StreakCondition,
};
use scorestats::monitoring::{self, AppState};
use scorestats::processing::{InMemoryStatsRepository, ScoreStatisticsPipeline};
use scorestats::queue::{ConsumerConfig, InMemoryScoreQueue, ScoreConsumer};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scorestats=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting score statistics consumer");

    // In-memory collaborators for local development.
    //
    // For production with PostgreSQL:
    // let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    // let pool = sqlx::PgPool::connect(&database_url).await.expect("Failed to connect to database");
    // let stats_repository = Arc::new(PostgresStatsRepository::new(pool));
    let stats_repository = Arc::new(InMemoryStatsRepository::new());
    let beatmaps = Arc::new(InMemoryBeatmapLookup::new());
    let medal_repository = Arc::new(InMemoryMedalRepository::new());

    let (medal_processor, mut medal_notifications) = MedalAwardProcessor::new(
        medal_repository.clone(),
        vec![
            MedalDefinition::new(
                1,
                "Video Game Pack",
                None,
                Arc::new(PackCompletionCondition { pack_id: 40 }),
            ),
            MedalDefinition::new(
                2,
                "Dedicated",
                None,
                Arc::new(StreakCondition { min_streak: 30 }),
            ),
        ],
    );

    let pipeline = Arc::new(
        ScoreStatisticsPipeline::builder(stats_repository, beatmaps)
            .with_medal_processor(Arc::new(medal_processor))
            .build(),
    );

    // Downstream award handling; in production this persists the award and
    // fans out to notification services.
    tokio::spawn(async move {
        while let Some(awarded) = medal_notifications.recv().await {
            info!(
                user_id = awarded.user_id,
                medal_id = awarded.medal_id,
                score_id = awarded.score_id,
                "Medal award notification"
            );
        }
    });

    let queue = Arc::new(InMemoryScoreQueue::new());
    let consumer = ScoreConsumer::new(queue.clone(), pipeline.clone(), ConsumerConfig::default());
    tokio::spawn(async move { consumer.run().await });

    let app = monitoring::router(AppState { pipeline });

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000")
        .await
        .expect("Failed to bind monitoring port");
    info!("Monitoring surface on http://localhost:3000");
    axum::serve(listener, app)
        .await
        .expect("Monitoring server failed");
}
