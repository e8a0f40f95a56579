// Monitoring HTTP surface
//
// The service is a queue consumer, not an API; this router only exists so
// liveness checks and dashboards can see that events are flowing.

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::processing::ScoreStatisticsPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ScoreStatisticsPipeline>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "events_applied": state.pipeline.events_applied(),
        "rule_version": state.pipeline.rule_version(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beatmaps::InMemoryBeatmapLookup;
    use crate::processing::InMemoryStatsRepository;

    #[tokio::test]
    async fn stats_reports_the_applied_counter() {
        let pipeline = Arc::new(
            ScoreStatisticsPipeline::builder(
                Arc::new(InMemoryStatsRepository::new()),
                Arc::new(InMemoryBeatmapLookup::new()),
            )
            .build(),
        );

        let Json(body) = stats(State(AppState {
            pipeline: pipeline.clone(),
        }))
        .await;

        assert_eq!(body["events_applied"], 0);
        assert_eq!(body["rule_version"], pipeline.rule_version());
    }
}
