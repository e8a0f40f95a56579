use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::models::{
    BestScoreRecord, ProcessHistory, ScoreContext, UnitOfWork, UserStatisticsAggregate,
};
use super::ProcessingError;
use crate::score::{Ruleset, ScoreRank};

/// Storage for everything the pipeline reads and writes: process history,
/// user aggregates, and best-score records.
///
/// `commit` is the single write path and must be atomic: either the whole
/// unit of work becomes visible or none of it does. Aggregate deltas are
/// applied under the store's own per-key serialization, so units of work
/// for different score ids may safely touch the same aggregate
/// concurrently.
#[async_trait]
pub trait StatsRepository: Send + Sync {
    async fn fetch_history(&self, score_id: u64)
        -> Result<Option<ProcessHistory>, ProcessingError>;

    /// The current aggregate for (user, ruleset), defaulted when the user
    /// has no processed scores in the ruleset yet.
    async fn fetch_aggregate(
        &self,
        user_id: u64,
        ruleset: Ruleset,
    ) -> Result<UserStatisticsAggregate, ProcessingError>;

    async fn fetch_best_score(
        &self,
        context: &ScoreContext,
    ) -> Result<Option<BestScoreRecord>, ProcessingError>;

    async fn commit(&self, unit: UnitOfWork) -> Result<(), ProcessingError>;
}

#[derive(Default)]
struct InMemoryState {
    histories: HashMap<u64, ProcessHistory>,
    aggregates: HashMap<(u64, Ruleset), UserStatisticsAggregate>,
    best_scores: HashMap<ScoreContext, BestScoreRecord>,
}

/// In-memory implementation for development and tests. One `RwLock` over
/// the whole store makes each commit trivially atomic.
#[derive(Default)]
pub struct InMemoryStatsRepository {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryStatsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatsRepository for InMemoryStatsRepository {
    async fn fetch_history(
        &self,
        score_id: u64,
    ) -> Result<Option<ProcessHistory>, ProcessingError> {
        let state = self.state.read().await;
        Ok(state.histories.get(&score_id).cloned())
    }

    async fn fetch_aggregate(
        &self,
        user_id: u64,
        ruleset: Ruleset,
    ) -> Result<UserStatisticsAggregate, ProcessingError> {
        let state = self.state.read().await;
        Ok(state
            .aggregates
            .get(&(user_id, ruleset))
            .cloned()
            .unwrap_or_else(|| UserStatisticsAggregate::new(user_id, ruleset)))
    }

    async fn fetch_best_score(
        &self,
        context: &ScoreContext,
    ) -> Result<Option<BestScoreRecord>, ProcessingError> {
        let state = self.state.read().await;
        Ok(state.best_scores.get(context).cloned())
    }

    #[instrument(skip(self, unit), fields(score_id = unit.history.score_id))]
    async fn commit(&self, unit: UnitOfWork) -> Result<(), ProcessingError> {
        let mut state = self.state.write().await;

        // Validate against a copy first so a rule violation leaves the
        // store untouched.
        let mut aggregate = state
            .aggregates
            .get(&(unit.user_id, unit.ruleset))
            .cloned()
            .unwrap_or_else(|| UserStatisticsAggregate::new(unit.user_id, unit.ruleset));
        aggregate.apply_delta(&unit.delta)?;

        state
            .aggregates
            .insert((unit.user_id, unit.ruleset), aggregate);

        for (context, record) in unit.best_scores {
            match record {
                Some(record) => {
                    state.best_scores.insert(context, record);
                }
                None => {
                    state.best_scores.remove(&context);
                }
            }
        }

        debug!(
            score_id = unit.history.score_id,
            version = unit.history.processed_version,
            "Unit of work committed in memory"
        );
        state.histories.insert(unit.history.score_id, unit.history);

        Ok(())
    }
}

/// PostgreSQL implementation. Each commit runs in one transaction; the
/// aggregate row is locked with `FOR UPDATE` so concurrent units of work
/// touching the same (user, ruleset) serialize at the store.
pub struct PostgresStatsRepository {
    pool: PgPool,
}

impl PostgresStatsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_err(e: sqlx::Error) -> ProcessingError {
    ProcessingError::Store(e.to_string())
}

fn parse_rank(value: &str) -> Result<ScoreRank, ProcessingError> {
    ScoreRank::from_str(value)
        .map_err(|_| ProcessingError::Store(format!("unknown rank {value:?} in store")))
}

#[async_trait]
impl StatsRepository for PostgresStatsRepository {
    #[instrument(skip(self))]
    async fn fetch_history(
        &self,
        score_id: u64,
    ) -> Result<Option<ProcessHistory>, ProcessingError> {
        let row = sqlx::query(
            "SELECT score_id, processed_version, reverts FROM score_process_history WHERE score_id = $1",
        )
        .bind(score_id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        let history = match row {
            Some(row) => {
                let reverts: serde_json::Value = row.get("reverts");
                let reverts = serde_json::from_value(reverts).map_err(|e| {
                    ProcessingError::Store(format!("corrupt revert data for {score_id}: {e}"))
                })?;
                Some(ProcessHistory {
                    score_id: row.get::<i64, _>("score_id") as u64,
                    processed_version: row.get::<i32, _>("processed_version") as u32,
                    reverts,
                })
            }
            None => None,
        };

        Ok(history)
    }

    #[instrument(skip(self))]
    async fn fetch_aggregate(
        &self,
        user_id: u64,
        ruleset: Ruleset,
    ) -> Result<UserStatisticsAggregate, ProcessingError> {
        let row = sqlx::query(
            "SELECT playcount, seconds_played, hit_totals, rank_counts \
             FROM user_statistics WHERE user_id = $1 AND ruleset = $2",
        )
        .bind(user_id as i64)
        .bind(ruleset.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        let aggregate = match row {
            Some(row) => aggregate_from_row(user_id, ruleset, &row)?,
            None => UserStatisticsAggregate::new(user_id, ruleset),
        };

        Ok(aggregate)
    }

    #[instrument(skip(self))]
    async fn fetch_best_score(
        &self,
        context: &ScoreContext,
    ) -> Result<Option<BestScoreRecord>, ProcessingError> {
        let row = sqlx::query(
            "SELECT score_id, total_score, rank FROM best_scores \
             WHERE user_id = $1 AND beatmap_id = $2 AND ruleset = $3",
        )
        .bind(context.user_id as i64)
        .bind(context.beatmap_id as i64)
        .bind(context.ruleset.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        let record = match row {
            Some(row) => Some(BestScoreRecord {
                score_id: row.get::<i64, _>("score_id") as u64,
                total_score: row.get::<i64, _>("total_score") as u64,
                rank: parse_rank(row.get::<String, _>("rank").as_str())?,
            }),
            None => None,
        };

        Ok(record)
    }

    #[instrument(skip(self, unit), fields(score_id = unit.history.score_id))]
    async fn commit(&self, unit: UnitOfWork) -> Result<(), ProcessingError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        // Row lock serializes concurrent commits against the same
        // aggregate; the delta is applied on top of the locked row.
        let row = sqlx::query(
            "SELECT playcount, seconds_played, hit_totals, rank_counts \
             FROM user_statistics WHERE user_id = $1 AND ruleset = $2 FOR UPDATE",
        )
        .bind(unit.user_id as i64)
        .bind(unit.ruleset.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err)?;

        let mut aggregate = match row {
            Some(row) => aggregate_from_row(unit.user_id, unit.ruleset, &row)?,
            None => UserStatisticsAggregate::new(unit.user_id, unit.ruleset),
        };
        aggregate.apply_delta(&unit.delta)?;

        let hit_totals = serde_json::to_value(&aggregate.hit_totals)
            .map_err(|e| ProcessingError::Store(e.to_string()))?;
        let rank_counts = serde_json::to_value(&aggregate.rank_counts)
            .map_err(|e| ProcessingError::Store(e.to_string()))?;

        sqlx::query(
            "INSERT INTO user_statistics (user_id, ruleset, playcount, seconds_played, hit_totals, rank_counts) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id, ruleset) DO UPDATE SET \
               playcount = EXCLUDED.playcount, \
               seconds_played = EXCLUDED.seconds_played, \
               hit_totals = EXCLUDED.hit_totals, \
               rank_counts = EXCLUDED.rank_counts",
        )
        .bind(unit.user_id as i64)
        .bind(unit.ruleset.to_string())
        .bind(aggregate.playcount as i64)
        .bind(aggregate.seconds_played as i64)
        .bind(hit_totals)
        .bind(rank_counts)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        for (context, record) in &unit.best_scores {
            match record {
                Some(record) => {
                    sqlx::query(
                        "INSERT INTO best_scores (user_id, beatmap_id, ruleset, score_id, total_score, rank) \
                         VALUES ($1, $2, $3, $4, $5, $6) \
                         ON CONFLICT (user_id, beatmap_id, ruleset) DO UPDATE SET \
                           score_id = EXCLUDED.score_id, \
                           total_score = EXCLUDED.total_score, \
                           rank = EXCLUDED.rank",
                    )
                    .bind(context.user_id as i64)
                    .bind(context.beatmap_id as i64)
                    .bind(context.ruleset.to_string())
                    .bind(record.score_id as i64)
                    .bind(record.total_score as i64)
                    .bind(record.rank.to_string())
                    .execute(&mut *tx)
                    .await
                    .map_err(store_err)?;
                }
                None => {
                    sqlx::query(
                        "DELETE FROM best_scores \
                         WHERE user_id = $1 AND beatmap_id = $2 AND ruleset = $3",
                    )
                    .bind(context.user_id as i64)
                    .bind(context.beatmap_id as i64)
                    .bind(context.ruleset.to_string())
                    .execute(&mut *tx)
                    .await
                    .map_err(store_err)?;
                }
            }
        }

        let reverts = serde_json::to_value(&unit.history.reverts)
            .map_err(|e| ProcessingError::Store(e.to_string()))?;
        sqlx::query(
            "INSERT INTO score_process_history (score_id, processed_version, reverts) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (score_id) DO UPDATE SET \
               processed_version = EXCLUDED.processed_version, \
               reverts = EXCLUDED.reverts",
        )
        .bind(unit.history.score_id as i64)
        .bind(unit.history.processed_version as i32)
        .bind(reverts)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(|e| {
            warn!(error = %e, "Failed to commit unit of work");
            store_err(e)
        })?;

        Ok(())
    }
}

fn aggregate_from_row(
    user_id: u64,
    ruleset: Ruleset,
    row: &sqlx::postgres::PgRow,
) -> Result<UserStatisticsAggregate, ProcessingError> {
    let hit_totals: serde_json::Value = row.get("hit_totals");
    let rank_counts: serde_json::Value = row.get("rank_counts");

    Ok(UserStatisticsAggregate {
        user_id,
        ruleset,
        playcount: row.get::<i64, _>("playcount") as u64,
        seconds_played: row.get::<i64, _>("seconds_played") as u64,
        hit_totals: serde_json::from_value(hit_totals)
            .map_err(|e| ProcessingError::Store(format!("corrupt hit totals: {e}")))?,
        rank_counts: serde_json::from_value(rank_counts)
            .map_err(|e| ProcessingError::Store(format!("corrupt rank counts: {e}")))?,
    })
}
