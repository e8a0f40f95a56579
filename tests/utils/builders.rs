#![allow(dead_code)] // Test utilities may not all be used in every test

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;

use scorestats::{Judgement, Ruleset, ScoreEvent, ScoreMod, ScoreRank};

/// Fluent builder for score events with sensible defaults: a passed play
/// on beatmap 1 (set 1) worth 600k at rank A, lasting 120 seconds with a
/// clean 100/100 hit sheet.
pub struct ScoreEventBuilder {
    id: u64,
    user_id: u64,
    beatmap_id: u64,
    beatmap_set_id: u64,
    ruleset: Ruleset,
    mods: Vec<ScoreMod>,
    hits: (u32, u32),
    total_score: u64,
    rank: ScoreRank,
    passed: bool,
    duration_seconds: i64,
}

impl ScoreEventBuilder {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            user_id: 1,
            beatmap_id: 1,
            beatmap_set_id: 1,
            ruleset: Ruleset::Osu,
            mods: vec![],
            hits: (100, 100),
            total_score: 600_000,
            rank: ScoreRank::A,
            passed: true,
            duration_seconds: 120,
        }
    }

    pub fn user(mut self, user_id: u64) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn beatmap(mut self, beatmap_id: u64, beatmap_set_id: u64) -> Self {
        self.beatmap_id = beatmap_id;
        self.beatmap_set_id = beatmap_set_id;
        self
    }

    pub fn ruleset(mut self, ruleset: Ruleset) -> Self {
        self.ruleset = ruleset;
        self
    }

    pub fn with_mod(mut self, acronym: &str) -> Self {
        self.mods.push(ScoreMod::new(acronym));
        self
    }

    pub fn hits(mut self, achieved: u32, maximum: u32) -> Self {
        self.hits = (achieved, maximum);
        self
    }

    pub fn total_score(mut self, total_score: u64) -> Self {
        self.total_score = total_score;
        self
    }

    pub fn rank(mut self, rank: ScoreRank) -> Self {
        self.rank = rank;
        self
    }

    pub fn failed(mut self) -> Self {
        self.passed = false;
        self
    }

    pub fn lasting_seconds(mut self, seconds: i64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn build(self) -> ScoreEvent {
        let started: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        ScoreEvent {
            id: self.id,
            user_id: self.user_id,
            beatmap_id: self.beatmap_id,
            beatmap_set_id: self.beatmap_set_id,
            ruleset: self.ruleset,
            mods: self.mods,
            statistics: HashMap::from([(Judgement::Great, self.hits.0)]),
            maximum_statistics: HashMap::from([(Judgement::Great, self.hits.1)]),
            total_score: self.total_score,
            rank: self.rank,
            passed: self.passed,
            started_at: Some(started),
            ended_at: Some(started + Duration::seconds(self.duration_seconds)),
        }
    }
}
