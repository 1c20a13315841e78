//! Persistence seam between the stages and the relational store
//!
//! Stages only talk to [`Store`]. [`postgres::PgStore`] is the production
//! implementation; tests substitute an in-memory one.

pub mod postgres;

pub use postgres::PgStore;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::models::rows::{
    Candidate, LapRow, NaturalKey, PitStopRow, QualifyingResultRow, RaceEventRow, RaceResultRow,
    ReplaceCount, StandingsSnapshot, StoredCircuit, StoredConstructor, StoredDriver, StoredRace,
    StoredSeason, StoredSession, TireStintRow,
};

/// Materialized views refreshed at the end of every pipeline run
pub const MATERIALIZED_VIEWS: [&str; 5] = [
    "driver_standings_materialized",
    "driver_career_stats_materialized",
    "race_fastest_laps_materialized",
    "constructor_standings_materialized",
    "driver_season_stats_materialized",
];

/// Outcome of a run-lock acquisition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    Acquired,
    /// Another unexpired run holds the lock
    HeldBy(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    // ------------------------------------------------------------------
    // Lookup snapshots
    // ------------------------------------------------------------------

    async fn seasons(&self) -> Result<Vec<StoredSeason>>;

    /// Every country code already present
    async fn country_codes(&self) -> Result<Vec<String>>;

    async fn circuits(&self) -> Result<Vec<StoredCircuit>>;

    async fn constructors(&self) -> Result<Vec<StoredConstructor>>;

    async fn drivers(&self) -> Result<Vec<StoredDriver>>;

    /// Races of one season ordered by round
    async fn races_for_season(&self, year: i32) -> Result<Vec<StoredRace>>;

    async fn sessions_for_races(&self, race_ids: &[i64]) -> Result<Vec<StoredSession>>;

    // ------------------------------------------------------------------
    // Natural-key upsert primitives
    // ------------------------------------------------------------------

    async fn find_id(&self, key: &NaturalKey) -> Result<Option<i64>>;

    /// Insert a new row and return its id
    async fn insert(&self, candidate: &Candidate) -> Result<i64>;

    /// Overwrite the row `id` with the candidate's payload. Optional session
    /// and driver fields that are absent keep their stored value.
    async fn update(&self, id: i64, candidate: &Candidate) -> Result<()>;

    // ------------------------------------------------------------------
    // Delete-then-insert replacements, one transaction each
    // ------------------------------------------------------------------

    async fn replace_race_results(&self, session_id: i64, rows: &[RaceResultRow]) -> Result<ReplaceCount>;

    async fn replace_qualifying_results(
        &self,
        session_id: i64,
        rows: &[QualifyingResultRow],
    ) -> Result<ReplaceCount>;

    async fn replace_laps(&self, race_id: i64, rows: &[LapRow]) -> Result<ReplaceCount>;

    async fn replace_pit_stops(&self, race_id: i64, rows: &[PitStopRow]) -> Result<ReplaceCount>;

    async fn replace_tire_stints(&self, session_id: i64, rows: &[TireStintRow]) -> Result<ReplaceCount>;

    async fn replace_race_events(&self, session_id: i64, rows: &[RaceEventRow]) -> Result<ReplaceCount>;

    /// Delete every standing and write the snapshot in one transaction
    async fn rebuild_standings(&self, snapshot: &StandingsSnapshot) -> Result<ReplaceCount>;

    // ------------------------------------------------------------------
    // Run lock and views
    // ------------------------------------------------------------------

    async fn try_acquire_run_lock(&self, owner: &str, ttl: Duration) -> Result<LockStatus>;

    /// Release the lock if `owner` still holds it
    async fn release_run_lock(&self, owner: &str) -> Result<()>;

    async fn refresh_materialized_view(&self, view: &str) -> Result<()>;
}
