//! Pipeline stages
//!
//! Each stage walks `Fetching → Resolving → Writing` and returns its own
//! [`StageStats`]. Per-item problems are counted and logged; an error returned
//! from a stage means the stage as a whole failed.

pub mod catalog;
pub mod granular;
pub mod modern_results;
pub mod races;
pub mod results;
pub mod schedule;
pub mod seasons;
pub mod sessions;
pub mod sprint;
pub mod standings;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use pitlane_common::types::{SessionType, StageStats};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::IngestConfig;
use crate::fetch::{HistoricalClient, ModernClient};
use crate::models::rows::{Candidate, CountryRow, StoredRace, StoredSession};
use crate::resolver::{ConstructorIndex, DriverIndex};
use crate::store::Store;
use crate::writer::UpsertWriter;

/// Everything a stage needs: store, writer, both API clients and settings
#[derive(Clone)]
pub struct IngestContext {
    pub store: Arc<dyn Store>,
    pub writer: UpsertWriter,
    pub historical: HistoricalClient,
    pub modern: ModernClient,
    pub config: IngestConfig,
}

impl IngestContext {
    pub fn new(store: Arc<dyn Store>, config: IngestConfig) -> Result<Self> {
        let historical = HistoricalClient::new(&config.historical, &config.backoff)
            .context("Failed to build historical API client")?;
        let modern =
            ModernClient::new(&config.modern, &config.backoff).context("Failed to build modern API client")?;
        Ok(Self {
            writer: UpsertWriter::new(store.clone()),
            store,
            historical,
            modern,
            config,
        })
    }

    /// Fresh driver and constructor indexes from the store
    pub async fn participant_indexes(&self) -> Result<(DriverIndex, ConstructorIndex)> {
        let drivers = DriverIndex::new(&self.store.drivers().await?);
        let constructors = ConstructorIndex::new(&self.store.constructors().await?);
        Ok((drivers, constructors))
    }

    /// Season id for `year`, if the season has been ingested
    pub async fn season_id(&self, year: i32) -> Result<Option<i64>> {
        Ok(self
            .store
            .seasons()
            .await?
            .into_iter()
            .find(|s| s.year == year)
            .map(|s| s.id))
    }

    /// Races of `year` and their sessions keyed by `(race_id, type)`
    pub async fn race_weekends(&self, year: i32) -> Result<(Vec<StoredRace>, SessionLookup)> {
        let races = self.store.races_for_season(year).await?;
        let race_ids: Vec<i64> = races.iter().map(|r| r.id).collect();
        let sessions = if race_ids.is_empty() {
            Vec::new()
        } else {
            self.store.sessions_for_races(&race_ids).await?
        };
        Ok((races, SessionLookup::new(sessions)))
    }
}

/// Sessions indexed by race and type
#[derive(Debug, Default)]
pub struct SessionLookup {
    by_race: HashMap<(i64, SessionType), StoredSession>,
}

impl SessionLookup {
    pub fn new(sessions: Vec<StoredSession>) -> Self {
        Self {
            by_race: sessions
                .into_iter()
                .map(|s| ((s.race_id, s.session_type), s))
                .collect(),
        }
    }

    pub fn get(&self, race_id: i64, session_type: SessionType) -> Option<&StoredSession> {
        self.by_race.get(&(race_id, session_type))
    }

    /// Sessions of one type that carry a modern-API session key
    pub fn keyed(&self, session_type: SessionType) -> Vec<(&StoredSession, i64)> {
        let mut keyed: Vec<_> = self
            .by_race
            .values()
            .filter(|s| s.session_type == session_type)
            .filter_map(|s| s.openf1_session_key.map(|key| (s, key)))
            .collect();
        keyed.sort_by_key(|(s, _)| s.race_id);
        keyed
    }

    /// Every session that carries a modern-API session key
    pub fn all_keyed(&self) -> Vec<(&StoredSession, i64)> {
        let mut keyed: Vec<_> = self
            .by_race
            .values()
            .filter_map(|s| s.openf1_session_key.map(|key| (s, key)))
            .collect();
        keyed.sort_by_key(|(s, _)| s.id);
        keyed
    }
}

/// Country codes known to the store, created on first sight
pub struct CountryRegistry {
    known: HashSet<String>,
}

impl CountryRegistry {
    pub async fn load(store: &dyn Store) -> Result<Self> {
        Ok(Self {
            known: store.country_codes().await?.into_iter().collect(),
        })
    }

    /// Create the country row for `code` unless it already exists
    pub async fn ensure(
        &mut self,
        writer: &UpsertWriter,
        code: &str,
        display_name: &str,
        stats: &mut StageStats,
    ) -> Result<()> {
        if self.known.contains(code) {
            return Ok(());
        }
        let outcome = writer
            .upsert(&Candidate::Country(CountryRow {
                code: code.to_string(),
                name: display_name.to_string(),
            }))
            .await?;
        info!(code, name = display_name, "Registered new country");
        stats.record(outcome);
        self.known.insert(code.to_string());
        Ok(())
    }
}

/// Every stage the pipeline can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Seasons,
    Circuits,
    Constructors,
    Drivers,
    RacesSessions,
    Results,
    Standings,
    Schedule(i32),
    SessionsWeather(i32),
    Granular(i32),
    ModernResults(i32),
    SprintQualifying(i32),
    SprintResults(i32),
}

impl Stage {
    /// Historical stages in dependency order
    pub const HISTORICAL: [Stage; 7] = [
        Stage::Seasons,
        Stage::Circuits,
        Stage::Constructors,
        Stage::Drivers,
        Stage::RacesSessions,
        Stage::Results,
        Stage::Standings,
    ];

    /// Modern stages that must succeed for one season
    pub fn modern_core(year: i32) -> [Stage; 4] {
        [
            Stage::Schedule(year),
            Stage::SessionsWeather(year),
            Stage::Granular(year),
            Stage::ModernResults(year),
        ]
    }

    /// Name shown in run reports
    pub fn name(&self) -> String {
        match self {
            Stage::Seasons => "Seasons".to_string(),
            Stage::Circuits => "Circuits".to_string(),
            Stage::Constructors => "Constructors".to_string(),
            Stage::Drivers => "Drivers".to_string(),
            Stage::RacesSessions => "Races & Sessions".to_string(),
            Stage::Results => "Historical Results".to_string(),
            Stage::Standings => "Standings".to_string(),
            Stage::Schedule(year) => format!("Season Schedule {}", year),
            Stage::SessionsWeather(year) => format!("OpenF1 Sessions & Weather {}", year),
            Stage::Granular(year) => format!("OpenF1 Granular Data {}", year),
            Stage::ModernResults(year) => format!("Modern Results & Laps {}", year),
            Stage::SprintQualifying(year) => format!("Sprint Qualifying {}", year),
            Stage::SprintResults(year) => format!("Sprint Race Results {}", year),
        }
    }

    /// Sprint stages are best-effort within a current-year run
    pub fn is_hard(&self) -> bool {
        !matches!(self, Stage::SprintQualifying(_) | Stage::SprintResults(_))
    }

    /// Run the stage to completion
    pub async fn execute(&self, ctx: &IngestContext) -> Result<StageStats> {
        let mut stats = StageStats::new(self.name());
        info!(stage = %self, "Starting stage");

        let result = match *self {
            Stage::Seasons => seasons::run(ctx, &mut stats).await,
            Stage::Circuits => catalog::run_circuits(ctx, &mut stats).await,
            Stage::Constructors => catalog::run_constructors(ctx, &mut stats).await,
            Stage::Drivers => catalog::run_drivers(ctx, &mut stats).await,
            Stage::RacesSessions => races::run(ctx, &mut stats).await,
            Stage::Results => results::run(ctx, &mut stats).await,
            Stage::Standings => standings::run(ctx, &mut stats).await,
            Stage::Schedule(year) => schedule::run(ctx, year, &mut stats).await,
            Stage::SessionsWeather(year) => sessions::run(ctx, year, &mut stats).await,
            Stage::Granular(year) => granular::run(ctx, year, &mut stats).await,
            Stage::ModernResults(year) => modern_results::run(ctx, year, &mut stats).await,
            Stage::SprintQualifying(year) => sprint::run_qualifying(ctx, year, &mut stats).await,
            Stage::SprintResults(year) => sprint::run_results(ctx, year, &mut stats).await,
        };

        match result {
            Ok(()) => {
                stats.complete();
                info!(
                    "✓ {}: {} created, {} updated, {} skipped, {} failed, {} replaced ({} removed) in {}ms",
                    self,
                    stats.created,
                    stats.updated,
                    stats.skipped,
                    stats.failed,
                    stats.inserted,
                    stats.deleted,
                    stats.duration_ms
                );
                Ok(stats)
            },
            Err(e) => {
                stats.fail();
                error!("✗ {} failed after {}ms: {:#}", self, stats.duration_ms, e);
                Err(e.context(format!("{} failed", self)))
            },
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Parse an ISO date such as `2021-07-18`
pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Parse a race start time such as `14:00:00Z`, dropping the zone marker
pub(crate) fn parse_race_time(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim().trim_end_matches('Z');
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f"))
        .ok()
}

/// Keep the first row for every key
pub(crate) fn dedup_by_key<T, K, F>(rows: Vec<T>, mut key: F) -> Vec<T>
where
    K: std::hash::Hash + Eq,
    F: FnMut(&T) -> K,
{
    let mut seen = HashSet::new();
    rows.into_iter().filter(|row| seen.insert(key(row))).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_race_time_strips_zone() {
        assert_eq!(parse_race_time("14:10:00Z"), NaiveTime::from_hms_opt(14, 10, 0));
        assert_eq!(parse_race_time("05:00:00"), NaiveTime::from_hms_opt(5, 0, 0));
        assert_eq!(parse_race_time("soon"), None);
        assert_eq!(parse_date("2021-07-18"), NaiveDate::from_ymd_opt(2021, 7, 18));
    }

    #[test]
    fn test_dedup_keeps_first() {
        let rows = vec![(1, "a"), (2, "b"), (1, "c")];
        assert_eq!(dedup_by_key(rows, |r| r.0), vec![(1, "a"), (2, "b")]);
    }

    #[test]
    fn test_stage_hardness_and_names() {
        assert!(Stage::Results.is_hard());
        assert!(!Stage::SprintResults(2024).is_hard());
        assert_eq!(Stage::SessionsWeather(2024).to_string(), "OpenF1 Sessions & Weather 2024");
        assert_eq!(Stage::modern_core(2023)[0], Stage::Schedule(2023));
    }

    #[test]
    fn test_session_lookup_keyed() {
        let lookup = SessionLookup::new(vec![
            StoredSession {
                id: 1,
                race_id: 10,
                session_type: SessionType::Race,
                openf1_session_key: Some(9001),
            },
            StoredSession {
                id: 2,
                race_id: 10,
                session_type: SessionType::Qualifying,
                openf1_session_key: None,
            },
        ]);
        assert_eq!(lookup.get(10, SessionType::Qualifying).map(|s| s.id), Some(2));
        assert_eq!(lookup.keyed(SessionType::Race).len(), 1);
        assert_eq!(lookup.all_keyed().len(), 1);
    }
}
