//! Test helpers for pitlane-ingest integration tests
//!
//! This module provides:
//! - [`MemoryStore`], an in-memory [`Store`] with the same upsert and
//!   replacement semantics as the Postgres store
//! - Fixture builders for both upstream APIs (see [`fixtures`])

#![allow(dead_code)]

pub mod fixtures;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use pitlane_ingest::config::IngestConfig;
use pitlane_ingest::models::rows::{
    Candidate, CircuitRow, ConstructorRow, CountryRow, DriverRow, LapRow, NaturalKey, PitStopRow,
    QualifyingResultRow, RaceEventRow, RaceResultRow, RaceRow, ReplaceCount, SeasonRow, SessionRow,
    StandingRow, StandingsSnapshot, StoredCircuit, StoredConstructor, StoredDriver, StoredRace,
    StoredSeason, StoredSession, TireStintRow,
};
use pitlane_ingest::stages::IngestContext;
use pitlane_ingest::store::{LockStatus, Store};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub use fixtures::*;

/// Everything the in-memory store holds, keyed by id where the table has one
#[derive(Debug, Default, Clone)]
pub struct MemoryState {
    next_id: i64,
    pub seasons: BTreeMap<i64, SeasonRow>,
    pub countries: BTreeMap<i64, CountryRow>,
    pub circuits: BTreeMap<i64, CircuitRow>,
    pub constructors: BTreeMap<i64, ConstructorRow>,
    pub drivers: BTreeMap<i64, DriverRow>,
    pub races: BTreeMap<i64, RaceRow>,
    pub sessions: BTreeMap<i64, SessionRow>,
    pub race_results: Vec<RaceResultRow>,
    pub qualifying_results: Vec<QualifyingResultRow>,
    pub laps: Vec<LapRow>,
    pub pit_stops: Vec<PitStopRow>,
    pub tire_stints: Vec<TireStintRow>,
    pub race_events: Vec<RaceEventRow>,
    pub driver_standings: Vec<StandingRow>,
    pub constructor_standings: Vec<StandingRow>,
    pub lock: Option<(String, Instant)>,
    pub refreshed_views: Vec<String>,
    pub failing_views: HashSet<String>,
    /// Every lock owner that ever acquired the lock
    pub lock_history: Vec<String>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn season_id(&self, year: i32) -> Option<i64> {
        self.seasons.iter().find(|(_, s)| s.year == year).map(|(id, _)| *id)
    }

    pub fn driver_by_ref(&self, external_ref: &str) -> Option<(i64, &DriverRow)> {
        self.drivers
            .iter()
            .find(|(_, d)| d.external_ref.as_deref() == Some(external_ref))
            .map(|(id, d)| (*id, d))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    pub fn snapshot(&self) -> MemoryState {
        self.state().clone()
    }

    /// Seed a season and return its id
    pub fn seed_season(&self, year: i32) -> i64 {
        let mut state = self.state();
        let id = state.allocate_id();
        state.seasons.insert(id, SeasonRow { year });
        id
    }

    pub fn seed_circuit(&self, name: &str) -> i64 {
        let mut state = self.state();
        let id = state.allocate_id();
        state
            .circuits
            .insert(id, CircuitRow::new(name, None, "UNK".to_string(), None));
        id
    }

    pub fn seed_constructor(&self, name: &str) -> i64 {
        let mut state = self.state();
        let id = state.allocate_id();
        state.constructors.insert(
            id,
            ConstructorRow {
                name: name.to_string(),
                nationality: None,
                reference_url: None,
            },
        );
        id
    }

    pub fn seed_driver(&self, external_ref: &str, acronym: Option<&str>, number: Option<i32>, first: &str, last: &str) -> i64 {
        let mut state = self.state();
        let id = state.allocate_id();
        state.drivers.insert(
            id,
            DriverRow {
                external_ref: Some(external_ref.to_string()),
                number,
                first_name: first.to_string(),
                last_name: last.to_string(),
                acronym: acronym.map(str::to_string),
                country_code: None,
                date_of_birth: None,
            },
        );
        id
    }

    pub fn seed_race(&self, season_id: i64, circuit_id: i64, round: i32, name: &str, date: &str) -> i64 {
        let mut state = self.state();
        let id = state.allocate_id();
        state.races.insert(
            id,
            RaceRow {
                season_id,
                circuit_id,
                round,
                name: name.to_string(),
                date: chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
                time: None,
            },
        );
        id
    }

    pub fn seed_session(&self, row: SessionRow) -> i64 {
        let mut state = self.state();
        let id = state.allocate_id();
        state.sessions.insert(id, row);
        id
    }

    /// Make the lock look held by another run
    pub fn hold_lock(&self, owner: &str) {
        self.state().lock = Some((owner.to_string(), Instant::now() + Duration::from_secs(3600)));
    }

    pub fn fail_view(&self, view: &str) {
        self.state().failing_views.insert(view.to_string());
    }
}

fn replace<T: Clone>(table: &mut Vec<T>, belongs: impl Fn(&T) -> bool, rows: &[T]) -> ReplaceCount {
    let before = table.len();
    table.retain(|row| !belongs(row));
    let deleted = (before - table.len()) as u64;
    table.extend_from_slice(rows);
    ReplaceCount {
        deleted,
        inserted: rows.len() as u64,
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn seasons(&self) -> Result<Vec<StoredSeason>> {
        Ok(self
            .state()
            .seasons
            .iter()
            .map(|(id, s)| StoredSeason { id: *id, year: s.year })
            .collect())
    }

    async fn country_codes(&self) -> Result<Vec<String>> {
        Ok(self.state().countries.values().map(|c| c.code.clone()).collect())
    }

    async fn circuits(&self) -> Result<Vec<StoredCircuit>> {
        Ok(self
            .state()
            .circuits
            .iter()
            .map(|(id, c)| StoredCircuit {
                id: *id,
                name: c.name.clone(),
            })
            .collect())
    }

    async fn constructors(&self) -> Result<Vec<StoredConstructor>> {
        Ok(self
            .state()
            .constructors
            .iter()
            .map(|(id, c)| StoredConstructor {
                id: *id,
                name: c.name.clone(),
            })
            .collect())
    }

    async fn drivers(&self) -> Result<Vec<StoredDriver>> {
        Ok(self
            .state()
            .drivers
            .iter()
            .map(|(id, d)| StoredDriver {
                id: *id,
                external_ref: d.external_ref.clone(),
                acronym: d.acronym.clone(),
                number: d.number,
                first_name: d.first_name.clone(),
                last_name: d.last_name.clone(),
            })
            .collect())
    }

    async fn races_for_season(&self, year: i32) -> Result<Vec<StoredRace>> {
        let state = self.state();
        let Some(season_id) = state.season_id(year) else {
            return Ok(Vec::new());
        };
        let mut races: Vec<StoredRace> = state
            .races
            .iter()
            .filter(|(_, r)| r.season_id == season_id)
            .map(|(id, r)| StoredRace {
                id: *id,
                season_id,
                year,
                round: r.round,
                name: r.name.clone(),
                date: r.date,
            })
            .collect();
        races.sort_by_key(|r| r.round);
        Ok(races)
    }

    async fn sessions_for_races(&self, race_ids: &[i64]) -> Result<Vec<StoredSession>> {
        Ok(self
            .state()
            .sessions
            .iter()
            .filter(|(_, s)| race_ids.contains(&s.race_id))
            .map(|(id, s)| StoredSession {
                id: *id,
                race_id: s.race_id,
                session_type: s.session_type,
                openf1_session_key: s.openf1_session_key,
            })
            .collect())
    }

    async fn find_id(&self, key: &NaturalKey) -> Result<Option<i64>> {
        let state = self.state();
        let found = match key {
            NaturalKey::Season(year) => state.season_id(*year),
            NaturalKey::Country(code) => state.countries.iter().find(|(_, c)| &c.code == code).map(|(id, _)| *id),
            NaturalKey::Circuit(name) => state.circuits.iter().find(|(_, c)| &c.name == name).map(|(id, _)| *id),
            NaturalKey::Constructor(name) => state
                .constructors
                .iter()
                .find(|(_, c)| &c.name == name)
                .map(|(id, _)| *id),
            NaturalKey::DriverRef(external_ref) => state.driver_by_ref(external_ref).map(|(id, _)| id),
            NaturalKey::DriverAcronym(acronym) => state
                .drivers
                .iter()
                .find(|(_, d)| d.acronym.as_deref() == Some(acronym.as_str()))
                .map(|(id, _)| *id),
            NaturalKey::Race { season_id, round } => state
                .races
                .iter()
                .find(|(_, r)| r.season_id == *season_id && r.round == *round)
                .map(|(id, _)| *id),
            NaturalKey::Session { race_id, session_type } => state
                .sessions
                .iter()
                .find(|(_, s)| s.race_id == *race_id && s.session_type == *session_type)
                .map(|(id, _)| *id),
        };
        Ok(found)
    }

    async fn insert(&self, candidate: &Candidate) -> Result<i64> {
        let mut state = self.state();
        let id = state.allocate_id();
        match candidate.clone() {
            Candidate::Season(row) => {
                state.seasons.insert(id, row);
            },
            Candidate::Country(row) => {
                state.countries.insert(id, row);
            },
            Candidate::Circuit(row) => {
                state.circuits.insert(id, row);
            },
            Candidate::Constructor(row) => {
                state.constructors.insert(id, row);
            },
            Candidate::Driver(row) => {
                state.drivers.insert(id, row);
            },
            Candidate::Race(row) => {
                state.races.insert(id, row);
            },
            Candidate::Session(row) => {
                state.sessions.insert(id, row);
            },
        }
        Ok(id)
    }

    async fn update(&self, id: i64, candidate: &Candidate) -> Result<()> {
        let mut state = self.state();
        let missing = || anyhow!("no {} row with id {}", candidate.kind(), id);
        match candidate.clone() {
            Candidate::Season(row) => *state.seasons.get_mut(&id).ok_or_else(missing)? = row,
            Candidate::Country(row) => *state.countries.get_mut(&id).ok_or_else(missing)? = row,
            Candidate::Circuit(row) => *state.circuits.get_mut(&id).ok_or_else(missing)? = row,
            Candidate::Constructor(row) => *state.constructors.get_mut(&id).ok_or_else(missing)? = row,
            Candidate::Driver(row) => {
                let stored = state.drivers.get_mut(&id).ok_or_else(missing)?;
                *stored = DriverRow {
                    external_ref: row.external_ref.or(stored.external_ref.take()),
                    number: row.number.or(stored.number),
                    acronym: row.acronym.or(stored.acronym.take()),
                    country_code: row.country_code.or(stored.country_code.take()),
                    date_of_birth: row.date_of_birth.or(stored.date_of_birth),
                    first_name: row.first_name,
                    last_name: row.last_name,
                };
            },
            Candidate::Race(row) => *state.races.get_mut(&id).ok_or_else(missing)? = row,
            Candidate::Session(row) => {
                let stored = state.sessions.get_mut(&id).ok_or_else(missing)?;
                *stored = SessionRow {
                    race_id: row.race_id,
                    session_type: row.session_type,
                    start_time: row.start_time.or(stored.start_time),
                    openf1_session_key: row.openf1_session_key.or(stored.openf1_session_key),
                    weather: row.weather.or(stored.weather.take()),
                };
            },
        }
        Ok(())
    }

    async fn replace_race_results(&self, session_id: i64, rows: &[RaceResultRow]) -> Result<ReplaceCount> {
        Ok(replace(&mut self.state().race_results, |r| r.session_id == session_id, rows))
    }

    async fn replace_qualifying_results(
        &self,
        session_id: i64,
        rows: &[QualifyingResultRow],
    ) -> Result<ReplaceCount> {
        Ok(replace(&mut self.state().qualifying_results, |r| r.session_id == session_id, rows))
    }

    async fn replace_laps(&self, race_id: i64, rows: &[LapRow]) -> Result<ReplaceCount> {
        Ok(replace(&mut self.state().laps, |r| r.race_id == race_id, rows))
    }

    async fn replace_pit_stops(&self, race_id: i64, rows: &[PitStopRow]) -> Result<ReplaceCount> {
        Ok(replace(&mut self.state().pit_stops, |r| r.race_id == race_id, rows))
    }

    async fn replace_tire_stints(&self, session_id: i64, rows: &[TireStintRow]) -> Result<ReplaceCount> {
        Ok(replace(&mut self.state().tire_stints, |r| r.session_id == session_id, rows))
    }

    async fn replace_race_events(&self, session_id: i64, rows: &[RaceEventRow]) -> Result<ReplaceCount> {
        Ok(replace(&mut self.state().race_events, |r| r.session_id == session_id, rows))
    }

    async fn rebuild_standings(&self, snapshot: &StandingsSnapshot) -> Result<ReplaceCount> {
        let mut state = self.state();
        let deleted = (state.driver_standings.len() + state.constructor_standings.len()) as u64;
        state.driver_standings = snapshot.drivers.clone();
        state.constructor_standings = snapshot.constructors.clone();
        Ok(ReplaceCount {
            deleted,
            inserted: snapshot.len() as u64,
        })
    }

    async fn try_acquire_run_lock(&self, owner: &str, ttl: Duration) -> Result<LockStatus> {
        let mut state = self.state();
        if let Some((holder, expires_at)) = &state.lock {
            if *expires_at > Instant::now() {
                return Ok(LockStatus::HeldBy(holder.clone()));
            }
        }
        state.lock = Some((owner.to_string(), Instant::now() + ttl));
        state.lock_history.push(owner.to_string());
        Ok(LockStatus::Acquired)
    }

    async fn release_run_lock(&self, owner: &str) -> Result<()> {
        let mut state = self.state();
        if state.lock.as_ref().is_some_and(|(holder, _)| holder == owner) {
            state.lock = None;
        }
        Ok(())
    }

    async fn refresh_materialized_view(&self, view: &str) -> Result<()> {
        let mut state = self.state();
        if state.failing_views.contains(view) {
            bail!("relation \"{}\" does not exist", view);
        }
        state.refreshed_views.push(view.to_string());
        Ok(())
    }
}

/// Context wired to an in-memory store and the given upstream mocks
pub fn context(store: Arc<MemoryStore>, config: IngestConfig) -> IngestContext {
    IngestContext::new(store, config).unwrap()
}
