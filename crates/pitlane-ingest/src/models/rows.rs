//! Rows read from and written to the relational store

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use pitlane_common::types::SessionType;
use serde::{Deserialize, Serialize};

/// Store column bound for `circuits.name`
pub const CIRCUIT_NAME_MAX_CHARS: usize = 100;

// ============================================================================
// Upsertable entities
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonRow {
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountryRow {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitRow {
    pub name: String,
    pub locality: Option<String>,
    pub country_code: String,
    pub reference_url: Option<String>,
}

impl CircuitRow {
    /// Build a row, truncating the name to the stored width
    pub fn new(
        name: &str,
        locality: Option<String>,
        country_code: String,
        reference_url: Option<String>,
    ) -> Self {
        Self {
            name: truncate_chars(name.trim(), CIRCUIT_NAME_MAX_CHARS),
            locality,
            country_code,
            reference_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorRow {
    pub name: String,
    pub nationality: Option<String>,
    pub reference_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverRow {
    /// Historical API identifier such as `max_verstappen`
    pub external_ref: Option<String>,
    pub number: Option<i32>,
    pub first_name: String,
    pub last_name: String,
    /// Three-letter code such as `VER`
    pub acronym: Option<String>,
    pub country_code: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RaceRow {
    pub season_id: i64,
    pub circuit_id: i64,
    pub round: i32,
    pub name: String,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
}

/// Conditions captured at the start of a session, stored as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub air_temperature: Option<f64>,
    pub track_temperature: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRow {
    pub race_id: i64,
    pub session_type: SessionType,
    pub start_time: Option<DateTime<Utc>>,
    pub openf1_session_key: Option<i64>,
    pub weather: Option<WeatherSnapshot>,
}

impl SessionRow {
    /// Session known only by its race and type
    pub fn bare(race_id: i64, session_type: SessionType) -> Self {
        Self {
            race_id,
            session_type,
            start_time: None,
            openf1_session_key: None,
            weather: None,
        }
    }
}

/// Natural key of an upsertable entity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NaturalKey {
    Season(i32),
    Country(String),
    Circuit(String),
    Constructor(String),
    DriverRef(String),
    DriverAcronym(String),
    Race { season_id: i64, round: i32 },
    Session { race_id: i64, session_type: SessionType },
}

/// A row proposed for create-or-update
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    Season(SeasonRow),
    Country(CountryRow),
    Circuit(CircuitRow),
    Constructor(ConstructorRow),
    Driver(DriverRow),
    Race(RaceRow),
    Session(SessionRow),
}

impl Candidate {
    /// Entity name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Candidate::Season(_) => "season",
            Candidate::Country(_) => "country",
            Candidate::Circuit(_) => "circuit",
            Candidate::Constructor(_) => "constructor",
            Candidate::Driver(_) => "driver",
            Candidate::Race(_) => "race",
            Candidate::Session(_) => "session",
        }
    }

    /// `None` when the row carries no usable identity
    pub fn natural_key(&self) -> Option<NaturalKey> {
        match self {
            Candidate::Season(row) => Some(NaturalKey::Season(row.year)),
            Candidate::Country(row) => non_blank(&row.code).map(NaturalKey::Country),
            Candidate::Circuit(row) => non_blank(&row.name).map(NaturalKey::Circuit),
            Candidate::Constructor(row) => non_blank(&row.name).map(NaturalKey::Constructor),
            Candidate::Driver(row) => match row.external_ref.as_deref().and_then(non_blank) {
                Some(external_ref) => Some(NaturalKey::DriverRef(external_ref)),
                None => row
                    .acronym
                    .as_deref()
                    .and_then(non_blank)
                    .map(NaturalKey::DriverAcronym),
            },
            Candidate::Race(row) => Some(NaturalKey::Race {
                season_id: row.season_id,
                round: row.round,
            }),
            Candidate::Session(row) => Some(NaturalKey::Session {
                race_id: row.race_id,
                session_type: row.session_type,
            }),
        }
    }
}

// ============================================================================
// Bulk-replaced rows
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RaceResultRow {
    pub session_id: i64,
    pub driver_id: i64,
    pub constructor_id: Option<i64>,
    pub position: Option<i32>,
    pub points: Option<f64>,
    pub grid: Option<i32>,
    pub laps: Option<i32>,
    pub status: Option<String>,
    pub time_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualifyingResultRow {
    pub session_id: i64,
    pub driver_id: i64,
    pub constructor_id: Option<i64>,
    pub position: Option<i32>,
    pub q1_ms: Option<i64>,
    pub q2_ms: Option<i64>,
    pub q3_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LapRow {
    pub race_id: i64,
    pub driver_id: i64,
    pub lap_number: i32,
    pub position: Option<i32>,
    pub time_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PitStopRow {
    pub race_id: i64,
    pub driver_id: i64,
    pub stop_number: i32,
    pub lap_number: i32,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TireStintRow {
    pub session_id: i64,
    pub driver_id: i64,
    pub stint_number: i32,
    pub lap_start: Option<i32>,
    pub lap_end: Option<i32>,
    pub compound: Option<String>,
    pub tyre_age_at_start: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RaceEventRow {
    pub session_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub category: Option<String>,
    pub flag: Option<String>,
    pub message: Option<String>,
}

/// Championship position after a race; `entity_id` is a driver or constructor
#[derive(Debug, Clone, PartialEq)]
pub struct StandingRow {
    pub race_id: i64,
    pub entity_id: i64,
    pub season: i32,
    pub points: f64,
    pub position: Option<i32>,
    pub wins: i32,
}

/// Every standing of every season, written as one replacement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StandingsSnapshot {
    pub drivers: Vec<StandingRow>,
    pub constructors: Vec<StandingRow>,
}

impl StandingsSnapshot {
    pub fn len(&self) -> usize {
        self.drivers.len() + self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty() && self.constructors.is_empty()
    }
}

/// Rows removed and written by one `replace_*` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceCount {
    pub deleted: u64,
    pub inserted: u64,
}

// ============================================================================
// Lookup rows
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct StoredSeason {
    pub id: i64,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredCircuit {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredConstructor {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDriver {
    pub id: i64,
    pub external_ref: Option<String>,
    pub acronym: Option<String>,
    pub number: Option<i32>,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRace {
    pub id: i64,
    pub season_id: i64,
    pub year: i32,
    pub round: i32,
    pub name: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub id: i64,
    pub race_id: i64,
    pub session_type: SessionType,
    pub openf1_session_key: Option<i64>,
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
