//! Records returned by the historical (Ergast-compatible) API
//!
//! Field names follow the upstream payloads. Numbers arrive as strings and are
//! parsed by the stages, so a single malformed value only affects its own row.
//! Nested references (`Driver`, `Constructor`, `Circuit`) are optional because
//! the upstream occasionally omits them for old seasons.

use serde::Deserialize;

use super::Lenient;
use crate::fetch::PageRecord;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiLocation {
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCircuit {
    #[serde(rename = "circuitId")]
    pub circuit_id: String,
    #[serde(rename = "circuitName")]
    pub circuit_name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "Location", default)]
    pub location: Option<ApiLocation>,
}

impl PageRecord for ApiCircuit {}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConstructor {
    #[serde(rename = "constructorId", default)]
    pub constructor_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl PageRecord for ApiConstructor {}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiDriver {
    #[serde(rename = "driverId")]
    pub driver_id: String,
    #[serde(rename = "permanentNumber", default)]
    pub permanent_number: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(rename = "givenName")]
    pub given_name: String,
    #[serde(rename = "familyName")]
    pub family_name: String,
    #[serde(rename = "dateOfBirth", default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl PageRecord for ApiDriver {}

/// Circuit reference embedded in a race
#[derive(Debug, Clone, Deserialize)]
pub struct ApiCircuitRef {
    #[serde(rename = "circuitId")]
    pub circuit_id: String,
    #[serde(rename = "circuitName", default)]
    pub circuit_name: Option<String>,
}

/// Date and time of a weekend sub-event such as the sprint
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSchedule {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiRace {
    pub season: String,
    pub round: String,
    #[serde(rename = "raceName")]
    pub race_name: String,
    #[serde(rename = "Circuit", default)]
    pub circuit: Option<ApiCircuitRef>,
    pub date: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(rename = "Sprint", default)]
    pub sprint: Option<ApiSchedule>,
}

impl PageRecord for ApiRace {}

impl ApiRace {
    pub fn is_sprint_weekend(&self) -> bool {
        self.sprint.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiDriverRef {
    #[serde(rename = "driverId")]
    pub driver_id: String,
    #[serde(rename = "permanentNumber", default)]
    pub permanent_number: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(rename = "givenName", default)]
    pub given_name: Option<String>,
    #[serde(rename = "familyName", default)]
    pub family_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConstructorRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiDuration {
    #[serde(default)]
    pub millis: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiResult {
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub points: Option<String>,
    #[serde(default)]
    pub grid: Option<String>,
    #[serde(default)]
    pub laps: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "Driver", default)]
    pub driver: Option<ApiDriverRef>,
    #[serde(rename = "Constructor", default)]
    pub constructor: Option<ApiConstructorRef>,
    #[serde(rename = "Time", default)]
    pub time: Option<ApiDuration>,
}

impl ApiResult {
    pub fn time_ms(&self) -> Option<i64> {
        self.time
            .as_ref()
            .and_then(|t| t.millis.as_deref())
            .and_then(|m| m.trim().parse().ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiQualifyingResult {
    #[serde(default)]
    pub position: Option<String>,
    #[serde(rename = "Driver", default)]
    pub driver: Option<ApiDriverRef>,
    #[serde(rename = "Constructor", default)]
    pub constructor: Option<ApiConstructorRef>,
    #[serde(rename = "Q1", default)]
    pub q1: Option<String>,
    #[serde(rename = "Q2", default)]
    pub q2: Option<String>,
    #[serde(rename = "Q3", default)]
    pub q3: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTiming {
    #[serde(rename = "driverId")]
    pub driver_id: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiLap {
    pub number: String,
    #[serde(rename = "Timings", default)]
    pub timings: Vec<Lenient<ApiTiming>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiPitStop {
    #[serde(rename = "driverId")]
    pub driver_id: String,
    pub lap: String,
    pub stop: String,
    #[serde(default)]
    pub duration: Option<String>,
}

/// Race envelope of `/{year}/{round}/results`
#[derive(Debug, Clone, Deserialize)]
pub struct RaceWithResults {
    pub round: String,
    #[serde(rename = "Results", default)]
    pub results: Vec<Lenient<ApiResult>>,
}

impl PageRecord for RaceWithResults {
    fn record_count(&self) -> usize {
        self.results.len()
    }
}

/// Race envelope of `/{year}/{round}/sprint`
#[derive(Debug, Clone, Deserialize)]
pub struct RaceWithSprint {
    pub round: String,
    #[serde(rename = "SprintResults", default)]
    pub results: Vec<Lenient<ApiResult>>,
}

impl PageRecord for RaceWithSprint {
    fn record_count(&self) -> usize {
        self.results.len()
    }
}

/// Race envelope of `/{year}/{round}/qualifying`
#[derive(Debug, Clone, Deserialize)]
pub struct RaceWithQualifying {
    pub round: String,
    #[serde(rename = "QualifyingResults", default)]
    pub results: Vec<Lenient<ApiQualifyingResult>>,
}

impl PageRecord for RaceWithQualifying {
    fn record_count(&self) -> usize {
        self.results.len()
    }
}

/// Race envelope of `/{year}/{round}/laps`
#[derive(Debug, Clone, Deserialize)]
pub struct RaceWithLaps {
    pub round: String,
    #[serde(rename = "Laps", default)]
    pub laps: Vec<ApiLap>,
}

impl PageRecord for RaceWithLaps {
    fn record_count(&self) -> usize {
        self.laps.iter().map(|lap| lap.timings.len()).sum()
    }
}

/// Race envelope of `/{year}/{round}/pitstops`
#[derive(Debug, Clone, Deserialize)]
pub struct RaceWithPitStops {
    pub round: String,
    #[serde(rename = "PitStops", default)]
    pub pit_stops: Vec<Lenient<ApiPitStop>>,
}

impl PageRecord for RaceWithPitStops {
    fn record_count(&self) -> usize {
        self.pit_stops.len()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiDriverStanding {
    pub position: Option<String>,
    pub points: String,
    pub wins: String,
    #[serde(rename = "Driver")]
    pub driver: ApiDriverRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConstructorStanding {
    pub position: Option<String>,
    pub points: String,
    pub wins: String,
    #[serde(rename = "Constructor")]
    pub constructor: ApiConstructorRef,
}

/// One entry of `StandingsLists`
#[derive(Debug, Clone, Deserialize)]
pub struct StandingsList {
    pub season: String,
    pub round: String,
    #[serde(rename = "DriverStandings", default)]
    pub driver_standings: Vec<ApiDriverStanding>,
    #[serde(rename = "ConstructorStandings", default)]
    pub constructor_standings: Vec<ApiConstructorStanding>,
}

impl PageRecord for StandingsList {
    fn record_count(&self) -> usize {
        self.driver_standings.len() + self.constructor_standings.len()
    }
}

/// Parse an integer field such as `"12"`
pub fn parse_int(raw: Option<&str>) -> Option<i32> {
    raw.and_then(|s| s.trim().parse().ok())
}

/// Parse a points value such as `"25"` or `"0.5"`
pub fn parse_points(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|p| p.is_finite())
}

/// Convert a lap or pit duration to milliseconds.
///
/// Accepts `SS.fff`, `M:SS.fff` and `H:MM:SS.fff`. The fraction is read as
/// milliseconds, so `"1:30.5"` is 90 500 ms. Returns `None` for anything else.
pub fn time_to_ms(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let (clock, fraction) = match raw.split_once('.') {
        Some((clock, fraction)) => (clock, Some(fraction)),
        None => (raw, None),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    let mut seconds: i64 = 0;
    for part in &parts {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        seconds = seconds.checked_mul(60)?.checked_add(part.parse::<i64>().ok()?)?;
    }

    let millis = match fraction {
        None => 0,
        Some(f) if !f.is_empty() && f.len() <= 3 && f.chars().all(|c| c.is_ascii_digit()) => {
            format!("{:0<3}", f).parse::<i64>().ok()?
        },
        Some(_) => return None,
    };

    seconds.checked_mul(1000)?.checked_add(millis)
}
