//! Records returned by the OpenF1 API

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Meeting {
    pub meeting_key: i64,
    pub meeting_name: String,
    #[serde(default)]
    pub meeting_official_name: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub date_start: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub session_key: i64,
    pub meeting_key: i64,
    pub session_name: String,
    #[serde(default)]
    pub session_type: Option<String>,
    #[serde(default)]
    pub date_start: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
}

impl Session {
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.date_start.as_deref().and_then(parse_timestamp)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Weather {
    #[serde(default)]
    pub air_temperature: Option<f64>,
    #[serde(default)]
    pub track_temperature: Option<f64>,
    #[serde(default)]
    pub date: Option<String>,
}

/// Entry of `/drivers?session_key=`
#[derive(Debug, Clone, Deserialize)]
pub struct SessionDriver {
    pub driver_number: i32,
    #[serde(default)]
    pub name_acronym: Option<String>,
    #[serde(default)]
    pub team_name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Stint {
    pub driver_number: i32,
    pub stint_number: i32,
    #[serde(default)]
    pub lap_start: Option<i32>,
    #[serde(default)]
    pub lap_end: Option<i32>,
    #[serde(default)]
    pub compound: Option<String>,
    #[serde(default)]
    pub tyre_age_at_start: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RaceControl {
    pub date: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Lap {
    pub driver_number: i32,
    pub lap_number: i32,
    /// Seconds; absent for laps that were not timed
    #[serde(default)]
    pub lap_duration: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pit {
    pub driver_number: i32,
    pub lap_number: i32,
    /// Pit-lane time in seconds
    #[serde(default)]
    pub pit_duration: Option<f64>,
    #[serde(default)]
    pub date: Option<String>,
}

/// Classification time: one value for races, one per segment for qualifying
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResultDuration {
    Single(Option<f64>),
    Segments(Vec<Option<f64>>),
}

impl ResultDuration {
    /// Segment times in milliseconds, padded to three entries
    pub fn segments_ms(&self) -> [Option<i64>; 3] {
        let mut out = [None; 3];
        match self {
            ResultDuration::Single(value) => out[0] = value.and_then(seconds_to_ms),
            ResultDuration::Segments(values) => {
                for (slot, value) in out.iter_mut().zip(values) {
                    *slot = value.and_then(seconds_to_ms);
                }
            },
        }
        out
    }
}

/// Entry of `/session_result?session_key=`
#[derive(Debug, Clone, Deserialize)]
pub struct SessionResult {
    pub driver_number: i32,
    #[serde(default)]
    pub position: Option<i32>,
    #[serde(default)]
    pub duration: Option<ResultDuration>,
}

/// Convert fractional seconds to whole milliseconds
pub fn seconds_to_ms(seconds: f64) -> Option<i64> {
    if seconds.is_finite() && seconds >= 0.0 {
        Some((seconds * 1000.0).round() as i64)
    } else {
        None
    }
}

/// Parse an OpenF1 timestamp. Offsets are honored; naive values are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_timestamp_variants() {
        let with_offset = parse_timestamp("2024-03-02T15:00:00+00:00").unwrap();
        assert_eq!(with_offset.hour(), 15);

        let shifted = parse_timestamp("2024-03-02T18:00:00+03:00").unwrap();
        assert_eq!(shifted, with_offset);

        let naive = parse_timestamp("2024-03-02T15:00:00.250").unwrap();
        assert_eq!(naive.timestamp_subsec_millis(), 250);

        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_result_duration_shapes() {
        let race: SessionResult =
            serde_json::from_str(r#"{"driver_number":1,"position":1,"duration":5400.123}"#).unwrap();
        assert_eq!(race.duration.unwrap().segments_ms(), [Some(5_400_123), None, None]);

        let quali: SessionResult =
            serde_json::from_str(r#"{"driver_number":4,"position":2,"duration":[90.5,89.75,null]}"#).unwrap();
        assert_eq!(quali.duration.unwrap().segments_ms(), [Some(90_500), Some(89_750), None]);
    }

    #[test]
    fn test_seconds_to_ms_rejects_negative() {
        assert_eq!(seconds_to_ms(22.4), Some(22_400));
        assert_eq!(seconds_to_ms(-1.0), None);
        assert_eq!(seconds_to_ms(f64::NAN), None);
    }
}
