//! Modern session keys, start times and weather for one season
//!
//! Meetings are matched to stored races by event name, falling back to the
//! race that falls within a few days of the meeting start. Where a weekend has
//! several sessions of one type (three practices), the latest one is kept.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use pitlane_common::types::{SessionType, StagePhase, StageStats};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::IngestContext;
use crate::models::modern::{parse_timestamp, Meeting, Session, Weather};
use crate::models::rows::{Candidate, SessionRow, StoredRace, WeatherSnapshot};
use crate::resolver::normalize_event_name;

/// Days between a meeting's first session and race day
const MEETING_SPAN_DAYS: i64 = 4;

pub async fn run(ctx: &IngestContext, year: i32, stats: &mut StageStats) -> Result<()> {
    stats.enter(StagePhase::Resolving);
    if ctx.season_id(year).await?.is_none() {
        warn!(year, "Season not stored, skipping modern sessions");
        return Ok(());
    }
    let races = ctx.store.races_for_season(year).await?;
    if races.is_empty() {
        warn!(year, "No races stored for season, skipping modern sessions");
        return Ok(());
    }

    stats.enter(StagePhase::Fetching);
    let query = [("year", year.to_string())];
    let meetings: Vec<Meeting> = ctx.modern.fetch("/meetings", &query).await.context("meetings fetch")?;
    let sessions: Vec<Session> = ctx.modern.fetch("/sessions", &query).await.context("sessions fetch")?;

    stats.enter(StagePhase::Resolving);
    let meeting_races: HashMap<i64, i64> = meetings
        .iter()
        .filter_map(|m| match_meeting(m, &races).map(|race_id| (m.meeting_key, race_id)))
        .collect();
    let chosen = latest_per_type(&sessions, &meeting_races, stats);

    stats.enter(StagePhase::Writing);
    for ((race_id, session_type), session) in chosen {
        let weather = match first_weather(ctx, session.session_key).await {
            Ok(weather) => weather,
            Err(e) => {
                warn!(session_key = session.session_key, error = %e, "Weather fetch failed, writing session without it");
                None
            },
        };
        let row = SessionRow {
            race_id,
            session_type,
            start_time: session.start_time(),
            openf1_session_key: Some(session.session_key),
            weather,
        };
        match ctx.writer.upsert(&Candidate::Session(row)).await {
            Ok(outcome) => stats.record(outcome),
            Err(e) => {
                warn!(session_key = session.session_key, error = %e, "Failed to write session");
                stats.inc_failed();
            },
        }
    }

    info!(year, meetings = meetings.len(), matched = meeting_races.len(), "Modern sessions written");
    Ok(())
}

/// Stored race for a meeting: same event name, else the race within the
/// meeting's span
fn match_meeting(meeting: &Meeting, races: &[StoredRace]) -> Option<i64> {
    let wanted = normalize_event_name(&meeting.meeting_name);
    if let Some(race) = races.iter().find(|r| normalize_event_name(&r.name) == wanted) {
        return Some(race.id);
    }

    let start = meeting
        .date_start
        .as_deref()
        .and_then(parse_timestamp)
        .map(|ts| ts.date_naive())?;
    let race = races.iter().find(|r| within_span(start, r.date))?;
    warn!(meeting = %meeting.meeting_name, race = %race.name, "Meeting matched to race by date");
    Some(race.id)
}

fn within_span(meeting_start: NaiveDate, race_date: NaiveDate) -> bool {
    let days = (race_date - meeting_start).num_days();
    (0..=MEETING_SPAN_DAYS).contains(&days)
}

/// Keep one session per `(race, type)`, the one that starts last
fn latest_per_type<'a>(
    sessions: &'a [Session],
    meeting_races: &HashMap<i64, i64>,
    stats: &mut StageStats,
) -> Vec<((i64, SessionType), &'a Session)> {
    let mut chosen: HashMap<(i64, SessionType), (&Session, Option<DateTime<Utc>>)> = HashMap::new();

    for session in sessions {
        let Some(race_id) = meeting_races.get(&session.meeting_key).copied() else {
            debug!(session_key = session.session_key, meeting_key = session.meeting_key, "Session outside any stored race");
            continue;
        };
        let Some(session_type) = SessionType::classify(&session.session_name) else {
            warn!(session = %session.session_name, "Unknown session type, skipping");
            stats.inc_skipped();
            continue;
        };

        let start = session.start_time();
        chosen
            .entry((race_id, session_type))
            .and_modify(|current| {
                if start > current.1 {
                    *current = (session, start);
                }
            })
            .or_insert((session, start));
    }

    let mut chosen: Vec<_> = chosen.into_iter().map(|(key, (session, _))| (key, session)).collect();
    chosen.sort_by_key(|((race_id, ty), _)| (*race_id, ty.as_str()));
    chosen
}

async fn first_weather(ctx: &IngestContext, session_key: i64) -> Result<Option<WeatherSnapshot>> {
    let readings: Vec<Weather> = ctx
        .modern
        .fetch("/weather", &[("session_key", session_key.to_string())])
        .await?;
    Ok(readings.into_iter().next().map(|w| WeatherSnapshot {
        air_temperature: w.air_temperature,
        track_temperature: w.track_temperature,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn session(key: i64, meeting: i64, name: &str, start: &str) -> Session {
        serde_json::from_value(serde_json::json!({
            "session_key": key, "meeting_key": meeting, "session_name": name, "date_start": start
        }))
        .unwrap()
    }

    fn race(id: i64, name: &str, date: &str) -> StoredRace {
        StoredRace {
            id,
            season_id: 1,
            year: 2024,
            round: id as i32,
            name: name.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        }
    }

    #[test]
    fn test_latest_practice_wins() {
        let sessions = vec![
            session(1, 100, "Practice 1", "2024-03-01T11:30:00+00:00"),
            session(3, 100, "Practice 3", "2024-03-02T12:30:00+00:00"),
            session(2, 100, "Practice 2", "2024-03-01T15:00:00+00:00"),
            session(4, 100, "Race", "2024-03-02T15:00:00+00:00"),
            session(5, 100, "Day 1", "2024-02-21T07:00:00+00:00"),
            session(6, 999, "Race", "2024-03-09T17:00:00+00:00"),
        ];
        let meeting_races = HashMap::from([(100, 10)]);
        let mut stats = StageStats::new("sessions");

        let chosen = latest_per_type(&sessions, &meeting_races, &mut stats);
        let keys: Vec<(SessionType, i64)> = chosen.iter().map(|((_, ty), s)| (*ty, s.session_key)).collect();
        assert_eq!(keys, vec![(SessionType::Practice, 3), (SessionType::Race, 4)]);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_meeting_matches_by_name_then_date() {
        let races = vec![race(1, "Bahrain Grand Prix", "2024-03-02"), race(2, "Saudi Arabian Grand Prix", "2024-03-09")];
        let by_name: Meeting = serde_json::from_value(serde_json::json!({
            "meeting_key": 1, "meeting_name": "bahrain  grand prix"
        }))
        .unwrap();
        assert_eq!(match_meeting(&by_name, &races), Some(1));

        let by_date: Meeting = serde_json::from_value(serde_json::json!({
            "meeting_key": 2, "meeting_name": "Jeddah Night Race", "date_start": "2024-03-07T13:30:00+00:00"
        }))
        .unwrap();
        assert_eq!(match_meeting(&by_date, &races), Some(2));

        let testing: Meeting = serde_json::from_value(serde_json::json!({
            "meeting_key": 3, "meeting_name": "Pre-Season Testing", "date_start": "2024-02-21T07:00:00+00:00"
        }))
        .unwrap();
        assert_eq!(match_meeting(&testing, &races), None);
    }
}
