//! Classification, laps and pit stops for one modern season
//!
//! Results and qualifying come from the historical API. Laps and pit stops
//! come from the modern API, keyed by the race session's modern key.

use anyhow::{Context, Result};
use pitlane_common::types::{SessionType, StagePhase, StageStats};
use std::collections::HashSet;
use tracing::{error, info, warn};

use super::granular::SessionEntrants;
use super::results::ingest_classification;
use super::{dedup_by_key, IngestContext};
use crate::models::modern::{seconds_to_ms, Lap, Pit};
use crate::models::rows::{LapRow, PitStopRow, StoredRace};
use crate::resolver::DriverIndex;

pub async fn run(ctx: &IngestContext, year: i32, stats: &mut StageStats) -> Result<()> {
    stats.enter(StagePhase::Resolving);
    let (races, sessions) = ctx.race_weekends(year).await?;
    if races.is_empty() {
        warn!(year, "No races stored for season, skipping modern results");
        return Ok(());
    }
    let (drivers, constructors) = ctx.participant_indexes().await?;

    let mut succeeded = 0usize;
    let mut failed = 0usize;

    stats.enter(StagePhase::Writing);
    for race in &races {
        let outcome = async {
            ingest_classification(ctx, race, &sessions, &drivers, &constructors, stats).await?;
            match sessions.get(race.id, SessionType::Race).and_then(|s| s.openf1_session_key) {
                Some(session_key) => ingest_modern_timing(ctx, race, session_key, &drivers, stats).await,
                None => {
                    warn!(race = %race.name, "Race session has no modern key, skipping laps and pit stops");
                    Ok(())
                },
            }
        }
        .await;

        match outcome {
            Ok(()) => succeeded += 1,
            Err(e) => {
                error!("✗ {} {} modern results failed: {:#}", race.year, race.name, e);
                stats.inc_failed();
                failed += 1;
            },
        }
        tokio::time::sleep(ctx.config.race_delay()).await;
    }

    info!(
        "Modern results for {} completed: {} races succeeded, {} failed",
        year, succeeded, failed
    );
    Ok(())
}

async fn ingest_modern_timing(
    ctx: &IngestContext,
    race: &StoredRace,
    session_key: i64,
    drivers: &DriverIndex,
    stats: &mut StageStats,
) -> Result<()> {
    let query = [("session_key", session_key.to_string())];
    let entrants = SessionEntrants::load(ctx, session_key, drivers).await?;
    let laps: Vec<Lap> = ctx.modern.fetch("/laps", &query).await.context("laps fetch")?;
    let pits: Vec<Pit> = ctx.modern.fetch("/pit", &query).await.context("pit fetch")?;

    let lap_rows = lap_rows(race.id, &laps, &entrants, stats);
    if !lap_rows.is_empty() {
        let count = ctx.store.replace_laps(race.id, &lap_rows).await?;
        stats.add_replaced(count.deleted, count.inserted);
    }

    let stop_rows = pit_stop_rows(race.id, pits, &entrants, stats);
    if !stop_rows.is_empty() {
        let count = ctx.store.replace_pit_stops(race.id, &stop_rows).await?;
        stats.add_replaced(count.deleted, count.inserted);
    }
    Ok(())
}

fn lap_rows(race_id: i64, laps: &[Lap], entrants: &SessionEntrants, stats: &mut StageStats) -> Vec<LapRow> {
    let mut rows = Vec::with_capacity(laps.len());
    let mut unresolved = HashSet::new();
    for lap in laps {
        let Some(driver_id) = entrants.driver(lap.driver_number) else {
            if unresolved.insert(lap.driver_number) {
                warn!(race_id, number = lap.driver_number, "Unresolved car in laps, dropping its laps");
            }
            stats.inc_skipped();
            continue;
        };
        rows.push(LapRow {
            race_id,
            driver_id,
            lap_number: lap.lap_number,
            position: None,
            time_ms: lap.lap_duration.and_then(seconds_to_ms),
        });
    }
    dedup_by_key(rows, |r| (r.driver_id, r.lap_number))
}

/// Number each driver's stops 1, 2, ... in lap order
fn pit_stop_rows(race_id: i64, mut pits: Vec<Pit>, entrants: &SessionEntrants, stats: &mut StageStats) -> Vec<PitStopRow> {
    pits.sort_by_key(|p| (p.driver_number, p.lap_number));

    let mut rows: Vec<PitStopRow> = Vec::with_capacity(pits.len());
    let mut current: Option<(i32, i32)> = None;
    let mut unresolved = HashSet::new();
    for pit in pits {
        let Some(driver_id) = entrants.driver(pit.driver_number) else {
            if unresolved.insert(pit.driver_number) {
                warn!(race_id, number = pit.driver_number, "Unresolved car in pit stops, dropping its stops");
            }
            stats.inc_skipped();
            continue;
        };
        let stop_number = match current {
            Some((number, stop)) if number == pit.driver_number => stop + 1,
            _ => 1,
        };
        current = Some((pit.driver_number, stop_number));
        rows.push(PitStopRow {
            race_id,
            driver_id,
            stop_number,
            lap_number: pit.lap_number,
            duration_ms: pit.pit_duration.and_then(seconds_to_ms),
        });
    }
    rows
}
