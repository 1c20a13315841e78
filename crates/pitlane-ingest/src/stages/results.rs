//! Historical race results, qualifying, laps and pit stops
//!
//! Work is done race by race. A race whose fetch or write fails is logged and
//! counted, and the loop moves on to the next race.

use anyhow::{Context, Result};
use pitlane_common::types::{SessionType, StagePhase, StageStats};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use super::{dedup_by_key, IngestContext, SessionLookup};
use crate::fetch::Endpoint;
use crate::models::historical::{
    parse_int, parse_points, time_to_ms, ApiDriverRef, ApiQualifyingResult, ApiResult, RaceWithLaps,
    RaceWithPitStops, RaceWithQualifying, RaceWithResults,
};
use crate::models::rows::{LapRow, PitStopRow, QualifyingResultRow, RaceResultRow, StoredRace};
use crate::models::Lenient;
use crate::resolver::{ConstructorIndex, DriverIndex, DriverReference};

pub async fn run(ctx: &IngestContext, stats: &mut StageStats) -> Result<()> {
    stats.enter(StagePhase::Resolving);
    let seasons = ctx.store.seasons().await?;
    if seasons.is_empty() {
        warn!("No seasons stored, skipping results");
        return Ok(());
    }
    let (drivers, constructors) = ctx.participant_indexes().await?;

    let mut succeeded = 0usize;
    let mut failed = 0usize;

    stats.enter(StagePhase::Writing);
    for year in ctx.config.pipeline.years() {
        if !seasons.iter().any(|s| s.year == year) {
            continue;
        }
        let (races, sessions) = ctx.race_weekends(year).await?;

        for race in &races {
            let outcome = async {
                ingest_classification(ctx, race, &sessions, &drivers, &constructors, stats).await?;
                ingest_historical_timing(ctx, race, &drivers, stats).await
            }
            .await;

            match outcome {
                Ok(()) => {
                    debug!("✓ {} {} results ingested", race.year, race.name);
                    succeeded += 1;
                },
                Err(e) => {
                    error!("✗ {} {} results failed: {:#}", race.year, race.name, e);
                    stats.inc_failed();
                    failed += 1;
                },
            }
            tokio::time::sleep(ctx.config.race_delay()).await;
        }
    }

    info!("Results ingestion completed: {} races succeeded, {} failed", succeeded, failed);
    Ok(())
}

/// Race classification and qualifying for one race, from the historical API
pub(crate) async fn ingest_classification(
    ctx: &IngestContext,
    race: &StoredRace,
    sessions: &SessionLookup,
    drivers: &DriverIndex,
    constructors: &ConstructorIndex,
    stats: &mut StageStats,
) -> Result<()> {
    match sessions.get(race.id, SessionType::Race) {
        Some(session) => {
            let pages: Vec<RaceWithResults> = ctx
                .historical
                .fetch_all_pages(&Endpoint::results(race.year, race.round))
                .await
                .context("results fetch")?;
            let items = pages.into_iter().flat_map(|p| p.results).collect();
            let rows = result_rows(session.id, items, drivers, constructors, stats);
            replace_results(ctx, session.id, &rows, stats).await?;
        },
        None => warn!(race = %race.name, year = race.year, "No RACE session stored, skipping results"),
    }

    match sessions.get(race.id, SessionType::Qualifying) {
        Some(session) => {
            let pages: Vec<RaceWithQualifying> = ctx
                .historical
                .fetch_all_pages(&Endpoint::qualifying(race.year, race.round))
                .await
                .context("qualifying fetch")?;
            let items = pages.into_iter().flat_map(|p| p.results).collect();
            let rows = qualifying_rows(session.id, items, drivers, constructors, stats);
            if rows.is_empty() {
                debug!(race = %race.name, "No qualifying rows upstream");
            } else {
                let count = ctx.store.replace_qualifying_results(session.id, &rows).await?;
                stats.add_replaced(count.deleted, count.inserted);
            }
        },
        None => warn!(race = %race.name, year = race.year, "No QUALIFYING session stored, skipping qualifying"),
    }
    Ok(())
}

/// Lap timings and pit stops for one race, from the historical API
async fn ingest_historical_timing(
    ctx: &IngestContext,
    race: &StoredRace,
    drivers: &DriverIndex,
    stats: &mut StageStats,
) -> Result<()> {
    let laps: Vec<RaceWithLaps> = ctx
        .historical
        .fetch_all_pages(&Endpoint::laps(race.year, race.round))
        .await
        .context("laps fetch")?;
    let lap_rows = lap_rows(race.id, laps, drivers, stats);
    if !lap_rows.is_empty() {
        let count = ctx.store.replace_laps(race.id, &lap_rows).await?;
        stats.add_replaced(count.deleted, count.inserted);
    }

    let stops: Vec<RaceWithPitStops> = ctx
        .historical
        .fetch_all_pages(&Endpoint::pit_stops(race.year, race.round))
        .await
        .context("pit stops fetch")?;
    let stop_rows = pit_stop_rows(race.id, stops, drivers, stats);
    if !stop_rows.is_empty() {
        let count = ctx.store.replace_pit_stops(race.id, &stop_rows).await?;
        stats.add_replaced(count.deleted, count.inserted);
    }
    Ok(())
}

/// Replace a session's classification unless upstream had nothing for it
pub(crate) async fn replace_results(
    ctx: &IngestContext,
    session_id: i64,
    rows: &[RaceResultRow],
    stats: &mut StageStats,
) -> Result<()> {
    if rows.is_empty() {
        debug!(session_id, "No result rows upstream");
        return Ok(());
    }
    let count = ctx.store.replace_race_results(session_id, rows).await?;
    stats.add_replaced(count.deleted, count.inserted);
    Ok(())
}

pub(crate) fn driver_reference(driver: &ApiDriverRef) -> DriverReference<'_> {
    DriverReference {
        external_ref: Some(driver.driver_id.as_str()),
        acronym: driver.code.as_deref(),
        number: parse_int(driver.permanent_number.as_deref()),
        first_name: driver.given_name.as_deref(),
        last_name: driver.family_name.as_deref(),
    }
}

/// Resolve classification entries, dropping the ones that do not resolve
pub(crate) fn result_rows(
    session_id: i64,
    items: Vec<Lenient<ApiResult>>,
    drivers: &DriverIndex,
    constructors: &ConstructorIndex,
    stats: &mut StageStats,
) -> Vec<RaceResultRow> {
    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let result = match item.into_result() {
            Ok(result) => result,
            Err(reason) => {
                warn!(session_id, reason = %reason, "Malformed result entry");
                stats.inc_failed();
                continue;
            },
        };
        let Some(driver_id) = result.driver.as_ref().and_then(|d| drivers.resolve(&driver_reference(d))) else {
            warn!(
                session_id,
                driver = ?result.driver.as_ref().map(|d| &d.driver_id),
                "Unresolved driver in results, dropping row"
            );
            stats.inc_skipped();
            continue;
        };
        let Some(constructor_id) = result.constructor.as_ref().and_then(|c| constructors.resolve(&c.name)) else {
            warn!(
                session_id,
                constructor = ?result.constructor.as_ref().map(|c| &c.name),
                "Unresolved constructor in results, dropping row"
            );
            stats.inc_skipped();
            continue;
        };

        rows.push(RaceResultRow {
            session_id,
            driver_id,
            constructor_id: Some(constructor_id),
            position: parse_int(result.position.as_deref()),
            points: result.points.as_deref().and_then(parse_points),
            grid: parse_int(result.grid.as_deref()),
            laps: parse_int(result.laps.as_deref()),
            status: result.status.clone(),
            time_ms: result.time_ms(),
        });
    }
    dedup_by_key(rows, |r| r.driver_id)
}

pub(crate) fn qualifying_rows(
    session_id: i64,
    items: Vec<Lenient<ApiQualifyingResult>>,
    drivers: &DriverIndex,
    constructors: &ConstructorIndex,
    stats: &mut StageStats,
) -> Vec<QualifyingResultRow> {
    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let entry = match item.into_result() {
            Ok(entry) => entry,
            Err(reason) => {
                warn!(session_id, reason = %reason, "Malformed qualifying entry");
                stats.inc_failed();
                continue;
            },
        };
        let Some(driver_id) = entry.driver.as_ref().and_then(|d| drivers.resolve(&driver_reference(d))) else {
            warn!(session_id, "Unresolved driver in qualifying, dropping row");
            stats.inc_skipped();
            continue;
        };
        let Some(constructor_id) = entry.constructor.as_ref().and_then(|c| constructors.resolve(&c.name)) else {
            warn!(session_id, "Unresolved constructor in qualifying, dropping row");
            stats.inc_skipped();
            continue;
        };

        rows.push(QualifyingResultRow {
            session_id,
            driver_id,
            constructor_id: Some(constructor_id),
            position: parse_int(entry.position.as_deref()),
            q1_ms: entry.q1.as_deref().and_then(time_to_ms),
            q2_ms: entry.q2.as_deref().and_then(time_to_ms),
            q3_ms: entry.q3.as_deref().and_then(time_to_ms),
        });
    }
    dedup_by_key(rows, |r| r.driver_id)
}

/// Flatten every page of lap timings into one row per driver and lap
fn lap_rows(race_id: i64, pages: Vec<RaceWithLaps>, drivers: &DriverIndex, stats: &mut StageStats) -> Vec<LapRow> {
    let mut rows = Vec::new();
    let mut unresolved = HashSet::new();

    for lap in pages.into_iter().flat_map(|p| p.laps) {
        let Some(lap_number) = parse_int(Some(&lap.number)) else {
            warn!(race_id, lap = %lap.number, "Invalid lap number");
            stats.inc_failed();
            continue;
        };
        for timing in lap.timings {
            let timing = match timing.into_result() {
                Ok(timing) => timing,
                Err(reason) => {
                    warn!(race_id, lap_number, reason = %reason, "Malformed lap timing");
                    stats.inc_failed();
                    continue;
                },
            };
            let reference = DriverReference {
                external_ref: Some(timing.driver_id.as_str()),
                ..Default::default()
            };
            let Some(driver_id) = drivers.resolve(&reference) else {
                if unresolved.insert(timing.driver_id.clone()) {
                    warn!(race_id, driver = %timing.driver_id, "Unresolved driver in laps, dropping timings");
                }
                stats.inc_skipped();
                continue;
            };
            rows.push(LapRow {
                race_id,
                driver_id,
                lap_number,
                position: parse_int(timing.position.as_deref()),
                time_ms: timing.time.as_deref().and_then(time_to_ms),
            });
        }
    }
    dedup_by_key(rows, |r| (r.driver_id, r.lap_number))
}

fn pit_stop_rows(
    race_id: i64,
    pages: Vec<RaceWithPitStops>,
    drivers: &DriverIndex,
    stats: &mut StageStats,
) -> Vec<PitStopRow> {
    let mut rows = Vec::new();
    for item in pages.into_iter().flat_map(|p| p.pit_stops) {
        let stop = match item.into_result() {
            Ok(stop) => stop,
            Err(reason) => {
                warn!(race_id, reason = %reason, "Malformed pit stop");
                stats.inc_failed();
                continue;
            },
        };
        let (Some(stop_number), Some(lap_number)) = (parse_int(Some(&stop.stop)), parse_int(Some(&stop.lap))) else {
            warn!(race_id, driver = %stop.driver_id, "Pit stop without stop or lap number");
            stats.inc_failed();
            continue;
        };
        let reference = DriverReference {
            external_ref: Some(stop.driver_id.as_str()),
            ..Default::default()
        };
        let Some(driver_id) = drivers.resolve(&reference) else {
            warn!(race_id, driver = %stop.driver_id, "Unresolved driver in pit stops, dropping row");
            stats.inc_skipped();
            continue;
        };
        rows.push(PitStopRow {
            race_id,
            driver_id,
            stop_number,
            lap_number,
            duration_ms: stop.duration.as_deref().and_then(time_to_ms),
        });
    }
    dedup_by_key(rows, |r| (r.driver_id, r.stop_number))
}
