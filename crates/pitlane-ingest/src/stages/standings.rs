//! End-of-season championship standings
//!
//! Each season's standings are attached to the highest-round race stored for
//! that season. All seasons are collected first and written as a single
//! replacement of both standings tables. A season whose fetch fails is
//! counted as failed and left out of the snapshot.

use anyhow::{Context, Result};
use pitlane_common::types::{StagePhase, StageStats};
use tracing::{error, info, warn};

use super::results::driver_reference;
use super::{dedup_by_key, IngestContext};
use crate::fetch::Endpoint;
use crate::models::historical::{parse_int, parse_points, StandingsList};
use crate::models::rows::{StandingRow, StandingsSnapshot};
use crate::resolver::{ConstructorIndex, DriverIndex};

pub async fn run(ctx: &IngestContext, stats: &mut StageStats) -> Result<()> {
    stats.enter(StagePhase::Resolving);
    let seasons = ctx.store.seasons().await?;
    if seasons.is_empty() {
        warn!("No seasons stored, skipping standings");
        return Ok(());
    }
    let (drivers, constructors) = ctx.participant_indexes().await?;

    let mut snapshot = StandingsSnapshot::default();
    for year in ctx.config.pipeline.years() {
        if !seasons.iter().any(|s| s.year == year) {
            continue;
        }
        let races = ctx.store.races_for_season(year).await?;
        let Some(final_race) = races.iter().max_by_key(|r| r.round) else {
            warn!(year, "No races stored for season, skipping standings");
            continue;
        };

        stats.enter(StagePhase::Fetching);
        let (driver_lists, constructor_lists) = match fetch_season(ctx, year).await {
            Ok(lists) => lists,
            Err(e) => {
                error!("✗ Standings for {} failed: {:#}", year, e);
                stats.inc_failed();
                continue;
            },
        };

        stats.enter(StagePhase::Resolving);
        snapshot
            .drivers
            .extend(driver_rows(final_race.id, year, &driver_lists, &drivers, stats));
        snapshot
            .constructors
            .extend(constructor_rows(final_race.id, year, &constructor_lists, &constructors, stats));
    }

    if snapshot.is_empty() {
        warn!("No standings resolved, keeping the stored tables");
        return Ok(());
    }

    stats.enter(StagePhase::Writing);
    let count = ctx.store.rebuild_standings(&snapshot).await?;
    stats.add_replaced(count.deleted, count.inserted);
    info!(
        drivers = snapshot.drivers.len(),
        constructors = snapshot.constructors.len(),
        "Standings rebuilt"
    );
    Ok(())
}

async fn fetch_season(ctx: &IngestContext, year: i32) -> Result<(Vec<StandingsList>, Vec<StandingsList>)> {
    let drivers = ctx
        .historical
        .fetch_all_pages(&Endpoint::driver_standings(year))
        .await
        .with_context(|| format!("driver standings fetch for {}", year))?;
    let constructors = ctx
        .historical
        .fetch_all_pages(&Endpoint::constructor_standings(year))
        .await
        .with_context(|| format!("constructor standings fetch for {}", year))?;
    Ok((drivers, constructors))
}

fn driver_rows(
    race_id: i64,
    season: i32,
    lists: &[StandingsList],
    drivers: &DriverIndex,
    stats: &mut StageStats,
) -> Vec<StandingRow> {
    let mut rows = Vec::new();
    for standing in lists.iter().flat_map(|l| &l.driver_standings) {
        let Some(driver_id) = drivers.resolve(&driver_reference(&standing.driver)) else {
            warn!(season, driver = %standing.driver.driver_id, "Unresolved driver in standings, dropping row");
            stats.inc_skipped();
            continue;
        };
        rows.push(StandingRow {
            race_id,
            entity_id: driver_id,
            season,
            points: parse_points(&standing.points).unwrap_or(0.0),
            position: parse_int(standing.position.as_deref()),
            wins: parse_int(Some(&standing.wins)).unwrap_or(0),
        });
    }
    dedup_by_key(rows, |r| r.entity_id)
}

fn constructor_rows(
    race_id: i64,
    season: i32,
    lists: &[StandingsList],
    constructors: &ConstructorIndex,
    stats: &mut StageStats,
) -> Vec<StandingRow> {
    let mut rows = Vec::new();
    for standing in lists.iter().flat_map(|l| &l.constructor_standings) {
        let Some(constructor_id) = constructors.resolve(&standing.constructor.name) else {
            warn!(season, constructor = %standing.constructor.name, "Unresolved constructor in standings, dropping row");
            stats.inc_skipped();
            continue;
        };
        rows.push(StandingRow {
            race_id,
            entity_id: constructor_id,
            season,
            points: parse_points(&standing.points).unwrap_or(0.0),
            position: parse_int(standing.position.as_deref()),
            wins: parse_int(Some(&standing.wins)).unwrap_or(0),
        });
    }
    dedup_by_key(rows, |r| r.entity_id)
}
