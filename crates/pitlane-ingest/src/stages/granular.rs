//! Tyre stints and race-control messages for every keyed session of a season

use anyhow::{Context, Result};
use pitlane_common::types::{StagePhase, StageStats};
use std::collections::HashMap;
use tracing::{error, info, warn};

use super::{dedup_by_key, IngestContext};
use crate::models::modern::{parse_timestamp, RaceControl, SessionDriver, Stint};
use crate::models::rows::{RaceEventRow, TireStintRow};
use crate::resolver::{DriverIndex, DriverReference};

/// Car numbers of one session mapped to stored drivers
#[derive(Debug, Default)]
pub(crate) struct SessionEntrants {
    drivers: HashMap<i32, i64>,
    teams: HashMap<i32, String>,
}

impl SessionEntrants {
    /// Fetch the session's entry list and resolve each car to a driver
    pub async fn load(ctx: &IngestContext, session_key: i64, index: &DriverIndex) -> Result<Self> {
        let entries: Vec<SessionDriver> = ctx
            .modern
            .fetch("/drivers", &[("session_key", session_key.to_string())])
            .await
            .context("session drivers fetch")?;
        Ok(Self::resolve(session_key, &entries, index))
    }

    pub fn resolve(session_key: i64, entries: &[SessionDriver], index: &DriverIndex) -> Self {
        let mut entrants = Self::default();
        for entry in entries {
            let reference = DriverReference {
                external_ref: None,
                acronym: entry.name_acronym.as_deref(),
                number: Some(entry.driver_number),
                first_name: entry.first_name.as_deref(),
                last_name: entry.last_name.as_deref(),
            };
            match index.resolve(&reference) {
                Some(driver_id) => {
                    entrants.drivers.insert(entry.driver_number, driver_id);
                },
                None => warn!(
                    session_key,
                    number = entry.driver_number,
                    acronym = ?entry.name_acronym,
                    "Entrant not matched to a stored driver"
                ),
            }
            if let Some(team) = &entry.team_name {
                entrants.teams.insert(entry.driver_number, team.clone());
            }
        }
        entrants
    }

    pub fn driver(&self, number: i32) -> Option<i64> {
        self.drivers.get(&number).copied()
    }

    pub fn team(&self, number: i32) -> Option<&str> {
        self.teams.get(&number).map(String::as_str)
    }
}

pub async fn run(ctx: &IngestContext, year: i32, stats: &mut StageStats) -> Result<()> {
    stats.enter(StagePhase::Resolving);
    let (races, sessions) = ctx.race_weekends(year).await?;
    if races.is_empty() {
        warn!(year, "No races stored for season, skipping granular data");
        return Ok(());
    }
    let (drivers, _) = ctx.participant_indexes().await?;

    let keyed = sessions.all_keyed();
    let mut succeeded = 0usize;
    let mut failed = 0usize;

    stats.enter(StagePhase::Writing);
    for (session, session_key) in &keyed {
        match ingest_session(ctx, session.id, *session_key, &drivers, stats).await {
            Ok(()) => succeeded += 1,
            Err(e) => {
                error!("✗ Session {} granular data failed: {:#}", session_key, e);
                stats.inc_failed();
                failed += 1;
            },
        }
    }

    info!(
        "Granular data for {} completed: {} sessions succeeded, {} failed",
        year, succeeded, failed
    );
    Ok(())
}

async fn ingest_session(
    ctx: &IngestContext,
    session_id: i64,
    session_key: i64,
    drivers: &DriverIndex,
    stats: &mut StageStats,
) -> Result<()> {
    let query = [("session_key", session_key.to_string())];
    let entrants = SessionEntrants::load(ctx, session_key, drivers).await?;
    let stints: Vec<Stint> = ctx.modern.fetch("/stints", &query).await.context("stints fetch")?;
    let messages: Vec<RaceControl> = ctx
        .modern
        .fetch("/race_control", &query)
        .await
        .context("race control fetch")?;

    let stint_rows = stint_rows(session_id, &stints, &entrants, stats);
    if !stint_rows.is_empty() {
        let count = ctx.store.replace_tire_stints(session_id, &stint_rows).await?;
        stats.add_replaced(count.deleted, count.inserted);
    }

    let event_rows = event_rows(session_id, &messages, stats);
    if !event_rows.is_empty() {
        let count = ctx.store.replace_race_events(session_id, &event_rows).await?;
        stats.add_replaced(count.deleted, count.inserted);
    }
    Ok(())
}

fn stint_rows(
    session_id: i64,
    stints: &[Stint],
    entrants: &SessionEntrants,
    stats: &mut StageStats,
) -> Vec<TireStintRow> {
    let mut rows = Vec::with_capacity(stints.len());
    for stint in stints {
        let Some(driver_id) = entrants.driver(stint.driver_number) else {
            stats.inc_skipped();
            continue;
        };
        rows.push(TireStintRow {
            session_id,
            driver_id,
            stint_number: stint.stint_number,
            lap_start: stint.lap_start,
            lap_end: stint.lap_end,
            compound: stint.compound.clone(),
            tyre_age_at_start: stint.tyre_age_at_start,
        });
    }
    dedup_by_key(rows, |r| (r.driver_id, r.stint_number))
}

fn event_rows(session_id: i64, messages: &[RaceControl], stats: &mut StageStats) -> Vec<RaceEventRow> {
    messages
        .iter()
        .filter_map(|m| match parse_timestamp(&m.date) {
            Some(occurred_at) => Some(RaceEventRow {
                session_id,
                occurred_at,
                category: m.category.clone(),
                flag: m.flag.clone(),
                message: m.message.clone(),
            }),
            None => {
                warn!(session_id, date = %m.date, "Race control message with invalid date");
                stats.inc_failed();
                None
            },
        })
        .collect()
}
