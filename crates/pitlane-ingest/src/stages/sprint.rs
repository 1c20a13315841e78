//! Sprint weekend results for one season
//!
//! Sprint qualifying comes from the modern API's session results, the sprint
//! race classification from the historical API. Failures propagate: these
//! stages are best-effort at the coordinator level, not per session.

use anyhow::{Context, Result};
use pitlane_common::types::{SessionType, StagePhase, StageStats};
use tracing::{info, warn};

use super::granular::SessionEntrants;
use super::results::{replace_results, result_rows};
use super::{dedup_by_key, IngestContext};
use crate::fetch::Endpoint;
use crate::models::historical::RaceWithSprint;
use crate::models::modern::SessionResult;
use crate::models::rows::QualifyingResultRow;
use crate::resolver::ConstructorIndex;

pub async fn run_qualifying(ctx: &IngestContext, year: i32, stats: &mut StageStats) -> Result<()> {
    stats.enter(StagePhase::Resolving);
    let (_, sessions) = ctx.race_weekends(year).await?;
    let keyed = sessions.keyed(SessionType::SprintQualifying);
    if keyed.is_empty() {
        info!(year, "No sprint qualifying sessions with a modern key");
        return Ok(());
    }
    let (drivers, constructors) = ctx.participant_indexes().await?;

    for (session, session_key) in keyed {
        stats.enter(StagePhase::Fetching);
        let entrants = SessionEntrants::load(ctx, session_key, &drivers).await?;
        let results: Vec<SessionResult> = ctx
            .modern
            .fetch("/session_result", &[("session_key", session_key.to_string())])
            .await
            .with_context(|| format!("sprint qualifying results for session {}", session_key))?;

        stats.enter(StagePhase::Writing);
        let rows = sprint_qualifying_rows(session.id, &results, &entrants, &constructors, stats);
        if rows.is_empty() {
            warn!(session_key, "No sprint qualifying rows resolved");
            continue;
        }
        let count = ctx.store.replace_qualifying_results(session.id, &rows).await?;
        stats.add_replaced(count.deleted, count.inserted);
    }
    Ok(())
}

pub async fn run_results(ctx: &IngestContext, year: i32, stats: &mut StageStats) -> Result<()> {
    stats.enter(StagePhase::Resolving);
    let (races, sessions) = ctx.race_weekends(year).await?;
    let sprint_races: Vec<_> = races
        .iter()
        .filter_map(|r| sessions.get(r.id, SessionType::Sprint).map(|s| (r, s.id)))
        .collect();
    if sprint_races.is_empty() {
        info!(year, "No sprint sessions stored");
        return Ok(());
    }
    let (drivers, constructors) = ctx.participant_indexes().await?;

    for (race, session_id) in sprint_races {
        stats.enter(StagePhase::Fetching);
        let pages: Vec<RaceWithSprint> = ctx
            .historical
            .fetch_all_pages(&Endpoint::sprint(race.year, race.round))
            .await
            .with_context(|| format!("sprint results for {} round {}", race.year, race.round))?;

        stats.enter(StagePhase::Writing);
        let items = pages.into_iter().flat_map(|p| p.results).collect();
        let rows = result_rows(session_id, items, &drivers, &constructors, stats);
        replace_results(ctx, session_id, &rows, stats).await?;
        tokio::time::sleep(ctx.config.race_delay()).await;
    }
    Ok(())
}

fn sprint_qualifying_rows(
    session_id: i64,
    results: &[SessionResult],
    entrants: &SessionEntrants,
    constructors: &ConstructorIndex,
    stats: &mut StageStats,
) -> Vec<QualifyingResultRow> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        let Some(driver_id) = entrants.driver(result.driver_number) else {
            warn!(session_id, number = result.driver_number, "Unresolved car in sprint qualifying, dropping row");
            stats.inc_skipped();
            continue;
        };
        let team = entrants.team(result.driver_number);
        let Some(constructor_id) = team.and_then(|t| constructors.resolve(t)) else {
            warn!(
                session_id,
                number = result.driver_number,
                team = team.unwrap_or("<none>"),
                "Unresolved team in sprint qualifying, dropping row"
            );
            stats.inc_skipped();
            continue;
        };
        let [q1_ms, q2_ms, q3_ms] = result
            .duration
            .as_ref()
            .map(|d| d.segments_ms())
            .unwrap_or_default();
        rows.push(QualifyingResultRow {
            session_id,
            driver_id,
            constructor_id: Some(constructor_id),
            position: result.position,
            q1_ms,
            q2_ms,
            q3_ms,
        });
    }
    dedup_by_key(rows, |r| r.driver_id)
}
