//! Races and their baseline sessions for every configured season

use anyhow::{anyhow, Result};
use pitlane_common::types::{SessionType, StagePhase, StageStats, UpsertOutcome};
use tracing::{error, info, warn};

use super::{parse_date, parse_race_time, IngestContext};
use crate::fetch::Endpoint;
use crate::models::historical::{parse_int, ApiRace};
use crate::models::rows::{Candidate, RaceRow, SessionRow};
use crate::resolver::CircuitIndex;

pub async fn run(ctx: &IngestContext, stats: &mut StageStats) -> Result<()> {
    stats.enter(StagePhase::Resolving);
    let seasons = ctx.store.seasons().await?;
    if seasons.is_empty() {
        warn!("No seasons stored, skipping races");
        return Ok(());
    }
    let circuits = CircuitIndex::new(&ctx.store.circuits().await?);

    for year in ctx.config.pipeline.years() {
        let Some(season) = seasons.iter().find(|s| s.year == year) else {
            warn!(year, "Season not stored, skipping its races");
            continue;
        };

        stats.enter(StagePhase::Fetching);
        let races: Vec<ApiRace> = match ctx.historical.fetch_all_pages(&Endpoint::races(year)).await {
            Ok(races) => races,
            Err(e) => {
                error!("✗ Race list for {} failed: {}", year, e);
                stats.inc_failed();
                continue;
            },
        };

        stats.enter(StagePhase::Writing);
        write_races(ctx, season.id, &circuits, &races, stats).await;
        info!(year, races = races.len(), "Season races written");
    }
    Ok(())
}

/// Upsert each race and its sessions, counting per-race problems
pub(crate) async fn write_races(
    ctx: &IngestContext,
    season_id: i64,
    circuits: &CircuitIndex,
    races: &[ApiRace],
    stats: &mut StageStats,
) {
    for race in races {
        let label = format!("{} round {}", race.season, race.round);
        if let Err(e) = write_race_weekend(ctx, season_id, circuits, race, stats).await {
            warn!(race = %label, error = %e, "Failed to write race");
            stats.inc_failed();
        }
    }
}

async fn write_race_weekend(
    ctx: &IngestContext,
    season_id: i64,
    circuits: &CircuitIndex,
    race: &ApiRace,
    stats: &mut StageStats,
) -> Result<()> {
    let round = parse_int(Some(&race.round)).ok_or_else(|| anyhow!("invalid round {:?}", race.round))?;
    let date = parse_date(&race.date).ok_or_else(|| anyhow!("invalid date {:?}", race.date))?;

    let circuit_ref = race.circuit.as_ref().map_or("<none>", |c| c.circuit_id.as_str());
    let circuit_id = race
        .circuit
        .as_ref()
        .and_then(|c| circuits.resolve(c.circuit_name.as_deref(), &c.circuit_id));
    let candidate = circuit_id.map(|circuit_id| {
        Candidate::Race(RaceRow {
            season_id,
            circuit_id,
            round,
            name: race.race_name.trim().to_string(),
            date,
            time: race.time.as_deref().and_then(parse_race_time),
        })
    });

    let label = format!("{} (circuit {})", race.race_name, circuit_ref);
    let (outcome, race_id) = ctx.writer.upsert_resolved(candidate, &label).await?;
    stats.record(outcome);
    let Some(race_id) = race_id else {
        return Ok(());
    };

    for session_type in weekend_sessions(race) {
        let outcome = ctx
            .writer
            .upsert(&Candidate::Session(SessionRow::bare(race_id, session_type)))
            .await?;
        if outcome != UpsertOutcome::Skipped {
            stats.record(outcome);
        }
    }
    Ok(())
}

/// Sessions every race weekend gets, plus the sprint where one is scheduled
pub(crate) fn weekend_sessions(race: &ApiRace) -> Vec<SessionType> {
    let mut sessions = vec![SessionType::Qualifying, SessionType::Race];
    if race.is_sprint_weekend() {
        sessions.push(SessionType::Sprint);
    }
    sessions
}
