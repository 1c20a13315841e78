//! Bootstrap one season so the modern stages have rows to attach to
//!
//! Writes the season, the circuits, constructors and drivers that appear in
//! it, then its races and baseline sessions.

use anyhow::{anyhow, Result};
use pitlane_common::types::{StagePhase, StageStats};
use tracing::info;

use super::catalog::{write_circuits, write_constructors, write_drivers};
use super::races::write_races;
use super::IngestContext;
use crate::fetch::Endpoint;
use crate::models::historical::{ApiCircuit, ApiConstructor, ApiDriver, ApiRace};
use crate::models::rows::{Candidate, SeasonRow};
use crate::resolver::CircuitIndex;

pub async fn run(ctx: &IngestContext, year: i32, stats: &mut StageStats) -> Result<()> {
    stats.enter(StagePhase::Writing);
    let (outcome, season_id) = ctx
        .writer
        .upsert_returning_id(&Candidate::Season(SeasonRow { year }))
        .await?;
    stats.record(outcome);
    let season_id = season_id.ok_or_else(|| anyhow!("season {} has no id after upsert", year))?;

    stats.enter(StagePhase::Fetching);
    let circuits: Vec<ApiCircuit> = ctx.historical.fetch_all_pages(&Endpoint::season_circuits(year)).await?;
    let constructors: Vec<ApiConstructor> = ctx
        .historical
        .fetch_all_pages(&Endpoint::season_constructors(year))
        .await?;
    let drivers: Vec<ApiDriver> = ctx.historical.fetch_all_pages(&Endpoint::season_drivers(year)).await?;
    let races: Vec<ApiRace> = ctx.historical.fetch_all_pages(&Endpoint::races(year)).await?;

    write_circuits(ctx, &circuits, stats).await?;
    write_constructors(ctx, &constructors, stats).await?;
    write_drivers(ctx, &drivers, stats).await?;

    stats.enter(StagePhase::Resolving);
    let circuit_index = CircuitIndex::new(&ctx.store.circuits().await?);

    stats.enter(StagePhase::Writing);
    write_races(ctx, season_id, &circuit_index, &races, stats).await;

    info!(
        year,
        circuits = circuits.len(),
        constructors = constructors.len(),
        drivers = drivers.len(),
        races = races.len(),
        "Season schedule written"
    );
    Ok(())
}
