//! Reference catalogs: circuits, constructors and drivers
//!
//! The `write_*` helpers are shared with the season schedule stage, which
//! feeds them season-scoped listings instead of the full catalog.

use anyhow::{bail, Result};
use pitlane_common::types::{StagePhase, StageStats};
use tracing::{info, warn};

use super::{parse_date, CountryRegistry, IngestContext};
use crate::fetch::Endpoint;
use crate::models::historical::{parse_int, ApiCircuit, ApiConstructor, ApiDriver};
use crate::models::rows::{Candidate, CircuitRow, ConstructorRow, DriverRow};
use crate::resolver::{
    country_name_for_code, normalize_driver_name, resolve_country_code, resolve_nationality,
};

pub async fn run_circuits(ctx: &IngestContext, stats: &mut StageStats) -> Result<()> {
    stats.enter(StagePhase::Fetching);
    let circuits: Vec<ApiCircuit> = ctx.historical.fetch_all_pages(&Endpoint::circuits()).await?;
    if circuits.is_empty() {
        warn!("Historical API returned no circuits, nothing to write");
        return Ok(());
    }
    write_circuits(ctx, &circuits, stats).await
}

pub async fn run_constructors(ctx: &IngestContext, stats: &mut StageStats) -> Result<()> {
    stats.enter(StagePhase::Fetching);
    let constructors: Vec<ApiConstructor> =
        ctx.historical.fetch_all_pages(&Endpoint::constructors()).await?;
    if constructors.is_empty() {
        bail!("Historical API returned no constructors");
    }
    write_constructors(ctx, &constructors, stats).await
}

pub async fn run_drivers(ctx: &IngestContext, stats: &mut StageStats) -> Result<()> {
    stats.enter(StagePhase::Fetching);
    let drivers: Vec<ApiDriver> = ctx.historical.fetch_all_pages(&Endpoint::drivers()).await?;
    if drivers.is_empty() {
        bail!("Historical API returned no drivers");
    }
    write_drivers(ctx, &drivers, stats).await
}

pub(crate) async fn write_circuits(
    ctx: &IngestContext,
    circuits: &[ApiCircuit],
    stats: &mut StageStats,
) -> Result<()> {
    stats.enter(StagePhase::Resolving);
    let mut countries = CountryRegistry::load(ctx.store.as_ref()).await?;

    stats.enter(StagePhase::Writing);
    for circuit in circuits {
        let location = circuit.location.as_ref();
        let country_name = location.and_then(|l| l.country.as_deref()).unwrap_or_default();
        let country_code = resolve_country_code(country_name);
        let display_name = if country_name.trim().is_empty() { country_code.as_str() } else { country_name.trim() };

        let row = CircuitRow::new(
            &circuit.circuit_name,
            location.and_then(|l| l.locality.clone()),
            country_code.clone(),
            circuit.url.clone(),
        );

        let written = async {
            countries.ensure(&ctx.writer, &country_code, display_name, stats).await?;
            ctx.writer.upsert(&Candidate::Circuit(row)).await
        }
        .await;

        match written {
            Ok(outcome) => stats.record(outcome),
            Err(e) => {
                warn!(circuit = %circuit.circuit_id, error = %e, "Failed to write circuit");
                stats.inc_failed();
            },
        }
    }

    info!(circuits = circuits.len(), "Circuits written");
    Ok(())
}

pub(crate) async fn write_constructors(
    ctx: &IngestContext,
    constructors: &[ApiConstructor],
    stats: &mut StageStats,
) -> Result<()> {
    stats.enter(StagePhase::Writing);
    for constructor in constructors {
        let row = ConstructorRow {
            name: constructor.name.trim().to_string(),
            nationality: constructor.nationality.clone(),
            reference_url: constructor.url.clone(),
        };
        match ctx.writer.upsert(&Candidate::Constructor(row)).await {
            Ok(outcome) => stats.record(outcome),
            Err(e) => {
                warn!(constructor = %constructor.name, error = %e, "Failed to write constructor");
                stats.inc_failed();
            },
        }
    }

    info!(constructors = constructors.len(), "Constructors written");
    Ok(())
}

pub(crate) async fn write_drivers(ctx: &IngestContext, drivers: &[ApiDriver], stats: &mut StageStats) -> Result<()> {
    stats.enter(StagePhase::Resolving);
    let mut countries = CountryRegistry::load(ctx.store.as_ref()).await?;

    stats.enter(StagePhase::Writing);
    for driver in drivers {
        let row = driver_row(driver);
        let country_code = row.country_code.clone();

        let written = async {
            if let Some(code) = country_code.as_deref() {
                let name = country_name_for_code(code)
                    .map(str::to_string)
                    .or_else(|| driver.nationality.clone())
                    .unwrap_or_else(|| code.to_string());
                countries.ensure(&ctx.writer, code, &name, stats).await?;
            }
            ctx.writer.upsert(&Candidate::Driver(row)).await
        }
        .await;

        match written {
            Ok(outcome) => stats.record(outcome),
            Err(e) => {
                warn!(driver = %driver.driver_id, error = %e, "Failed to write driver");
                stats.inc_failed();
            },
        }
    }

    info!(drivers = drivers.len(), "Drivers written");
    Ok(())
}

/// Map one upstream driver onto a store row
pub(crate) fn driver_row(driver: &ApiDriver) -> DriverRow {
    let (first_name, last_name) = normalize_driver_name(&driver.given_name, &driver.family_name);
    let country_code = driver.nationality.as_deref().and_then(|n| {
        let code = resolve_nationality(n);
        if code.is_none() {
            warn!(driver = %driver.driver_id, nationality = n, "Unmapped nationality");
        }
        code
    });

    DriverRow {
        external_ref: Some(driver.driver_id.clone()),
        number: parse_int(driver.permanent_number.as_deref()),
        first_name,
        last_name,
        acronym: driver.code.as_ref().map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty()),
        country_code,
        date_of_birth: driver.date_of_birth.as_deref().and_then(parse_date),
    }
}
