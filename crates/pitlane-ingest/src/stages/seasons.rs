//! Season rows for the configured year range

use anyhow::Result;
use pitlane_common::types::{StagePhase, StageStats};
use tracing::{info, warn};

use super::IngestContext;
use crate::models::rows::{Candidate, SeasonRow};

pub async fn run(ctx: &IngestContext, stats: &mut StageStats) -> Result<()> {
    let years = ctx.config.pipeline.years();
    info!(start = years.start(), end = years.end(), "Upserting seasons");

    stats.enter(StagePhase::Writing);
    for year in years {
        match ctx.writer.upsert(&Candidate::Season(SeasonRow { year })).await {
            Ok(outcome) => stats.record(outcome),
            Err(e) => {
                warn!(year, error = %e, "Failed to upsert season");
                stats.inc_failed();
            },
        }
    }
    Ok(())
}
