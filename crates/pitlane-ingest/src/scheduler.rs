//! Weekly trigger for the current-year pipeline

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::coordinator::Coordinator;

/// Build and start a scheduler that runs the current-year pipeline on `cron`.
///
/// The job goes through the coordinator, so a run that is still going when
/// the next tick fires is rejected by the run lock.
pub async fn start_weekly(coordinator: Arc<Coordinator>, cron: &str) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("Failed to create scheduler")?;

    let job = Job::new_async(cron, move |_uuid, _l| {
        let coordinator = coordinator.clone();
        Box::pin(async move {
            info!("Scheduled current-year run triggered");
            let report = coordinator.run_scheduled().await;
            if report.success {
                info!("✓ Scheduled run finished: {}", report.message);
            } else {
                error!("✗ Scheduled run failed: {}", report.message);
            }
            for step in report.failed_steps() {
                warn!(step = %step.step, error = ?step.error, "Step failed in scheduled run");
            }
        })
    })
    .with_context(|| format!("Failed to create scheduler job for cron {}", cron))?;

    sched.add(job).await.context("Failed to add scheduler job")?;
    sched.start().await.context("Failed to start scheduler")?;
    info!(cron, "Weekly scheduler started");
    Ok(sched)
}
