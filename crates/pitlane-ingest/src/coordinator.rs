//! Pipeline coordinator
//!
//! Every entry point plans a list of steps and runs them under the shared run
//! lock. Entry points always return a [`RunReport`]; errors are folded into it.
//!
//! ```text
//! acquire lock ──► step 1 ──► step 2 ──► ... ──► release lock
//!                     │ hard step fails
//!                     └──────────────────────────► release lock
//! ```

use chrono::{Datelike, Utc};
use pitlane_common::types::{RunReport, StepReport};
use pitlane_common::PitlaneError;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::stages::{IngestContext, Stage};
use crate::store::{LockStatus, MATERIALIZED_VIEWS};

/// Step name recorded for the view refresh
pub const REFRESH_STEP: &str = "Refresh Materialized Views";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Stage { stage: Stage, hard: bool },
    RefreshViews,
}

impl Step {
    fn hard(stage: Stage) -> Self {
        Step::Stage { stage, hard: true }
    }

    fn name(&self) -> String {
        match self {
            Step::Stage { stage, .. } => stage.name(),
            Step::RefreshViews => REFRESH_STEP.to_string(),
        }
    }

    fn is_hard(&self) -> bool {
        match self {
            Step::Stage { hard, .. } => *hard,
            Step::RefreshViews => false,
        }
    }
}

pub struct Coordinator {
    ctx: IngestContext,
}

impl Coordinator {
    pub fn new(ctx: IngestContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &IngestContext {
        &self.ctx
    }

    /// Historical backfill, then every configured modern season, then views
    pub async fn run_full_pipeline(&self) -> RunReport {
        let mut steps: Vec<Step> = Stage::HISTORICAL.into_iter().map(Step::hard).collect();
        for year in &self.ctx.config.pipeline.modern_years {
            steps.extend(Stage::modern_core(*year).into_iter().map(Step::hard));
        }
        steps.push(Step::RefreshViews);
        self.execute("full", steps).await
    }

    /// Weekly refresh of one season
    pub async fn run_current_year_pipeline(&self, year: i32) -> RunReport {
        let mut steps: Vec<Step> = Stage::modern_core(year).into_iter().map(Step::hard).collect();
        steps.push(Step::Stage {
            stage: Stage::SprintQualifying(year),
            hard: false,
        });
        steps.push(Step::Stage {
            stage: Stage::SprintResults(year),
            hard: false,
        });
        steps.push(Step::RefreshViews);
        self.execute("current-year", steps).await
    }

    /// Current-year pipeline for today's UTC season
    pub async fn run_scheduled(&self) -> RunReport {
        self.run_current_year_pipeline(Utc::now().year()).await
    }

    /// Run one stage on its own
    pub async fn run_stage(&self, stage: Stage) -> RunReport {
        self.execute("stage", vec![Step::hard(stage)]).await
    }

    pub async fn refresh_materialized_views(&self) -> RunReport {
        self.execute("refresh-views", vec![Step::RefreshViews]).await
    }

    async fn execute(&self, trigger: &str, steps: Vec<Step>) -> RunReport {
        let owner = format!("{}:{}", trigger, Uuid::new_v4());

        match self
            .ctx
            .store
            .try_acquire_run_lock(&owner, self.ctx.config.run_lock_ttl())
            .await
        {
            Ok(LockStatus::Acquired) => info!(owner = %owner, "Run lock acquired"),
            Ok(LockStatus::HeldBy(holder)) => {
                warn!(trigger, holder = %holder, "Pipeline already running, rejecting trigger");
                return RunReport::rejected(&PitlaneError::RunInProgress { owner: holder });
            },
            Err(e) => {
                error!("✗ Failed to acquire run lock: {:#}", e);
                return RunReport::begin().finish(false, format!("Failed to acquire run lock: {:#}", e));
            },
        }

        let report = self.run_steps(trigger, steps).await;

        if let Err(e) = self.ctx.store.release_run_lock(&owner).await {
            warn!(owner = %owner, error = %e, "Failed to release run lock, it will expire");
        }
        report
    }

    async fn run_steps(&self, trigger: &str, steps: Vec<Step>) -> RunReport {
        let mut report = RunReport::begin();
        let total = steps.len();
        info!(trigger, steps = total, "Starting pipeline run");

        for step in steps {
            let started = Instant::now();
            let outcome = match step {
                Step::Stage { stage, .. } => stage.execute(&self.ctx).await.map(Some).map_err(|e| format!("{:#}", e)),
                Step::RefreshViews => self.refresh_views().await.map(|_| None),
            };
            let duration = started.elapsed().as_millis() as i64;

            match outcome {
                Ok(stats) => {
                    info!("✓ {} ({}ms)", step.name(), duration);
                    report.push(StepReport::success(step.name(), step.is_hard(), duration, stats));
                },
                Err(e) if step.is_hard() => {
                    error!("✗ {} failed, stopping run: {}", step.name(), e);
                    report.push(StepReport::error(step.name(), true, duration, e));
                    let message = format!("{} pipeline stopped: {} failed", trigger, step.name());
                    return report.finish(false, message);
                },
                Err(e) => {
                    warn!("✗ {} failed, continuing: {}", step.name(), e);
                    report.push(StepReport::error(step.name(), false, duration, e));
                },
            }
        }

        let soft_failures = report.failed_steps().count();
        let totals = report.totals();
        info!(
            "Pipeline run completed: {} steps, {} soft failures, {} created, {} updated, {} skipped, {} failed",
            total, soft_failures, totals.created, totals.updated, totals.skipped, totals.failed
        );
        let message = if soft_failures == 0 {
            format!("{} pipeline completed", trigger)
        } else {
            format!("{} pipeline completed with {} soft failures", trigger, soft_failures)
        };
        report.finish(true, message)
    }

    /// Refresh every view; one failing view does not stop the others
    async fn refresh_views(&self) -> Result<(), String> {
        let mut failed = Vec::new();
        for view in MATERIALIZED_VIEWS {
            match self.ctx.store.refresh_materialized_view(view).await {
                Ok(()) => info!("✓ Refreshed {}", view),
                Err(e) => {
                    error!("✗ Failed to refresh {}: {:#}", view, e);
                    failed.push(view);
                },
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(format!("Failed to refresh: {}", failed.join(", ")))
        }
    }
}
