//! Pitlane Ingest - F1 ingestion and reconciliation tool

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use pitlane_common::logging::{init_logging, LogConfig, LogLevel};
use pitlane_common::types::RunReport;
use pitlane_ingest::config::IngestConfig;
use pitlane_ingest::coordinator::Coordinator;
use pitlane_ingest::scheduler;
use pitlane_ingest::stages::{IngestContext, Stage};
use pitlane_ingest::store::PgStore;
use std::process;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pitlane-ingest")]
#[command(author, version, about = "F1 data ingestion and reconciliation")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upsert seasons for the configured year range
    Seasons,
    /// Ingest the circuit catalog
    Circuits,
    /// Ingest the constructor catalog
    Constructors,
    /// Ingest the driver catalog
    Drivers,
    /// Ingest races and baseline sessions
    Races,
    /// Ingest historical results, qualifying, laps and pit stops
    Results,
    /// Rebuild end-of-season standings
    Standings,
    /// Bootstrap one season's schedule
    Schedule {
        #[arg(long)]
        year: Option<i32>,
    },
    /// Attach modern session keys and weather
    Sessions {
        #[arg(long)]
        year: Option<i32>,
    },
    /// Ingest tyre stints and race control messages
    Granular {
        #[arg(long)]
        year: Option<i32>,
    },
    /// Ingest modern results, laps and pit stops
    ModernResults {
        #[arg(long)]
        year: Option<i32>,
    },
    /// Ingest sprint qualifying results
    SprintQualifying {
        #[arg(long)]
        year: Option<i32>,
    },
    /// Ingest sprint race results
    SprintResults {
        #[arg(long)]
        year: Option<i32>,
    },
    /// Run the current-year pipeline
    CurrentYear {
        /// Season to refresh, defaults to the current UTC year
        #[arg(long)]
        year: Option<i32>,
    },
    /// Run the full historical and modern pipeline
    Full,
    /// Refresh the materialized views
    RefreshViews,
    /// Run the weekly scheduler until Ctrl-C
    ScheduleWeekly,
}

impl Command {
    fn stage(&self) -> Option<Stage> {
        let year = |y: &Option<i32>| y.unwrap_or_else(|| Utc::now().year());
        match self {
            Command::Seasons => Some(Stage::Seasons),
            Command::Circuits => Some(Stage::Circuits),
            Command::Constructors => Some(Stage::Constructors),
            Command::Drivers => Some(Stage::Drivers),
            Command::Races => Some(Stage::RacesSessions),
            Command::Results => Some(Stage::Results),
            Command::Standings => Some(Stage::Standings),
            Command::Schedule { year: y } => Some(Stage::Schedule(year(y))),
            Command::Sessions { year: y } => Some(Stage::SessionsWeather(year(y))),
            Command::Granular { year: y } => Some(Stage::Granular(year(y))),
            Command::ModernResults { year: y } => Some(Stage::ModernResults(year(y))),
            Command::SprintQualifying { year: y } => Some(Stage::SprintQualifying(year(y))),
            Command::SprintResults { year: y } => Some(Stage::SprintResults(year(y))),
            Command::CurrentYear { .. } | Command::Full | Command::RefreshViews | Command::ScheduleWeekly => None,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { LogLevel::Debug } else { LogLevel::Info };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("pitlane-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        },
    };

    match execute(cli.command).await {
        Ok(true) => {},
        Ok(false) => process::exit(1),
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            process::exit(1);
        },
    }
}

/// Run the command; `Ok(false)` when the printed report is unsuccessful
async fn execute(command: Command) -> Result<bool> {
    let config = IngestConfig::load().context("Failed to load configuration")?;
    let store = PgStore::connect(&config.database).await?;
    let ctx = IngestContext::new(Arc::new(store), config)?;
    let coordinator = Arc::new(Coordinator::new(ctx));

    let report = match command {
        Command::CurrentYear { year } => {
            let year = year.unwrap_or_else(|| Utc::now().year());
            coordinator.run_current_year_pipeline(year).await
        },
        Command::Full => coordinator.run_full_pipeline().await,
        Command::RefreshViews => coordinator.refresh_materialized_views().await,
        Command::ScheduleWeekly => {
            let cron = coordinator.context().config.pipeline.schedule_cron.clone();
            let mut sched = scheduler::start_weekly(coordinator.clone(), &cron).await?;
            info!("Scheduler running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
            info!("Shutting down scheduler");
            sched.shutdown().await.context("Failed to stop scheduler")?;
            return Ok(true);
        },
        other => match other.stage() {
            Some(stage) => coordinator.run_stage(stage).await,
            None => anyhow::bail!("Command {:?} has no stage", other),
        },
    };

    print_report(&report)?;
    Ok(report.success)
}

fn print_report(report: &RunReport) -> Result<()> {
    println!("{}", report.to_json()?);
    Ok(())
}
