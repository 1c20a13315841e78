//! Ingestion configuration
//!
//! Everything is read from environment variables with sensible defaults, so a
//! bare `pitlane-ingest full` against a local database works out of the box.

use pitlane_common::PitlaneError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/pitlane";
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Ergast-compatible historical results API
pub const DEFAULT_HISTORICAL_BASE_URL: &str = "https://api.jolpi.ca/ergast/f1";
pub const DEFAULT_PAGE_LIMIT: u32 = 100;
pub const DEFAULT_PAGE_DELAY_MS: u64 = 100;

/// OpenF1 session-keyed telemetry API
pub const DEFAULT_MODERN_BASE_URL: &str = "https://api.openf1.org/v1";
pub const DEFAULT_MODERN_DELAY_MS: u64 = 250;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str = "Pitlane-Ingest/0.1";

pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;
pub const DEFAULT_BACKOFF_JITTER_MS: u64 = 500;

pub const DEFAULT_START_YEAR: i32 = 2000;
pub const DEFAULT_END_YEAR: i32 = 2022;
pub const DEFAULT_MODERN_YEARS: [i32; 3] = [2023, 2024, 2025];
pub const DEFAULT_RACE_DELAY_MS: u64 = 1000;

/// Six hours; a full historical backfill comfortably fits inside it
pub const DEFAULT_RUN_LOCK_TTL_SECS: u64 = 6 * 60 * 60;

/// Mondays at 06:00 UTC, after the weekend's sessions have settled upstream
pub const DEFAULT_SCHEDULE_CRON: &str = "0 0 6 * * Mon";

/// First season with a world championship
const EARLIEST_SEASON: i32 = 1950;

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestConfig {
    pub database: DatabaseConfig,
    pub historical: HistoricalApiConfig,
    pub modern: ModernApiConfig,
    pub backoff: BackoffConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoricalApiConfig {
    pub base_url: String,
    /// Records requested per page (`limit` query parameter)
    pub page_limit: u32,
    /// Pause between two successful page fetches
    pub page_delay_ms: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModernApiConfig {
    pub base_url: String,
    /// Pause after every successful request
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
}

/// Rate-limit backoff: `2^attempt * base_ms + rand(0..=jitter_ms)`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub jitter_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// First historical season ingested by the full pipeline
    pub start_year: i32,
    /// Last historical season ingested by the full pipeline
    pub end_year: i32,
    /// Seasons refreshed from the modern API during a full run
    pub modern_years: Vec<i32>,
    /// Pause between races in per-race stages
    pub race_delay_ms: u64,
    pub run_lock_ttl_secs: u64,
    /// Cron expression (with seconds) for the weekly trigger
    pub schedule_cron: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            historical: HistoricalApiConfig {
                base_url: DEFAULT_HISTORICAL_BASE_URL.to_string(),
                page_limit: DEFAULT_PAGE_LIMIT,
                page_delay_ms: DEFAULT_PAGE_DELAY_MS,
                timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            },
            modern: ModernApiConfig {
                base_url: DEFAULT_MODERN_BASE_URL.to_string(),
                request_delay_ms: DEFAULT_MODERN_DELAY_MS,
                timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            },
            backoff: BackoffConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: DEFAULT_BACKOFF_BASE_MS,
            jitter_ms: DEFAULT_BACKOFF_JITTER_MS,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            start_year: DEFAULT_START_YEAR,
            end_year: DEFAULT_END_YEAR,
            modern_years: DEFAULT_MODERN_YEARS.to_vec(),
            race_delay_ms: DEFAULT_RACE_DELAY_MS,
            run_lock_ttl_secs: DEFAULT_RUN_LOCK_TTL_SECS,
            schedule_cron: DEFAULT_SCHEDULE_CRON.to_string(),
        }
    }
}

impl IngestConfig {
    /// Load `.env` if present, then read the environment
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load ingestion configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let timeout_secs = env_or("PITLANE_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS);

        let config = Self {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
            },
            historical: HistoricalApiConfig {
                base_url: std::env::var("PITLANE_HISTORICAL_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_HISTORICAL_BASE_URL.to_string()),
                page_limit: env_or("PITLANE_HISTORICAL_PAGE_LIMIT", DEFAULT_PAGE_LIMIT),
                page_delay_ms: env_or("PITLANE_PAGE_DELAY_MS", DEFAULT_PAGE_DELAY_MS),
                timeout_secs,
            },
            modern: ModernApiConfig {
                base_url: std::env::var("PITLANE_MODERN_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_MODERN_BASE_URL.to_string()),
                request_delay_ms: env_or("PITLANE_MODERN_DELAY_MS", DEFAULT_MODERN_DELAY_MS),
                timeout_secs,
            },
            backoff: BackoffConfig {
                base_ms: env_or("PITLANE_BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS),
                jitter_ms: env_or("PITLANE_BACKOFF_JITTER_MS", DEFAULT_BACKOFF_JITTER_MS),
            },
            pipeline: PipelineConfig {
                start_year: env_or("PITLANE_START_YEAR", DEFAULT_START_YEAR),
                end_year: env_or("PITLANE_END_YEAR", DEFAULT_END_YEAR),
                modern_years: match std::env::var("PITLANE_MODERN_YEARS") {
                    Ok(raw) => parse_years(&raw)?,
                    Err(_) => DEFAULT_MODERN_YEARS.to_vec(),
                },
                race_delay_ms: env_or("PITLANE_RACE_DELAY_MS", DEFAULT_RACE_DELAY_MS),
                run_lock_ttl_secs: env_or("PITLANE_RUN_LOCK_TTL_SECS", DEFAULT_RUN_LOCK_TTL_SECS),
                schedule_cron: std::env::var("PITLANE_SCHEDULE_CRON")
                    .unwrap_or_else(|_| DEFAULT_SCHEDULE_CRON.to_string()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("DATABASE_URL must not be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be greater than 0");
        }
        for (name, url) in [
            ("PITLANE_HISTORICAL_BASE_URL", &self.historical.base_url),
            ("PITLANE_MODERN_BASE_URL", &self.modern.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must be an http(s) URL, got '{}'", name, url);
            }
        }
        if self.historical.page_limit == 0 || self.historical.page_limit > 1000 {
            anyhow::bail!("PITLANE_HISTORICAL_PAGE_LIMIT must be between 1 and 1000");
        }
        if self.historical.timeout_secs == 0 {
            anyhow::bail!("PITLANE_HTTP_TIMEOUT_SECS must be greater than 0");
        }
        self.pipeline.validate()?;
        Ok(())
    }

    pub fn race_delay(&self) -> Duration {
        Duration::from_millis(self.pipeline.race_delay_ms)
    }

    pub fn run_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.pipeline.run_lock_ttl_secs)
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.start_year < EARLIEST_SEASON {
            anyhow::bail!("PITLANE_START_YEAR must be {} or later", EARLIEST_SEASON);
        }
        if self.start_year > self.end_year {
            anyhow::bail!(
                "PITLANE_START_YEAR ({}) must not be after PITLANE_END_YEAR ({})",
                self.start_year,
                self.end_year
            );
        }
        if let Some(year) = self.modern_years.iter().find(|y| **y < EARLIEST_SEASON) {
            anyhow::bail!("PITLANE_MODERN_YEARS contains invalid season {}", year);
        }
        if self.run_lock_ttl_secs == 0 {
            anyhow::bail!("PITLANE_RUN_LOCK_TTL_SECS must be greater than 0");
        }
        if self.schedule_cron.split_whitespace().count() < 6 {
            anyhow::bail!(
                "PITLANE_SCHEDULE_CRON must include a seconds field, got '{}'",
                self.schedule_cron
            );
        }
        Ok(())
    }

    /// Seasons covered by the historical stages, inclusive
    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.start_year..=self.end_year
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Parse a comma-separated season list such as "2023, 2024"
fn parse_years(raw: &str) -> Result<Vec<i32>, PitlaneError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i32>()
                .map_err(|_| PitlaneError::Config(format!("invalid season '{}' in PITLANE_MODERN_YEARS", s)))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 6] = [
        "PITLANE_START_YEAR",
        "PITLANE_END_YEAR",
        "PITLANE_MODERN_YEARS",
        "PITLANE_HISTORICAL_PAGE_LIMIT",
        "PITLANE_HISTORICAL_BASE_URL",
        "DATABASE_URL",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.historical.page_limit, 100);
        assert_eq!(config.pipeline.years().count(), 23);
        assert_eq!(config.race_delay(), Duration::from_secs(1));
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("PITLANE_START_YEAR", "2010");
        std::env::set_var("PITLANE_END_YEAR", "2012");
        std::env::set_var("PITLANE_MODERN_YEARS", "2024, 2025");
        std::env::set_var("PITLANE_HISTORICAL_PAGE_LIMIT", "30");

        let config = IngestConfig::from_env().unwrap();
        assert_eq!(config.pipeline.years().collect::<Vec<_>>(), vec![2010, 2011, 2012]);
        assert_eq!(config.pipeline.modern_years, vec![2024, 2025]);
        assert_eq!(config.historical.page_limit, 30);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_inverted_range() {
        clear_env();
        std::env::set_var("PITLANE_START_YEAR", "2020");
        std::env::set_var("PITLANE_END_YEAR", "2010");

        assert!(IngestConfig::from_env().is_err());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_modern_years() {
        clear_env();
        std::env::set_var("PITLANE_MODERN_YEARS", "2024,next");

        let err = IngestConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("next"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_unparseable_number_falls_back_to_default() {
        clear_env();
        std::env::set_var("PITLANE_HISTORICAL_PAGE_LIMIT", "lots");

        let config = IngestConfig::from_env().unwrap();
        assert_eq!(config.historical.page_limit, DEFAULT_PAGE_LIMIT);

        clear_env();
    }

    #[test]
    fn test_validate_rejects_non_http_base_url() {
        let mut config = IngestConfig::default();
        config.historical.base_url = "ftp://example.org".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_seconds_in_cron() {
        let mut config = IngestConfig::default();
        config.pipeline.schedule_cron = "0 6 * * Mon".to_string();
        assert!(config.validate().is_err());
    }
}
