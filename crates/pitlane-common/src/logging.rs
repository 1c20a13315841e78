//! Tracing setup shared by the Pitlane binaries
//!
//! Events go to stdout, to rolling files under a log directory, or to both,
//! rendered as human-readable text or one JSON object per line. Stage code
//! should log with fields instead of formatting values into the message:
//!
//! ```rust
//! use tracing::warn;
//!
//! let season = 2021;
//! let round = 4;
//! warn!(season, round, "Circuit not found, skipping race");
//! ```
//!
//! ```no_run
//! use pitlane_common::logging::{init_logging, LogConfig, LogLevel};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::builder()
//!         .level(LogLevel::Debug)
//!         .log_file_prefix("pitlane-ingest")
//!         .build()
//!         .merge_env()?;
//!     let _guard = init_logging(&config)?;
//!     tracing::info!("Pipeline starting");
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Noisy dependencies are held back unless `LOG_FILTER` says otherwise
const DEFAULT_DIRECTIVES: &str = "sqlx=warn,hyper=info,reqwest=info,tokio_cron_scheduler=info";

/// Looks up a case-insensitive name in an alias table
fn lookup<T: Copy>(kind: &str, raw: &str, table: &[(&str, T)]) -> Result<T> {
    let wanted = raw.trim().to_ascii_lowercase();
    table
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, value)| *value)
        .ok_or_else(|| anyhow!("Unknown {} '{}'", kind, raw))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        lookup(
            "log level",
            s,
            &[
                ("trace", LogLevel::Trace),
                ("debug", LogLevel::Debug),
                ("info", LogLevel::Info),
                ("warn", LogLevel::Warn),
                ("warning", LogLevel::Warn),
                ("error", LogLevel::Error),
            ],
        )
    }
}

/// Where events are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogSink {
    #[default]
    Console,
    File,
    Both,
}

impl LogSink {
    fn writes_stdout(self) -> bool {
        self != LogSink::File
    }

    fn writes_files(self) -> bool {
        self != LogSink::Console
    }
}

impl FromStr for LogSink {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        lookup(
            "log output",
            s,
            &[
                ("console", LogSink::Console),
                ("stdout", LogSink::Console),
                ("file", LogSink::File),
                ("both", LogSink::Both),
            ],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        lookup("log format", s, &[("text", LogFormat::Text), ("json", LogFormat::Json)])
    }
}

/// How often the file sink starts a new file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

impl LogRotation {
    fn rotation(self) -> Rotation {
        match self {
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

impl FromStr for LogRotation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        lookup(
            "log rotation",
            s,
            &[
                ("hourly", LogRotation::Hourly),
                ("daily", LogRotation::Daily),
                ("never", LogRotation::Never),
            ],
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub sink: LogSink,
    pub format: LogFormat,
    pub rotation: LogRotation,
    pub directory: PathBuf,
    /// Files are named `<prefix>.<date>`
    pub file_prefix: String,
    /// Comma-separated `target=level` directives appended after the base level
    pub directives: String,
    /// Adds source file and line to every event
    pub source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            sink: LogSink::default(),
            format: LogFormat::default(),
            rotation: LogRotation::default(),
            directory: PathBuf::from("logs"),
            file_prefix: "pitlane".to_string(),
            directives: DEFAULT_DIRECTIVES.to_string(),
            source_location: false,
        }
    }
}

/// Reads `key` and parses it, `Ok(None)` when unset
fn env_override<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Into<anyhow::Error>,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| -> anyhow::Error { e.into() })
            .with_context(|| format!("Invalid {}", key)),
        Err(_) => Ok(None),
    }
}

impl LogConfig {
    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder { config: Self::default() }
    }

    /// Applies `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_ROTATION`,
    /// `LOG_DIR`, `LOG_FILE_PREFIX`, `LOG_FILTER` and `LOG_SOURCE_LOCATION`
    /// on top of this configuration
    pub fn merge_env(mut self) -> Result<Self> {
        if let Some(level) = env_override("LOG_LEVEL")? {
            self.level = level;
        }
        if let Some(sink) = env_override("LOG_OUTPUT")? {
            self.sink = sink;
        }
        if let Some(format) = env_override("LOG_FORMAT")? {
            self.format = format;
        }
        if let Some(rotation) = env_override("LOG_ROTATION")? {
            self.rotation = rotation;
        }
        if let Some(directory) = env_override::<PathBuf>("LOG_DIR")? {
            self.directory = directory;
        }
        if let Some(prefix) = env_override::<String>("LOG_FILE_PREFIX")? {
            self.file_prefix = prefix;
        }
        if let Some(directives) = env_override::<String>("LOG_FILTER")? {
            self.directives = directives;
        }
        if let Some(location) = env_override("LOG_SOURCE_LOCATION")? {
            self.source_location = location;
        }
        Ok(self)
    }

    /// The base level followed by the extra directives, blanks dropped
    fn filter_string(&self) -> String {
        std::iter::once(self.level.as_str())
            .chain(self.directives.split(',').map(str::trim).filter(|d| !d.is_empty()))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn filter(&self) -> Result<EnvFilter> {
        let filter = self.filter_string();
        EnvFilter::try_new(&filter).with_context(|| format!("Failed to parse log filter '{}'", filter))
    }
}

pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    pub fn sink(mut self, sink: LogSink) -> Self {
        self.config.sink = sink;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn rotation(mut self, rotation: LogRotation) -> Self {
        self.config.rotation = rotation;
        self
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.directory = directory.into();
        self
    }

    pub fn log_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.file_prefix = prefix.into();
        self
    }

    pub fn directives(mut self, directives: impl Into<String>) -> Self {
        self.config.directives = directives.into();
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}

/// Flushes buffered file output when dropped; keep it alive in `main`
#[must_use]
pub struct LogGuard {
    _worker: Option<WorkerGuard>,
}

fn format_layer<W>(writer: W, config: &LogConfig, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_file(config.source_location)
        .with_line_number(config.source_location);
    match config.format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Text => layer.with_span_events(FmtSpan::CLOSE).boxed(),
    }
}

/// Installs the global subscriber. `RUST_LOG`, when set, replaces the
/// configured level and directives.
pub fn init_logging(config: &LogConfig) -> Result<LogGuard> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::try_from_default_env().context("Failed to parse RUST_LOG")?,
        Err(_) => config.filter()?,
    };

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut worker = None;

    if config.sink.writes_stdout() {
        layers.push(format_layer(std::io::stdout, config, true));
    }
    if config.sink.writes_files() {
        let appender = rolling_appender(config)?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(format_layer(writer, config, false));
        worker = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuard { _worker: worker })
}

fn rolling_appender(config: &LogConfig) -> Result<RollingFileAppender> {
    create_directory(&config.directory)?;
    Ok(RollingFileAppender::new(
        config.rotation.rotation(),
        &config.directory,
        &config.file_prefix,
    ))
}

fn create_directory(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create log directory {}", dir.display()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_level_aliases() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" debug ".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        let err = "loud".parse::<LogLevel>().unwrap_err();
        assert!(err.to_string().contains("loud"));
    }

    #[test]
    fn test_sink_targets() {
        assert!(LogSink::Console.writes_stdout() && !LogSink::Console.writes_files());
        assert!(!LogSink::File.writes_stdout() && LogSink::File.writes_files());
        assert!(LogSink::Both.writes_stdout() && LogSink::Both.writes_files());
        assert_eq!("stdout".parse::<LogSink>().unwrap(), LogSink::Console);
        assert!("syslog".parse::<LogSink>().is_err());
    }

    #[test]
    fn test_format_and_rotation_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!("hourly".parse::<LogRotation>().unwrap(), LogRotation::Hourly);
        assert_eq!(LogRotation::default(), LogRotation::Daily);
    }

    #[test]
    fn test_builder_overrides_defaults() {
        let config = LogConfig::builder()
            .level(LogLevel::Debug)
            .sink(LogSink::Both)
            .format(LogFormat::Json)
            .rotation(LogRotation::Never)
            .directory("/var/log/pitlane")
            .log_file_prefix("pitlane-ingest")
            .directives("sqlx=debug")
            .build();

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.sink, LogSink::Both);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.rotation, LogRotation::Never);
        assert_eq!(config.directory, PathBuf::from("/var/log/pitlane"));
        assert_eq!(config.file_prefix, "pitlane-ingest");
        assert_eq!(config.filter_string(), "debug,sqlx=debug");
    }

    #[test]
    fn test_filter_string_skips_blank_directives() {
        let config = LogConfig::builder().directives("sqlx=warn, ,reqwest=info,").build();
        assert_eq!(config.filter_string(), "info,sqlx=warn,reqwest=info");
        assert!(config.filter().is_ok());

        let config = LogConfig::builder().directives("sqlx=notalevel").build();
        assert!(config.filter().is_err());
    }

    #[test]
    fn test_create_directory_is_recursive() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("pitlane").join("ingest");
        create_directory(&nested).unwrap();
        create_directory(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
