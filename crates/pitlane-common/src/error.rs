//! Error types for Pitlane

use thiserror::Error;

/// Result type alias for Pitlane operations
pub type Result<T> = std::result::Result<T, PitlaneError>;

/// Main error type for Pitlane
#[derive(Error, Debug)]
pub enum PitlaneError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid session type: {0}")]
    InvalidSessionType(String),

    #[error("Pipeline run already in progress (held by {owner})")]
    RunInProgress { owner: String },
}
