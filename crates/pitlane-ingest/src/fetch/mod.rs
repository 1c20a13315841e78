//! HTTP fetchers for the two upstream APIs
//!
//! - [`historical::HistoricalClient`] walks the offset-paginated envelope of
//!   the Ergast-compatible API and decodes each page into typed records.
//! - [`modern::ModernClient`] performs whole-result fetches against OpenF1.
//!
//! Both share the rate-limit policy in this module: HTTP 429 is retried on the
//! same request after `2^attempt * base + jitter`, any other failure is fatal
//! for the fetch.

pub mod historical;
pub mod modern;

pub use historical::{Endpoint, HistoricalClient, PageRecord, PageTermination};
pub use modern::ModernClient;

use rand::Rng;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::BackoffConfig;

/// Exponent cap so the backoff multiplication cannot overflow
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Result type for fetch operations
pub type Result<T> = std::result::Result<T, FetchError>;

/// Error types for upstream fetches
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid request URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Rate limited by {url}")]
    RateLimited { url: String },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unexpected response envelope from {url}: {reason}")]
    Envelope { url: String, reason: String },
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }

    /// Upstream status code, when the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS.as_u16()),
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Rate-limit backoff policy shared by both clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_ms: u64,
    jitter_ms: u64,
}

impl RetryPolicy {
    pub fn new(base_ms: u64, jitter_ms: u64) -> Self {
        Self { base_ms, jitter_ms }
    }

    /// Wait before retry number `attempt + 1`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.min(MAX_BACKOFF_EXPONENT));
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        Duration::from_millis(self.base_ms.saturating_mul(factor).saturating_add(jitter))
    }
}

impl From<&BackoffConfig> for RetryPolicy {
    fn from(config: &BackoffConfig) -> Self {
        Self::new(config.base_ms, config.jitter_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&BackoffConfig::default())
    }
}

/// GET `url`, retrying the identical request for as long as the server answers 429
pub(crate) async fn get_with_backoff(client: &Client, url: &str, policy: &RetryPolicy) -> Result<String> {
    let mut attempt = 0u32;
    loop {
        match get_once(client, url).await {
            Err(err) if err.is_rate_limited() => {
                let wait = policy.delay_for(attempt);
                warn!(
                    url,
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    "Rate limited, waiting before retrying"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            },
            other => return other,
        }
    }
}

async fn get_once(client: &Client, url: &str) -> Result<String> {
    debug!(url, "GET");
    let response = client.get(url).send().await.map_err(|source| FetchError::Http {
        url: url.to_string(),
        source,
    })?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited { url: url.to_string() });
    }
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    response.text().await.map_err(|source| FetchError::Http {
        url: url.to_string(),
        source,
    })
}

pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(crate::config::DEFAULT_USER_AGENT)
        .build()?)
}
