//! Client for the OpenF1 API
//!
//! Endpoints return the complete result set as a flat JSON array filtered by
//! query parameters, so there is no pagination here.

use reqwest::Url;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::{build_client, get_with_backoff, FetchError, Result, RetryPolicy};
use crate::config::{BackoffConfig, ModernApiConfig};

#[derive(Debug, Clone)]
pub struct ModernClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    request_delay: Duration,
}

impl ModernClient {
    pub fn new(config: &ModernApiConfig, backoff: &BackoffConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::from(backoff),
            request_delay: Duration::from_millis(config.request_delay_ms),
        })
    }

    /// Build `{base_url}{path}?{query}`
    pub fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url> {
        let raw = format!("{}{}", self.base_url, path);
        Url::parse_with_params(&raw, query).map_err(|e| FetchError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })
    }

    /// GET one endpoint and decode the array body
    pub async fn fetch<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        let url = self.url(path, query)?;
        let body = get_with_backoff(&self.client, url.as_str(), &self.retry).await?;

        let records: Vec<T> = serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })?;
        debug!(url = %url, records = records.len(), "Fetched modern endpoint");

        tokio::time::sleep(self.request_delay).await;
        Ok(records)
    }
}
