//! Paginated client for the Ergast-compatible historical API
//!
//! Every response is wrapped in an envelope whose key names vary per
//! endpoint:
//!
//! ```text
//! { "MRData": { "total": "74", "limit": "30", "offset": "0",
//!               "CircuitTable": { "Circuits": [ ... ] } } }
//! ```
//!
//! The envelope, table and array keys are discovered from the shape of the
//! document rather than hard-coded, and the array elements are decoded into
//! the caller's record type before they leave this module.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::{build_client, get_with_backoff, FetchError, Result, RetryPolicy};
use crate::config::{BackoffConfig, HistoricalApiConfig};

/// How a paginated walk decides it has seen everything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTermination {
    /// Stop once the accumulated record count reaches the envelope's `total`
    ReportedTotal,
    /// Ignore `total` and stop at the first empty page
    EmptyPage,
}

/// A historical API resource together with its termination rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    path: String,
    termination: PageTermination,
}

impl Endpoint {
    /// Ordinary list endpoint, trusted to report an accurate `total`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            termination: PageTermination::ReportedTotal,
        }
    }

    pub fn circuits() -> Self {
        Self::new("/circuits")
    }

    pub fn constructors() -> Self {
        Self::new("/constructors")
    }

    pub fn drivers() -> Self {
        Self::new("/drivers")
    }

    pub fn season_circuits(year: i32) -> Self {
        Self::new(format!("/{}/circuits", year))
    }

    pub fn season_constructors(year: i32) -> Self {
        Self::new(format!("/{}/constructors", year))
    }

    pub fn season_drivers(year: i32) -> Self {
        Self::new(format!("/{}/drivers", year))
    }

    pub fn races(year: i32) -> Self {
        Self::new(format!("/{}/races", year))
    }

    pub fn results(year: i32, round: i32) -> Self {
        Self::new(format!("/{}/{}/results", year, round))
    }

    pub fn qualifying(year: i32, round: i32) -> Self {
        Self::new(format!("/{}/{}/qualifying", year, round))
    }

    pub fn sprint(year: i32, round: i32) -> Self {
        Self::new(format!("/{}/{}/sprint", year, round))
    }

    pub fn pit_stops(year: i32, round: i32) -> Self {
        Self::new(format!("/{}/{}/pitstops", year, round))
    }

    /// Lap-by-lap timings. The server's `total` for this family undercounts,
    /// so the walk continues until an empty page.
    pub fn laps(year: i32, round: i32) -> Self {
        Self {
            path: format!("/{}/{}/laps", year, round),
            termination: PageTermination::EmptyPage,
        }
    }

    pub fn driver_standings(year: i32) -> Self {
        Self::new(format!("/{}/driverStandings", year))
    }

    pub fn constructor_standings(year: i32) -> Self {
        Self::new(format!("/{}/constructorStandings", year))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn termination(&self) -> PageTermination {
        self.termination
    }
}

/// Element type of a paginated array.
///
/// `record_count` reports how many of the rows counted by the envelope's
/// `total` this element carries. List endpoints carry one; race-scoped
/// endpoints return one race object holding many nested result rows.
pub trait PageRecord: DeserializeOwned {
    fn record_count(&self) -> usize {
        1
    }
}

/// One decoded page
#[derive(Debug)]
pub struct Page<T> {
    pub records: Vec<T>,
    /// Server-reported total, if present and numeric
    pub total: Option<u64>,
}

/// HTTP client for the historical API
#[derive(Debug, Clone)]
pub struct HistoricalClient {
    client: reqwest::Client,
    base_url: String,
    page_limit: u32,
    page_delay: Duration,
    retry: RetryPolicy,
}

impl HistoricalClient {
    pub fn new(config: &HistoricalApiConfig, backoff: &BackoffConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_limit: config.page_limit,
            page_delay: Duration::from_millis(config.page_delay_ms),
            retry: RetryPolicy::from(backoff),
        })
    }

    pub fn page_url(&self, endpoint: &Endpoint, offset: u64) -> String {
        format!(
            "{}{}.json?limit={}&offset={}",
            self.base_url,
            endpoint.path(),
            self.page_limit,
            offset
        )
    }

    /// Walk every page of `endpoint` and return all records.
    ///
    /// A 429 is retried on the same offset. Any other failure aborts the walk
    /// and the pages gathered so far are dropped.
    pub async fn fetch_all_pages<T: PageRecord>(&self, endpoint: &Endpoint) -> Result<Vec<T>> {
        let mut records: Vec<T> = Vec::new();
        let mut counted: u64 = 0;
        let mut offset: u64 = 0;
        let mut pages = 0usize;

        loop {
            let url = self.page_url(endpoint, offset);
            let body = get_with_backoff(&self.client, &url, &self.retry).await?;
            let page = decode_page::<T>(&url, &body)?;
            pages += 1;

            if page.records.is_empty() {
                debug!(path = endpoint.path(), offset, "Empty page, stopping");
                break;
            }

            counted += page.records.iter().map(|r| r.record_count() as u64).sum::<u64>();
            records.extend(page.records);

            if endpoint.termination() == PageTermination::ReportedTotal {
                if let Some(total) = page.total {
                    if counted >= total {
                        break;
                    }
                }
            }

            offset += u64::from(self.page_limit);
            tokio::time::sleep(self.page_delay).await;
        }

        info!(
            path = endpoint.path(),
            pages,
            records = records.len(),
            rows = counted,
            "Fetched historical endpoint"
        );
        Ok(records)
    }
}

/// Decode one envelope into typed records
pub fn decode_page<T: DeserializeOwned>(url: &str, body: &str) -> Result<Page<T>> {
    let root: Value = serde_json::from_str(body).map_err(|source| FetchError::Decode {
        url: url.to_string(),
        source,
    })?;

    let envelope = root
        .as_object()
        .and_then(|obj| obj.values().find_map(Value::as_object))
        .ok_or_else(|| FetchError::Envelope {
            url: url.to_string(),
            reason: "no envelope object at top level".to_string(),
        })?;

    let total = envelope.get("total").and_then(parse_count);

    let records = match find_data_array(envelope) {
        Some(items) => serde_json::from_value::<Vec<T>>(Value::Array(items.clone())).map_err(|source| {
            FetchError::Decode {
                url: url.to_string(),
                source,
            }
        })?,
        None => {
            debug!(url, "Envelope carries no data array");
            Vec::new()
        },
    };

    Ok(Page { records, total })
}

/// The first array inside the table object, preferring keys ending in "Table"
fn find_data_array(envelope: &Map<String, Value>) -> Option<&Vec<Value>> {
    let mut tables: Vec<(&String, &Map<String, Value>)> = envelope
        .iter()
        .filter_map(|(key, value)| value.as_object().map(|table| (key, table)))
        .collect();
    tables.sort_by_key(|(key, _)| !key.ends_with("Table"));

    tables
        .into_iter()
        .find_map(|(_, table)| table.values().find_map(Value::as_array))
}

fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Named {
        name: String,
    }

    impl PageRecord for Named {}

    #[test]
    fn test_decode_discovers_dynamic_keys() {
        let body = r#"{"MRData":{"xmlns":"","series":"f1","limit":"30","offset":"0","total":"2",
            "ConstructorTable":{"Constructors":[{"name":"Ferrari"},{"name":"McLaren"}]}}}"#;
        let page = decode_page::<Named>("u", body).unwrap();
        assert_eq!(page.total, Some(2));
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[1].name, "McLaren");
    }

    #[test]
    fn test_decode_skips_scalar_fields_in_table() {
        let body = r#"{"Envelope":{"total":1,"StandingsTable":{"season":"2021",
            "StandingsLists":[{"name":"x"}]}}}"#;
        let page = decode_page::<Named>("u", body).unwrap();
        assert_eq!(page.total, Some(1));
        assert_eq!(page.records, vec![Named { name: "x".into() }]);
    }

    #[test]
    fn test_decode_without_array_is_empty_page() {
        let body = r#"{"MRData":{"total":"0","RaceTable":{"season":"2099"}}}"#;
        let page = decode_page::<Named>("u", body).unwrap();
        assert!(page.records.is_empty());
    }

    #[test]
    fn test_decode_rejects_missing_envelope() {
        let err = decode_page::<Named>("u", r#"{"total": 3}"#).unwrap_err();
        assert!(matches!(err, FetchError::Envelope { .. }));
    }

    #[test]
    fn test_decode_reports_malformed_records() {
        let body = r#"{"MRData":{"total":"1","DriverTable":{"Drivers":[{"nom":"x"}]}}}"#;
        let err = decode_page::<Named>("u", body).unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[test]
    fn test_lap_endpoint_ignores_reported_total() {
        assert_eq!(Endpoint::laps(2021, 3).termination(), PageTermination::EmptyPage);
        assert_eq!(Endpoint::results(2021, 3).termination(), PageTermination::ReportedTotal);
        assert_eq!(Endpoint::pit_stops(2021, 3).path(), "/2021/3/pitstops");
    }

    #[test]
    fn test_page_url_shape() {
        let config = HistoricalApiConfig {
            base_url: "http://localhost:9999/ergast/f1/".to_string(),
            page_limit: 100,
            page_delay_ms: 0,
            timeout_secs: 5,
        };
        let client = HistoricalClient::new(&config, &BackoffConfig::default()).unwrap();
        assert_eq!(
            client.page_url(&Endpoint::races(2005), 200),
            "http://localhost:9999/ergast/f1/2005/races.json?limit=100&offset=200"
        );
    }
}
