//! Upstream fetcher tests against mocked APIs

mod helpers;

use helpers::{envelope, test_config};
use pitlane_ingest::fetch::{Endpoint, FetchError, HistoricalClient, ModernClient};
use pitlane_ingest::models::historical::{ApiCircuit, RaceWithLaps};
use pitlane_ingest::models::modern::Stint;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn circuit(id: &str) -> serde_json::Value {
    helpers::circuit_json(id, &format!("{} circuit", id), "Somewhere", "Italy")
}

fn offsets(requests: &[wiremock::Request]) -> Vec<String> {
    requests
        .iter()
        .map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "offset")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default()
        })
        .collect()
}

#[tokio::test]
async fn test_pagination_stops_at_reported_total() {
    let server = MockServer::start().await;
    let mut config = test_config(&server);
    config.historical.page_limit = 1;

    for (offset, id) in [(0u64, "monza"), (1, "imola")] {
        Mock::given(method("GET"))
            .and(path("/circuits.json"))
            .and(query_param("offset", offset.to_string()))
            .and(query_param("limit", "1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(envelope("CircuitTable", "Circuits", json!([circuit(id)]), 2, 1, offset)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = HistoricalClient::new(&config.historical, &config.backoff).unwrap();
    let circuits: Vec<ApiCircuit> = client.fetch_all_pages(&Endpoint::circuits()).await.unwrap();

    assert_eq!(circuits.len(), 2);
    assert_eq!(circuits[1].circuit_id, "imola");
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2, "total=2 with limit=1 needs exactly two pages");
}

#[tokio::test]
async fn test_lap_pagination_runs_until_empty_page() {
    let server = MockServer::start().await;
    let config = test_config(&server);

    // The server undercounts: it claims one row but has two pages of laps
    let first = json!([{"season": "2021", "round": "3", "Laps": [
        {"number": "1", "Timings": [{"driverId": "hamilton", "position": "1", "time": "1:40.000"}]}
    ]}]);
    let second = json!([{"season": "2021", "round": "3", "Laps": [
        {"number": "2", "Timings": [{"driverId": "hamilton", "position": "1", "time": "1:39.500"}]}
    ]}]);

    for (offset, races) in [(0u64, first), (30, second)] {
        Mock::given(method("GET"))
            .and(path("/2021/3/laps.json"))
            .and(query_param("offset", offset.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope("RaceTable", "Races", races, 1, 30, offset)))
            .expect(1)
            .mount(&server)
            .await;
    }
    helpers::mount_empty_page(&server, "/2021/3/laps", "RaceTable", "Races", 60).await;

    let client = HistoricalClient::new(&config.historical, &config.backoff).unwrap();
    let pages: Vec<RaceWithLaps> = client.fetch_all_pages(&Endpoint::laps(2021, 3)).await.unwrap();

    let laps: Vec<&str> = pages.iter().flat_map(|p| &p.laps).map(|l| l.number.as_str()).collect();
    assert_eq!(laps, vec!["1", "2"]);
    assert_eq!(offsets(&server.received_requests().await.unwrap()), vec!["0", "30", "60"]);
}

#[tokio::test]
async fn test_rate_limit_retries_same_offset() {
    let server = MockServer::start().await;
    let config = test_config(&server);

    Mock::given(method("GET"))
        .and(path("/circuits.json"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    helpers::mount_page(&server, "/circuits", "CircuitTable", "Circuits", json!([circuit("spa")])).await;

    let client = HistoricalClient::new(&config.historical, &config.backoff).unwrap();
    let circuits: Vec<ApiCircuit> = client.fetch_all_pages(&Endpoint::circuits()).await.unwrap();

    assert_eq!(circuits.len(), 1);
    assert_eq!(offsets(&server.received_requests().await.unwrap()), vec!["0", "0"]);
}

#[tokio::test]
async fn test_server_error_is_fatal() {
    let server = MockServer::start().await;
    let config = test_config(&server);

    Mock::given(method("GET"))
        .and(path("/drivers.json"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = HistoricalClient::new(&config.historical, &config.backoff).unwrap();
    let err = client
        .fetch_all_pages::<ApiCircuit>(&Endpoint::drivers())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 500, .. }));
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn test_modern_fetch_decodes_array() {
    let server = MockServer::start().await;
    let config = test_config(&server);

    helpers::mount_modern(
        &server,
        "/stints",
        "session_key",
        "9158",
        json!([
            {"driver_number": 1, "stint_number": 1, "lap_start": 1, "lap_end": 18, "compound": "SOFT", "tyre_age_at_start": 3, "meeting_key": 1229},
            {"driver_number": 11, "stint_number": 1, "lap_start": 1, "lap_end": 20, "compound": "MEDIUM", "tyre_age_at_start": 0, "meeting_key": 1229}
        ]),
    )
    .await;

    let client = ModernClient::new(&config.modern, &config.backoff).unwrap();
    let stints: Vec<Stint> = client
        .fetch("/stints", &[("session_key", "9158".to_string())])
        .await
        .unwrap();

    assert_eq!(stints.len(), 2);
    assert_eq!(stints[0].compound.as_deref(), Some("SOFT"));
    assert_eq!(stints[1].driver_number, 11);
}

#[tokio::test]
async fn test_modern_rate_limit_then_success() {
    let server = MockServer::start().await;
    let config = test_config(&server);

    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    helpers::mount_modern(&server, "/weather", "session_key", "1", json!([{"air_temperature": 27.5}])).await;

    let client = ModernClient::new(&config.modern, &config.backoff).unwrap();
    let readings: Vec<pitlane_ingest::models::modern::Weather> = client
        .fetch("/weather", &[("session_key", "1".to_string())])
        .await
        .unwrap();

    assert_eq!(readings[0].air_temperature, Some(27.5));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}
