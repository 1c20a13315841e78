//! Upstream payload fixtures and mock wiring

use pitlane_ingest::config::IngestConfig;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Config pointing both APIs at `server`, with every delay disabled
pub fn test_config(server: &MockServer) -> IngestConfig {
    let mut config = IngestConfig::default();
    config.historical.base_url = server.uri();
    config.historical.page_limit = 30;
    config.historical.page_delay_ms = 0;
    config.modern.base_url = server.uri();
    config.modern.request_delay_ms = 0;
    config.backoff.base_ms = 1;
    config.backoff.jitter_ms = 0;
    config.pipeline.race_delay_ms = 0;
    config.pipeline.start_year = 2021;
    config.pipeline.end_year = 2021;
    config.pipeline.modern_years = vec![2024];
    config
}

/// Historical API envelope around one page of records
pub fn envelope(table: &str, array: &str, records: Value, total: u64, limit: u32, offset: u64) -> Value {
    let mut inner = serde_json::Map::new();
    inner.insert(array.to_string(), records);

    let mut data = json!({
        "xmlns": "",
        "series": "f1",
        "limit": limit.to_string(),
        "offset": offset.to_string(),
        "total": total.to_string()
    });
    data[table] = Value::Object(inner);
    json!({ "MRData": data })
}

/// Mount a single-page historical response for `endpoint` (without `.json`)
pub async fn mount_page(server: &MockServer, endpoint: &str, table: &str, array: &str, records: Value) {
    let total = records.as_array().map(|a| a.len() as u64).unwrap_or(0);
    Mock::given(method("GET"))
        .and(path(format!("{}.json", endpoint)))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(table, array, records, total, 30, 0)))
        .mount(server)
        .await;
}

/// Mount an empty follow-up page at `offset`
pub async fn mount_empty_page(server: &MockServer, endpoint: &str, table: &str, array: &str, offset: u64) {
    Mock::given(method("GET"))
        .and(path(format!("{}.json", endpoint)))
        .and(query_param("offset", offset.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(table, array, json!([]), 0, 30, offset)))
        .mount(server)
        .await;
}

/// Mount a modern API array for `endpoint` filtered by `key=value`
pub async fn mount_modern(server: &MockServer, endpoint: &str, key: &str, value: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(endpoint))
        .and(query_param(key, value))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub fn circuit_json(id: &str, name: &str, locality: &str, country: &str) -> Value {
    json!({
        "circuitId": id,
        "url": format!("https://en.wikipedia.org/wiki/{}", id),
        "circuitName": name,
        "Location": {"lat": "0", "long": "0", "locality": locality, "country": country}
    })
}

pub fn constructor_json(id: &str, name: &str, nationality: &str) -> Value {
    json!({"constructorId": id, "name": name, "nationality": nationality, "url": ""})
}

pub fn driver_json(id: &str, code: Option<&str>, number: Option<&str>, given: &str, family: &str, nationality: &str) -> Value {
    let mut driver = json!({
        "driverId": id,
        "givenName": given,
        "familyName": family,
        "dateOfBirth": "1990-01-01",
        "nationality": nationality
    });
    if let Some(code) = code {
        driver["code"] = json!(code);
    }
    if let Some(number) = number {
        driver["permanentNumber"] = json!(number);
    }
    driver
}

pub fn race_json(season: i32, round: i32, name: &str, circuit_id: &str, circuit_name: &str, date: &str, sprint: bool) -> Value {
    let mut race = json!({
        "season": season.to_string(),
        "round": round.to_string(),
        "raceName": name,
        "Circuit": {"circuitId": circuit_id, "circuitName": circuit_name},
        "date": date,
        "time": "14:00:00Z"
    });
    if sprint {
        race["Sprint"] = json!({"date": date, "time": "10:30:00Z"});
    }
    race
}

pub fn result_json(position: u32, driver_id: &str, code: &str, constructor: &str, points: &str) -> Value {
    json!({
        "number": "1",
        "position": position.to_string(),
        "points": points,
        "grid": position.to_string(),
        "laps": "57",
        "status": "Finished",
        "Driver": {"driverId": driver_id, "code": code},
        "Constructor": {"constructorId": constructor.to_lowercase(), "name": constructor}
    })
}
