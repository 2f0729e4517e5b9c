//! API Integration Tests for netpulse
//!
//! Runs the sampler and the HTTP server together against a temporary data
//! directory and checks the API contract end to end.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use netpulse::probe::{MockProbe, MockProbeConfig, ProbeMode};
use netpulse::server::{AppState, PageInfo, create_router};
use netpulse::{AppConfig, QueryService, Sample, SampleStore, Sampler};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

// =============================================================================
// Test Helpers
// =============================================================================

fn test_config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.data_dir = dir.path().to_path_buf();
    config.storage.timezone = Tz::UTC;
    config.sampler.interval = Duration::from_secs(1);
    config.probe.mode = ProbeMode::Mock;
    config
}

/// Start test server and return base URL.
async fn start_test_server(config: &AppConfig, store: SampleStore) -> String {
    let state = AppState {
        query: QueryService::new(store, config.storage.timezone),
        page: PageInfo {
            timezone: config.storage.timezone.name().to_string(),
            cleanup_days: config.storage.cleanup_days,
            target: config.sampler.target.clone(),
        },
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://{}", addr)
}

async fn get_json(client: &reqwest::Client, url: String) -> Value {
    let resp = client.get(url).send().await.expect("request failed");
    assert_eq!(resp.status(), 200);
    resp.json().await.expect("invalid JSON body")
}

// =============================================================================
// Page and Health
// =============================================================================

#[tokio::test]
async fn test_index_and_health() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = SampleStore::open(dir.path()).unwrap();
    let base_url = start_test_server(&config, store).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{}/", base_url)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let html = resp.text().await.unwrap();
    assert!(html.contains("Network Stability Monitor"));
    assert!(html.contains("UTC"));
    assert!(html.contains("30 days"));

    let body = get_json(&client, format!("{}/healthz", base_url)).await;
    assert_eq!(body["status"], "ok");
}

// =============================================================================
// Data and Stats
// =============================================================================

#[tokio::test]
async fn test_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = SampleStore::open(dir.path()).unwrap();
    let base_url = start_test_server(&config, store).await;
    let client = reqwest::Client::new();

    let data = get_json(&client, format!("{}/api/data", base_url)).await;
    assert_eq!(data, json!([]));

    let stats = get_json(&client, format!("{}/api/stats", base_url)).await;
    assert_eq!(
        stats,
        json!({
            "total_pings": 0,
            "successful_pings": 0,
            "failed_pings": 0,
            "success_rate": 0.0,
            "avg_response_time": 0.0,
        })
    );
}

#[tokio::test]
async fn test_single_sample_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = SampleStore::open(dir.path()).unwrap();

    let now = Utc::now().fixed_offset();
    let today = now.date_naive();
    store.append(today, Sample::new(now, Some(50.5))).unwrap();

    let base_url = start_test_server(&config, store.clone()).await;
    let client = reqwest::Client::new();

    // Skip the assertions if the UTC date rolled over mid-test.
    if Utc::now().date_naive() != today {
        return;
    }

    let data = get_json(&client, format!("{}/api/data", base_url)).await;
    let data = data.as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["response_time"], 50.5);
    assert_eq!(data[0]["success"], true);
    let parsed: Sample = serde_json::from_value(data[0].clone()).unwrap();
    assert_eq!(parsed, store.read(today)[0]);

    let stats = get_json(&client, format!("{}/api/stats", base_url)).await;
    assert_eq!(
        stats,
        json!({
            "total_pings": 1,
            "successful_pings": 1,
            "failed_pings": 0,
            "success_rate": 100.0,
            "avg_response_time": 50.5,
        })
    );
}

// =============================================================================
// Sampler + API
// =============================================================================

#[tokio::test]
async fn test_sampler_feeds_api() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = SampleStore::open(dir.path()).unwrap();

    let probe = Arc::new(MockProbe::new(
        MockProbeConfig::default()
            .with_success_rate(1.0)
            .with_seed(11),
    ));
    let handle = Sampler::new(&config, probe, store.clone()).spawn();

    let base_url = start_test_server(&config, store).await;
    let client = reqwest::Client::new();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let data = loop {
        let data = get_json(&client, format!("{}/api/data", base_url)).await;
        if data.as_array().is_some_and(|d| d.len() >= 2) {
            break data;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "sampler did not produce samples in time"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    };

    for sample in data.as_array().unwrap() {
        assert_eq!(sample["success"], true);
        let latency = sample["response_time"].as_f64().unwrap();
        assert!((10.0..=100.0).contains(&latency));
    }

    let stats = get_json(&client, format!("{}/api/stats", base_url)).await;
    assert!(stats["total_pings"].as_u64().unwrap() >= 2);
    assert_eq!(stats["failed_pings"], 0);
    assert_eq!(stats["success_rate"], 100.0);

    handle.shutdown().await.unwrap();
}
