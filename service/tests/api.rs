use axum::routing::get;
use axum::Router;
use chrono::{TimeZone, Utc};
use polars::prelude::*;
use pretty_assertions::assert_eq;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use terrabench_model::{AdminEnvelope, BenchmarkRunRecord, DetailResponse, ScenarioSummary};
use terrabench_service::clock::ManualClock;
use terrabench_service::config::ServiceConfig;
use terrabench_service::{app_state, http};

const ADMIN_TOKEN: &str = "integration-test-token";

/// One published partition, 2025-01, holding 4 rice_mapper runs
/// (3 passed, 1 failed).
fn partition_bytes() -> Vec<u8> {
    let ms = |day: u32| {
        Utc.with_ymd_and_hms(2025, 1, day, 6, 0, 0)
            .unwrap()
            .timestamp_millis()
    };
    let mut frame = df! [
        "scenario_id" => ["rice_mapper", "rice_mapper", "rice_mapper", "rice_mapper"],
        "cpu_seconds" => [812.5_f64, 790.124_f64, 805.0_f64, 1203.7_f64],
        "memory_seconds" => [3200.0_f64, 3150.55_f64, 3180.0_f64, 4800.2_f64],
        "cost" => [4.2_f64, 4.1_f64, 4.15_f64, 6.9_f64],
        "duration_seconds" => [412.5_f64, 401.004_f64, 407.8_f64, 603.1_f64],
        "input_pixels" => [12_000_000_i64, 12_000_000_i64, 12_000_000_i64, 12_000_000_i64],
        "max_executor_memory" => [2_147_483_648_i64; 4].to_vec(),
        "network_received_bytes" => [52_428_800_i64; 4].to_vec(),
        "area_km2" => [250.5_f64; 4].to_vec(),
        "started_at" => [ms(10), ms(11), ms(12), ms(13)],
        "outcome" => ["passed", "passed", "passed", "failed"],
    ]
    .unwrap();

    let mut bytes = Vec::new();
    ParquetWriter::new(&mut bytes).finish(&mut frame).unwrap();
    bytes
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Stands in for the remote partition store. HEAD and GET succeed for the
/// single published month, every other candidate is a 404.
async fn start_partition_store() -> SocketAddr {
    let data = partition_bytes();
    let app = Router::new().route(
        "/benchmarks/2025/01/runs.parquet",
        get(move || {
            let data = data.clone();
            async move { data }
        }),
    );
    serve(app).await
}

async fn start_service() -> SocketAddr {
    let store = start_partition_store().await;
    let config = ServiceConfig {
        partition_url_template: format!(
            "http://{store}/benchmarks/[YEAR]/[MONTH]/runs.parquet"
        ),
        lookback_months: 2,
        discovery_ttl: chrono::Duration::hours(1),
        probe_timeout: Duration::from_secs(5),
        fetch_timeout: Duration::from_secs(5),
        admin_token: Some(ADMIN_TOKEN.to_string()),
        scenario_ids: Some(vec!["rice_mapper".to_string(), "flood_extent".to_string()]),
    };
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 2, 15, 10, 0, 0).unwrap());
    let state = app_state(&config, Arc::new(clock));
    serve(http::router(state)).await
}

#[tokio::test]
async fn public_summary_aggregates_the_published_partition() {
    let service = start_service().await;
    let response = reqwest::get(format!("http://{service}/api/benchmarks"))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let summaries: Vec<ScenarioSummary> = response.json().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].scenario_id, "rice_mapper");
    assert_eq!(summaries[0].runs, 4);
    assert_eq!(summaries[0].success_count, 3);
    assert_eq!(summaries[0].failed_count, 1);
    assert_eq!(summaries[0].success_rate, Some(75.0));
}

#[tokio::test]
async fn public_detail_lists_runs_newest_first() {
    let service = start_service().await;
    let response = reqwest::get(format!("http://{service}/api/benchmarks/rice_mapper"))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let detail: DetailResponse = response.json().await.unwrap();
    assert_eq!(detail.scenario_id, "rice_mapper");
    assert_eq!(detail.data.len(), 4);

    let times: Vec<_> = detail.data.iter().map(|r| r.started_at).collect();
    let mut sorted = times.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(times, sorted);

    // Query-level rounding: cpu/memory/cost are integers, duration keeps 2dp.
    let newest = &detail.data[0];
    assert_eq!(newest.cpu_seconds, 1203);
    assert_eq!(newest.cost, 6);
    assert_eq!(newest.duration_seconds, 603.1);
}

#[tokio::test]
async fn unknown_scenario_is_a_404_with_error_body() {
    let service = start_service().await;
    let response = reqwest::get(format!("http://{service}/api/benchmarks/unlisted_algo"))
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("unlisted_algo"));
}

#[tokio::test]
async fn admin_endpoints_require_the_bearer_token() {
    let service = start_service().await;
    let client = reqwest::Client::new();

    let denied = client
        .get(format!("http://{service}/api/admin/benchmarks"))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 403);

    let allowed = client
        .get(format!("http://{service}/api/admin/benchmarks"))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);
}

#[tokio::test]
async fn admin_summary_with_explicit_range_returns_envelope_metadata() {
    let service = start_service().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!(
            "http://{service}/api/admin/benchmarks?start=2025-01-01&end=2025-01-31"
        ))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let envelope: AdminEnvelope<ScenarioSummary> = response.json().await.unwrap();
    assert_eq!(envelope.data.len(), 1);
    assert_eq!(envelope.data[0].runs, 4);
    assert_eq!(envelope.data[0].success_count, 3);
    assert_eq!(envelope.data[0].failed_count, 1);

    let metadata = &envelope.metadata;
    assert_eq!(metadata.total_count, 1);
    assert_eq!(metadata.page_info.limit, 100);
    assert_eq!(metadata.page_info.offset, 0);
    assert!(!metadata.page_info.has_next_page);
    assert_eq!(
        metadata.date_range.start,
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    );
    assert_eq!(metadata.filters_applied.status, "all");
    assert_eq!(metadata.filters_applied.sort, "scenario_id");
    assert_eq!(metadata.filters_applied.order, "asc");
}

#[tokio::test]
async fn admin_detail_paginates_and_sorts() {
    let service = start_service().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!(
            "http://{service}/api/admin/benchmarks/rice_mapper\
             ?start=2025-01-01&end=2025-01-31&limit=2&offset=0&sort=started_at&order=asc"
        ))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let envelope: AdminEnvelope<BenchmarkRunRecord> = response.json().await.unwrap();
    assert_eq!(envelope.data.len(), 2);
    assert!(envelope.data[0].started_at < envelope.data[1].started_at);
    assert_eq!(envelope.metadata.total_count, 4);
    assert!(envelope.metadata.page_info.has_next_page);
}

#[tokio::test]
async fn admin_status_filter_restricts_the_rows() {
    let service = start_service().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!(
            "http://{service}/api/admin/benchmarks/rice_mapper?status=failed"
        ))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let envelope: AdminEnvelope<BenchmarkRunRecord> = response.json().await.unwrap();
    assert_eq!(envelope.data.len(), 1);
    assert_eq!(envelope.metadata.total_count, 1);
    assert_eq!(envelope.metadata.filters_applied.status, "failed");
}

#[tokio::test]
async fn validation_failures_are_machine_readable_400s() {
    let service = start_service().await;
    let client = reqwest::Client::new();

    for (query, fragment) in [
        ("start=01-2025-01", "YYYY-MM-DD"),
        ("end=2025-01-31", "start is required"),
        ("start=2025-01-31&end=2025-01-01", "end must be on or after start"),
        ("limit=5000", "limit must be between"),
        ("sort=surprise_field", "sort must be one of"),
        ("order=sideways", "order must be asc or desc"),
    ] {
        let response = client
            .get(format!("http://{service}/api/admin/benchmarks?{query}"))
            .bearer_auth(ADMIN_TOKEN)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "query: {query}");
        let body: serde_json::Value = response.json().await.unwrap();
        assert!(
            body["message"].as_str().unwrap().contains(fragment),
            "query: {query}, body: {body}"
        );
    }
}
