use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::Request;
use chrono::{TimeZone, Utc};
use rankwatch_core::memory::MemoryStore;
use rankwatch_core::{ConfigStore, ItemRecord, RecordStore, CRAWL_INTERVAL_SETTING};
use rankwatch_crawl::{ProcessSupervisor, WorkerConfig};
use tower::ServiceExt;
use uuid::Uuid;

use super::*;

const SLOW_WORKER: &str = "cat >/dev/null\nsleep 2\nexit 0\n";

fn bash_worker(body: &str) -> WorkerConfig {
    let script = std::env::temp_dir().join(format!("rankwatch-api-{}.sh", Uuid::new_v4()));
    std::fs::write(&script, body).expect("write worker script");
    WorkerConfig {
        project_root: std::env::temp_dir(),
        script,
        interpreter_candidates: vec!["bash".to_string()],
        version_pattern: r"version \d+\.\d+".to_string(),
        max_captured_lines: 20,
    }
}

fn test_app(config: WorkerConfig) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let supervisor = ProcessSupervisor::new(config).expect("supervisor");
    let engine = CrawlEngine::new(Arc::clone(&store), supervisor);
    (build_app(AppState { engine }), store)
}

fn record(id: i64, asin: &str, url: &str, rank: Option<i32>) -> ItemRecord {
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    ItemRecord {
        id,
        asin: asin.to_string(),
        url: Some(url.to_string()),
        name: format!("Product {asin}"),
        rank,
        price: None,
        brand: None,
        ratings: None,
        stars: None,
        image_url: None,
        listing_date: None,
        created_at: at,
        updated_at: at,
    }
}

fn query_encode(raw: &str) -> String {
    let mut out = String::new();
    for b in raw.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(b));
        } else {
            write!(out, "%{b:02X}").unwrap();
        }
    }
    out
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[test]
fn api_error_codes_map_to_statuses() {
    for (code, status) in [
        ("validation_error", StatusCode::BAD_REQUEST),
        ("conflict", StatusCode::CONFLICT),
        ("worker_unavailable", StatusCode::SERVICE_UNAVAILABLE),
        ("not_found", StatusCode::NOT_FOUND),
        ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
    ] {
        let response = ApiError::new("req-1", code, "message").into_response();
        assert_eq!(response.status(), status, "{code}");
    }
}

#[tokio::test]
async fn health_reports_ok_and_echoes_request_id() {
    let (app, _store) = test_app(bash_worker("exit 0\n"));
    let request = Request::builder()
        .uri("/api/v1/health")
        .header("x-request-id", "req-health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "req-health"
    );
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["data"]["status"], "ok");
    assert_eq!(json["meta"]["request_id"], "req-health");
}

#[tokio::test]
async fn crawl_interval_defaults_and_updates() {
    let (app, store) = test_app(bash_worker("exit 0\n"));

    let (status, json) = send(&app, get("/api/v1/settings/crawl-interval")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["interval"], 2);

    let (status, json) = send(
        &app,
        json_request(
            "PUT",
            "/api/v1/settings/crawl-interval",
            &serde_json::json!({ "interval": 8 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["interval"], 8);
    assert_eq!(
        store.get(CRAWL_INTERVAL_SETTING).await.unwrap().as_deref(),
        Some("8")
    );

    let (_, json) = send(&app, get("/api/v1/settings/crawl-interval")).await;
    assert_eq!(json["data"]["interval"], 8);
}

#[tokio::test]
async fn out_of_range_interval_is_a_validation_error() {
    let (app, store) = test_app(bash_worker("exit 0\n"));

    for bad in [0, 25] {
        let (status, json) = send(
            &app,
            json_request(
                "PUT",
                "/api/v1/settings/crawl-interval",
                &serde_json::json!({ "interval": bad }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{bad}");
        assert_eq!(json["error"]["code"], "validation_error");
    }
    assert_eq!(store.get(CRAWL_INTERVAL_SETTING).await.unwrap(), None);
}

#[tokio::test]
async fn empty_crawl_request_is_rejected() {
    let (app, store) = test_app(bash_worker("exit 0\n"));

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/crawl",
            &serde_json::json!({ "urls": ["  ", ""] }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
    assert_eq!(store.url_list_count(), 0);
}

#[tokio::test]
async fn crawl_is_accepted_and_overlap_conflicts() {
    let (app, store) = test_app(bash_worker(SLOW_WORKER));
    let body = serde_json::json!({ "urls": ["https://example.com/dp/A1"] });

    let (status, json) = send(&app, json_request("POST", "/api/v1/crawl", &body)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["data"]["urls"][0], "https://example.com/dp/A1");
    let batch_id = json["data"]["batch_id"].as_str().unwrap().to_string();
    assert_eq!(store.url_list_count(), 1);

    let (status, json) = send(&app, json_request("POST", "/api/v1/crawl", &body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "conflict");

    let (status, json) = send(&app, get("/api/v1/crawl/current")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["batch"]["id"], batch_id.as_str());

    // Once the worker exits the slot frees and the report is kept.
    let mut report = serde_json::Value::Null;
    for _ in 0..100 {
        let (_, json) = send(&app, get("/api/v1/crawl/current")).await;
        if json["data"]["batch"].is_null() && !json["data"]["last_report"].is_null() {
            report = json["data"]["last_report"].clone();
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(report["batch_id"], batch_id.as_str());
    assert_eq!(report["outcome"]["kind"], "success");
}

#[tokio::test]
async fn missing_interpreter_is_reported_as_unavailable() {
    let config = WorkerConfig {
        interpreter_candidates: vec!["rankwatch-no-such-interpreter".to_string()],
        ..bash_worker("exit 0\n")
    };
    let (app, _store) = test_app(config);

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/crawl",
            &serde_json::json!({ "urls": ["https://example.com/dp/A1"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"]["code"], "worker_unavailable");

    let (_, json) = send(&app, get("/api/v1/crawl/current")).await;
    assert!(json["data"]["batch"].is_null());
    assert_eq!(
        json["data"]["last_report"]["outcome"]["kind"],
        "interpreter_not_found"
    );
}

#[tokio::test]
async fn crawl_status_reports_per_url_completion() {
    let (app, store) = test_app(bash_worker("exit 0\n"));
    store.seed_record(record(1, "A1", "https://example.com/dp/A1", Some(10)));

    let urls = serde_json::json!(["https://example.com/dp/A1", "https://example.com/dp/B2"]);
    let uri = format!(
        "/api/v1/crawl/status?urls={}&since={}",
        query_encode(&urls.to_string()),
        query_encode("2026-03-01T11:00:00Z"),
    );

    let (status, json) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["done"], 1);
    assert_eq!(json["data"]["total"], 2);
    assert_eq!(json["data"]["converged"], false);
    assert_eq!(
        json["data"]["items"]["https://example.com/dp/A1"]["state"],
        "done"
    );
    assert_eq!(
        json["data"]["items"]["https://example.com/dp/B2"]["state"],
        "pending"
    );
}

#[tokio::test]
async fn crawl_status_rejects_malformed_url_list() {
    let (app, _store) = test_app(bash_worker("exit 0\n"));
    let uri = format!("/api/v1/crawl/status?urls={}", query_encode("not-json"));

    let (status, json) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
}

#[tokio::test]
async fn products_are_listed_by_rank_with_unranked_last() {
    let (app, store) = test_app(bash_worker("exit 0\n"));
    store.seed_record(record(1, "C3", "https://example.com/dp/C3", None));
    store.seed_record(record(2, "B2", "https://example.com/dp/B2", Some(50)));
    store.seed_record(record(3, "A1", "https://example.com/dp/A1", Some(5)));

    let (status, json) = send(&app, get("/api/v1/products")).await;
    assert_eq!(status, StatusCode::OK);
    let asins: Vec<&str> = json["data"]["products"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["asin"].as_str().unwrap())
        .collect();
    assert_eq!(asins, vec!["A1", "B2", "C3"]);
    assert_eq!(json["data"]["products"][0]["rank_trend"], "new");
}

#[tokio::test]
async fn clear_database_removes_records_and_keeps_settings() {
    let (app, store) = test_app(bash_worker("exit 0\n"));
    store.seed_record(record(1, "A1", "https://example.com/dp/A1", Some(10)));
    store.set(CRAWL_INTERVAL_SETTING, "4").await.unwrap();

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/settings/clear-database",
            &serde_json::json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["cleared"], true);
    assert!(store.get_all().await.unwrap().is_empty());
    assert_eq!(
        store.get(CRAWL_INTERVAL_SETTING).await.unwrap().as_deref(),
        Some("4")
    );
}
