//! Tests for the HTTP surface: the worker trigger endpoint and the job
//! management API, driven through the router with in-memory backends.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use conveyor_core::api::{build_router, AppState, HandlerRegistry};
use conveyor_core::cache::MemoryCache;
use conveyor_core::config::WorkerSettings;
use conveyor_core::error::Result;
use conveyor_core::jobs::{
    Dispatcher, ItemContext, ItemProcessor, ItemResult, SelfTrigger, TRIGGER_TOKEN_HEADER,
};
use conveyor_core::store::MemoryKvStore;
use conveyor_core::telemetry;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tower::ServiceExt;

// ============================================================================
// Fixtures
// ============================================================================

struct NoopProcessor;

#[async_trait]
impl ItemProcessor for NoopProcessor {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn process(&self, _item: &Value, _ctx: &ItemContext<'_>) -> ItemResult {
        Ok(())
    }
}

struct NullTrigger;

#[async_trait]
impl SelfTrigger for NullTrigger {
    async fn fire(&self, _handler: &str, _token: &str) -> Result<()> {
        Ok(())
    }
}

// The Prometheus recorder is process-global; install it once for the whole
// test binary.
static METRICS: OnceLock<PrometheusHandle> = OnceLock::new();

fn metrics_handle() -> PrometheusHandle {
    METRICS
        .get_or_init(|| telemetry::init_metrics_only().unwrap())
        .clone()
}

fn test_app() -> (Router, String) {
    let dispatcher = Dispatcher::builder("reports")
        .kv_store(Arc::new(MemoryKvStore::new()))
        .cache(Arc::new(MemoryCache::new()))
        .processor(Arc::new(NoopProcessor))
        .trigger(Arc::new(NullTrigger))
        .settings(WorkerSettings {
            time_limit: Duration::from_secs(3600),
            ..WorkerSettings::default()
        })
        .trigger_secret("api-test-secret")
        .build()
        .unwrap();
    let token = dispatcher.trigger_token();

    let mut registry = HandlerRegistry::new();
    registry.register(dispatcher);

    let state = AppState {
        registry: Arc::new(registry),
        metrics: metrics_handle(),
    };
    (build_router(state), token)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ============================================================================
// Health & Metrics
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = test_app();

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["handlers"][0], "reports");
}

#[tokio::test]
async fn test_metrics_endpoint_renders() {
    let (app, _) = test_app();

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// Worker Trigger
// ============================================================================

#[tokio::test]
async fn test_trigger_rejects_invalid_token() {
    let (app, _) = test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/worker/reports")
        .header(TRIGGER_TOKEN_HEADER, "not-the-token")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_trigger_rejects_missing_token() {
    let (app, _) = test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/worker/reports")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_trigger_unknown_handler_is_404() {
    let (app, token) = test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/worker/nonexistent")
        .header(TRIGGER_TOKEN_HEADER, token)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_trigger_with_empty_queue_returns_no_content() {
    let (app, token) = test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/worker/reports")
        .header(TRIGGER_TOKEN_HEADER, token)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_trigger_processes_queued_jobs() {
    let (app, token) = test_app();

    let (status, created) = send(
        &app,
        post_json("/api/v1/jobs/reports", json!({"data": ["a", "b"]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("POST")
        .uri("/worker/reports")
        .header(TRIGGER_TOKEN_HEADER, token)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // The invocation runs detached from the trigger request; poll for the
    // terminal state
    let mut fetched = Value::Null;
    for _ in 0..200 {
        let (_, body) = send(&app, get(&format!("/api/v1/jobs/reports/{}", id))).await;
        if body["data"]["status"] == "completed" {
            fetched = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(fetched["data"]["status"], "completed");
    assert_eq!(fetched["data"]["progress"], 2);
}

// ============================================================================
// Job Management
// ============================================================================

#[tokio::test]
async fn test_create_job_returns_the_document() {
    let (app, _) = test_app();

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/jobs/reports",
            json!({"data": [1, 2, 3], "tenant": "acme"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "queued");
    assert_eq!(body["data"]["progress"], 0);
    assert_eq!(body["data"]["tenant"], "acme");
    assert!(body["data"]["id"].as_str().is_some());
}

#[tokio::test]
async fn test_create_job_rejects_empty_attributes() {
    let (app, _) = test_app();

    let (status, body) = send(&app, post_json("/api/v1/jobs/reports", json!({}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_get_unknown_job_is_404() {
    let (app, _) = test_app();

    let (status, _) = send(
        &app,
        get("/api/v1/jobs/reports/00000000-0000-0000-0000-000000000000"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_jobs_with_status_filter() {
    let (app, _) = test_app();

    let (_, first) = send(
        &app,
        post_json("/api/v1/jobs/reports", json!({"data": [1]})),
    )
    .await;
    let (_, second) = send(
        &app,
        post_json("/api/v1/jobs/reports", json!({"data": [2]})),
    )
    .await;
    let first_id = first["data"]["id"].as_str().unwrap();
    let second_id = second["data"]["id"].as_str().unwrap().to_string();

    // Fail the first job, then filter by status
    let (status, _) = send(
        &app,
        post_json(
            &format!("/api/v1/jobs/reports/{}/fail", first_id),
            json!({"reason": "network timeout"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, queued) = send(&app, get("/api/v1/jobs/reports?status=queued")).await;
    let jobs = queued["data"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], second_id.as_str());

    let (_, failed) = send(&app, get("/api/v1/jobs/reports?status=failed")).await;
    assert_eq!(failed["data"][0]["failure_reason"], "network timeout");

    // Default listing carries both, newest first
    let (_, all) = send(&app, get("/api/v1/jobs/reports")).await;
    let jobs = all["data"].as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["id"], second_id.as_str());
}

#[tokio::test]
async fn test_fail_job_twice_is_rejected() {
    let (app, _) = test_app();

    let (_, created) = send(
        &app,
        post_json("/api/v1/jobs/reports", json!({"data": [1]})),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        post_json(
            &format!("/api/v1/jobs/reports/{}/fail", id),
            json!({"reason": "network timeout"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "failed");
    assert_eq!(body["data"]["failure_reason"], "network timeout");

    let (status, _) = send(
        &app,
        post_json(
            &format!("/api/v1/jobs/reports/{}/fail", id),
            json!({"reason": "again"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_fail_job_requires_a_reason() {
    let (app, _) = test_app();

    let (_, created) = send(
        &app,
        post_json("/api/v1/jobs/reports", json!({"data": [1]})),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        post_json(
            &format!("/api/v1/jobs/reports/{}/fail", id),
            json!({"reason": "  "}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_delete_job() {
    let (app, _) = test_app();

    let (_, created) = send(
        &app,
        post_json("/api/v1/jobs/reports", json!({"data": [1]})),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/jobs/reports/{}", id))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], true);

    let (status, _) = send(&app, get(&format!("/api/v1/jobs/reports/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
