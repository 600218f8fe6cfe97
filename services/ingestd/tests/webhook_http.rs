// HTTP ingress contract tests: the webhook always acknowledges structurally
// valid requests, and the audit-log query surface serves the forensic
// trail.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use http_body_util::BodyExt as _;
use ingestd::http::build_router;
use ingestd::pipeline::{IngestPipeline, PipelineOptions};
use ingestd::state::AppState;
use ingestd::store::memory::{MemoryDirectory, MemoryStore};
use ingestd::store::IngestStore;
use isca_core::test_support::build_lora_frame;
use rastro_protocol::ProcessingStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tower::ServiceExt as _;
use uuid::Uuid;

struct Harness {
    router: axum::Router,
    store: Arc<MemoryStore>,
    directory: Arc<MemoryDirectory>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let directory = Arc::new(MemoryDirectory::new());
    let pipeline = Arc::new(IngestPipeline::new(
        store.clone(),
        directory.clone(),
        PipelineOptions::default(),
    ));
    let router = build_router(AppState::new(pipeline, store.clone()));
    Harness {
        router,
        store,
        directory,
    }
}

fn post_json(body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/ingest/everynet")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "everynet-core/2.1")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn wait_for_terminal_audit(store: &MemoryStore) -> ingestd::audit::AuditLogEntry {
    for _ in 0..200 {
        let entries = store
            .recent_audit_logs(&ingestd::store::AuditLogQuery {
                status: None,
                device_serial_number: None,
                limit: 10,
            })
            .await
            .unwrap();
        if let Some(entry) = entries.into_iter().find(|e| e.status.is_terminal()) {
            return entry;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("no terminal audit entry appeared");
}

#[tokio::test]
async fn unknown_device_webhook_returns_200_with_message_id() {
    let h = harness();
    let body = serde_json::json!({
        "dev_eui": "ABC",
        "payload": BASE64.encode(b"hi"),
        "gateway_id": "gw-7"
    });

    let response = h.router.clone().oneshot(post_json(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    assert_eq!(parsed["success"], true);
    let message_id: Uuid = parsed["message_id"]
        .as_str()
        .expect("message_id present")
        .parse()
        .expect("message_id is a uuid");

    // Acceptance recorded even though nothing decoded.
    let raws = h.store.raw_messages().await;
    assert_eq!(raws.len(), 1);
    assert_eq!(raws[0].id, message_id);
    assert_eq!(raws[0].device_serial_number.as_deref(), Some("ABC"));
    assert_eq!(raws[0].source_identifier.as_deref(), Some("gw-7"));

    let entry = wait_for_terminal_audit(&h.store).await;
    assert_eq!(entry.status, ProcessingStatus::Success);
    assert_eq!(entry.user_agent.as_deref(), Some("everynet-core/2.1"));
    assert_eq!(entry.http_path.as_deref(), Some("/api/v1/ingest/everynet"));
}

#[tokio::test]
async fn registered_isca_device_webhook_decodes_to_telemetry() {
    let h = harness();
    h.directory.register("ABC123", "ISCAFK").await;

    let frame = build_lora_frame(0x01, 0x42, 25, 3700, 0b0000_1000, 0);
    let body = serde_json::json!({
        "dev_eui": "ABC123",
        "payload": BASE64.encode(&frame),
        "gps": {"lat": -23.55, "lng": -46.63},
        "rssi": -90
    });

    let response = h.router.clone().oneshot(post_json(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    for _ in 0..200 {
        if !h.store.telemetry().await.is_empty() {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    let telemetry = h.store.telemetry().await;
    assert_eq!(telemetry.len(), 1);
    let reading = &telemetry[0].reading;
    assert_eq!(reading.device_serial_number, "ABC123");
    assert_eq!(reading.latitude, -23.55);
    assert_eq!(reading.ignition, Some(true));
    assert_eq!(reading.additional_data["location_source"], "gateway");
}

#[tokio::test]
async fn malformed_body_is_rejected_with_400_and_nothing_recorded() {
    let h = harness();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/ingest/everynet")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let parsed = json_body(response).await;
    assert_eq!(parsed["code"], "BAD_REQUEST");

    assert!(h.store.raw_messages().await.is_empty());
    assert_eq!(h.store.audit_log_count().await, 0);
}

#[tokio::test]
async fn audit_log_query_surface_filters_by_status() {
    let h = harness();
    let body = serde_json::json!({"dev_eui": "Q1", "payload": BASE64.encode(b"x")});
    let response = h.router.clone().oneshot(post_json(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    wait_for_terminal_audit(&h.store).await;

    let request = Request::builder()
        .uri("/api/v1/audit-logs?status=SUCCESS&device=Q1")
        .body(Body::empty())
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    let entries = parsed.as_array().expect("list");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["device_serial_number"], "Q1");
    assert_eq!(entries[0]["status"], "SUCCESS");

    // No FAILED entries yet.
    let request = Request::builder()
        .uri("/api/v1/audit-logs?status=FAILED")
        .body(Body::empty())
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    let parsed = json_body(response).await;
    assert_eq!(parsed.as_array().expect("list").len(), 0);
}

#[tokio::test]
async fn audit_log_query_rejects_unknown_status() {
    let h = harness();
    let request = Request::builder()
        .uri("/api/v1/audit-logs?status=EXPLODED")
        .body(Body::empty())
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_endpoints_answer_ok() {
    let h = harness();
    for path in ["/healthz", "/readyz"] {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = h.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
