//! Everynet webhook ingress.
//!
//! Acceptance ≠ decode success: a structurally valid request is always
//! `200` with an opaque accepted-message id, even when nothing could be
//! decoded. `4xx` is reserved for unprocessable requests (non-JSON body),
//! `5xx` for unexpected internal faults.

use super::response::bad_request;
use crate::pipeline::{HttpRequestMeta, IncomingMessage};
use crate::state::AppState;
use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use rastro_protocol::SourceType;
use serde_json::{Value, json};
use std::net::SocketAddr;

/// Webhook bodies are small; anything past this is not a gateway uplink.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// POST /api/v1/ingest/everynet
pub async fn handle_everynet(State(state): State<AppState>, request: Request) -> Response {
    let connect_info = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .cloned();
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => return bad_request(format!("failed to read request body: {e}")),
    };

    let Ok(envelope) = serde_json::from_slice::<Value>(&body) else {
        return bad_request("request body is not valid JSON");
    };

    let declared_serial = extract_device_serial(&envelope);
    let gateway_id = extract_gateway_id(&envelope);
    let (remote_address, remote_port) = match connect_info {
        Some(ConnectInfo(addr)) => (Some(addr.ip().to_string()), Some(addr.port())),
        None => (None, None),
    };

    let mut metadata = serde_json::Map::new();
    metadata.insert("received_via".to_owned(), json!("HTTP_WEBHOOK"));

    let message_id = state
        .pipeline
        .ingest_message(IncomingMessage {
            payload: body.to_vec(),
            source_type: SourceType::LorawanEverynet,
            source_identifier: gateway_id,
            declared_serial,
            remote_address,
            remote_port,
            http: Some(HttpRequestMeta {
                method: "POST".to_owned(),
                path: "/api/v1/ingest/everynet".to_owned(),
                user_agent,
            }),
            metadata,
        })
        .await;

    (
        StatusCode::OK,
        Json(json!({"success": true, "message_id": message_id})),
    )
        .into_response()
}

/// Device identity hides in several places depending on the gateway's
/// webhook shape.
fn extract_device_serial(envelope: &Value) -> Option<String> {
    [
        envelope.get("meta").and_then(|m| m.get("device")),
        envelope.get("params").and_then(|p| p.get("device")),
        envelope.get("dev_eui"),
        envelope.get("device_id"),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .find(|s| !s.is_empty())
    .map(str::to_owned)
}

fn extract_gateway_id(envelope: &Value) -> Option<String> {
    [
        envelope.get("meta").and_then(|m| m.get("gateway")),
        envelope.get("gateway_id"),
        envelope.get("gatewayEui"),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .find(|s| !s.is_empty())
    .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_serial_prefers_nested_meta_then_aliases() {
        let uplink = json!({"meta": {"device": "D1"}, "dev_eui": "D2"});
        assert_eq!(extract_device_serial(&uplink).as_deref(), Some("D1"));

        let webhook = json!({"dev_eui": "ABC"});
        assert_eq!(extract_device_serial(&webhook).as_deref(), Some("ABC"));

        let alias = json!({"device_id": "XYZ"});
        assert_eq!(extract_device_serial(&alias).as_deref(), Some("XYZ"));

        assert_eq!(extract_device_serial(&json!({"dev_eui": ""})), None);
        assert_eq!(extract_device_serial(&json!({})), None);
    }

    #[test]
    fn gateway_id_checks_all_known_locations() {
        let uplink = json!({"meta": {"gateway": "gw-1"}});
        assert_eq!(extract_gateway_id(&uplink).as_deref(), Some("gw-1"));

        let webhook = json!({"gateway_id": "gw-2"});
        assert_eq!(extract_gateway_id(&webhook).as_deref(), Some("gw-2"));

        let eui = json!({"gatewayEui": "AA-BB"});
        assert_eq!(extract_gateway_id(&eui).as_deref(), Some("AA-BB"));
    }
}
