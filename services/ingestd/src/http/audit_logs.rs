//! Audit-log query surface — the forensic trail for unrecognized or
//! malformed device traffic.

use super::response::{bad_request, internal_error};
use crate::state::AppState;
use crate::store::AuditLogQuery;
use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use rastro_protocol::ProcessingStatus;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct AuditLogsParams {
    pub status: Option<String>,
    pub device: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// GET /api/v1/audit-logs?status=FAILED&device=123&limit=50
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(params): Query<AuditLogsParams>,
) -> Response {
    let status = match params.status.as_deref() {
        None => None,
        Some(raw) => match ProcessingStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return bad_request(
                    "invalid status; use RECEIVED|PROCESSING|SUCCESS|FAILED",
                );
            }
        },
    };

    let query = AuditLogQuery {
        status,
        device_serial_number: params.device,
        limit: params.limit.clamp(1, 500),
    };

    match state.store.recent_audit_logs(&query).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => internal_error(e),
    }
}
