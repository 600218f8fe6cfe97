use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt::Display;

/// Error envelope shared by every non-2xx JSON response.
#[derive(Debug, Serialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
}

pub(crate) fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> Response {
    (
        status,
        Json(HttpErrorEnvelope {
            code: code.into(),
            message: message.into(),
        }),
    )
        .into_response()
}

pub fn internal_error(err: impl Display) -> Response {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        err.to_string(),
    )
}

pub fn bad_request(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
}
