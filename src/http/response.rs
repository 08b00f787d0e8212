//! Response envelope shared by every route.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use crate::{AppError, Result};

/// JSON body returned for every operation.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    /// Whether the operation succeeded.
    pub ok: bool,
    /// HTTP status code, repeated in the body.
    pub status: u16,
    /// Operation name.
    pub method: &'static str,
    /// Operation result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Human-readable message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Turn an operation result into a response.
pub fn respond<T: Serialize>(method: &'static str, result: Result<T>) -> Response {
    match result {
        Ok(data) => (
            StatusCode::OK,
            Json(Envelope {
                ok: true,
                status: StatusCode::OK.as_u16(),
                method,
                data: Some(data),
                error: None,
            }),
        )
            .into_response(),
        Err(err) => failure(method, &err),
    }
}

/// Response for a failed operation.
pub fn failure(method: &'static str, err: &AppError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if err.is_client_error() {
        warn!(method, status = status.as_u16(), %err, "request rejected");
    } else {
        error!(method, status = status.as_u16(), %err, "request failed");
    }

    (
        status,
        Json(Envelope::<()> {
            ok: false,
            status: status.as_u16(),
            method,
            data: None,
            error: Some(err.to_string()),
        }),
    )
        .into_response()
}

/// Response for a body that could not be decoded.
pub fn rejected(method: &'static str, rejection: &JsonRejection) -> Response {
    failure(method, &AppError::InvalidInput(rejection.body_text()))
}
