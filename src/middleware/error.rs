//! Error response formatting middleware
//!
//! Every failed request gets the same JSON envelope as the wallet
//! endpoints' success responses: `{"status": "failed", "message", ...}`
//! with a machine-readable `error` code and a `retryable` hint.

use crate::error::{AppError, ErrorCode};
use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Standardized error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `"failed"`
    pub status: String,

    /// Machine-readable error code
    pub error: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Request ID for debugging and support
    pub request_id: Option<String>,

    /// ISO 8601 timestamp of the error
    pub timestamp: String,

    /// Whether the client should retry the request
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            status: "failed".to_string(),
            error: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            retryable: error.is_retryable(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error = ?self,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                error_code = ?self.error_code(),
                context = ?self.context,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Client error occurred"
            );
        }

        let error_response = ErrorResponse::from_app_error(&self);
        let mut response = (status_code, Json(error_response)).into_response();
        // Lets `error_handling_middleware` re-render with the request id.
        response.extensions_mut().insert(self);
        response
    }
}

/// Fills in the request id on error bodies produced by handlers that never
/// saw the request headers.
pub async fn error_handling_middleware(request: Request, next: axum::middleware::Next) -> Response {
    let request_id = get_request_id_from_headers(request.headers());
    let mut response = next.run(request).await;

    let Some(request_id) = request_id else {
        return response;
    };
    match response.extensions_mut().remove::<AppError>() {
        Some(error) if error.request_id.is_none() => {
            let status = response.status();
            let body = ErrorResponse::from_app_error(&error.with_request_id(request_id));
            let mut rebuilt = (status, Json(body)).into_response();
            for (name, value) in response.headers() {
                if name != axum::http::header::CONTENT_LENGTH {
                    rebuilt.headers_mut().insert(name.clone(), value.clone());
                }
            }
            rebuilt
        }
        _ => response,
    }
}

pub fn get_request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
