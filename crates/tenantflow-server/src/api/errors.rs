//! Error responses for the admin API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tenantflow_core::CoreError;
use tracing::{error, warn};

use crate::error::ServerError;

/// API error returned by handlers
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),
    /// Unauthorized (401)
    Unauthorized,
    /// Failure from the storage core
    Core(CoreError),
    /// Wrapped server error
    Server(ServerError),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Core(err)
    }
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Core(core) => ApiError::Core(core),
            other => ApiError::Server(other),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::Unauthorized => write!(f, "Unauthorized"),
            ApiError::Core(err) => write!(f, "{}", err),
            ApiError::Server(err) => write!(f, "{}", err),
        }
    }
}

/// HTTP status and error code for a core failure
pub fn core_error_status(err: &CoreError) -> (StatusCode, &'static str) {
    match err {
        CoreError::ScopeResolutionFailed(_) => (StatusCode::BAD_REQUEST, "ERR_SCOPE_RESOLUTION"),
        CoreError::ValidationError(_) => (StatusCode::BAD_REQUEST, "ERR_VALIDATION_ERROR"),
        CoreError::ConcurrentModification(_) => {
            (StatusCode::CONFLICT, "ERR_CONCURRENT_MODIFICATION")
        }
        CoreError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "ERR_TIMEOUT"),
        CoreError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "ERR_STORE_UNAVAILABLE"),
        CoreError::DecryptionFailed(_) | CoreError::CorruptVault(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "ERR_VAULT")
        }
        CoreError::Unsupported(_) => (StatusCode::BAD_REQUEST, "ERR_UNSUPPORTED"),
        CoreError::SerializationError(_)
        | CoreError::ConfigurationError(_)
        | CoreError::ReloadChannelError(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "ERR_INTERNAL_SERVER_ERROR")
        }
    }
}

fn error_body(status: StatusCode, code: &str, message: String) -> Response {
    let error = status
        .canonical_reason()
        .unwrap_or("Error")
        .to_string();
    (
        status,
        Json(json!({
            "error": error,
            "errorDetails": {
                "errorCode": code,
                "errorMessage": message,
            }
        })),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => error_body(StatusCode::BAD_REQUEST, "ERR_BAD_REQUEST", msg),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthorized" })),
            )
                .into_response(),
            ApiError::Core(err) => {
                let (status, code) = core_error_status(&err);
                if status.is_server_error() {
                    error!(error = %err, "Request failed");
                } else {
                    warn!(error = %err, "Request rejected");
                }
                error_body(status, code, err.to_string())
            }
            ApiError::Server(err) => {
                error!(error = %err, "Request failed");
                error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ERR_INTERNAL_SERVER_ERROR",
                    err.to_string(),
                )
            }
        }
    }
}
