//! Health check endpoint

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use super::AppState;

/// Report flow store and credential store status
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let flow_store = match state.storage.coordinator().health_check().await {
        Ok(healthy) => healthy,
        Err(err) => {
            warn!(error = %err, "Flow store health check failed");
            false
        }
    };
    let credential_store = match state.storage.vault().health_check().await {
        Ok(healthy) => healthy,
        Err(err) => {
            warn!(error = %err, "Credential store health check failed");
            false
        }
    };

    let status = if flow_store && credential_store {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let label = |ok: bool| if ok { "up" } else { "down" };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "components": {
                "flowStore": label(flow_store),
                "credentialStore": label(credential_store),
            },
            "cacheRevision": state.storage.cache().revision().await,
        })),
    )
}
