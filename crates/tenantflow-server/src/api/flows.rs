//! Flow fetch and save handlers

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::Value;
use std::sync::Arc;
use tenantflow_core::CallContext;
use tracing::{info, warn};

use super::errors::ApiError;
use super::AppState;

/// Header carrying the reload correlation id of a save
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Full engine document; narrowed per scope by `filter_flows_response`
pub async fn get_flows(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.storage.cache().engine_document().await)
}

/// Accept `{"flows": [...]}` or a bare node array
fn submitted_nodes(body: &Value) -> Result<Vec<Value>, ApiError> {
    let nodes = match body {
        Value::Array(nodes) => nodes,
        Value::Object(fields) => match fields.get("flows") {
            Some(Value::Array(nodes)) => nodes,
            _ => {
                return Err(ApiError::BadRequest(
                    "request body must carry a `flows` array".to_string(),
                ))
            }
        },
        _ => {
            return Err(ApiError::BadRequest(
                "request body must be a JSON object or array".to_string(),
            ))
        }
    };
    Ok(nodes.clone())
}

/// Reconcile the caller's flows and echo the request body
pub async fn save_flows(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<CallContext>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let nodes = submitted_nodes(&body)?;
    let outcome = state.storage.save_flows(nodes.clone(), &ctx).await?;

    if let Some(exporter) = &state.exporter {
        if let Err(err) = exporter.export(&nodes).await {
            warn!(error = %err, "Flow file export failed");
        }
    }

    info!(
        correlation_id = %outcome.correlation_id,
        revision = outcome.revision,
        "Flows saved"
    );

    let mut response = (StatusCode::OK, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(&outcome.correlation_id.to_string()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    Ok(response)
}
