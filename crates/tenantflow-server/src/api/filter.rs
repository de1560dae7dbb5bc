//! Response stage narrowing `GET <admin-root>/flows` to the caller's scope

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tenantflow_core::{CallContext, CoreError};
use tracing::debug;

use super::errors::ApiError;
use super::AppState;

/// Rewrite the engine's `{flows, rev}` to the scope-filtered subset
///
/// Non-GET requests and unsuccessful upstream responses pass through
/// untouched. The scope's records are read from the flow store on every
/// fetch; the `rev` of the upstream document is kept as is.
pub async fn filter_flows_response(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let ctx = request
        .extensions()
        .get::<CallContext>()
        .cloned()
        .unwrap_or_default();
    let scope = match ctx.require_scope() {
        Ok(scope) => scope.clone(),
        Err(err) => return ApiError::from(err).into_response(),
    };

    let response = next.run(request).await;
    if !response.status().is_success() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return ApiError::from(CoreError::SerializationError(format!(
                "unreadable flows response: {}",
                err
            )))
            .into_response()
        }
    };
    let upstream: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => return ApiError::from(CoreError::from(err)).into_response(),
    };
    let rev = upstream.get("rev").cloned().unwrap_or(Value::Null);

    let visible = match state.storage.coordinator().list_for(&ctx).await {
        Ok(records) => records,
        Err(err) => return ApiError::from(err).into_response(),
    };
    debug!(scope = %scope, visible = visible.len(), "Filtered flows response");

    let nodes: Vec<Value> = visible.into_iter().map(|record| record.node).collect();
    let body = json!({ "flows": nodes, "rev": rev });
    let bytes = match serde_json::to_vec(&body) {
        Ok(bytes) => bytes,
        Err(err) => return ApiError::from(CoreError::from(err)).into_response(),
    };

    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}
