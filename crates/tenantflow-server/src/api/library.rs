//! Flow library endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tenantflow_core::CoreError;
use tracing::debug;

use super::errors::ApiError;
use super::AppState;

const FLOW_KIND: &str = "flows";

fn entry_path(path: Option<String>) -> String {
    match path {
        Some(p) if !p.trim_matches('/').is_empty() => p.trim_matches('/').to_string(),
        _ => "/".to_string(),
    }
}

async fn list(state: &AppState, path: String) -> Result<Response, ApiError> {
    let entries = state.storage.get_library_entry(FLOW_KIND, &path).await?;
    Ok(Json(Value::Array(entries)).into_response())
}

async fn save(state: &AppState, path: String, body: Value) -> Result<Response, ApiError> {
    match state
        .storage
        .save_library_entry(FLOW_KIND, &path, json!({}), body)
        .await
    {
        Ok(saved) => Ok((StatusCode::OK, Json(saved)).into_response()),
        Err(CoreError::Unsupported(reason)) => {
            debug!(%path, %reason, "Library save refused");
            Ok((StatusCode::BAD_REQUEST, Json(json!({ "error": "Error" }))).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn list_root(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    list(&state, entry_path(None)).await
}

pub async fn list_path(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    list(&state, entry_path(Some(path))).await
}

pub async fn save_root(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    save(&state, entry_path(None), body).await
}

pub async fn save_path(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    save(&state, entry_path(Some(path)), body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_entry_path_normalisation() {
        assert_eq!(entry_path(None), "/");
        assert_eq!(entry_path(Some("/".to_string())), "/");
        assert_eq!(entry_path(Some("team/demo/".to_string())), "team/demo");
    }
}
