//! API module for the tenantflow server
//!
//! The editor admin API lives under the configured admin root; `/health`
//! sits outside it. Every request passes the context resolver first, admin
//! requests then pass the role gate, and flow fetches are narrowed to the
//! caller's scope by the `filter_flows_response` stage.

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use std::sync::Arc;
use tenantflow_core::StorageModule;
use tower_http::trace::TraceLayer;

pub mod context;
pub mod errors;
pub mod filter;
pub mod flows;
pub mod health;
pub mod library;

use crate::config::ServerConfig;
use crate::export::FlowExporter;
use context::ContextResolver;

/// State shared by every handler
pub struct AppState {
    pub storage: Arc<StorageModule>,
    pub config: ServerConfig,
    pub resolver: Arc<dyn ContextResolver>,
    pub exporter: Option<FlowExporter>,
}

/// Build the router for API endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    let flow_routes = Router::new()
        .route("/flows", get(flows::get_flows).post(flows::save_flows))
        .route_layer(from_fn_with_state(
            state.clone(),
            filter::filter_flows_response,
        ));

    let admin = Router::new()
        .merge(flow_routes)
        .route(
            "/library/local/flows",
            get(library::list_root).post(library::save_root),
        )
        .route(
            "/library/local/flows/*path",
            get(library::list_path).post(library::save_path),
        )
        .route_layer(from_fn_with_state(state.clone(), context::admin_gate));

    let root = state.config.admin_root.clone();
    let router = Router::new().route("/health", get(health::health_check));
    let router = if root == "/" {
        router.merge(admin)
    } else {
        router.nest(&root, admin)
    };

    router
        .layer(from_fn_with_state(state.clone(), context::resolve_context))
        .layer(DefaultBodyLimit::max(state.config.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
