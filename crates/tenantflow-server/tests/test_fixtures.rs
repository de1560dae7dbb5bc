//! Shared helpers for tenantflow-server tests.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use mockall::mock;
use serde_json::Value;
use tower::ServiceExt;

use tenantflow_core::{
    CoreError, FlowChangeSet, FlowRecord, FlowSnapshot, RecordKey, ReloadSubscription,
    StorageModule,
};
use tenantflow_server::{build_app_with_stores, ServerConfig, Stores};
use tenantflow_state_inmemory::InMemoryStateStoreProvider;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize test tracing
pub fn init_test_tracing() {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tenantflow_server=debug".parse().unwrap())
                .add_directive("tenantflow_core=debug".parse().unwrap()),
        )
        .with_test_writer()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

// Mock the flow store
mock! {
    pub FlowStore {}

    #[async_trait]
    impl tenantflow_core::FlowStore for FlowStore {
        async fn list(&self) -> Result<Vec<FlowRecord>, CoreError>;
        async fn snapshot(&self) -> Result<FlowSnapshot, CoreError>;
        async fn upsert(&self, records: &[FlowRecord]) -> Result<Vec<FlowRecord>, CoreError>;
        async fn remove_all(&self, keys: &[RecordKey]) -> Result<usize, CoreError>;
        async fn apply(&self, changes: FlowChangeSet) -> Result<u64, CoreError>;
        async fn health_check(&self) -> Result<bool, CoreError>;
    }
}

/// A running application over in-memory stores
pub struct TestApp {
    pub router: Router,
    pub storage: std::sync::Arc<StorageModule>,
    pub subscription: ReloadSubscription,
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        credential_secret: "test-secret".to_string(),
        ..Default::default()
    }
}

pub async fn spawn_app(config: ServerConfig, stores: Stores) -> TestApp {
    let (router, storage, subscription) = build_app_with_stores(config, stores)
        .await
        .expect("build app");
    TestApp {
        router,
        storage,
        subscription,
    }
}

pub async fn spawn_in_memory(config: ServerConfig) -> TestApp {
    let provider = InMemoryStateStoreProvider::new();
    spawn_app(config, Stores::in_memory(&provider)).await
}

/// Build a JSON request, optionally scoped to a tenant
pub fn json_request(method: &str, uri: &str, tenant: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(tenant) = tenant {
        builder = builder.header("x-tenant-id", tenant);
    }
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    builder.body(body).unwrap()
}

/// Send a request and decode the JSON response
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

/// Node ids of a `{flows: [...]}` document
pub fn flow_ids(body: &Value) -> Vec<String> {
    body["flows"]
        .as_array()
        .map(|nodes| {
            nodes
                .iter()
                .filter_map(|n| n["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
