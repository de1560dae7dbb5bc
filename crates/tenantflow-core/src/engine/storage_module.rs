//! Storage facade the flow engine is configured with
//!
//! One `StorageModule` per engine instance owns the flow cache, the vault and
//! the auxiliary settings/session documents that replace process-wide state.

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::cache::{CacheReloader, FlowCache};
use super::interceptor::NodeInterceptor;
use crate::application::{FlowMergeCoordinator, OperationPolicy, ReconcileOutcome};
use crate::domain::CallContext;
use crate::library::FlowLibrary;
use crate::vault::{CredentialPayload, CredentialVault};
use crate::CoreError;

pub struct StorageModule {
    coordinator: Arc<FlowMergeCoordinator>,
    vault: Arc<CredentialVault>,
    library: Arc<dyn FlowLibrary>,
    interceptor: Arc<dyn NodeInterceptor>,
    cache: Arc<FlowCache>,
    policy: OperationPolicy,
    settings: RwLock<Value>,
    sessions: RwLock<Value>,
}

impl StorageModule {
    pub fn new(
        coordinator: Arc<FlowMergeCoordinator>,
        vault: Arc<CredentialVault>,
        library: Arc<dyn FlowLibrary>,
        interceptor: Arc<dyn NodeInterceptor>,
        policy: OperationPolicy,
    ) -> Self {
        Self {
            coordinator,
            vault,
            library,
            interceptor,
            cache: Arc::new(FlowCache::new()),
            policy,
            settings: RwLock::new(json!({})),
            sessions: RwLock::new(json!([])),
        }
    }

    pub fn coordinator(&self) -> Arc<FlowMergeCoordinator> {
        Arc::clone(&self.coordinator)
    }

    pub fn vault(&self) -> Arc<CredentialVault> {
        Arc::clone(&self.vault)
    }

    pub fn cache(&self) -> Arc<FlowCache> {
        Arc::clone(&self.cache)
    }

    /// Reload handler bound to this module's cache
    pub fn reloader(&self) -> CacheReloader {
        CacheReloader::new(
            self.coordinator.store(),
            Arc::clone(&self.cache),
            self.coordinator.origin(),
            self.policy,
        )
    }

    /// Populate the cache from the store
    pub async fn init(&self) -> Result<(), CoreError> {
        self.reloader().refresh().await.map(|_| ())
    }

    /// Node configurations for the whole cached corpus
    pub async fn get_flows(&self) -> Vec<Value> {
        self.cache
            .records()
            .await
            .iter()
            .map(|record| self.interceptor.prepare_node(record))
            .collect()
    }

    /// Reconcile the caller's nodes and install the merged corpus locally
    #[instrument(skip_all)]
    pub async fn save_flows(
        &self,
        nodes: Vec<Value>,
        ctx: &CallContext,
    ) -> Result<ReconcileOutcome, CoreError> {
        let outcome = self.coordinator.reconcile_nodes(nodes, ctx).await?;
        self.cache
            .replace_if_newer(outcome.merged.clone(), Some(outcome.revision))
            .await;
        Ok(outcome)
    }

    /// `{"$": envelope}` for the latest snapshot, `{}` when the vault is empty
    pub async fn get_credentials(&self) -> Result<Value, CoreError> {
        Ok(match self.vault.latest_envelope().await? {
            Some(envelope) => json!({ "$": envelope }),
            None => json!({}),
        })
    }

    pub async fn save_credentials(&self, payload: Value) -> Result<Value, CoreError> {
        let payload = CredentialPayload::from_value(payload)?;
        let committed = self.vault.write(payload).await?;
        Ok(committed.to_engine_value())
    }

    pub async fn get_settings(&self) -> Value {
        self.settings.read().await.clone()
    }

    pub async fn save_settings(&self, settings: Value) -> Value {
        *self.settings.write().await = settings.clone();
        settings
    }

    pub async fn get_sessions(&self) -> Value {
        self.sessions.read().await.clone()
    }

    pub async fn save_sessions(&self, sessions: Value) -> Value {
        *self.sessions.write().await = sessions.clone();
        sessions
    }

    pub async fn get_library_entry(&self, kind: &str, path: &str) -> Result<Vec<Value>, CoreError> {
        self.library.get_entry(kind, path).await
    }

    pub async fn save_library_entry(
        &self,
        kind: &str,
        path: &str,
        meta: Value,
        body: Value,
    ) -> Result<Value, CoreError> {
        debug!(kind, path, "Saving library entry");
        self.library.save_entry(kind, path, meta, body).await
    }
}
