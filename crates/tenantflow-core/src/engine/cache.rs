//! In-process copy of the flow corpus served to the engine

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::OperationPolicy;
use crate::domain::{FlowRecord, FlowStore, ReloadEvent, ReloadHandler};
use crate::CoreError;

/// Content revision of a corpus as the engine sees it
pub fn compute_rev(records: &[FlowRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        // Value serialisation cannot fail
        if let Ok(bytes) = serde_json::to_vec(&record.node) {
            hasher.update(&bytes);
        }
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Default)]
struct CachedFlows {
    records: Vec<FlowRecord>,
    rev: String,
    revision: Option<u64>,
}

/// Authoritative in-memory corpus for one engine instance
#[derive(Debug)]
pub struct FlowCache {
    inner: RwLock<CachedFlows>,
}

impl Default for FlowCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CachedFlows {
                rev: compute_rev(&[]),
                ..Default::default()
            }),
        }
    }

    /// Install `records` unless the cache already holds a later store revision
    pub async fn replace_if_newer(&self, records: Vec<FlowRecord>, revision: Option<u64>) -> bool {
        let mut inner = self.inner.write().await;
        if let (Some(current), Some(incoming)) = (inner.revision, revision) {
            if incoming < current {
                debug!(current, incoming, "Ignoring stale flow corpus");
                return false;
            }
        }

        inner.rev = compute_rev(&records);
        inner.records = records;
        inner.revision = revision.or(inner.revision);
        true
    }

    pub async fn records(&self) -> Vec<FlowRecord> {
        self.inner.read().await.records.clone()
    }

    pub async fn rev(&self) -> String {
        self.inner.read().await.rev.clone()
    }

    pub async fn revision(&self) -> Option<u64> {
        self.inner.read().await.revision
    }

    /// The engine's native `{flows, rev}` document
    pub async fn engine_document(&self) -> Value {
        let inner = self.inner.read().await;
        let flows: Vec<&Value> = inner.records.iter().map(|r| &r.node).collect();
        json!({ "flows": flows, "rev": inner.rev })
    }
}

/// Reload handler that refreshes a [`FlowCache`] from the store
pub struct CacheReloader {
    store: Arc<dyn FlowStore>,
    cache: Arc<FlowCache>,
    origin: Uuid,
    policy: OperationPolicy,
}

impl CacheReloader {
    pub fn new(
        store: Arc<dyn FlowStore>,
        cache: Arc<FlowCache>,
        origin: Uuid,
        policy: OperationPolicy,
    ) -> Self {
        Self {
            store,
            cache,
            origin,
            policy,
        }
    }

    /// Re-read the whole corpus into the cache
    pub async fn refresh(&self) -> Result<u64, CoreError> {
        let snapshot = self
            .policy
            .bounded("flow snapshot", self.store.snapshot())
            .await?;
        let count = snapshot.records.len();
        self.cache
            .replace_if_newer(snapshot.records, Some(snapshot.revision))
            .await;
        info!(revision = snapshot.revision, records = count, "Flow cache reloaded");
        Ok(snapshot.revision)
    }
}

#[async_trait]
impl ReloadHandler for CacheReloader {
    async fn on_reload(&self, event: ReloadEvent) -> Result<(), CoreError> {
        if event.origin == self.origin {
            if let (Some(cached), Some(published)) = (self.cache.revision().await, event.revision) {
                if cached >= published {
                    debug!(correlation_id = %event.correlation_id, "Skipping own reload event");
                    return Ok(());
                }
            }
        }

        self.refresh().await.map(|_| ())
    }
}
