//! Reload notifications between engine replicas
//!
//! Every persisted flow change is followed by a `ReloadEvent`. Replicas
//! subscribe a `ReloadHandler` that discards their cached corpus and re-reads
//! the store. Delivery is at-least-once; handlers must be idempotent.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::flow_record::Scope;
use crate::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadEvent {
    /// Fresh id per publish, used to correlate logs across replicas
    pub correlation_id: Uuid,
    /// Instance that committed the change
    pub origin: Uuid,
    /// Store revision after the change; `None` when unknown
    #[serde(default)]
    pub revision: Option<u64>,
    /// Scope whose save triggered the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
}

impl ReloadEvent {
    pub fn new(origin: Uuid, revision: u64, scope: Option<Scope>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            origin,
            revision: Some(revision),
            scope,
        }
    }

    /// Synthetic event delivered when a subscriber may have missed notifications
    pub fn resync() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            origin: Uuid::nil(),
            revision: None,
            scope: None,
        }
    }
}

/// Receives reload notifications
#[async_trait]
pub trait ReloadHandler: Send + Sync {
    async fn on_reload(&self, event: ReloadEvent) -> Result<(), CoreError>;
}

/// Publish/subscribe channel for reload notifications
#[async_trait]
pub trait ReloadBroadcaster: Send + Sync {
    /// Publish an event to every subscriber, including ones in other processes
    async fn publish(&self, event: ReloadEvent) -> Result<(), CoreError>;

    /// Register a handler invoked once per published event
    async fn subscribe(
        &self,
        handler: Arc<dyn ReloadHandler>,
    ) -> Result<ReloadSubscription, CoreError>;
}

/// Running subscription; dropping it stops delivery
#[derive(Debug)]
pub struct ReloadSubscription {
    task: JoinHandle<()>,
}

impl ReloadSubscription {
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    /// Spawn a dispatcher that feeds events from a local broadcast channel to `handler`
    pub fn spawn_from_broadcast(
        mut rx: broadcast::Receiver<ReloadEvent>,
        handler: Arc<dyn ReloadHandler>,
    ) -> Self {
        let task = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Reload subscriber lagged, forcing a full reload");
                        ReloadEvent::resync()
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Reload channel closed, stopping subscriber");
                        break;
                    }
                };

                dispatch(handler.as_ref(), event).await;
            }
        });

        Self { task }
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for ReloadSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Invoke a handler, logging instead of propagating its failure
pub async fn dispatch(handler: &dyn ReloadHandler, event: ReloadEvent) {
    let correlation_id = event.correlation_id;
    if let Err(err) = handler.on_reload(event).await {
        error!(%correlation_id, error = %err, "Reload handler failed");
    }
}
