//! In-memory state store implementation for tenantflow
//!
//! This crate provides in-memory implementations of the repository and
//! reload contracts defined in tenantflow-core. It is primarily useful for
//! development, testing, and single-process deployments where persistence is
//! not required.

use std::sync::Arc;
use tokio::sync::RwLock;

pub mod reload;
pub mod repositories;

pub use reload::InMemoryReloadBroadcaster;
pub use repositories::{FlowState, InMemoryCredentialStore, InMemoryFlowStore};

use tenantflow_core::{
    domain::repository::{CredentialSnapshot, CredentialSnapshotStore, FlowStore},
    ReloadBroadcaster,
};

/// Provider for in-memory stores sharing one set of backing collections
pub struct InMemoryStateStoreProvider {
    // Shared storage for flow records
    flows: Arc<RwLock<FlowState>>,

    // Shared storage for credential snapshots
    credentials: Arc<RwLock<Vec<CredentialSnapshot>>>,

    // One reload channel for every engine instance in the process
    broadcaster: InMemoryReloadBroadcaster,
}

impl InMemoryStateStoreProvider {
    /// Create a new in-memory state store provider
    pub fn new() -> Self {
        Self {
            flows: Arc::new(RwLock::new(FlowState::default())),
            credentials: Arc::new(RwLock::new(Vec::new())),
            broadcaster: InMemoryReloadBroadcaster::default(),
        }
    }

    /// Create stores over the shared collections
    pub fn create_repositories(
        &self,
    ) -> (
        Arc<dyn FlowStore>,
        Arc<dyn CredentialSnapshotStore>,
        Arc<dyn ReloadBroadcaster>,
    ) {
        (
            Arc::new(InMemoryFlowStore::new(self.flows.clone())),
            Arc::new(InMemoryCredentialStore::new(self.credentials.clone())),
            Arc::new(self.broadcaster.clone()),
        )
    }
}

impl Default for InMemoryStateStoreProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
