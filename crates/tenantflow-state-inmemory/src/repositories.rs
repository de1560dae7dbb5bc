use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use tenantflow_core::{
    domain::repository::{
        CredentialSnapshot, CredentialSnapshotStore, FlowChangeSet, FlowSnapshot, FlowStore,
    },
    CoreError, FlowRecord, RecordKey,
};

/// Records in store order plus the revision counter
#[derive(Debug, Default)]
pub struct FlowState {
    records: IndexMap<RecordKey, FlowRecord>,
    revision: u64,
}

impl FlowState {
    fn upsert(&mut self, records: &[FlowRecord]) {
        for record in records {
            let key = record.key();
            // Replaced records move to the end
            self.records.shift_remove(&key);
            self.records.insert(key, record.clone());
        }
    }

    fn remove(&mut self, keys: &[RecordKey]) -> usize {
        keys.iter()
            .filter(|key| self.records.shift_remove(*key).is_some())
            .count()
    }
}

/// In-memory implementation of the FlowStore
pub struct InMemoryFlowStore {
    state: Arc<RwLock<FlowState>>,
}

impl InMemoryFlowStore {
    /// Create a new in-memory flow store
    pub fn new(state: Arc<RwLock<FlowState>>) -> Self {
        Self { state }
    }
}

impl Default for InMemoryFlowStore {
    fn default() -> Self {
        Self::new(Arc::new(RwLock::new(FlowState::default())))
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn snapshot(&self) -> Result<FlowSnapshot, CoreError> {
        let state = self.state.read().await;
        Ok(FlowSnapshot {
            records: state.records.values().cloned().collect(),
            revision: state.revision,
        })
    }

    async fn upsert(&self, records: &[FlowRecord]) -> Result<Vec<FlowRecord>, CoreError> {
        let mut state = self.state.write().await;
        state.upsert(records);
        state.revision += 1;
        Ok(records.to_vec())
    }

    async fn remove_all(&self, keys: &[RecordKey]) -> Result<usize, CoreError> {
        let mut state = self.state.write().await;
        let removed = state.remove(keys);
        state.revision += 1;
        Ok(removed)
    }

    async fn apply(&self, changes: FlowChangeSet) -> Result<u64, CoreError> {
        let mut state = self.state.write().await;
        if state.revision != changes.expected_revision {
            return Err(CoreError::ConcurrentModification(format!(
                "flow store is at revision {}, expected {}",
                state.revision, changes.expected_revision
            )));
        }

        state.upsert(&changes.upserts);
        let removed = state.remove(&changes.removals);
        state.revision += 1;

        debug!(
            revision = state.revision,
            upserted = changes.upserts.len(),
            removed,
            "Applied flow change set"
        );
        Ok(state.revision)
    }
}

/// In-memory implementation of the CredentialSnapshotStore
pub struct InMemoryCredentialStore {
    snapshots: Arc<RwLock<Vec<CredentialSnapshot>>>,
}

impl InMemoryCredentialStore {
    /// Create a new in-memory credential snapshot log
    pub fn new(snapshots: Arc<RwLock<Vec<CredentialSnapshot>>>) -> Self {
        Self { snapshots }
    }

    /// Number of snapshots ever appended
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new(Arc::new(RwLock::new(Vec::new())))
    }
}

#[async_trait]
impl CredentialSnapshotStore for InMemoryCredentialStore {
    async fn latest(&self) -> Result<Option<CredentialSnapshot>, CoreError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.last().cloned())
    }

    async fn append(
        &self,
        expected_latest: Option<u64>,
        ciphertext: String,
        timestamp: i64,
    ) -> Result<CredentialSnapshot, CoreError> {
        let mut snapshots = self.snapshots.write().await;
        let latest = snapshots.last().map(|s| s.sequence);
        if latest != expected_latest {
            return Err(CoreError::ConcurrentModification(format!(
                "credential log is at sequence {:?}, expected {:?}",
                latest, expected_latest
            )));
        }

        let snapshot = CredentialSnapshot {
            sequence: latest.unwrap_or(0) + 1,
            ciphertext,
            timestamp,
        };
        snapshots.push(snapshot.clone());
        Ok(snapshot)
    }
}
