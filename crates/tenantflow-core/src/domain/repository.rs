//! Repository traits for the tenantflow core
//!
//! This module defines the persistence contracts used by the reconciliation
//! and vault services. Storage crates implement these traits; no tenancy or
//! merge logic lives behind them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::flow_record::{FlowRecord, RecordKey};
use crate::CoreError;

/// Consistent view of the whole flow corpus at one revision
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlowSnapshot {
    /// Records in store order
    pub records: Vec<FlowRecord>,
    /// Revision token; increases on every committed mutation
    pub revision: u64,
}

/// Atomic unit of change applied against an expected revision
#[derive(Debug, Clone, PartialEq)]
pub struct FlowChangeSet {
    pub expected_revision: u64,
    pub upserts: Vec<FlowRecord>,
    pub removals: Vec<RecordKey>,
}

impl FlowChangeSet {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }
}

/// Durable CRUD over flow records
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// List every record in store order
    async fn list(&self) -> Result<Vec<FlowRecord>, CoreError> {
        Ok(self.snapshot().await?.records)
    }

    /// Read every record together with the current revision
    async fn snapshot(&self) -> Result<FlowSnapshot, CoreError>;

    /// Insert or replace records by `(scope, id)`; replaced records move to the end
    async fn upsert(&self, records: &[FlowRecord]) -> Result<Vec<FlowRecord>, CoreError>;

    /// Remove the given keys, returning how many existed
    async fn remove_all(&self, keys: &[RecordKey]) -> Result<usize, CoreError>;

    /// Upsert then remove atomically, failing with `ConcurrentModification`
    /// when the store moved past `expected_revision`
    async fn apply(&self, changes: FlowChangeSet) -> Result<u64, CoreError>;

    /// Health check
    async fn health_check(&self) -> Result<bool, CoreError> {
        Ok(true)
    }
}

/// One encrypted credential snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSnapshot {
    /// Strictly increasing, starting at 1
    pub sequence: u64,
    /// `hex(iv) + base64(ciphertext)`
    pub ciphertext: String,
    /// Write time in Unix milliseconds, monotonically increasing
    pub timestamp: i64,
}

/// Append-only log of encrypted credential snapshots
#[async_trait]
pub trait CredentialSnapshotStore: Send + Sync {
    /// Most recent snapshot, if any was ever written
    async fn latest(&self) -> Result<Option<CredentialSnapshot>, CoreError>;

    /// Append a snapshot on top of `expected_latest`, failing with
    /// `ConcurrentModification` if another writer got there first
    async fn append(
        &self,
        expected_latest: Option<u64>,
        ciphertext: String,
        timestamp: i64,
    ) -> Result<CredentialSnapshot, CoreError>;

    /// Health check
    async fn health_check(&self) -> Result<bool, CoreError> {
        Ok(true)
    }
}
