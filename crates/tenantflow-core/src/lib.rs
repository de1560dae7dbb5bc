//!
//! Tenantflow Core - tenant-scoped flow storage for a shared flow engine
//!
//! This crate defines the flow record model, the persistence contracts, the
//! scope filter and merge coordinator that turn one shared corpus into
//! per-tenant views, the encrypted credential vault, and the storage facade
//! the engine is configured with.

#![forbid(unsafe_code)]

/// Domain layer - records, scopes, call context and persistence contracts
pub mod domain;

/// Application services - filtering and reconciliation
pub mod application;

/// Encrypted credential vault
pub mod vault;

/// Engine-facing facade, cache and interceptor
pub mod engine;

/// Flow snippet library
pub mod library;

/// Error types
pub mod error;

pub use error::CoreError;

pub use application::{
    FlowMergeCoordinator, OperationPolicy, ReconcileOutcome, TenantScopeFilter, UnscopedPolicy,
};
pub use domain::{
    CallContext, CredentialSnapshot, CredentialSnapshotStore, FlowChangeSet, FlowRecord,
    FlowSnapshot, FlowStore, RecordKey, ReloadBroadcaster, ReloadEvent, ReloadHandler,
    ReloadSubscription, Scope,
};
pub use engine::{CacheReloader, FlowCache, MessageContextInjector, NodeInterceptor, StorageModule};
pub use library::{FlowLibrary, InMemoryLibrary, InertLibrary, LibraryMode};
pub use vault::{CredentialMap, CredentialPayload, CredentialVault};
