//!
//! Tenantflow - multi-tenant flow storage for a shared flow engine
//!
//! Re-exports the workspace crates so callers can depend on one package.

pub use tenantflow_core;
pub use tenantflow_server;
pub use tenantflow_state_inmemory;

pub use tenantflow_core::{
    CallContext, CoreError, CredentialVault, FlowMergeCoordinator, FlowRecord, Scope,
    StorageModule, TenantScopeFilter, UnscopedPolicy,
};
pub use tenantflow_server::{build_app, build_app_with_stores, run, ServerConfig, Stores};
