//! Domain model for tenant-scoped flow storage

pub mod call_context;
pub mod flow_record;
pub mod reload;
pub mod repository;

pub use call_context::CallContext;
pub use flow_record::{FlowRecord, RecordKey, Scope};
pub use reload::{ReloadBroadcaster, ReloadEvent, ReloadHandler, ReloadSubscription};
pub use repository::{
    CredentialSnapshot, CredentialSnapshotStore, FlowChangeSet, FlowSnapshot, FlowStore,
};
