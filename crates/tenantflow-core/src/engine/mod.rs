//! Engine-facing storage, cache and interception

pub mod cache;
pub mod interceptor;
pub mod storage_module;

pub use cache::{compute_rev, CacheReloader, FlowCache};
pub use interceptor::{MessageContextInjector, NodeInterceptor};
pub use storage_module::StorageModule;
