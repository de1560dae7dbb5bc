//! Flow snippet library
//!
//! Multi-tenant deployments run the library inert: every listing is empty
//! and every save is refused. A process-local library is available for
//! single-tenant development.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::CoreError;

/// How the flow library is served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryMode {
    #[default]
    Disabled,
    InMemory,
}

#[async_trait]
pub trait FlowLibrary: Send + Sync {
    /// Entries under `path`; `/` lists everything
    async fn get_entry(&self, kind: &str, path: &str) -> Result<Vec<Value>, CoreError>;

    /// Store `body` under `path`, returning the stored body
    async fn save_entry(
        &self,
        kind: &str,
        path: &str,
        meta: Value,
        body: Value,
    ) -> Result<Value, CoreError>;
}

/// Library that holds nothing and refuses writes
#[derive(Debug, Default, Clone, Copy)]
pub struct InertLibrary;

#[async_trait]
impl FlowLibrary for InertLibrary {
    async fn get_entry(&self, _kind: &str, _path: &str) -> Result<Vec<Value>, CoreError> {
        Ok(Vec::new())
    }

    async fn save_entry(
        &self,
        _kind: &str,
        path: &str,
        _meta: Value,
        _body: Value,
    ) -> Result<Value, CoreError> {
        Err(CoreError::Unsupported(format!(
            "flow library is disabled, cannot save `{}`",
            path
        )))
    }
}

/// Process-local library keyed by normalised path
#[derive(Debug, Default)]
pub struct InMemoryLibrary {
    entries: RwLock<IndexMap<String, Value>>,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalise(path: &str) -> String {
        path.replace('/', "_")
    }
}

#[async_trait]
impl FlowLibrary for InMemoryLibrary {
    async fn get_entry(&self, _kind: &str, path: &str) -> Result<Vec<Value>, CoreError> {
        let entries = self.entries.read().await;

        if path == "/" {
            return Ok(entries
                .iter()
                .map(|(path, body)| json!({ "type": "flow", "path": path, "body": body }))
                .collect());
        }

        let key = Self::normalise(path);
        Ok(entries
            .get(&key)
            .map(|body| vec![json!({ "path": key, "body": body })])
            .unwrap_or_default())
    }

    async fn save_entry(
        &self,
        _kind: &str,
        path: &str,
        _meta: Value,
        body: Value,
    ) -> Result<Value, CoreError> {
        self.entries
            .write()
            .await
            .insert(Self::normalise(path), body.clone());
        Ok(body)
    }
}

/// Library implementation for `mode`
pub fn library_for(mode: LibraryMode) -> std::sync::Arc<dyn FlowLibrary> {
    match mode {
        LibraryMode::Disabled => std::sync::Arc::new(InertLibrary),
        LibraryMode::InMemory => std::sync::Arc::new(InMemoryLibrary::new()),
    }
}
