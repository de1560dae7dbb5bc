//! Development mirror of saved flows on the local filesystem

use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ServerError, ServerResult};

#[derive(Debug, Clone)]
pub struct FlowExporter {
    path: PathBuf,
}

impl FlowExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `nodes` as pretty-printed JSON, creating parent directories
    pub async fn export(&self, nodes: &[Value]) -> ServerResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    ServerError::ExportError(format!("{}: {}", parent.display(), e))
                })?;
            }
        }

        let body = serde_json::to_vec_pretty(nodes)?;
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|e| ServerError::ExportError(format!("{}: {}", self.path.display(), e)))?;

        debug!(path = %self.path.display(), nodes = nodes.len(), "Exported flows");
        Ok(())
    }
}
