//! Flow records and the scope that partitions them
//!
//! A flow record is one persisted unit of the engine's flow graph: a tab, a
//! node or a configuration node. The store identifies records by the pair
//! `(scope, id)` so two tenants that mint the same engine id never overwrite
//! each other.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::CoreError;

/// Opaque tenant or user identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    /// Create a scope, rejecting empty or whitespace-only identifiers
    pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(CoreError::ScopeResolutionFailed(
                "scope identifier is empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage identity of a flow record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub scope: Option<Scope>,
    pub id: String,
}

impl RecordKey {
    pub fn new(scope: Option<Scope>, id: impl Into<String>) -> Self {
        Self {
            scope,
            id: id.into(),
        }
    }

    pub fn scoped(scope: &Scope, id: impl Into<String>) -> Self {
        Self::new(Some(scope.clone()), id)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}:{}", scope, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// One persisted node/tab of the flow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    /// The engine's node id
    pub id: String,

    /// Owning scope; `None` for legacy/global records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,

    /// The engine's native node document, opaque to the store
    pub node: Value,
}

impl FlowRecord {
    pub fn new(id: impl Into<String>, scope: Option<Scope>, node: Value) -> Self {
        Self {
            id: id.into(),
            scope,
            node,
        }
    }

    /// Build an unscoped record from an engine node document, reading its `id` field
    pub fn from_node(node: Value) -> Result<Self, CoreError> {
        let id = node
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                CoreError::ValidationError("flow node is missing a string `id`".to_string())
            })?
            .to_string();

        Ok(Self {
            id,
            scope: None,
            node,
        })
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.scope.clone(), self.id.clone())
    }

    /// Namespaced form of the key, `scope:id` or the bare id
    pub fn storage_key(&self) -> String {
        self.key().to_string()
    }

    pub fn is_unscoped(&self) -> bool {
        self.scope.is_none()
    }

    pub fn belongs_to(&self, scope: &Scope) -> bool {
        self.scope.as_ref() == Some(scope)
    }

    /// Return the record with `scope` stamped on it if it carries none
    pub fn stamped(mut self, scope: &Scope) -> Self {
        if self.scope.is_none() {
            self.scope = Some(scope.clone());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scope_rejects_blank() {
        assert!(Scope::new("").is_err());
        assert!(Scope::new("   ").is_err());
        assert_eq!(Scope::new("tenantA").unwrap().as_str(), "tenantA");
    }

    #[test]
    fn test_from_node_reads_id() {
        let record = FlowRecord::from_node(json!({"id": "n1", "type": "inject"})).unwrap();
        assert_eq!(record.id, "n1");
        assert!(record.is_unscoped());

        let err = FlowRecord::from_node(json!({"type": "tab"})).unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[test]
    fn test_storage_key_namespaces_by_scope() {
        let a = Scope::new("tenantA").unwrap();
        let b = Scope::new("tenantB").unwrap();
        let ra = FlowRecord::new("x1", Some(a), json!({}));
        let rb = FlowRecord::new("x1", Some(b), json!({}));

        assert_eq!(ra.storage_key(), "tenantA:x1");
        assert_ne!(ra.key(), rb.key());
        assert_eq!(FlowRecord::new("x1", None, json!({})).storage_key(), "x1");
    }

    #[test]
    fn test_stamped_keeps_existing_scope() {
        let a = Scope::new("tenantA").unwrap();
        let b = Scope::new("tenantB").unwrap();

        let unscoped = FlowRecord::new("n", None, json!({})).stamped(&a);
        assert!(unscoped.belongs_to(&a));

        let scoped = FlowRecord::new("n", Some(b.clone()), json!({})).stamped(&a);
        assert!(scoped.belongs_to(&b));
    }
}
