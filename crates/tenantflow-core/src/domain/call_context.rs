//! Ambient per-request context
//!
//! A `CallContext` is resolved once per request by whatever sits in front of
//! the core (see `ContextResolver` in the server crate) and is threaded
//! explicitly through every operation that needs a scope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::flow_record::Scope;
use crate::CoreError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallContext {
    /// Visibility partition for flow records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default)]
    pub roles: Vec<String>,

    /// Auxiliary claims carried opaquely
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub claims: Map<String, Value>,
}

impl CallContext {
    /// Context scoped to a single tenant, as used by tests and tools
    pub fn for_scope(scope: Scope) -> Self {
        Self {
            tenant_id: Some(scope.as_str().to_string()),
            scope: Some(scope),
            ..Default::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// The scope of this call, or `ScopeResolutionFailed` when none was resolved
    pub fn require_scope(&self) -> Result<&Scope, CoreError> {
        self.scope.as_ref().ok_or_else(|| {
            CoreError::ScopeResolutionFailed(
                "call context carries neither a tenant nor a user scope".to_string(),
            )
        })
    }

    pub fn has_any_role(&self, accepted: &[String]) -> bool {
        self.roles.iter().any(|role| accepted.contains(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_scope() {
        let ctx = CallContext::default();
        assert!(matches!(
            ctx.require_scope(),
            Err(CoreError::ScopeResolutionFailed(_))
        ));

        let ctx = CallContext::for_scope(Scope::new("t1").unwrap());
        assert_eq!(ctx.require_scope().unwrap().as_str(), "t1");
    }

    #[test]
    fn test_role_intersection() {
        let ctx = CallContext::default().with_roles(["viewer", "FLOW_ADMIN"]);
        assert!(ctx.has_any_role(&["FLOW_ADMIN".to_string()]));
        assert!(!ctx.has_any_role(&["OPS".to_string()]));
        assert!(!CallContext::default().has_any_role(&["FLOW_ADMIN".to_string()]));
    }
}
