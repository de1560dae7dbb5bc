//! Per-scope views over the shared flow corpus

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::domain::{FlowRecord, Scope};
use crate::CoreError;

/// Visibility of records that carry no scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnscopedPolicy {
    /// Unscoped records are visible to no scope
    #[default]
    Hidden,
    /// Unscoped records are visible to every scope, read-only
    Shared,
}

impl FromStr for UnscopedPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hidden" => Ok(UnscopedPolicy::Hidden),
            "shared" => Ok(UnscopedPolicy::Shared),
            other => Err(CoreError::ConfigurationError(format!(
                "unknown unscoped policy `{}`, expected `hidden` or `shared`",
                other
            ))),
        }
    }
}

impl fmt::Display for UnscopedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnscopedPolicy::Hidden => write!(f, "hidden"),
            UnscopedPolicy::Shared => write!(f, "shared"),
        }
    }
}

/// Pure filter selecting the records a scope may see
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TenantScopeFilter {
    policy: UnscopedPolicy,
}

impl TenantScopeFilter {
    pub fn new(policy: UnscopedPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> UnscopedPolicy {
        self.policy
    }

    pub fn is_visible(&self, record: &FlowRecord, scope: &Scope) -> bool {
        match &record.scope {
            Some(owner) => owner == scope,
            None => self.policy == UnscopedPolicy::Shared,
        }
    }

    /// Records visible to `scope`, in their original relative order
    ///
    /// A shared record whose id the scope also owns is hidden in favour of
    /// the scope's own copy, so every visible id is unique.
    pub fn filter<'a, I>(&self, records: I, scope: &Scope) -> Vec<FlowRecord>
    where
        I: IntoIterator<Item = &'a FlowRecord>,
    {
        let visible: Vec<&FlowRecord> = records
            .into_iter()
            .filter(|record| self.is_visible(record, scope))
            .collect();
        let owned: HashSet<&str> = visible
            .iter()
            .filter(|record| !record.is_unscoped())
            .map(|record| record.id.as_str())
            .collect();
        visible
            .into_iter()
            .filter(|record| !(record.is_unscoped() && owned.contains(record.id.as_str())))
            .cloned()
            .collect()
    }
}
