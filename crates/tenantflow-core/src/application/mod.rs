//! Application services built on the domain contracts

pub mod merge_coordinator;
pub mod scope_filter;

pub use merge_coordinator::{FlowMergeCoordinator, ReconcileOutcome, ReconcilePlan};
pub use scope_filter::{TenantScopeFilter, UnscopedPolicy};

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::CoreError;

/// Time and retry budget applied to store and vault operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPolicy {
    /// Upper bound for a single store or vault call
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Read-merge-write attempts before a conflict is surfaced
    pub max_attempts: u32,
}

impl Default for OperationPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 5,
        }
    }
}

impl OperationPolicy {
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run `fut` under the configured timeout
    pub async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T, CoreError>
    where
        F: Future<Output = Result<T, CoreError>>,
    {
        bounded(self.timeout, operation, fut).await
    }
}

/// Await `fut` for at most `timeout`, mapping expiry to `CoreError::Timeout`
pub async fn bounded<T, F>(timeout: Duration, operation: &str, fut: F) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, CoreError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::Timeout(format!(
            "{} did not complete within {}ms",
            operation,
            timeout.as_millis()
        ))),
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<(), CoreError> = bounded(Duration::from_millis(10), "slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(CoreError::Timeout(msg)) => assert!(msg.contains("slow")),
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let policy = OperationPolicy::default();
        let value = policy.bounded("fast", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_policy_requires_one_attempt() {
        assert_eq!(OperationPolicy::new(Duration::from_secs(1), 0).max_attempts, 1);
    }
}
