//! Reconciliation of a scope's submitted flows with the shared corpus
//!
//! The engine always submits its complete working set for the calling scope.
//! Reconciling replaces that scope's previous records, leaves every other
//! scope untouched and tells the other replicas to reload. The read-merge-write
//! cycle is guarded by the store revision and restarted on conflict.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::scope_filter::{TenantScopeFilter, UnscopedPolicy};
use super::OperationPolicy;
use crate::domain::{
    CallContext, FlowChangeSet, FlowRecord, FlowStore, RecordKey, ReloadBroadcaster, ReloadEvent,
    Scope,
};
use crate::CoreError;

/// Changes one reconciliation derives from a snapshot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReconcilePlan {
    /// Full corpus the engine must treat as authoritative afterwards
    pub merged: Vec<FlowRecord>,
    /// Records to write, stamped with the requesting scope
    pub upserts: Vec<FlowRecord>,
    /// The scope's records absent from the submission
    pub removals: Vec<RecordKey>,
}

/// Result of a committed reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub merged: Vec<FlowRecord>,
    pub removed: Vec<RecordKey>,
    pub revision: u64,
    pub correlation_id: Uuid,
    /// Attempts used, including the successful one
    pub attempts: u32,
    /// Whether the reload event reached the broadcaster
    pub broadcast_delivered: bool,
}

/// Compute the merged corpus and the changes for `scope` from a snapshot
///
/// Submitted records without a scope are stamped with `scope`; a record
/// carrying a different scope is rejected. Duplicate ids collapse to the last
/// occurrence at the first occurrence's position. Unscoped stored records are
/// never rewritten or removed; under [`UnscopedPolicy::Shared`] a submitted id
/// that matches one keeps the stored version, unless the scope already owns a
/// record with that id.
pub fn plan_reconcile(
    stored: &[FlowRecord],
    submitted: Vec<FlowRecord>,
    scope: &Scope,
    policy: UnscopedPolicy,
) -> Result<ReconcilePlan, CoreError> {
    let mut incoming: IndexMap<String, FlowRecord> = IndexMap::with_capacity(submitted.len());
    for record in submitted {
        if let Some(owner) = &record.scope {
            if owner != scope {
                return Err(CoreError::ScopeResolutionFailed(format!(
                    "record `{}` belongs to scope `{}`, not `{}`",
                    record.id, owner, scope
                )));
            }
        }
        let record = record.stamped(scope);
        incoming.insert(record.id.clone(), record);
    }

    if policy == UnscopedPolicy::Shared {
        let owned: HashSet<&str> = stored
            .iter()
            .filter(|r| r.belongs_to(scope))
            .map(|r| r.id.as_str())
            .collect();
        let shared: HashSet<&str> = stored
            .iter()
            .filter(|r| r.is_unscoped() && !owned.contains(r.id.as_str()))
            .map(|r| r.id.as_str())
            .collect();
        incoming.retain(|id, _| {
            let read_only = shared.contains(id.as_str());
            if read_only {
                debug!(id = %id, "Ignoring submitted copy of a shared record");
            }
            !read_only
        });
    }

    let mut merged = Vec::with_capacity(stored.len() + incoming.len());
    let mut removals = Vec::new();
    for record in stored {
        if record.belongs_to(scope) {
            if !incoming.contains_key(&record.id) {
                removals.push(record.key());
            }
        } else {
            merged.push(record.clone());
        }
    }

    let upserts: Vec<FlowRecord> = incoming.into_values().collect();
    merged.extend(upserts.iter().cloned());

    Ok(ReconcilePlan {
        merged,
        upserts,
        removals,
    })
}

/// Coordinates scoped saves against the shared store
pub struct FlowMergeCoordinator {
    store: Arc<dyn FlowStore>,
    broadcaster: Arc<dyn ReloadBroadcaster>,
    filter: TenantScopeFilter,
    policy: OperationPolicy,
    origin: Uuid,
}

impl FlowMergeCoordinator {
    pub fn new(
        store: Arc<dyn FlowStore>,
        broadcaster: Arc<dyn ReloadBroadcaster>,
        filter: TenantScopeFilter,
        policy: OperationPolicy,
    ) -> Self {
        Self {
            store,
            broadcaster,
            filter,
            policy,
            origin: Uuid::new_v4(),
        }
    }

    /// Instance id stamped on every event this coordinator publishes
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    pub fn filter(&self) -> &TenantScopeFilter {
        &self.filter
    }

    pub fn store(&self) -> Arc<dyn FlowStore> {
        Arc::clone(&self.store)
    }

    pub async fn health_check(&self) -> Result<bool, CoreError> {
        self.policy
            .bounded("flow store health", self.store.health_check())
            .await
    }

    /// The records visible to the caller's scope, in store order
    pub async fn list_for(&self, ctx: &CallContext) -> Result<Vec<FlowRecord>, CoreError> {
        let scope = ctx.require_scope()?;
        let all = self.policy.bounded("flow list", self.store.list()).await?;
        Ok(self.filter.filter(&all, scope))
    }

    /// Reconcile engine node documents submitted by the caller
    pub async fn reconcile_nodes(
        &self,
        nodes: Vec<Value>,
        ctx: &CallContext,
    ) -> Result<ReconcileOutcome, CoreError> {
        let records = nodes
            .into_iter()
            .map(FlowRecord::from_node)
            .collect::<Result<Vec<_>, _>>()?;
        self.reconcile(records, ctx).await
    }

    /// Replace the caller's flows with `submitted` and notify other replicas
    #[instrument(skip_all, fields(scope = tracing::field::Empty))]
    pub async fn reconcile(
        &self,
        submitted: Vec<FlowRecord>,
        ctx: &CallContext,
    ) -> Result<ReconcileOutcome, CoreError> {
        let scope = ctx.require_scope()?.clone();
        tracing::Span::current().record("scope", scope.as_str());

        let mut attempt = 0;
        let (plan, revision) = loop {
            attempt += 1;

            let snapshot = self
                .policy
                .bounded("flow snapshot", self.store.snapshot())
                .await?;
            let plan = plan_reconcile(
                &snapshot.records,
                submitted.clone(),
                &scope,
                self.filter.policy(),
            )?;

            let changes = FlowChangeSet {
                expected_revision: snapshot.revision,
                upserts: plan.upserts.clone(),
                removals: plan.removals.clone(),
            };
            if changes.is_empty() {
                debug!(revision = snapshot.revision, "Nothing to reconcile");
                break (plan, snapshot.revision);
            }

            match self
                .policy
                .bounded("flow apply", self.store.apply(changes))
                .await
            {
                Ok(revision) => break (plan, revision),
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    warn!(attempt, error = %err, "Flow store moved during reconcile, retrying");
                }
                Err(err) if err.is_retryable() => {
                    return Err(CoreError::ConcurrentModification(format!(
                        "reconcile gave up after {} attempts: {}",
                        attempt, err
                    )));
                }
                Err(err) => return Err(err),
            }
        };

        let event = ReloadEvent::new(self.origin, revision, Some(scope.clone()));
        let correlation_id = event.correlation_id;
        let broadcast_delivered = match self
            .policy
            .bounded("reload publish", self.broadcaster.publish(event))
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!(%correlation_id, error = %err, "Reload broadcast failed after commit");
                false
            }
        };

        info!(
            %correlation_id,
            revision,
            attempts = attempt,
            upserted = plan.upserts.len(),
            removed = plan.removals.len(),
            "Reconciled flows"
        );

        Ok(ReconcileOutcome {
            merged: plan.merged,
            removed: plan.removals,
            revision,
            correlation_id,
            attempts: attempt,
            broadcast_delivered,
        })
    }
}
