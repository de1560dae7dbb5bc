//! Integration tests against a live database
//!
//! Run with `DATABASE_URL=postgres://... cargo test -p tenantflow-state-postgres -- --ignored`.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use tenantflow_core::{
    domain::repository::{CredentialSnapshotStore, FlowChangeSet, FlowStore},
    CoreError, FlowRecord, ReloadBroadcaster, ReloadEvent, ReloadHandler, Scope,
};
use tenantflow_state_postgres::{
    PostgresConfig, PostgresConnection, PostgresCredentialStore, PostgresFlowStore,
    PostgresReloadBroadcaster,
};

async fn connect() -> PostgresConnection {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
    PostgresConnection::new(&PostgresConfig::with_connection_string(url))
        .await
        .expect("connect to test database")
}

fn record(id: &str, scope: Option<&str>) -> FlowRecord {
    FlowRecord::new(
        id,
        scope.map(|s| Scope::new(s).unwrap()),
        json!({ "id": id, "type": "inject" }),
    )
}

fn keys(records: &[FlowRecord]) -> Vec<String> {
    records.iter().map(FlowRecord::storage_key).collect()
}

#[tokio::test]
#[ignore]
async fn test_postgres_stores() -> Result<(), CoreError> {
    let conn = connect().await;
    sqlx::raw_sql("TRUNCATE flow_records; TRUNCATE credential_snapshots;")
        .execute(conn.pool())
        .await
        .expect("reset tables");

    // Flow store
    let store = PostgresFlowStore::new(conn.clone());
    assert!(store.health_check().await?);

    let start = store.snapshot().await?;
    assert!(start.records.is_empty());

    let revision = store
        .apply(FlowChangeSet {
            expected_revision: start.revision,
            upserts: vec![record("x1", Some("A")), record("y1", Some("B")), record("g", None)],
            removals: vec![],
        })
        .await?;
    assert_eq!(revision, start.revision + 1);

    let stale = store
        .apply(FlowChangeSet {
            expected_revision: start.revision,
            upserts: vec![record("x9", Some("A"))],
            removals: vec![],
        })
        .await;
    assert!(matches!(stale, Err(CoreError::ConcurrentModification(_))));

    let revision = store
        .apply(FlowChangeSet {
            expected_revision: revision,
            upserts: vec![record("x1", Some("A")), record("x2", Some("A"))],
            removals: vec![record("y1", Some("B")).key()],
        })
        .await?;

    let snapshot = store.snapshot().await?;
    assert_eq!(snapshot.revision, revision);
    assert_eq!(keys(&snapshot.records), vec!["g", "A:x1", "A:x2"]);
    assert!(snapshot.records[0].is_unscoped());

    // Credential log
    let credentials = PostgresCredentialStore::new(conn.clone());
    assert!(credentials.latest().await?.is_none());

    let first = credentials.append(None, "c1".to_string(), 100).await?;
    assert_eq!(first.sequence, 1);

    let conflict = credentials.append(None, "c2".to_string(), 101).await;
    assert!(matches!(conflict, Err(CoreError::ConcurrentModification(_))));

    let second = credentials.append(Some(1), "c2".to_string(), 101).await?;
    assert_eq!(credentials.latest().await?, Some(second));

    Ok(())
}

struct ChannelHandler {
    tx: mpsc::UnboundedSender<ReloadEvent>,
}

#[async_trait]
impl ReloadHandler for ChannelHandler {
    async fn on_reload(&self, event: ReloadEvent) -> Result<(), CoreError> {
        let _ = self.tx.send(event);
        Ok(())
    }
}

#[tokio::test]
#[ignore]
async fn test_postgres_notify_round_trip() -> Result<(), CoreError> {
    let conn = connect().await;
    let channel = format!("tenantflow_test_{}", Uuid::new_v4().simple());
    let broadcaster = PostgresReloadBroadcaster::new(conn, channel);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = broadcaster.subscribe(Arc::new(ChannelHandler { tx })).await?;

    let event = ReloadEvent::new(Uuid::new_v4(), 7, Some(Scope::new("A").unwrap()));
    broadcaster.publish(event.clone()).await?;

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("notification within timeout");
    assert_eq!(received, Some(event));

    Ok(())
}
