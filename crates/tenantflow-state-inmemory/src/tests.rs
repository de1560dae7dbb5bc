use crate::{InMemoryCredentialStore, InMemoryReloadBroadcaster, InMemoryStateStoreProvider};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tenantflow_core::{
    domain::repository::{CredentialSnapshotStore, FlowChangeSet, FlowStore},
    CoreError, FlowRecord, RecordKey, ReloadBroadcaster, ReloadEvent, ReloadHandler, Scope,
};
use tokio::sync::mpsc;
use uuid::Uuid;

fn record(id: &str, scope: &str) -> FlowRecord {
    FlowRecord::new(id, Some(Scope::new(scope).unwrap()), json!({ "id": id }))
}

fn keys(records: &[FlowRecord]) -> Vec<String> {
    records.iter().map(FlowRecord::storage_key).collect()
}

#[tokio::test]
async fn test_flow_store_upsert_and_remove() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (store, _, _) = provider.create_repositories();

    store
        .upsert(&[record("a", "A"), record("b", "A"), record("a", "B")])
        .await?;
    assert_eq!(keys(&store.list().await?), vec!["A:a", "A:b", "B:a"]);

    // Re-upserting moves the record to the end
    let mut updated = record("a", "A");
    updated.node = json!({ "id": "a", "name": "renamed" });
    store.upsert(&[updated.clone()]).await?;
    let listed = store.list().await?;
    assert_eq!(keys(&listed), vec!["A:b", "B:a", "A:a"]);
    assert_eq!(listed[2], updated);

    let removed = store
        .remove_all(&[
            RecordKey::scoped(&Scope::new("A").unwrap(), "a"),
            RecordKey::scoped(&Scope::new("A").unwrap(), "missing"),
        ])
        .await?;
    assert_eq!(removed, 1);
    assert_eq!(keys(&store.list().await?), vec!["A:b", "B:a"]);

    Ok(())
}

#[tokio::test]
async fn test_flow_store_apply_checks_revision() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (store, _, _) = provider.create_repositories();

    let snapshot = store.snapshot().await?;
    assert_eq!(snapshot.revision, 0);

    let revision = store
        .apply(FlowChangeSet {
            expected_revision: 0,
            upserts: vec![record("x1", "A"), record("y1", "B")],
            removals: vec![],
        })
        .await?;
    assert_eq!(revision, 1);

    let stale = store
        .apply(FlowChangeSet {
            expected_revision: 0,
            upserts: vec![record("x2", "A")],
            removals: vec![],
        })
        .await;
    assert!(matches!(stale, Err(CoreError::ConcurrentModification(_))));
    assert_eq!(keys(&store.list().await?), vec!["A:x1", "B:y1"]);

    // Upserts land before removals within one change set
    let revision = store
        .apply(FlowChangeSet {
            expected_revision: 1,
            upserts: vec![record("x2", "A")],
            removals: vec![record("x1", "A").key()],
        })
        .await?;
    assert_eq!(revision, 2);
    assert_eq!(keys(&store.list().await?), vec!["B:y1", "A:x2"]);

    Ok(())
}

#[tokio::test]
async fn test_credential_store_sequences() -> Result<(), CoreError> {
    let store = InMemoryCredentialStore::default();
    assert!(store.latest().await?.is_none());

    let first = store.append(None, "c1".to_string(), 10).await?;
    assert_eq!(first.sequence, 1);

    let conflict = store.append(None, "c2".to_string(), 11).await;
    assert!(matches!(conflict, Err(CoreError::ConcurrentModification(_))));

    let second = store.append(Some(1), "c2".to_string(), 11).await?;
    assert_eq!(second.sequence, 2);
    assert_eq!(store.latest().await?, Some(second));
    assert_eq!(store.len().await, 2);

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
async fn test_broadcaster_delivers_to_every_subscriber() -> Result<(), CoreError> {
    let broadcaster = InMemoryReloadBroadcaster::default();
    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let (tx2, mut rx2) = mpsc::unbounded_channel();

    let _s1 = broadcaster.subscribe(Arc::new(ChannelHandler { tx: tx1 })).await?;
    let _s2 = broadcaster.subscribe(Arc::new(ChannelHandler { tx: tx2 })).await?;
    assert_eq!(broadcaster.subscriber_count(), 2);

    let event = ReloadEvent::new(Uuid::new_v4(), 4, Some(Scope::new("A").unwrap()));
    broadcaster.publish(event.clone()).await?;

    let got1 = tokio::time::timeout(Duration::from_secs(1), rx1.recv()).await.unwrap();
    let got2 = tokio::time::timeout(Duration::from_secs(1), rx2.recv()).await.unwrap();
    assert_eq!(got1, Some(event.clone()));
    assert_eq!(got2, Some(event));

    Ok(())
}

#[tokio::test]
async fn test_publish_without_subscribers_succeeds() {
    let broadcaster = InMemoryReloadBroadcaster::default();
    assert!(broadcaster
        .publish(ReloadEvent::new(Uuid::new_v4(), 1, None))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_dropping_subscription_stops_delivery() -> Result<(), CoreError> {
    let broadcaster = InMemoryReloadBroadcaster::default();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let subscription = broadcaster.subscribe(Arc::new(ChannelHandler { tx })).await?;
    drop(subscription);
    tokio::task::yield_now().await;

    broadcaster
        .publish(ReloadEvent::new(Uuid::new_v4(), 1, None))
        .await?;
    let got = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    // Either nothing arrives or the channel closed with the aborted task
    assert!(matches!(got, Err(_) | Ok(None)));

    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn test_lagging_subscriber_gets_resync() -> Result<(), CoreError> {
    let broadcaster = InMemoryReloadBroadcaster::new(2);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = broadcaster.subscribe(Arc::new(ChannelHandler { tx })).await?;

    // The dispatcher cannot run until this task yields, so it falls behind
    for revision in 1..=5 {
        broadcaster
            .publish(ReloadEvent::new(Uuid::new_v4(), revision, None))
            .await?;
    }

    let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.revision, None);
    assert!(first.origin.is_nil());

    let mut rest = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await {
        rest.push(event.revision);
    }
    assert_eq!(rest, vec![Some(4), Some(5)]);

    Ok(())
}
