use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use tenantflow_core::{
    CoreError, ReloadBroadcaster, ReloadEvent, ReloadHandler, ReloadSubscription,
};

/// Default number of events a slow subscriber may fall behind
pub const DEFAULT_CAPACITY: usize = 64;

/// Process-local reload channel shared by every engine instance in the process
#[derive(Clone)]
pub struct InMemoryReloadBroadcaster {
    tx: broadcast::Sender<ReloadEvent>,
}

impl InMemoryReloadBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for InMemoryReloadBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl ReloadBroadcaster for InMemoryReloadBroadcaster {
    async fn publish(&self, event: ReloadEvent) -> Result<(), CoreError> {
        let correlation_id = event.correlation_id;
        match self.tx.send(event) {
            Ok(receivers) => debug!(%correlation_id, receivers, "Published reload event"),
            // No subscribers is not a channel failure
            Err(_) => debug!(%correlation_id, "Published reload event with no subscribers"),
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        handler: Arc<dyn ReloadHandler>,
    ) -> Result<ReloadSubscription, CoreError> {
        Ok(ReloadSubscription::spawn_from_broadcast(
            self.tx.subscribe(),
            handler,
        ))
    }
}
