//! Cross-replica reload channel over Postgres LISTEN/NOTIFY

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use tenantflow_core::{
    domain::reload::dispatch, CoreError, ReloadBroadcaster, ReloadEvent, ReloadHandler,
    ReloadSubscription,
};

use crate::PostgresConnection;

/// Default notification channel
pub const DEFAULT_CHANNEL: &str = "tenantflow_reload";

const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct PostgresReloadBroadcaster {
    conn: PostgresConnection,
    channel: String,
}

impl PostgresReloadBroadcaster {
    pub fn new(conn: PostgresConnection, channel: impl Into<String>) -> Self {
        Self {
            conn,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl ReloadBroadcaster for PostgresReloadBroadcaster {
    async fn publish(&self, event: ReloadEvent) -> Result<(), CoreError> {
        let payload = serde_json::to_string(&event)?;

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&self.channel)
            .bind(&payload)
            .execute(self.conn.pool())
            .await
            .map_err(|e| CoreError::ReloadChannelError(format!("Failed to notify: {}", e)))?;

        debug!(correlation_id = %event.correlation_id, channel = %self.channel, "Published reload event");
        Ok(())
    }

    async fn subscribe(
        &self,
        handler: Arc<dyn ReloadHandler>,
    ) -> Result<ReloadSubscription, CoreError> {
        let mut listener = PgListener::connect_with(self.conn.pool())
            .await
            .map_err(|e| CoreError::ReloadChannelError(format!("Failed to connect listener: {}", e)))?;
        listener
            .listen(&self.channel)
            .await
            .map_err(|e| CoreError::ReloadChannelError(format!("Failed to listen: {}", e)))?;

        info!(channel = %self.channel, "Listening for reload events");

        let task = tokio::spawn(async move {
            loop {
                match listener.try_recv().await {
                    Ok(Some(notification)) => {
                        match serde_json::from_str::<ReloadEvent>(notification.payload()) {
                            Ok(event) => dispatch(handler.as_ref(), event).await,
                            Err(e) => warn!(error = %e, "Ignoring malformed reload payload"),
                        }
                    }
                    Ok(None) => {
                        // Notifications sent while disconnected are lost
                        warn!("Reload listener reconnected, forcing a full reload");
                        dispatch(handler.as_ref(), ReloadEvent::resync()).await;
                    }
                    Err(e) => {
                        error!(error = %e, "Reload listener failed, retrying");
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        });

        Ok(ReloadSubscription::from_task(task))
    }
}
