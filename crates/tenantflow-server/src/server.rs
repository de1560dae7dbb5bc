//! HTTP server lifecycle

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use tenantflow_core::{ReloadSubscription, StorageModule};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Running flow storage host
pub struct TenantFlowServer {
    config: ServerConfig,
    app: Router,
    storage: Arc<StorageModule>,
    // Dropping the subscription stops reload delivery
    subscription: ReloadSubscription,
}

impl TenantFlowServer {
    pub fn new(
        config: ServerConfig,
        app: Router,
        storage: Arc<StorageModule>,
        subscription: ReloadSubscription,
    ) -> Self {
        Self {
            config,
            app,
            storage,
            subscription,
        }
    }

    pub fn storage(&self) -> Arc<StorageModule> {
        Arc::clone(&self.storage)
    }

    /// Address the server binds to
    pub fn address(&self) -> ServerResult<SocketAddr> {
        format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| {
                ServerError::ConfigError(format!(
                    "Invalid bind address {}:{}: {}",
                    self.config.bind_address, self.config.port, e
                ))
            })
    }

    /// Serve until ctrl-c
    pub async fn run(self) -> ServerResult<()> {
        let addr = self.address()?;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, admin_root = %self.config.admin_root, "Starting tenantflow server");

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.subscription.cancel();
        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
