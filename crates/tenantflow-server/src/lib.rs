//!
//! Tenantflow Server - HTTP host for tenant-scoped flow storage
//!
//! Wires configuration, stores, the storage module and the admin API together.

use axum::Router;
use std::sync::Arc;
use tracing::info;

use tenantflow_core::{
    engine::MessageContextInjector, library::library_for, CredentialSnapshotStore,
    CredentialVault, FlowMergeCoordinator, FlowStore, ReloadBroadcaster, ReloadSubscription,
    StorageModule, TenantScopeFilter,
};
use tenantflow_state_inmemory::InMemoryStateStoreProvider;

/// API module
pub mod api;

/// Configuration module
pub mod config;

/// Error module
pub mod error;

/// Flow file export
pub mod export;

/// Logging setup
pub mod logging;

/// Server module
pub mod server;

pub use config::{LogFormat, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use export::FlowExporter;
pub use logging::{engine_log, init_logging};
pub use server::TenantFlowServer;

use api::context::{ContextResolver, HeaderContextResolver};
use api::AppState;

/// The persistence backends one engine instance runs on
#[derive(Clone)]
pub struct Stores {
    pub flows: Arc<dyn FlowStore>,
    pub credentials: Arc<dyn CredentialSnapshotStore>,
    pub broadcaster: Arc<dyn ReloadBroadcaster>,
}

impl Stores {
    /// Stores over one in-memory provider
    pub fn in_memory(provider: &InMemoryStateStoreProvider) -> Self {
        let (flows, credentials, broadcaster) = provider.create_repositories();
        Self {
            flows,
            credentials,
            broadcaster,
        }
    }
}

/// Create the stores named by `database_url`
pub async fn create_stores(config: &ServerConfig) -> ServerResult<Stores> {
    if config.database_url.starts_with("memory://") {
        info!("Using in-memory flow store");
        return Ok(Stores::in_memory(&InMemoryStateStoreProvider::new()));
    }

    #[cfg(feature = "postgres")]
    {
        use tenantflow_state_postgres::{create_repositories, PostgresConfig, PostgresConnection};

        let pg_config = PostgresConfig {
            max_connections: config.db_max_connections,
            ..PostgresConfig::with_connection_string(config.database_url.clone())
        };
        let conn = PostgresConnection::new(&pg_config).await?;
        info!("Using PostgreSQL flow store");
        let (flows, credentials, broadcaster) = create_repositories(conn, &pg_config);
        Ok(Stores {
            flows,
            credentials,
            broadcaster,
        })
    }

    #[cfg(not(feature = "postgres"))]
    {
        Err(ServerError::ConfigError(format!(
            "PostgreSQL support is not compiled in: {}",
            config.database_url
        )))
    }
}

/// Build the storage module for one engine instance
pub fn build_storage(config: &ServerConfig, stores: &Stores) -> StorageModule {
    let policy = config.operation_policy();
    let coordinator = FlowMergeCoordinator::new(
        stores.flows.clone(),
        stores.broadcaster.clone(),
        TenantScopeFilter::new(config.unscoped_policy),
        policy,
    );
    let vault = CredentialVault::new(&config.credential_secret, stores.credentials.clone(), policy);

    StorageModule::new(
        Arc::new(coordinator),
        Arc::new(vault),
        library_for(config.library_mode),
        Arc::new(MessageContextInjector),
        policy,
    )
}

/// Build the router, storage module and reload subscription over `stores`
pub async fn build_app_with_stores(
    config: ServerConfig,
    stores: Stores,
) -> ServerResult<(Router, Arc<StorageModule>, ReloadSubscription)> {
    let storage = Arc::new(build_storage(&config, &stores));
    storage.init().await?;

    let subscription = stores
        .broadcaster
        .subscribe(Arc::new(storage.reloader()))
        .await?;

    let resolver: Arc<dyn ContextResolver> = Arc::new(HeaderContextResolver::from_config(&config));
    let exporter = config.export_path().map(FlowExporter::new);

    let state = Arc::new(AppState {
        storage: storage.clone(),
        config,
        resolver,
        exporter,
    });

    Ok((api::build_router(state), storage, subscription))
}

/// Build the application from configuration alone
pub async fn build_app(
    config: ServerConfig,
) -> ServerResult<(Router, Arc<StorageModule>, ReloadSubscription)> {
    let stores = create_stores(&config).await?;
    build_app_with_stores(config, stores).await
}

/// Run the server until shutdown
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    if !config.enabled {
        info!("Flow integration disabled, not starting server");
        return Ok(());
    }

    let (app, storage, subscription) = build_app(config.clone()).await?;
    TenantFlowServer::new(config, app, storage, subscription)
        .run()
        .await
}
