use anyhow::Context;
use tenantflow_server::{init_logging, run, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load().context("Failed to load configuration")?;
    init_logging(&config).context("Failed to initialise logging")?;

    run(config).await.context("Server error")?;
    Ok(())
}
