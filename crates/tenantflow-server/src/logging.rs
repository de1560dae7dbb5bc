//! Logging setup and the engine log bridge

use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LogFormat, ServerConfig};
use crate::error::{ServerError, ServerResult};

/// Install the global subscriber
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(config: &ServerConfig) -> ServerResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| ServerError::ConfigError(format!("Invalid log level: {}", e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
    };

    result.map_err(|e| ServerError::InternalError(format!("Failed to initialise logging: {}", e)))
}

/// Severity of an engine log record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineLevel {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    Audit,
    Metric,
}

impl EngineLevel {
    /// Map the engine's numeric level; unknown values are treated as info
    pub fn from_code(code: u32) -> Self {
        match code {
            10 => EngineLevel::Fatal,
            20 => EngineLevel::Error,
            30 => EngineLevel::Warn,
            40 => EngineLevel::Info,
            50 => EngineLevel::Debug,
            60 => EngineLevel::Trace,
            98 => EngineLevel::Audit,
            99 => EngineLevel::Metric,
            _ => EngineLevel::Info,
        }
    }
}

/// Forward one engine log record to tracing
pub fn engine_log(code: u32, msg: &str) {
    match EngineLevel::from_code(code) {
        EngineLevel::Fatal => error!(target: "tenantflow::engine", fatal = true, "{}", msg),
        EngineLevel::Error => error!(target: "tenantflow::engine", "{}", msg),
        EngineLevel::Warn => warn!(target: "tenantflow::engine", "{}", msg),
        EngineLevel::Info => info!(target: "tenantflow::engine", "{}", msg),
        EngineLevel::Debug => debug!(target: "tenantflow::engine", "{}", msg),
        EngineLevel::Trace => trace!(target: "tenantflow::engine", "{}", msg),
        EngineLevel::Audit => info!(target: "tenantflow::audit", "{}", msg),
        EngineLevel::Metric => debug!(target: "tenantflow::metric", "{}", msg),
    }
}
