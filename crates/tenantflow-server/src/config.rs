//! Configuration for the tenantflow server
//!
//! Values come from defaults, then an optional file named by
//! `TENANTFLOW_CONFIG`, then `TENANTFLOW_*` environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use tenantflow_core::{LibraryMode, OperationPolicy, UnscopedPolicy};

use crate::error::{ServerError, ServerResult};

/// Passphrase used when none is configured
pub const DEFAULT_CREDENTIAL_SECRET: &str = "my-random-string";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Whether the flow integration is mounted at all
    pub enabled: bool,

    /// Host to bind to
    pub bind_address: String,

    /// Port to listen on
    pub port: u16,

    /// Path prefix of the editor admin API
    pub admin_root: String,

    /// `memory://...` or `postgres://...`
    pub database_url: String,

    /// Maximum pooled database connections
    pub db_max_connections: u32,

    /// Passphrase the vault key is derived from
    pub credential_secret: String,

    /// Visibility of records saved without a scope
    pub unscoped_policy: UnscopedPolicy,

    /// Time budget of one store or vault call
    pub operation_timeout_ms: u64,

    /// Read-merge-write attempts before a conflict is reported
    pub max_reconcile_attempts: u32,

    /// Restrict the admin API to `admin_roles`
    pub enable_admin_role: bool,

    pub admin_roles: Vec<String>,

    pub library_mode: LibraryMode,

    /// Where saved flows are mirrored outside production
    pub flow_file_export: Option<PathBuf>,

    /// `production` disables the flow file export
    pub environment: String,

    /// Log level
    pub log_level: String,

    pub log_format: LogFormat,

    pub tenant_header: String,
    pub user_header: String,
    pub roles_header: String,

    /// Maximum accepted request body
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            admin_root: "/red".to_string(),
            database_url: "memory://local".to_string(),
            db_max_connections: 5,
            credential_secret: DEFAULT_CREDENTIAL_SECRET.to_string(),
            unscoped_policy: UnscopedPolicy::default(),
            operation_timeout_ms: 10_000,
            max_reconcile_attempts: 5,
            enable_admin_role: false,
            admin_roles: vec!["FLOW_ADMIN".to_string()],
            library_mode: LibraryMode::default(),
            flow_file_export: None,
            environment: "development".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            tenant_header: "x-tenant-id".to_string(),
            user_header: "x-user-id".to_string(),
            roles_header: "x-roles".to_string(),
            body_limit_bytes: 2048 * 1024,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl ServerConfig {
    /// Load configuration from the optional file and the process environment
    pub fn load() -> ServerResult<Self> {
        let file = env::var("TENANTFLOW_CONFIG").ok();
        Self::load_from(file.as_deref(), |key| env::var(key).ok())
    }

    /// Load configuration from `file` and an arbitrary variable lookup
    pub fn load_from<F>(file: Option<&str>, lookup: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match file {
            Some(path) => config::Config::builder()
                .add_source(config::File::with_name(path).required(false))
                .build()?
                .try_deserialize::<ServerConfig>()?,
            None => Self::default(),
        };

        config.apply_env(lookup);
        config.validate()?;

        info!(
            admin_root = %config.admin_root,
            unscoped_policy = %config.unscoped_policy,
            library_mode = ?config.library_mode,
            "Loaded server configuration"
        );
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("TENANTFLOW_ENABLED") {
            match parse_bool(&value) {
                Some(enabled) => self.enabled = enabled,
                None => warn!("Invalid TENANTFLOW_ENABLED value: {}", value),
            }
        }

        if let Some(host) = lookup("TENANTFLOW_BIND_ADDRESS") {
            self.bind_address = host;
        }

        if let Some(port) = lookup("TENANTFLOW_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => warn!("Invalid TENANTFLOW_PORT value: {}", port),
            }
        }

        if let Some(root) = lookup("TENANTFLOW_ADMIN_ROOT") {
            self.admin_root = root;
        }

        if let Some(url) = lookup("TENANTFLOW_DATABASE_URL") {
            self.database_url = url;
        }

        if let Some(max) = lookup("TENANTFLOW_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(max) => self.db_max_connections = max,
                Err(_) => warn!("Invalid TENANTFLOW_DB_MAX_CONNECTIONS value: {}", max),
            }
        }

        if let Some(secret) = lookup("TENANTFLOW_CREDENTIAL_SECRET") {
            self.credential_secret = secret;
        }

        if let Some(policy) = lookup("TENANTFLOW_UNSCOPED_POLICY") {
            match policy.parse::<UnscopedPolicy>() {
                Ok(policy) => self.unscoped_policy = policy,
                Err(e) => warn!("Invalid TENANTFLOW_UNSCOPED_POLICY value: {}", e),
            }
        }

        if let Some(timeout) = lookup("TENANTFLOW_OPERATION_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(ms) => self.operation_timeout_ms = ms,
                Err(_) => warn!("Invalid TENANTFLOW_OPERATION_TIMEOUT_MS value: {}", timeout),
            }
        }

        if let Some(attempts) = lookup("TENANTFLOW_MAX_RECONCILE_ATTEMPTS") {
            match attempts.parse::<u32>() {
                Ok(n) => self.max_reconcile_attempts = n,
                Err(_) => warn!("Invalid TENANTFLOW_MAX_RECONCILE_ATTEMPTS value: {}", attempts),
            }
        }

        if let Some(value) = lookup("TENANTFLOW_ENABLE_ADMIN_ROLE") {
            match parse_bool(&value) {
                Some(enabled) => self.enable_admin_role = enabled,
                None => warn!("Invalid TENANTFLOW_ENABLE_ADMIN_ROLE value: {}", value),
            }
        }

        if let Some(roles) = lookup("TENANTFLOW_ADMIN_ROLES") {
            self.admin_roles = roles
                .split(',')
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect();
        }

        if let Some(mode) = lookup("TENANTFLOW_LIBRARY_MODE") {
            match mode.trim().to_ascii_lowercase().as_str() {
                "disabled" => self.library_mode = LibraryMode::Disabled,
                "in_memory" | "memory" => self.library_mode = LibraryMode::InMemory,
                _ => warn!("Invalid TENANTFLOW_LIBRARY_MODE value: {}", mode),
            }
        }

        if let Some(path) = lookup("TENANTFLOW_FLOW_FILE_EXPORT") {
            self.flow_file_export = if path.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }

        if let Some(environment) = lookup("TENANTFLOW_ENVIRONMENT") {
            self.environment = environment;
        }

        if let Some(level) = lookup("TENANTFLOW_LOG_LEVEL") {
            self.log_level = level;
        }

        if let Some(format) = lookup("TENANTFLOW_LOG_FORMAT") {
            match format.trim().to_ascii_lowercase().as_str() {
                "json" => self.log_format = LogFormat::Json,
                "pretty" => self.log_format = LogFormat::Pretty,
                _ => warn!("Invalid TENANTFLOW_LOG_FORMAT value: {}", format),
            }
        }

        if let Some(header) = lookup("TENANTFLOW_TENANT_HEADER") {
            self.tenant_header = header;
        }

        if let Some(header) = lookup("TENANTFLOW_USER_HEADER") {
            self.user_header = header;
        }

        if let Some(header) = lookup("TENANTFLOW_ROLES_HEADER") {
            self.roles_header = header;
        }

        if let Some(limit) = lookup("TENANTFLOW_BODY_LIMIT_BYTES") {
            match limit.parse::<usize>() {
                Ok(bytes) => self.body_limit_bytes = bytes,
                Err(_) => warn!("Invalid TENANTFLOW_BODY_LIMIT_BYTES value: {}", limit),
            }
        }
    }

    /// Check invariants and normalise the admin root
    pub fn validate(&mut self) -> ServerResult<()> {
        let root = self.admin_root.trim().trim_end_matches('/');
        if !self.admin_root.trim().starts_with('/') {
            return Err(ServerError::ConfigError(format!(
                "admin_root must start with '/': {}",
                self.admin_root
            )));
        }
        self.admin_root = if root.is_empty() {
            "/".to_string()
        } else {
            root.to_string()
        };

        if !(self.database_url.starts_with("memory://")
            || self.database_url.starts_with("postgres://")
            || self.database_url.starts_with("postgresql://"))
        {
            return Err(ServerError::ConfigError(format!(
                "Unsupported database URL: {}",
                self.database_url
            )));
        }

        if self.credential_secret.is_empty() {
            return Err(ServerError::ConfigError(
                "credential_secret must not be empty".to_string(),
            ));
        }

        if self.operation_timeout_ms == 0 {
            return Err(ServerError::ConfigError(
                "operation_timeout_ms must be positive".to_string(),
            ));
        }

        if self.max_reconcile_attempts == 0 {
            return Err(ServerError::ConfigError(
                "max_reconcile_attempts must be at least 1".to_string(),
            ));
        }

        if self.credential_secret == DEFAULT_CREDENTIAL_SECRET {
            warn!("No TENANTFLOW_CREDENTIAL_SECRET provided - credentials are encrypted with the default passphrase!");
        }

        if self.enable_admin_role && self.admin_roles.is_empty() {
            warn!("Admin role check enabled with no admin_roles - every admin request will be rejected");
        }

        Ok(())
    }

    pub fn operation_policy(&self) -> OperationPolicy {
        OperationPolicy::new(
            Duration::from_millis(self.operation_timeout_ms),
            self.max_reconcile_attempts,
        )
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Export target, if exporting applies to this environment
    pub fn export_path(&self) -> Option<&PathBuf> {
        if self.is_production() {
            None
        } else {
            self.flow_file_export.as_ref()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::load_from(None, lookup(&[])).unwrap();
        assert!(config.enabled);
        assert_eq!(config.admin_root, "/red");
        assert_eq!(config.unscoped_policy, UnscopedPolicy::Hidden);
        assert_eq!(config.admin_roles, vec!["FLOW_ADMIN"]);
        assert_eq!(config.body_limit_bytes, 2048 * 1024);
        assert_eq!(config.operation_policy(), OperationPolicy::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::load_from(
            None,
            lookup(&[
                ("TENANTFLOW_PORT", "9000"),
                ("TENANTFLOW_ADMIN_ROOT", "/editor/"),
                ("TENANTFLOW_UNSCOPED_POLICY", "shared"),
                ("TENANTFLOW_ENABLE_ADMIN_ROLE", "1"),
                ("TENANTFLOW_ADMIN_ROLES", "OPS, FLOW_ADMIN ,"),
                ("TENANTFLOW_LIBRARY_MODE", "in_memory"),
                ("TENANTFLOW_LOG_FORMAT", "json"),
                ("TENANTFLOW_OPERATION_TIMEOUT_MS", "250"),
            ]),
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.admin_root, "/editor");
        assert_eq!(config.unscoped_policy, UnscopedPolicy::Shared);
        assert!(config.enable_admin_role);
        assert_eq!(config.admin_roles, vec!["OPS", "FLOW_ADMIN"]);
        assert_eq!(config.library_mode, LibraryMode::InMemory);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.operation_policy().timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = ServerConfig::load_from(
            None,
            lookup(&[("TENANTFLOW_PORT", "http"), ("TENANTFLOW_UNSCOPED_POLICY", "everyone")]),
        )
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.unscoped_policy, UnscopedPolicy::Hidden);
    }

    #[test]
    fn test_validation_errors() {
        for vars in [
            vec![("TENANTFLOW_DATABASE_URL", "mysql://db")],
            vec![("TENANTFLOW_ADMIN_ROOT", "red")],
            vec![("TENANTFLOW_CREDENTIAL_SECRET", "")],
            vec![("TENANTFLOW_MAX_RECONCILE_ATTEMPTS", "0")],
        ] {
            assert!(
                matches!(
                    ServerConfig::load_from(None, lookup(&vars)),
                    Err(ServerError::ConfigError(_))
                ),
                "expected ConfigError for {:?}",
                vars
            );
        }
    }

    #[test]
    fn test_export_disabled_in_production() {
        let mut config = ServerConfig {
            flow_file_export: Some(PathBuf::from("/tmp/flows.json")),
            ..Default::default()
        };
        assert!(config.export_path().is_some());

        config.environment = "Production".to_string();
        assert!(config.export_path().is_none());
    }

    #[test]
    fn test_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tenantflow.toml");
        std::fs::write(
            &path,
            "admin_root = \"/flows-admin\"\nlibrary_mode = \"in_memory\"\nport = 7000\n",
        )
        .unwrap();

        let config = ServerConfig::load_from(
            path.to_str(),
            lookup(&[("TENANTFLOW_PORT", "7001")]),
        )
        .unwrap();
        assert_eq!(config.admin_root, "/flows-admin");
        assert_eq!(config.library_mode, LibraryMode::InMemory);
        assert_eq!(config.port, 7001);
    }
}
