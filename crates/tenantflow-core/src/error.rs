use thiserror::Error;

/// Core error type for tenant-scoped flow and credential storage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The backing database could not be reached or a query failed
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Vault ciphertext could not be decrypted (malformed or wrong key)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Vault plaintext decrypted but is not a credential mapping
    #[error("Corrupt vault: {0}")]
    CorruptVault(String),

    /// Optimistic concurrency conflict; the caller may retry
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// The call context does not carry a usable scope
    #[error("Scope resolution failed: {0}")]
    ScopeResolutionFailed(String),

    /// A store or vault operation exceeded its time budget
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Feature switched off in the current deployment mode
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Reload channel error
    #[error("Reload channel error: {0}")]
    ReloadChannelError(String),
}

impl CoreError {
    /// Whether retrying the whole read-merge-write cycle can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::ConcurrentModification(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}
