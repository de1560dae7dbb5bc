//! Encrypted, append-only credential vault
//!
//! The vault holds one logical credential map. Every write decrypts the
//! latest snapshot, merges the new secrets field by field, re-encrypts under a
//! fresh IV and appends a new snapshot conditioned on the sequence it read.
//! A snapshot that cannot be decrypted fails the call; it is never treated as
//! an empty vault.

pub mod cipher;
pub mod merge;

pub use cipher::CredentialCipher;
pub use merge::{decode_credential_map, merge_credentials, CredentialMap};

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::OperationPolicy;
use crate::domain::{CredentialSnapshot, CredentialSnapshotStore};
use crate::CoreError;

/// Credentials handed to the vault by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialPayload {
    /// `{"$": envelope}` encrypted under the vault passphrase
    Encrypted(String),
    Plain(CredentialMap),
}

impl CredentialPayload {
    /// Classify an engine document: a lone string `$` field is an envelope
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        if let Value::Object(fields) = &value {
            if fields.len() == 1 {
                if let Some(Value::String(envelope)) = fields.get("$") {
                    return Ok(CredentialPayload::Encrypted(envelope.clone()));
                }
            }
        }

        decode_credential_map(value)
            .map(CredentialPayload::Plain)
            .map_err(|e| CoreError::ValidationError(format!("invalid credential payload: {}", e)))
    }
}

/// The committed state after a vault write
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedCredentials {
    pub credentials: CredentialMap,
    pub envelope: String,
    pub sequence: u64,
}

impl CommittedCredentials {
    /// Engine-facing `{"$": envelope}` form
    pub fn to_engine_value(&self) -> Value {
        json!({ "$": self.envelope })
    }
}

pub struct CredentialVault {
    cipher: CredentialCipher,
    store: Arc<dyn CredentialSnapshotStore>,
    policy: OperationPolicy,
}

impl CredentialVault {
    pub fn new(
        passphrase: &str,
        store: Arc<dyn CredentialSnapshotStore>,
        policy: OperationPolicy,
    ) -> Self {
        Self {
            cipher: CredentialCipher::from_passphrase(passphrase),
            store,
            policy,
        }
    }

    pub fn cipher(&self) -> &CredentialCipher {
        &self.cipher
    }

    async fn latest(&self) -> Result<Option<CredentialSnapshot>, CoreError> {
        self.policy
            .bounded("credential read", self.store.latest())
            .await
    }

    pub async fn health_check(&self) -> Result<bool, CoreError> {
        self.policy
            .bounded("credential health", self.store.health_check())
            .await
    }

    /// Envelope of the latest snapshot, without decrypting it
    pub async fn latest_envelope(&self) -> Result<Option<String>, CoreError> {
        Ok(self.latest().await?.map(|snapshot| snapshot.ciphertext))
    }

    /// Decrypted contents of the latest snapshot
    pub async fn read(&self) -> Result<CredentialMap, CoreError> {
        match self.latest().await? {
            Some(snapshot) => self.cipher.decrypt(&snapshot.ciphertext),
            None => Ok(CredentialMap::new()),
        }
    }

    /// Merge `payload` into the vault and append the result
    pub async fn write(&self, payload: CredentialPayload) -> Result<CommittedCredentials, CoreError> {
        let incoming = match payload {
            CredentialPayload::Encrypted(envelope) => self.cipher.decrypt(&envelope)?,
            CredentialPayload::Plain(map) => map,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;

            let latest = self.latest().await?;
            let (current, expected, previous_ts) = match &latest {
                Some(snapshot) => (
                    self.cipher.decrypt(&snapshot.ciphertext)?,
                    Some(snapshot.sequence),
                    snapshot.timestamp,
                ),
                None => (CredentialMap::new(), None, i64::MIN),
            };

            let merged = merge_credentials(current, incoming.clone());
            let envelope = self.cipher.encrypt(&merged)?;
            let timestamp = chrono::Utc::now()
                .timestamp_millis()
                .max(previous_ts.saturating_add(1));

            match self
                .policy
                .bounded(
                    "credential append",
                    self.store.append(expected, envelope.clone(), timestamp),
                )
                .await
            {
                Ok(snapshot) => {
                    info!(
                        sequence = snapshot.sequence,
                        nodes = merged.len(),
                        attempts = attempt,
                        "Stored credential snapshot"
                    );
                    return Ok(CommittedCredentials {
                        credentials: merged,
                        envelope,
                        sequence: snapshot.sequence,
                    });
                }
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    warn!(attempt, error = %err, "Credential vault moved during write, retrying");
                }
                Err(err) if err.is_retryable() => {
                    return Err(CoreError::ConcurrentModification(format!(
                        "credential write gave up after {} attempts: {}",
                        attempt, err
                    )));
                }
                Err(err) => {
                    debug!(error = %err, "Credential append failed");
                    return Err(err);
                }
            }
        }
    }
}
