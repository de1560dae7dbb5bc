//! AES-256-CTR envelope for credential snapshots
//!
//! Wire form: `hex(iv) + base64(ciphertext)` where `iv` is 16 random bytes
//! and the key is the SHA-256 digest of the operator passphrase.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use super::merge::{decode_credential_map, CredentialMap};
use crate::CoreError;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const IV_LEN: usize = 16;
const IV_HEX_LEN: usize = IV_LEN * 2;

#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; 32],
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl CredentialCipher {
    /// Derive the key once from `passphrase`
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Encrypt a credential map under a fresh IV
    pub fn encrypt(&self, credentials: &CredentialMap) -> Result<String, CoreError> {
        let plaintext = serde_json::to_vec(credentials)?;

        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        Ok(self.seal(&iv, plaintext))
    }

    fn seal(&self, iv: &[u8; IV_LEN], mut buffer: Vec<u8>) -> String {
        let mut cipher = Aes256Ctr::new(&self.key.into(), &(*iv).into());
        cipher.apply_keystream(&mut buffer);
        format!("{}{}", hex::encode(iv), base64::encode(&buffer))
    }

    /// Decrypt a stored envelope into a credential map
    pub fn decrypt(&self, envelope: &str) -> Result<CredentialMap, CoreError> {
        let plaintext = self.open(envelope)?;
        let value: Value = serde_json::from_str(&plaintext).map_err(|e| {
            CoreError::DecryptionFailed(format!("plaintext is not JSON: {}", e))
        })?;
        decode_credential_map(value)
    }

    fn open(&self, envelope: &str) -> Result<String, CoreError> {
        let iv_hex = envelope.get(..IV_HEX_LEN).ok_or_else(|| {
            CoreError::DecryptionFailed(format!(
                "envelope shorter than the {}-character IV prefix",
                IV_HEX_LEN
            ))
        })?;
        let iv_bytes = hex::decode(iv_hex)
            .map_err(|e| CoreError::DecryptionFailed(format!("invalid IV hex: {}", e)))?;
        let iv: [u8; IV_LEN] = iv_bytes
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::DecryptionFailed("IV must be 16 bytes".to_string()))?;

        let mut buffer = base64::decode(&envelope[IV_HEX_LEN..])
            .map_err(|e| CoreError::DecryptionFailed(format!("invalid ciphertext base64: {}", e)))?;

        let mut cipher = Aes256Ctr::new(&self.key.into(), &iv.into());
        cipher.apply_keystream(&mut buffer);

        String::from_utf8(buffer).map_err(|_| {
            CoreError::DecryptionFailed("plaintext is not UTF-8, wrong key?".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> CredentialMap {
        decode_credential_map(json!({
            "n1": { "user": "admin", "password": "s3cret" },
            "n2": { "apiKey": "k-123", "port": 1883 }
        }))
        .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let cipher = CredentialCipher::from_passphrase("correct horse");
        let envelope = cipher.encrypt(&sample()).unwrap();

        assert!(envelope[..32].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(cipher.decrypt(&envelope).unwrap(), sample());
    }

    #[test]
    fn test_fresh_iv_per_encrypt() {
        let cipher = CredentialCipher::from_passphrase("pw");
        let a = cipher.encrypt(&sample()).unwrap();
        let b = cipher.encrypt(&sample()).unwrap();
        assert_ne!(a[..32], b[..32]);
    }

    #[test]
    fn test_known_vector_is_stable() {
        let cipher = CredentialCipher::from_passphrase("my-random-string");
        let iv = [7u8; 16];
        let envelope = cipher.seal(&iv, br#"{"n1":{"pw":"a"}}"#.to_vec());

        assert!(envelope.starts_with("07070707070707070707070707070707"));
        let decoded = cipher.decrypt(&envelope).unwrap();
        assert_eq!(decoded["n1"]["pw"], json!("a"));
    }

    #[test]
    fn test_wrong_key_fails_loudly() {
        let envelope = CredentialCipher::from_passphrase("one")
            .encrypt(&sample())
            .unwrap();

        let err = CredentialCipher::from_passphrase("two")
            .decrypt(&envelope)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::DecryptionFailed(_) | CoreError::CorruptVault(_)
        ));
    }

    #[test]
    fn test_malformed_envelopes() {
        let cipher = CredentialCipher::from_passphrase("pw");
        for bad in ["", "abc", "zz070707070707070707070707070707AAAA", "07070707070707070707070707070707!!!"] {
            assert!(
                matches!(cipher.decrypt(bad), Err(CoreError::DecryptionFailed(_))),
                "expected DecryptionFailed for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_non_map_plaintext_is_corrupt() {
        let cipher = CredentialCipher::from_passphrase("pw");
        let envelope = cipher.seal(&[1u8; 16], b"[1,2,3]".to_vec());
        assert!(matches!(cipher.decrypt(&envelope), Err(CoreError::CorruptVault(_))));
    }

    #[test]
    fn test_debug_redacts_key() {
        let cipher = CredentialCipher::from_passphrase("pw");
        assert!(format!("{:?}", cipher).contains("<redacted>"));
    }
}
