use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use super::DbError;

const SEALED_PREFIX: &str = "enc:v1:";
const NONCE_LEN: usize = 12;

/// Used when `security.encryption_key` is not configured.
pub const DEVELOPMENT_KEY: &str = "nl2sql-gate-development-key";

/// Seals connection strings before they are written to the application
/// database. AES-256-GCM with a fresh nonce per value; the key is the
/// SHA-256 digest of the configured secret.
pub struct ConnectionCipher {
    cipher: Aes256Gcm,
}

impl ConnectionCipher {
    pub fn new(secret: &str) -> Self {
        let key = Sha256::digest(secret.as_bytes());
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Returns `enc:v1:<base64(nonce || ciphertext)>`.
    pub fn seal(&self, plaintext: &str) -> Result<String, DbError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| DbError::Secret("encryption failed".into()))?;

        let mut payload = nonce.to_vec();
        payload.extend_from_slice(&sealed);
        Ok(format!("{}{}", SEALED_PREFIX, STANDARD.encode(payload)))
    }

    pub fn open(&self, stored: &str) -> Result<String, DbError> {
        let encoded = stored
            .strip_prefix(SEALED_PREFIX)
            .ok_or_else(|| DbError::Secret("stored value is not sealed".into()))?;
        let payload = STANDARD
            .decode(encoded)
            .map_err(|e| DbError::Secret(format!("malformed sealed value: {}", e)))?;
        if payload.len() <= NONCE_LEN {
            return Err(DbError::Secret("sealed value is truncated".into()));
        }

        let (nonce, sealed) = payload.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| DbError::Secret("cannot decrypt value; was the key changed?".into()))?;
        String::from_utf8(plaintext).map_err(|e| DbError::Secret(e.to_string()))
    }
}
