//! KeyManager: the single authority for "is the vault unlocked, and with what key".
//!
//! There is no process-wide key. A `KeyManager` is an explicit session object:
//! clone it to share one session, construct another for an independent one.
//!
//! States are `Locked` (no key) and `Unlocked` (key present). Deriving while
//! already unlocked replaces the key: last derive wins. Data sealed under the
//! previous key will then fail to open with a decryption error.

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use nv_crypto::kdf::SALT_LEN;
use nv_crypto::{EncryptedBlob, KdfParams, SymmetricKey};
use parking_lot::RwLock;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::error::StoreError;
use crate::kv::{KvBackend, META_COLLECTION};

/// Well-known id of the installation salt in the `meta` collection.
pub const SALT_ID: &str = "salt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
}

/// Derived key plus the salt it came from. Volatile only; never serialised.
///
/// Read-only once created, so any number of concurrent encrypt/decrypt calls
/// may hold a clone.
#[derive(Clone)]
pub struct SessionKey {
    inner: Arc<SessionKeyInner>,
}

struct SessionKeyInner {
    key: SymmetricKey,
    salt: [u8; SALT_LEN],
}

impl SessionKey {
    fn new(key: SymmetricKey, salt: [u8; SALT_LEN]) -> Self {
        Self {
            inner: Arc::new(SessionKeyInner { key, salt }),
        }
    }

    pub fn key(&self) -> &SymmetricKey {
        &self.inner.key
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.inner.salt
    }

    pub fn seal(&self, plaintext: &str) -> Result<EncryptedBlob, StoreError> {
        Ok(nv_crypto::encrypt_str(&self.inner.key, plaintext)?)
    }

    pub fn open(&self, blob: &EncryptedBlob) -> Result<String, StoreError> {
        Ok(nv_crypto::decrypt_string(&self.inner.key, blob)?)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey").finish_non_exhaustive()
    }
}

/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct KeyManager {
    kv: Arc<dyn KvBackend>,
    params: KdfParams,
    current: Arc<RwLock<Option<SessionKey>>>,
}

impl KeyManager {
    pub fn new(kv: Arc<dyn KvBackend>, params: KdfParams) -> Self {
        Self {
            kv,
            params,
            current: Arc::new(RwLock::new(None)),
        }
    }

    /// Derive the session key from `password` and the installation salt,
    /// creating and persisting the salt on first use. Replaces any live key.
    pub async fn derive_key(&self, password: &str) -> Result<SessionKey, StoreError> {
        let salt = self.load_or_create_salt().await?;
        let params = self.params;
        let password = Zeroizing::new(password.as_bytes().to_vec());

        // Argon2 is deliberately slow; keep it off the async workers.
        let key = tokio::task::spawn_blocking(move || {
            nv_crypto::derive_key(&password, &salt, &params)
        })
        .await
        .map_err(|e| StoreError::KeyDerivationTask(e.to_string()))??;

        let session = SessionKey::new(key, salt);
        let replaced = self.current.write().replace(session.clone()).is_some();
        info!(replaced, "vault unlocked");
        Ok(session)
    }

    /// Non-blocking read of the live key.
    pub fn current_key(&self) -> Option<SessionKey> {
        self.current.read().clone()
    }

    /// Like `current_key`, but locked is an error.
    pub fn require_key(&self) -> Result<SessionKey, StoreError> {
        self.current_key().ok_or(StoreError::MissingKey)
    }

    /// Drop the in-memory key. Outstanding `SessionKey` clones keep working
    /// until they are dropped; the key bytes are zeroized with the last one.
    pub fn clear_key(&self) {
        if self.current.write().take().is_some() {
            info!("vault locked");
        }
    }

    pub fn state(&self) -> LockState {
        if self.current.read().is_some() {
            LockState::Unlocked
        } else {
            LockState::Locked
        }
    }

    async fn load_or_create_salt(&self) -> Result<[u8; SALT_LEN], StoreError> {
        if let Some(raw) = self.kv.get(META_COLLECTION, SALT_ID).await? {
            let encoded: String = serde_json::from_str(&raw)?;
            let bytes = general_purpose::STANDARD
                .decode(encoded)
                .map_err(nv_crypto::CryptoError::from)?;
            let len = bytes.len();
            return bytes.try_into().map_err(|_| {
                StoreError::Crypto(nv_crypto::CryptoError::InvalidSalt {
                    expected: SALT_LEN,
                    actual: len,
                })
            });
        }

        let salt = nv_crypto::generate_salt();
        let encoded = serde_json::to_string(&general_purpose::STANDARD.encode(salt))?;
        self.kv.put(META_COLLECTION, SALT_ID, &encoded).await?;
        debug!("generated installation salt");
        Ok(salt)
    }
}
