use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Vault is locked; unlock with password first")]
    MissingKey,

    #[error("Crypto error: {0}")]
    Crypto(#[from] nv_crypto::CryptoError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Key derivation task failed: {0}")]
    KeyDerivationTask(String),
}

impl StoreError {
    /// Wrong password or a tampered record. Never to be shown as "empty".
    pub fn is_decryption_failure(&self) -> bool {
        matches!(self, StoreError::Crypto(nv_crypto::CryptoError::Decryption))
    }
}
