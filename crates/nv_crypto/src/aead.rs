//! Authenticated Encryption with Associated Data
//!
//! Uses XChaCha20-Poly1305 (192-bit nonce).
//! Key size: 32 bytes.  Nonce: 24 bytes (random, fresh per call).  Tag: 16 bytes.
//!
//! Every field of every record is sealed separately, so no two blobs ever
//! share a nonce under the same key.

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng, Payload},
    XChaCha20Poly1305, XNonce,
};
use zeroize::Zeroizing;

use crate::blob::EncryptedBlob;
use crate::error::CryptoError;
use crate::kdf::SymmetricKey;

pub const NONCE_LEN: usize = 24;

/// Bound into every tag; blobs from other formats fail to open.
const RECORD_AAD: &[u8] = b"nv-record-v1";

/// Seal `plaintext` under `key` with a freshly generated nonce.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<EncryptedBlob, CryptoError> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::Encryption)?;

    let nonce = XChaCha20Poly1305::generate_nonce(&mut AeadOsRng);

    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad: RECORD_AAD,
            },
        )
        .map_err(|_| CryptoError::Encryption)?;

    Ok(EncryptedBlob {
        ciphertext,
        nonce: nonce.to_vec(),
    })
}

/// Open a blob. Any authentication failure is a hard `Decryption` error.
pub fn decrypt(key: &SymmetricKey, blob: &EncryptedBlob) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if blob.nonce.len() != NONCE_LEN {
        return Err(CryptoError::Decryption);
    }
    let nonce = XNonce::from_slice(&blob.nonce);

    let cipher =
        XChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::Decryption)?;

    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: &blob.ciphertext,
                aad: RECORD_AAD,
            },
        )
        .map_err(|_| CryptoError::Decryption)?;

    Ok(Zeroizing::new(plaintext))
}

pub fn encrypt_str(key: &SymmetricKey, plaintext: &str) -> Result<EncryptedBlob, CryptoError> {
    encrypt(key, plaintext.as_bytes())
}

pub fn decrypt_string(key: &SymmetricKey, blob: &EncryptedBlob) -> Result<String, CryptoError> {
    let bytes = decrypt(key, blob)?;
    std::str::from_utf8(&bytes)
        .map(str::to_owned)
        .map_err(|_| CryptoError::InvalidUtf8)
}
