//! nv_crypto — NoteVault cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; Argon2id and XChaCha20-Poly1305 come from audited crates.
//! - Stateless: every function takes the key it needs, nothing is cached here.
//! - Key material is zeroized on drop and never printed by `Debug`.
//!
//! # Module layout
//! - `kdf`    — Argon2id password → 32-byte key, salt generation
//! - `aead`   — XChaCha20-Poly1305 seal/open of record fields
//! - `blob`   — `EncryptedBlob`, the persisted `{ciphertext, nonce}` pair
//! - `error`  — unified error type

pub mod aead;
pub mod blob;
pub mod error;
pub mod kdf;

pub use aead::{decrypt, decrypt_string, encrypt, encrypt_str};
pub use blob::EncryptedBlob;
pub use error::CryptoError;
pub use kdf::{derive_key, generate_salt, KdfParams, SymmetricKey};
