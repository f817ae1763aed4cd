//! nv_store — session keys and encrypted record storage for NoteVault
//!
//! # Encryption strategy
//! Nothing below this crate ever sees plaintext note fields:
//! - Titles, bodies, tags and folder names are sealed individually with
//!   XChaCha20-Poly1305 before they reach a `KvBackend`.
//! - The session key is derived from the user password via Argon2id and held
//!   in memory only, inside a `KeyManager` the caller owns and passes around.
//! - Non-sensitive metadata (ids, folder membership, timestamps) is stored in
//!   plaintext so records can be filtered and ordered without decrypting.
//!
//! # Persistence
//! Any durable key-value engine can sit underneath; `MemoryKv` and the
//! SQLite-backed `SqliteKv` ship here.

pub mod error;
pub mod key_manager;
pub mod kv;
pub mod notes;
pub mod records;
pub mod sqlite;

pub use error::StoreError;
pub use key_manager::{KeyManager, LockState, SessionKey};
pub use kv::{KvBackend, MemoryKv};
pub use notes::{Folder, Note, NoteService};
pub use records::{EncryptedStore, StoredRecord};
pub use sqlite::SqliteKv;
