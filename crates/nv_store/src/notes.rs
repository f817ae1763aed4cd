//! Notes and folders on top of `EncryptedStore`.
//!
//! Every human-readable field is sealed on its own with a fresh nonce; only
//! ids, folder membership and timestamps stay in plaintext. A decrypted
//! `Note` lives no longer than the call that produced it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use nv_crypto::EncryptedBlob;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::key_manager::SessionKey;
use crate::kv::{KvBackend, FOLDERS_COLLECTION, NOTES_COLLECTION};
use crate::records::{EncryptedStore, StoredRecord};

pub const DEFAULT_FOLDER_ID: &str = "inbox";

/// Seeded on first unlock of an empty vault: (id, name).
pub const DEFAULT_FOLDERS: &[(&str, &str)] = &[
    ("inbox", "Inbox"),
    ("projects", "Projects"),
    ("todo", "TODO"),
    ("private", "Private"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: String,
    pub folder_id: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn new(folder_id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            folder_id: folder_id.into(),
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Folder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedNote {
    pub folder_id: String,
    pub title: EncryptedBlob,
    pub content: EncryptedBlob,
    #[serde(default)]
    pub tags: Vec<EncryptedBlob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedFolder {
    pub name: EncryptedBlob,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// Cheap to clone.
#[derive(Clone)]
pub struct NoteService {
    notes: EncryptedStore<SealedNote>,
    folders: EncryptedStore<SealedFolder>,
}

impl NoteService {
    pub fn new(kv: Arc<dyn KvBackend>) -> Self {
        Self {
            notes: EncryptedStore::new(kv.clone(), NOTES_COLLECTION),
            folders: EncryptedStore::new(kv, FOLDERS_COLLECTION),
        }
    }

    // ── Notes ────────────────────────────────────────────────────────────────

    /// Seal and upsert. The returned note carries the stored `updated_at`.
    pub async fn save_note(&self, session: &SessionKey, note: &Note) -> Result<Note, StoreError> {
        let sealed = SealedNote {
            folder_id: note.folder_id.clone(),
            title: session.seal(&note.title)?,
            content: session.seal(&note.content)?,
            tags: note
                .tags
                .iter()
                .map(|tag| session.seal(tag))
                .collect::<Result<Vec<_>, _>>()?,
        };
        let record = self.notes.put_at(&note.id, sealed, None, note.updated_at).await?;
        debug!(note_id = %note.id, "note saved");
        Ok(Note {
            updated_at: record.updated_at,
            ..note.clone()
        })
    }

    pub async fn load_note(&self, session: &SessionKey, id: &str) -> Result<Option<Note>, StoreError> {
        match self.notes.get(id).await? {
            Some(record) => Ok(Some(open_note(session, &record)?)),
            None => Ok(None),
        }
    }

    pub async fn note_exists(&self, id: &str) -> Result<bool, StoreError> {
        self.notes.contains(id).await
    }

    /// Most recently updated first. Any record that fails to open fails the
    /// whole listing.
    pub async fn list_notes(
        &self,
        session: &SessionKey,
        folder_id: Option<&str>,
    ) -> Result<Vec<Note>, StoreError> {
        self.notes
            .list()
            .await?
            .iter()
            .filter(|record| folder_id.map_or(true, |f| record.sealed.folder_id == f))
            .map(|record| open_note(session, record))
            .collect()
    }

    pub async fn delete_note(&self, id: &str) -> Result<bool, StoreError> {
        self.notes.delete(id).await
    }

    /// Case-insensitive exact title match; the most recently updated wins.
    pub async fn find_note_by_title(
        &self,
        session: &SessionKey,
        title: &str,
    ) -> Result<Option<Note>, StoreError> {
        let wanted = title.to_lowercase();
        for record in self.notes.list().await? {
            let candidate = session.open(&record.sealed.title)?;
            if candidate.to_lowercase() == wanted {
                return Ok(Some(open_note(session, &record)?));
            }
        }
        Ok(None)
    }

    /// Empty note titled exactly `title`.
    pub async fn create_stub_note(
        &self,
        session: &SessionKey,
        title: &str,
        folder_id: &str,
    ) -> Result<Note, StoreError> {
        let note = Note::new(folder_id, title, "");
        self.save_note(session, &note).await
    }

    // ── Folders ──────────────────────────────────────────────────────────────

    pub async fn save_folder(&self, session: &SessionKey, folder: &Folder) -> Result<(), StoreError> {
        let sealed = SealedFolder {
            name: session.seal(&folder.name)?,
            parent_id: folder.parent_id.clone(),
        };
        self.folders
            .put_at(&folder.id, sealed, None, folder.created_at)
            .await?;
        Ok(())
    }

    pub async fn load_folder(&self, session: &SessionKey, id: &str) -> Result<Option<Folder>, StoreError> {
        match self.folders.get(id).await? {
            Some(record) => Ok(Some(open_folder(session, &record)?)),
            None => Ok(None),
        }
    }

    pub async fn folder_exists(&self, id: &str) -> Result<bool, StoreError> {
        self.folders.contains(id).await
    }

    /// In creation order.
    pub async fn list_folders(&self, session: &SessionKey) -> Result<Vec<Folder>, StoreError> {
        let mut folders = self
            .folders
            .list()
            .await?
            .iter()
            .map(|record| open_folder(session, record))
            .collect::<Result<Vec<_>, _>>()?;
        folders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(folders)
    }

    pub async fn delete_folder(&self, id: &str) -> Result<bool, StoreError> {
        self.folders.delete(id).await
    }

    /// Create the default folders if the vault has none. Returns how many
    /// were created.
    pub async fn seed_default_folders(&self, session: &SessionKey) -> Result<usize, StoreError> {
        if !self.folders.list().await?.is_empty() {
            return Ok(0);
        }
        let base = Utc::now();
        for (offset, (id, name)) in DEFAULT_FOLDERS.iter().enumerate() {
            let folder = Folder {
                id: id.to_string(),
                name: name.to_string(),
                parent_id: None,
                created_at: base + chrono::Duration::milliseconds(offset as i64),
            };
            self.save_folder(session, &folder).await?;
        }
        debug!(count = DEFAULT_FOLDERS.len(), "seeded default folders");
        Ok(DEFAULT_FOLDERS.len())
    }
}

fn open_note(session: &SessionKey, record: &StoredRecord<SealedNote>) -> Result<Note, StoreError> {
    Ok(Note {
        id: record.id.clone(),
        folder_id: record.sealed.folder_id.clone(),
        title: session.open(&record.sealed.title)?,
        content: session.open(&record.sealed.content)?,
        tags: record
            .sealed
            .tags
            .iter()
            .map(|tag| session.open(tag))
            .collect::<Result<Vec<_>, _>>()?,
        updated_at: record.updated_at,
    })
}

fn open_folder(session: &SessionKey, record: &StoredRecord<SealedFolder>) -> Result<Folder, StoreError> {
    Ok(Folder {
        id: record.id.clone(),
        name: session.open(&record.sealed.name)?,
        parent_id: record.sealed.parent_id.clone(),
        created_at: record.created_at,
    })
}
