//! Durable key-value contract the rest of the vault is written against.
//!
//! Values are UTF-8 JSON documents addressed by `(collection, id)`. Every
//! backend keeps records grouped per collection so `list` reads one
//! collection without walking every key in the store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StoreError;

pub const META_COLLECTION: &str = "meta";
pub const NOTES_COLLECTION: &str = "notes";
pub const FOLDERS_COLLECTION: &str = "folders";
pub const GRAPH_COLLECTION: &str = "graph";

#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Insert or replace.
    async fn put(&self, collection: &str, id: &str, value: &str) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<String>, StoreError>;

    /// All `(id, value)` pairs of one collection, ordered by id.
    async fn list(&self, collection: &str) -> Result<Vec<(String, String)>, StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;
}

/// Volatile backend; one ordered map per collection.
#[derive(Default)]
pub struct MemoryKv {
    collections: RwLock<HashMap<String, BTreeMap<String, String>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn put(&self, collection: &str, id: &str, value: &str) -> Result<(), StoreError> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|records| records.get(id).cloned()))
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .map(|(id, value)| (id.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let mut guard = self.collections.write();
        let removed = guard
            .get_mut(collection)
            .map(|records| records.remove(id).is_some())
            .unwrap_or(false);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_kv_basic_contract() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("notes", "a").await.unwrap(), None);

        kv.put("notes", "b", "\"two\"").await.unwrap();
        kv.put("notes", "a", "\"one\"").await.unwrap();
        kv.put("folders", "a", "\"other\"").await.unwrap();
        kv.put("notes", "a", "\"uno\"").await.unwrap();

        assert_eq!(kv.get("notes", "a").await.unwrap().as_deref(), Some("\"uno\""));
        let listed = kv.list("notes").await.unwrap();
        assert_eq!(
            listed,
            vec![
                ("a".to_string(), "\"uno\"".to_string()),
                ("b".to_string(), "\"two\"".to_string())
            ]
        );

        assert!(kv.delete("notes", "a").await.unwrap());
        assert!(!kv.delete("notes", "a").await.unwrap());
        assert!(!kv.delete("missing", "a").await.unwrap());
        assert_eq!(kv.list("notes").await.unwrap().len(), 1);
        assert_eq!(kv.list("folders").await.unwrap().len(), 1);
        assert!(kv.list("empty").await.unwrap().is_empty());
    }
}
