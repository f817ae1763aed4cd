//! EncryptedStore: opaque sealed records by id, one collection per store.
//!
//! The store never interprets `sealed`; it only stamps timestamps and keeps
//! the optional plaintext `hint` the caller chose to expose.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::kv::KvBackend;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord<T> {
    pub id: String,
    pub sealed: T,
    /// Non-secret, caller-chosen value stored unencrypted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct EncryptedStore<T> {
    kv: Arc<dyn KvBackend>,
    collection: &'static str,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for EncryptedStore<T> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
            collection: self.collection,
            _record: PhantomData,
        }
    }
}

impl<T> EncryptedStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(kv: Arc<dyn KvBackend>, collection: &'static str) -> Self {
        Self {
            kv,
            collection,
            _record: PhantomData,
        }
    }

    pub fn collection(&self) -> &'static str {
        self.collection
    }

    /// Upsert, stamped with the current time.
    pub async fn put(
        &self,
        id: &str,
        sealed: T,
        hint: Option<String>,
    ) -> Result<StoredRecord<T>, StoreError> {
        self.put_at(id, sealed, hint, Utc::now()).await
    }

    /// Upsert with an explicit `updated_at`. `created_at` of an existing
    /// record is preserved.
    pub async fn put_at(
        &self,
        id: &str,
        sealed: T,
        hint: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Result<StoredRecord<T>, StoreError> {
        let created_at = match self.get(id).await? {
            Some(existing) => existing.created_at,
            None => updated_at,
        };
        let record = StoredRecord {
            id: id.to_string(),
            sealed,
            hint,
            created_at,
            updated_at,
        };
        let value = serde_json::to_string(&record)?;
        self.kv.put(self.collection, id, &value).await?;
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Result<Option<StoredRecord<T>>, StoreError> {
        match self.kv.get(self.collection, id).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn contains(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.kv.get(self.collection, id).await?.is_some())
    }

    /// Most recently updated first; ties ordered by id.
    pub async fn list(&self) -> Result<Vec<StoredRecord<T>>, StoreError> {
        let mut records = self
            .kv
            .list(self.collection)
            .await?
            .into_iter()
            .map(|(_, raw)| serde_json::from_str::<StoredRecord<T>>(&raw))
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    /// Removes the record only. Index cleanup is the caller's job.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.kv.delete(self.collection, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use chrono::Duration;

    fn store() -> EncryptedStore<String> {
        EncryptedStore::new(Arc::new(MemoryKv::new()), "things")
    }

    #[tokio::test]
    async fn put_get_delete() {
        let store = store();
        assert!(store.get("a").await.unwrap().is_none());

        let rec = store
            .put("a", "opaque".to_string(), Some("hint".into()))
            .await
            .unwrap();
        let loaded = store.get("a").await.unwrap().unwrap();
        assert_eq!(loaded, rec);
        assert_eq!(loaded.hint.as_deref(), Some("hint"));
        assert!(store.contains("a").await.unwrap());

        assert!(store.delete("a").await.unwrap());
        assert!(!store.contains("a").await.unwrap());
    }

    #[tokio::test]
    async fn upsert_keeps_created_at() {
        let store = store();
        let t0 = Utc::now() - Duration::hours(2);
        let t1 = t0 + Duration::hours(1);
        store.put_at("a", "v1".into(), None, t0).await.unwrap();
        let rec = store.put_at("a", "v2".into(), None, t1).await.unwrap();
        assert_eq!(rec.created_at, t0);
        assert_eq!(rec.updated_at, t1);
        assert_eq!(store.get("a").await.unwrap().unwrap().sealed, "v2");
    }

    #[tokio::test]
    async fn list_is_most_recent_first() {
        let store = store();
        let t = Utc::now();
        store.put_at("old", "x".into(), None, t - Duration::minutes(5)).await.unwrap();
        store.put_at("new", "x".into(), None, t).await.unwrap();
        store.put_at("mid-b", "x".into(), None, t - Duration::minutes(1)).await.unwrap();
        store.put_at("mid-a", "x".into(), None, t - Duration::minutes(1)).await.unwrap();

        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["new", "mid-a", "mid-b", "old"]);
    }

    #[tokio::test]
    async fn corrupt_record_surfaces_as_error() {
        let kv = Arc::new(MemoryKv::new());
        kv.put("things", "bad", "not json").await.unwrap();
        let store: EncryptedStore<String> = EncryptedStore::new(kv, "things");
        assert!(matches!(
            store.get("bad").await,
            Err(StoreError::Serialisation(_))
        ));
        assert!(store.list().await.is_err());
    }
}
