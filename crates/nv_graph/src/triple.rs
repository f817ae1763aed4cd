//! Triple store: an insertion-ordered set of `(subject, predicate, object)`.
//!
//! Subjects and objects are typed node ids (`note:<id>`, `folder:<id>`);
//! predicates come from a fixed vocabulary. The whole set is persisted as one
//! flat JSON list in the `graph` collection after every change.

use std::collections::HashSet;
use std::sync::Arc;

use nv_store::kv::{KvBackend, GRAPH_COLLECTION};
use nv_store::StoreError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GraphError;
use crate::query::{self, Binding, Query};

const TRIPLES_ID: &str = "triples";

pub const NOTE_PREFIX: &str = "note:";
pub const FOLDER_PREFIX: &str = "folder:";

pub mod predicate {
    pub const LINKS_TO: &str = "linksTo";
    pub const IN_FOLDER: &str = "inFolder";
}

pub fn note_node(id: &str) -> String {
    format!("{NOTE_PREFIX}{id}")
}

pub fn folder_node(id: &str) -> String {
    format!("{FOLDER_PREFIX}{id}")
}

/// `note:abc` → `abc`. Untyped ids come back unchanged.
pub fn strip_node_prefix(node: &str) -> &str {
    node.split_once(':').map_or(node, |(_, id)| id)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    pub fn new(subject: impl Into<String>, predicate: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    pub fn mentions(&self, node: &str) -> bool {
        self.subject == node || self.object == node
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Backlink {
    pub id: String,
    pub predicate: String,
}

#[derive(Debug, Default, Clone)]
struct TripleSet {
    order: Vec<Triple>,
    members: HashSet<Triple>,
}

impl TripleSet {
    fn from_list(list: Vec<Triple>) -> Self {
        let mut set = Self::default();
        for triple in list {
            set.insert(triple);
        }
        set
    }

    fn insert(&mut self, triple: Triple) -> bool {
        if !self.members.insert(triple.clone()) {
            return false;
        }
        self.order.push(triple);
        true
    }

    fn retain(&mut self, mut keep: impl FnMut(&Triple) -> bool) -> usize {
        let before = self.order.len();
        self.order.retain(|t| keep(t));
        if self.order.len() != before {
            self.members = self.order.iter().cloned().collect();
        }
        before - self.order.len()
    }
}

pub struct TripleStore {
    kv: Arc<dyn KvBackend>,
    triples: RwLock<TripleSet>,
    /// Serialises mutate-then-persist so snapshots hit the backend in order.
    write_gate: tokio::sync::Mutex<()>,
}

impl TripleStore {
    /// Load the persisted set (empty if none was ever written).
    pub async fn load(kv: Arc<dyn KvBackend>) -> Result<Self, StoreError> {
        let list: Vec<Triple> = match kv.get(GRAPH_COLLECTION, TRIPLES_ID).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        debug!(count = list.len(), "triple store loaded");
        Ok(Self {
            kv,
            triples: RwLock::new(TripleSet::from_list(list)),
            write_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Idempotent insert. Returns whether the triple was new.
    pub async fn add_triple(&self, subject: &str, predicate: &str, object: &str) -> Result<bool, StoreError> {
        let triple = Triple::new(subject, predicate, object);
        let changed = self.mutate(|set| usize::from(set.insert(triple))).await?;
        Ok(changed > 0)
    }

    /// Idempotent removal. Returns whether the triple was present.
    pub async fn remove_triple(&self, subject: &str, predicate: &str, object: &str) -> Result<bool, StoreError> {
        let removed = self
            .mutate(|set| {
                set.retain(|t| !(t.subject == subject && t.predicate == predicate && t.object == object))
            })
            .await?;
        Ok(removed > 0)
    }

    /// Remove every triple with this subject (outgoing edges).
    pub async fn remove_subject(&self, subject: &str) -> Result<usize, StoreError> {
        self.mutate(|set| set.retain(|t| t.subject != subject)).await
    }

    /// Remove every triple mentioning `node` as subject or object.
    pub async fn remove_references(&self, node: &str) -> Result<usize, StoreError> {
        self.mutate(|set| set.retain(|t| !t.mentions(node))).await
    }

    /// Apply `change`; persist if anything changed. On a failed write the
    /// in-memory set is rolled back so it never runs ahead of the backend.
    async fn mutate<F>(&self, change: F) -> Result<usize, StoreError>
    where
        F: FnOnce(&mut TripleSet) -> usize,
    {
        let _gate = self.write_gate.lock().await;
        let (changed, previous, snapshot) = {
            let mut guard = self.triples.write();
            let previous = guard.clone();
            let changed = change(&mut *guard);
            (changed, previous, guard.order.clone())
        };
        if changed == 0 {
            return Ok(0);
        }
        let value = serde_json::to_string(&snapshot)?;
        if let Err(err) = self.kv.put(GRAPH_COLLECTION, TRIPLES_ID, &value).await {
            *self.triples.write() = previous;
            return Err(err);
        }
        debug!(changed, total = snapshot.len(), "triple store persisted");
        Ok(changed)
    }

    pub fn len(&self) -> usize {
        self.triples.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, subject: &str, predicate: &str, object: &str) -> bool {
        self.triples
            .read()
            .members
            .contains(&Triple::new(subject, predicate, object))
    }

    /// Snapshot in insertion order.
    pub fn triples(&self) -> Vec<Triple> {
        self.triples.read().order.clone()
    }

    /// Objects of `subject --predicate-->`, in insertion order.
    pub fn objects(&self, subject: &str, predicate: &str) -> Vec<String> {
        self.triples
            .read()
            .order
            .iter()
            .filter(|t| t.subject == subject && t.predicate == predicate)
            .map(|t| t.object.clone())
            .collect()
    }

    /// Parse and evaluate a pattern query. Syntax errors are raised before
    /// the index is read.
    pub fn query(&self, source: &str) -> Result<Vec<Binding>, GraphError> {
        let query = Query::parse(source)?;
        Ok(self.evaluate(&query))
    }

    pub fn evaluate(&self, query: &Query) -> Vec<Binding> {
        let guard = self.triples.read();
        query::evaluate(query, &guard.order)
    }

    /// Same result as `?s ?p note:<id>`, with subjects stripped of their type prefix.
    pub fn backlinks(&self, note_id: &str) -> Vec<Backlink> {
        let target = note_node(note_id);
        self.triples
            .read()
            .order
            .iter()
            .filter(|t| t.object == target)
            .map(|t| Backlink {
                id: strip_node_prefix(&t.subject).to_string(),
                predicate: t.predicate.clone(),
            })
            .collect()
    }
}
