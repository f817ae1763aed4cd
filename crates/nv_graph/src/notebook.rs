//! Notebook: note/folder persistence with the relationship index kept in step.
//!
//! Every write goes record first, index second. The two are not
//! transactional; a failed index write leaves the record saved and the index
//! as it was before the failing edge.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use nv_crypto::KdfParams;
use nv_store::notes::DEFAULT_FOLDER_ID;
use nv_store::{Folder, KeyManager, KvBackend, LockState, Note, NoteService, SessionKey};
use serde::Serialize;
use tracing::{debug, warn};

use crate::click::{HandlerId, LinkClickRegistry};
use crate::error::GraphError;
use crate::links::{LinkResolver, LinkUpdate};
use crate::query::Binding;
use crate::triple::{folder_node, note_node, predicate, strip_node_prefix, TripleStore};

#[derive(Debug, Clone)]
pub struct NotebookOptions {
    /// Folder that receives notes created for unresolved links.
    pub default_folder: String,
    /// Create the default folders on unlock when the vault has none.
    pub seed_folders: bool,
    pub kdf: KdfParams,
}

impl Default for NotebookOptions {
    fn default() -> Self {
        Self {
            default_folder: DEFAULT_FOLDER_ID.to_string(),
            seed_folders: true,
            kdf: KdfParams::default(),
        }
    }
}

/// A saved note together with what happened to its outgoing links.
#[derive(Debug)]
pub struct SavedNote {
    pub note: Note,
    pub links: LinkUpdate,
}

/// A note reached over an edge, decrypted just far enough to show a title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedNote {
    pub id: String,
    pub title: String,
    pub predicate: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub predicate: String,
}

/// The neighbourhood of one note: itself, everything linking to it and
/// everything it links to, plus the `linksTo` edges among them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphView {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

pub struct Notebook {
    keys: KeyManager,
    notes: NoteService,
    triples: Arc<TripleStore>,
    resolver: LinkResolver,
    clicks: LinkClickRegistry,
    options: NotebookOptions,
}

impl Notebook {
    /// Open over `kv` with a fresh, locked session.
    pub async fn open(kv: Arc<dyn KvBackend>, options: NotebookOptions) -> Result<Self, GraphError> {
        let keys = KeyManager::new(kv.clone(), options.kdf);
        Self::with_keys(kv, keys, options).await
    }

    /// Open over `kv`, sharing an existing session.
    pub async fn with_keys(
        kv: Arc<dyn KvBackend>,
        keys: KeyManager,
        options: NotebookOptions,
    ) -> Result<Self, GraphError> {
        let notes = NoteService::new(kv.clone());
        let triples = Arc::new(TripleStore::load(kv).await?);
        let resolver = LinkResolver::new(notes.clone(), triples.clone(), options.default_folder.clone());
        Ok(Self {
            keys,
            notes,
            triples,
            resolver,
            clicks: LinkClickRegistry::new(),
            options,
        })
    }

    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    pub fn notes(&self) -> &NoteService {
        &self.notes
    }

    pub fn triples(&self) -> &TripleStore {
        &self.triples
    }

    pub fn resolver(&self) -> &LinkResolver {
        &self.resolver
    }

    pub fn clicks(&self) -> &LinkClickRegistry {
        &self.clicks
    }

    pub fn options(&self) -> &NotebookOptions {
        &self.options
    }

    pub fn state(&self) -> LockState {
        self.keys.state()
    }

    // ── Session ──────────────────────────────────────────────────────────────

    /// Derive the session key and, if configured, seed the default folders.
    pub async fn unlock(&self, password: &str) -> Result<SessionKey, GraphError> {
        let session = self.keys.derive_key(password).await?;
        if self.options.seed_folders {
            self.notes.seed_default_folders(&session).await?;
        }
        Ok(session)
    }

    pub fn lock(&self) {
        self.keys.clear_key();
    }

    fn session(&self) -> Result<SessionKey, GraphError> {
        Ok(self.keys.require_key()?)
    }

    // ── Notes ────────────────────────────────────────────────────────────────

    /// Seal and persist `note` (stamping `updated_at`), point its `inFolder`
    /// edge at its folder, then reconcile its `linksTo` edges with the body.
    ///
    /// A note whose folder does not exist is rejected before anything is
    /// written.
    pub async fn save_note(&self, note: &Note) -> Result<SavedNote, GraphError> {
        let session = self.session()?;
        if !self.notes.folder_exists(&note.folder_id).await? {
            return Err(GraphError::UnknownFolder(note.folder_id.clone()));
        }
        let stamped = Note {
            updated_at: Utc::now(),
            ..note.clone()
        };
        let saved = self.notes.save_note(&session, &stamped).await?;

        self.resolver.set_folder_edge(&saved.id, &saved.folder_id).await?;
        let links = self
            .resolver
            .update_note_links(&session, &saved.id, &saved.content)
            .await?;

        Ok(SavedNote { note: saved, links })
    }

    pub async fn load_note(&self, id: &str) -> Result<Option<Note>, GraphError> {
        let session = self.session()?;
        Ok(self.notes.load_note(&session, id).await?)
    }

    pub async fn list_notes(&self, folder_id: Option<&str>) -> Result<Vec<Note>, GraphError> {
        let session = self.session()?;
        Ok(self.notes.list_notes(&session, folder_id).await?)
    }

    /// Case-insensitive title lookup.
    pub async fn find_note(&self, title: &str) -> Result<Option<Note>, GraphError> {
        let session = self.session()?;
        Ok(self.notes.find_note_by_title(&session, title).await?)
    }

    /// Delete the record, then every triple mentioning it. Returns whether
    /// the record existed; dangling triples are pruned either way.
    pub async fn delete_note(&self, id: &str) -> Result<bool, GraphError> {
        self.session()?;
        let existed = self.notes.delete_note(id).await?;
        let pruned = self.triples.remove_references(&note_node(id)).await?;
        debug!(note_id = id, existed, pruned, "note deleted");
        Ok(existed)
    }

    // ── Folders ──────────────────────────────────────────────────────────────

    pub async fn save_folder(&self, folder: &Folder) -> Result<(), GraphError> {
        let session = self.session()?;
        Ok(self.notes.save_folder(&session, folder).await?)
    }

    pub async fn list_folders(&self) -> Result<Vec<Folder>, GraphError> {
        let session = self.session()?;
        Ok(self.notes.list_folders(&session).await?)
    }

    /// Delete the folder record and every triple mentioning it. Notes that
    /// were in it keep their records; only their `inFolder` edge goes.
    pub async fn delete_folder(&self, id: &str) -> Result<bool, GraphError> {
        self.session()?;
        let existed = self.notes.delete_folder(id).await?;
        let pruned = self.triples.remove_references(&folder_node(id)).await?;
        debug!(folder_id = id, existed, pruned, "folder deleted");
        Ok(existed)
    }

    pub async fn seed_default_folders(&self) -> Result<usize, GraphError> {
        let session = self.session()?;
        Ok(self.notes.seed_default_folders(&session).await?)
    }

    // ── Link views ───────────────────────────────────────────────────────────

    /// Notes whose edges point at `note_id`, in index order.
    pub async fn backlinks(&self, note_id: &str) -> Result<Vec<LinkedNote>, GraphError> {
        let session = self.session()?;
        let edges = self
            .triples
            .backlinks(note_id)
            .into_iter()
            .map(|b| (b.id, b.predicate))
            .collect();
        self.dereference(&session, edges).await
    }

    /// Notes `note_id` links to, in index order.
    pub async fn forward_links(&self, note_id: &str) -> Result<Vec<LinkedNote>, GraphError> {
        let session = self.session()?;
        let edges = self
            .triples
            .objects(&note_node(note_id), predicate::LINKS_TO)
            .iter()
            .map(|node| (strip_node_prefix(node).to_string(), predicate::LINKS_TO.to_string()))
            .collect();
        self.dereference(&session, edges).await
    }

    /// Backlinks then forward links, each id once.
    pub async fn related_notes(&self, note_id: &str) -> Result<Vec<LinkedNote>, GraphError> {
        let mut seen: HashSet<String> = HashSet::from([note_id.to_string()]);
        let mut related = Vec::new();
        let backlinks = self.backlinks(note_id).await?;
        for linked in backlinks.into_iter().chain(self.forward_links(note_id).await?) {
            if seen.insert(linked.id.clone()) {
                related.push(linked);
            }
        }
        Ok(related)
    }

    pub async fn graph_view(&self, note_id: &str) -> Result<GraphView, GraphError> {
        let session = self.session()?;
        let Some(center) = self.notes.load_note(&session, note_id).await? else {
            return Ok(GraphView::default());
        };

        let mut nodes = vec![GraphNode {
            id: center.id,
            title: center.title,
        }];
        for linked in self.related_notes(note_id).await? {
            nodes.push(GraphNode {
                id: linked.id,
                title: linked.title,
            });
        }

        let members: HashSet<String> = nodes.iter().map(|n| note_node(&n.id)).collect();
        let edges = self
            .triples
            .triples()
            .into_iter()
            .filter(|t| {
                t.predicate == predicate::LINKS_TO
                    && members.contains(&t.subject)
                    && members.contains(&t.object)
            })
            .map(|t| GraphEdge {
                source: strip_node_prefix(&t.subject).to_string(),
                target: strip_node_prefix(&t.object).to_string(),
                predicate: t.predicate,
            })
            .collect();

        Ok(GraphView { nodes, edges })
    }

    /// Pattern query over the index. Needs no key: the index holds no
    /// note content.
    pub fn query(&self, source: &str) -> Result<Vec<Binding>, GraphError> {
        self.triples.query(source)
    }

    // ── Link activation ──────────────────────────────────────────────────────

    pub fn on_link_click<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.clicks.register(handler)
    }

    pub fn remove_link_click(&self, id: HandlerId) -> bool {
        self.clicks.unregister(id)
    }

    pub fn activate_link(&self, link_text: &str) -> bool {
        self.clicks.activate(link_text)
    }

    /// Load each target; ids with no record are skipped with a warning.
    async fn dereference(
        &self,
        session: &SessionKey,
        edges: Vec<(String, String)>,
    ) -> Result<Vec<LinkedNote>, GraphError> {
        let mut linked = Vec::with_capacity(edges.len());
        for (id, predicate) in edges {
            match self.notes.load_note(session, &id).await? {
                Some(note) => linked.push(LinkedNote {
                    id,
                    title: note.title,
                    predicate,
                }),
                None => warn!(note_id = %id, "skipping dangling reference"),
            }
        }
        Ok(linked)
    }
}
