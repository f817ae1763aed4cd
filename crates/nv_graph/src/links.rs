//! Wiki-link extraction and `linksTo` edge reconciliation.
//!
//! `[[Title]]` spans in a note body name other notes by title. Saving a body
//! resolves each title to a note id (creating an empty note when none
//! exists) and then applies the set difference between the edges the body
//! implies and the edges the index currently holds.

use std::sync::{Arc, OnceLock};

use nv_store::{NoteService, SessionKey, StoreError};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::GraphError;
use crate::triple::{folder_node, note_node, predicate, strip_node_prefix, TripleStore};

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[\[([^\]]+)\]\]").expect("static wiki-link regex"))
}

/// Inner text of every `[[...]]`, trimmed, de-duplicated by exact string,
/// in first-occurrence order. Blank links are ignored.
pub fn extract_links(body: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for caps in link_pattern().captures_iter(body) {
        let text = caps[1].trim();
        if !text.is_empty() && !links.iter().any(|l| l == text) {
            links.push(text.to_string());
        }
    }
    links
}

/// Outcome of one reconciliation. Ids are bare note ids.
#[derive(Debug, Default)]
pub struct LinkUpdate {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Existing edges left in place.
    pub kept: Vec<String>,
    /// Stub notes created while resolving.
    pub created: Vec<String>,
    /// Links skipped because they could not be resolved.
    pub failed: Vec<GraphError>,
}

/// Cheap to clone.
#[derive(Clone)]
pub struct LinkResolver {
    notes: NoteService,
    triples: Arc<TripleStore>,
    default_folder: String,
}

impl LinkResolver {
    pub fn new(notes: NoteService, triples: Arc<TripleStore>, default_folder: impl Into<String>) -> Self {
        Self {
            notes,
            triples,
            default_folder: default_folder.into(),
        }
    }

    /// Id of the note titled `link_text` (case-insensitive), creating an
    /// empty one in the default folder if there is none.
    pub async fn resolve_link(&self, session: &SessionKey, link_text: &str) -> Result<String, GraphError> {
        Ok(self.resolve(session, link_text).await?.0)
    }

    /// `(id, created)`.
    ///
    /// A record that fails to open, or a locked session, is returned as
    /// `GraphError::Store`. Everything else that stops the link from
    /// resolving is a `LinkResolution` error.
    async fn resolve(&self, session: &SessionKey, link_text: &str) -> Result<(String, bool), GraphError> {
        let failure = |err: StoreError| match err {
            StoreError::MissingKey => GraphError::Store(err),
            err if err.is_decryption_failure() => GraphError::Store(err),
            err => GraphError::LinkResolution {
                link: link_text.to_string(),
                reason: err.to_string(),
            },
        };
        if let Some(existing) = self
            .notes
            .find_note_by_title(session, link_text)
            .await
            .map_err(failure)?
        {
            return Ok((existing.id, false));
        }

        if !self
            .notes
            .folder_exists(&self.default_folder)
            .await
            .map_err(failure)?
        {
            return Err(GraphError::LinkResolution {
                link: link_text.to_string(),
                reason: format!("default folder {} does not exist", self.default_folder),
            });
        }
        let stub = self
            .notes
            .create_stub_note(session, link_text, &self.default_folder)
            .await
            .map_err(failure)?;
        self.triples
            .add_triple(
                &note_node(&stub.id),
                predicate::IN_FOLDER,
                &folder_node(&self.default_folder),
            )
            .await?;
        debug!(note_id = %stub.id, "created note for unresolved link");
        Ok((stub.id, true))
    }

    /// Point `note_id`'s single `inFolder` edge at `folder_id`, which must
    /// name an existing folder.
    pub async fn set_folder_edge(&self, note_id: &str, folder_id: &str) -> Result<(), GraphError> {
        if !self.notes.folder_exists(folder_id).await? {
            return Err(GraphError::UnknownFolder(folder_id.to_string()));
        }
        let subject = note_node(note_id);
        let wanted = folder_node(folder_id);
        for current in self.triples.objects(&subject, predicate::IN_FOLDER) {
            if current != wanted {
                self.triples
                    .remove_triple(&subject, predicate::IN_FOLDER, &current)
                    .await?;
            }
        }
        self.triples
            .add_triple(&subject, predicate::IN_FOLDER, &wanted)
            .await?;
        Ok(())
    }

    /// Bring `note_id`'s outgoing `linksTo` edges in line with `body`.
    ///
    /// A link that fails to resolve is logged, reported in `failed`, and
    /// skipped; the remaining links are still processed. While any link is
    /// unresolved no existing edge is removed, since the failed link may
    /// name one of them. Decryption failures, a locked session and index
    /// write failures are returned.
    pub async fn update_note_links(
        &self,
        session: &SessionKey,
        note_id: &str,
        body: &str,
    ) -> Result<LinkUpdate, GraphError> {
        let mut update = LinkUpdate::default();

        let mut desired: Vec<String> = Vec::new();
        for link in extract_links(body) {
            match self.resolve(session, &link).await {
                Ok((id, created)) => {
                    if created {
                        update.created.push(id.clone());
                    }
                    if !desired.contains(&id) {
                        desired.push(id);
                    }
                }
                Err(err @ GraphError::Store(_)) => return Err(err),
                Err(err) => {
                    warn!(note_id, error = %err, "skipping unresolved link");
                    update.failed.push(err);
                }
            }
        }

        let subject = note_node(note_id);
        let current: Vec<String> = self
            .triples
            .objects(&subject, predicate::LINKS_TO)
            .iter()
            .map(|node| strip_node_prefix(node).to_string())
            .collect();

        for target in &current {
            if desired.contains(target) || !update.failed.is_empty() {
                update.kept.push(target.clone());
            } else {
                self.triples
                    .remove_triple(&subject, predicate::LINKS_TO, &note_node(target))
                    .await?;
                update.removed.push(target.clone());
            }
        }
        for target in desired {
            if !current.contains(&target) {
                self.triples
                    .add_triple(&subject, predicate::LINKS_TO, &note_node(&target))
                    .await?;
                update.added.push(target);
            }
        }

        debug!(
            note_id,
            added = update.added.len(),
            removed = update.removed.len(),
            kept = update.kept.len(),
            "links reconciled"
        );
        Ok(update)
    }
}
