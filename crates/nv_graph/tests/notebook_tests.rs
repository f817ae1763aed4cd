use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use nv_crypto::KdfParams;
use nv_graph::{GraphError, Notebook, NotebookOptions};
use nv_store::kv::NOTES_COLLECTION;
use nv_store::{Folder, KeyManager, KvBackend, LockState, MemoryKv, Note, NoteService, StoreError};

fn fast() -> KdfParams {
    KdfParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    }
}

fn options() -> NotebookOptions {
    NotebookOptions {
        kdf: fast(),
        ..NotebookOptions::default()
    }
}

async fn unlocked(kv: Arc<dyn KvBackend>) -> Notebook {
    let notebook = Notebook::open(kv, options()).await.unwrap();
    notebook.unlock("correct-horse").await.unwrap();
    notebook
}

async fn memory_notebook() -> Notebook {
    unlocked(Arc::new(MemoryKv::new())).await
}

fn binding_values(rows: &[nv_graph::Binding], var: &str) -> Vec<String> {
    rows.iter()
        .map(|b| b.get(var).expect("bound").to_string())
        .collect()
}

#[tokio::test]
async fn plan_links_to_new_budget_note() {
    let notebook = memory_notebook().await;

    let plan = Note::new("inbox", "Plan", "See [[Budget]]");
    let saved = notebook.save_note(&plan).await.unwrap();
    assert_eq!(saved.links.created.len(), 1);
    assert_eq!(saved.links.added, saved.links.created);

    let budget = notebook.find_note("budget").await.unwrap().expect("stub created");
    assert_eq!(budget.title, "Budget");
    assert_eq!(budget.content, "");
    assert_eq!(budget.folder_id, "inbox");

    let backlinks = notebook.backlinks(&budget.id).await.unwrap();
    assert_eq!(backlinks.len(), 1);
    assert_eq!(backlinks[0].id, plan.id);
    assert_eq!(backlinks[0].title, "Plan");
    assert_eq!(backlinks[0].predicate, "linksTo");

    let rows = notebook
        .query(&format!("?s linksTo note:{}", budget.id))
        .unwrap();
    assert_eq!(binding_values(&rows, "s"), vec![format!("note:{}", plan.id)]);
}

#[tokio::test]
async fn created_notes_are_filed_in_the_default_folder() {
    let notebook = memory_notebook().await;
    let plan = Note::new("projects", "Plan", "See [[Budget]]");
    notebook.save_note(&plan).await.unwrap();
    let budget = notebook.find_note("Budget").await.unwrap().unwrap();

    let rows = notebook.query("?n inFolder folder:inbox").unwrap();
    assert_eq!(binding_values(&rows, "n"), vec![format!("note:{}", budget.id)]);
    let rows = notebook.query("?n inFolder folder:projects").unwrap();
    assert_eq!(binding_values(&rows, "n"), vec![format!("note:{}", plan.id)]);
}

#[tokio::test]
async fn resolve_link_finds_or_creates() {
    let notebook = memory_notebook().await;
    let session = notebook.keys().require_key().unwrap();
    let budget = Note::new("projects", "Budget", "numbers");
    notebook.save_note(&budget).await.unwrap();

    let resolver = notebook.resolver();
    assert_eq!(resolver.resolve_link(&session, "bUdGeT").await.unwrap(), budget.id);

    let costs_id = resolver.resolve_link(&session, "Costs").await.unwrap();
    let costs = notebook.load_note(&costs_id).await.unwrap().unwrap();
    assert_eq!(costs.title, "Costs");
    assert_eq!(costs.content, "");
    assert!(notebook
        .triples()
        .contains(&format!("note:{costs_id}"), "inFolder", "folder:inbox"));
    assert_eq!(resolver.resolve_link(&session, "costs").await.unwrap(), costs_id);
}

#[tokio::test]
async fn undecryptable_note_fails_link_upkeep_and_keeps_edges() {
    let kv: Arc<dyn KvBackend> = Arc::new(MemoryKv::new());
    let notebook = unlocked(kv.clone()).await;
    let plan = Note::new("inbox", "Plan", "[[Budget]] [[Costs]]");
    let first = notebook.save_note(&plan).await.unwrap();
    assert_eq!(first.links.added.len(), 2);

    // A record sealed under some other key.
    let foreign_keys = KeyManager::new(kv.clone(), fast());
    let foreign = foreign_keys.derive_key("battery-staple").await.unwrap();
    NoteService::new(kv)
        .save_note(&foreign, &Note::new("inbox", "Foreign", ""))
        .await
        .unwrap();

    let err = notebook.save_note(&plan).await.unwrap_err();
    assert!(err.is_decryption_failure(), "{err}");

    let subject = format!("note:{}", plan.id);
    for target in &first.links.added {
        assert!(notebook
            .triples()
            .contains(&subject, "linksTo", &format!("note:{target}")));
    }
}

#[tokio::test]
async fn unknown_folder_is_rejected_before_saving() {
    let notebook = memory_notebook().await;
    let note = Note::new("nope", "Lost", "[[Budget]]");

    match notebook.save_note(&note).await {
        Err(GraphError::UnknownFolder(folder)) => assert_eq!(folder, "nope"),
        other => panic!("expected unknown folder, got {other:?}"),
    }
    assert!(notebook.load_note(&note.id).await.unwrap().is_none());
    assert!(notebook.find_note("Budget").await.unwrap().is_none());
    assert!(notebook.query("?n inFolder folder:nope").unwrap().is_empty());
}

#[tokio::test]
async fn links_are_not_stubbed_without_the_default_folder() {
    let notebook = memory_notebook().await;
    let existing = Note::new("projects", "Exists", "");
    notebook.save_note(&existing).await.unwrap();
    assert!(notebook.delete_folder("inbox").await.unwrap());

    let note = Note::new("projects", "Source", "[[Ghost]] [[Exists]]");
    let saved = notebook.save_note(&note).await.unwrap();

    assert_eq!(saved.links.added, vec![existing.id.clone()]);
    assert!(matches!(
        saved.links.failed.as_slice(),
        [GraphError::LinkResolution { link, .. }] if link == "Ghost"
    ));
    assert!(notebook.find_note("Ghost").await.unwrap().is_none());
    assert!(notebook.query("?n inFolder folder:inbox").unwrap().is_empty());
}

#[tokio::test]
async fn existing_title_is_reused_case_insensitively() {
    let notebook = memory_notebook().await;
    let budget = Note::new("projects", "Budget", "numbers");
    notebook.save_note(&budget).await.unwrap();

    let plan = Note::new("inbox", "Plan", "[[BUDGET]] and [[budget]]");
    let saved = notebook.save_note(&plan).await.unwrap();

    assert!(saved.links.created.is_empty());
    assert_eq!(saved.links.added, vec![budget.id.clone()]);
    assert_eq!(notebook.list_notes(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn changing_a_link_swaps_only_that_edge() {
    let notebook = memory_notebook().await;

    let other = Note::new("inbox", "Other", "[[X]]");
    notebook.save_note(&other).await.unwrap();
    let mut note = Note::new("inbox", "Source", "[[X]] and [[Keep]]");
    notebook.save_note(&note).await.unwrap();

    let x = notebook.find_note("X").await.unwrap().unwrap();
    let keep = notebook.find_note("Keep").await.unwrap().unwrap();

    note.content = "[[Y]] and [[Keep]]".into();
    let saved = notebook.save_note(&note).await.unwrap();
    let y = notebook.find_note("Y").await.unwrap().unwrap();

    assert_eq!(saved.links.removed, vec![x.id.clone()]);
    assert_eq!(saved.links.added, vec![y.id.clone()]);
    assert_eq!(saved.links.kept, vec![keep.id.clone()]);

    let triples = notebook.triples();
    let source = format!("note:{}", note.id);
    assert!(!triples.contains(&source, "linksTo", &format!("note:{}", x.id)));
    assert!(triples.contains(&source, "linksTo", &format!("note:{}", y.id)));
    assert!(triples.contains(&source, "linksTo", &format!("note:{}", keep.id)));
    assert!(triples.contains(&format!("note:{}", other.id), "linksTo", &format!("note:{}", x.id)));
}

#[tokio::test]
async fn removing_every_link_clears_outgoing_edges() {
    let notebook = memory_notebook().await;
    let mut note = Note::new("inbox", "Source", "[[A]] [[B]]");
    notebook.save_note(&note).await.unwrap();

    note.content = "no links any more".into();
    let saved = notebook.save_note(&note).await.unwrap();

    assert_eq!(saved.links.removed.len(), 2);
    assert!(notebook.forward_links(&note.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_note_prunes_every_reference() {
    let notebook = memory_notebook().await;
    let plan = Note::new("inbox", "Plan", "[[Budget]]");
    notebook.save_note(&plan).await.unwrap();
    let budget = notebook.find_note("Budget").await.unwrap().unwrap();
    let mut budget_body = budget.clone();
    budget_body.content = "back to [[Plan]]".into();
    notebook.save_note(&budget_body).await.unwrap();

    assert!(notebook.delete_note(&budget.id).await.unwrap());

    let node = format!("note:{}", budget.id);
    assert!(notebook.triples().triples().iter().all(|t| !t.mentions(&node)));
    assert!(notebook.forward_links(&plan.id).await.unwrap().is_empty());
    assert!(notebook.load_note(&budget.id).await.unwrap().is_none());
    assert!(!notebook.delete_note(&budget.id).await.unwrap());
}

#[tokio::test]
async fn folder_edge_follows_the_note() {
    let notebook = memory_notebook().await;
    let mut note = Note::new("inbox", "Moving", "");
    notebook.save_note(&note).await.unwrap();

    note.folder_id = "projects".into();
    notebook.save_note(&note).await.unwrap();

    let rows = notebook
        .query(&format!("note:{} inFolder ?f", note.id))
        .unwrap();
    assert_eq!(binding_values(&rows, "f"), vec!["folder:projects"]);

    assert!(notebook.delete_folder("projects").await.unwrap());
    assert!(notebook.query("?n inFolder folder:projects").unwrap().is_empty());
    assert!(notebook.load_note(&note.id).await.unwrap().is_some());
}

#[tokio::test]
async fn unlock_seeds_default_folders_once() {
    let kv: Arc<dyn KvBackend> = Arc::new(MemoryKv::new());
    let notebook = unlocked(kv.clone()).await;
    let ids: Vec<String> = notebook
        .list_folders()
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.id)
        .collect();
    assert_eq!(ids, vec!["inbox", "projects", "todo", "private"]);

    notebook.save_folder(&Folder::new("archive", "Archive")).await.unwrap();
    notebook.lock();
    notebook.unlock("correct-horse").await.unwrap();
    assert_eq!(notebook.list_folders().await.unwrap().len(), 5);
    assert_eq!(notebook.seed_default_folders().await.unwrap(), 0);
}

#[tokio::test]
async fn locked_notebook_refuses_key_operations() {
    let notebook = memory_notebook().await;
    let note = Note::new("inbox", "Plan", "[[Budget]]");
    notebook.save_note(&note).await.unwrap();

    notebook.lock();
    assert_eq!(notebook.state(), LockState::Locked);

    let err = notebook.save_note(&note).await.unwrap_err();
    assert!(err.is_missing_key());
    assert!(notebook.load_note(&note.id).await.unwrap_err().is_missing_key());
    assert!(notebook.backlinks(&note.id).await.unwrap_err().is_missing_key());
    assert!(notebook.delete_note(&note.id).await.unwrap_err().is_missing_key());

    // The index holds no content and stays queryable.
    assert_eq!(notebook.query("?s linksTo ?o").unwrap().len(), 1);
}

#[tokio::test]
async fn wrong_password_surfaces_decryption_failure() {
    let kv: Arc<dyn KvBackend> = Arc::new(MemoryKv::new());
    let notebook = unlocked(kv.clone()).await;
    let note = Note::new("inbox", "Plan", "");
    notebook.save_note(&note).await.unwrap();

    let other = Notebook::open(kv, NotebookOptions { seed_folders: false, ..options() })
        .await
        .unwrap();
    other.unlock("battery-staple").await.unwrap();
    let err = other.load_note(&note.id).await.unwrap_err();
    assert!(err.is_decryption_failure());
    assert!(other.list_notes(None).await.unwrap_err().is_decryption_failure());
}

#[tokio::test]
async fn query_syntax_errors_are_reported_with_position() {
    let notebook = memory_notebook().await;
    match notebook.query("?s linksTo") {
        Err(GraphError::QuerySyntax { .. }) => {}
        other => panic!("expected syntax error, got {other:?}"),
    }
    assert!(matches!(
        notebook.query("SELECT ?missing WHERE { ?s linksTo ?o }"),
        Err(GraphError::QuerySyntax { .. })
    ));
}

#[tokio::test]
async fn related_notes_and_graph_view() {
    let notebook = memory_notebook().await;
    let hub = Note::new("inbox", "Hub", "[[Spoke]]");
    notebook.save_note(&hub).await.unwrap();
    let spoke = notebook.find_note("Spoke").await.unwrap().unwrap();
    let mut spoke_body = spoke.clone();
    spoke_body.content = "[[Hub]] [[Leaf]]".into();
    notebook.save_note(&spoke_body).await.unwrap();
    let leaf = notebook.find_note("Leaf").await.unwrap().unwrap();

    let related: Vec<String> = notebook
        .related_notes(&spoke.id)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(related, vec![hub.id.clone(), leaf.id.clone()]);

    let view = notebook.graph_view(&spoke.id).await.unwrap();
    assert_eq!(view.nodes.len(), 3);
    assert_eq!(view.nodes[0].title, "Spoke");
    assert_eq!(view.edges.len(), 3);

    assert!(notebook.graph_view("missing").await.unwrap().nodes.is_empty());
}

#[tokio::test]
async fn link_clicks_reach_the_registered_handler() {
    let notebook = memory_notebook().await;
    assert!(!notebook.activate_link("Budget"));

    let clicks = Arc::new(AtomicUsize::new(0));
    let counter = clicks.clone();
    let id = notebook.on_link_click(move |text| {
        assert_eq!(text, "Budget");
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert!(notebook.activate_link("Budget"));
    assert!(notebook.remove_link_click(id));
    assert!(!notebook.activate_link("Budget"));
    assert_eq!(clicks.load(Ordering::SeqCst), 1);
}

/// Lets a fixed number of note writes through, then fails the rest.
struct FlakyKv {
    inner: MemoryKv,
    note_puts_left: AtomicUsize,
}

#[async_trait]
impl KvBackend for FlakyKv {
    async fn put(&self, collection: &str, id: &str, value: &str) -> Result<(), StoreError> {
        if collection == NOTES_COLLECTION
            && self
                .note_puts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err()
        {
            return Err(StoreError::Persistence("disk full".into()));
        }
        self.inner.put(collection, id, value).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, String)>, StoreError> {
        self.inner.list(collection).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.inner.delete(collection, id).await
    }
}

#[tokio::test]
async fn unresolvable_link_is_skipped_not_fatal() {
    let flaky = Arc::new(FlakyKv {
        inner: MemoryKv::new(),
        note_puts_left: AtomicUsize::new(usize::MAX),
    });
    let notebook = unlocked(flaky.clone()).await;
    let existing = Note::new("inbox", "Exists", "");
    notebook.save_note(&existing).await.unwrap();

    // The note itself may be written; creating the stub for [[Missing]] may not.
    flaky.note_puts_left.store(1, Ordering::SeqCst);
    let source = Note::new("inbox", "Source", "[[Missing]] then [[Exists]]");
    let saved = notebook.save_note(&source).await.unwrap();

    assert_eq!(saved.links.added, vec![existing.id.clone()]);
    assert_eq!(saved.links.failed.len(), 1);
    match &saved.links.failed[0] {
        GraphError::LinkResolution { link, .. } => assert_eq!(link, "Missing"),
        other => panic!("unexpected failure {other:?}"),
    }
    assert!(notebook.find_note("Missing").await.unwrap().is_none());
}

#[tokio::test]
async fn index_survives_reopen_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.db");

    let plan_id = {
        let kv = Arc::new(nv_store::SqliteKv::open(&path).await.unwrap());
        let notebook = unlocked(kv.clone()).await;
        let plan = Note::new("inbox", "Plan", "[[Budget]]");
        notebook.save_note(&plan).await.unwrap();
        kv.close().await;
        plan.id
    };

    let kv = Arc::new(nv_store::SqliteKv::open(&path).await.unwrap());
    let notebook = unlocked(kv).await;
    let budget = notebook.find_note("Budget").await.unwrap().unwrap();
    let backlinks = notebook.backlinks(&budget.id).await.unwrap();
    assert_eq!(backlinks.len(), 1);
    assert_eq!(backlinks[0].id, plan_id);
}
