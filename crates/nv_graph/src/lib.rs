//! nv_graph — relationship index for NoteVault
//!
//! Notes reference each other through `[[Title]]` wiki-links and belong to
//! folders. Both relationships are kept as `(subject, predicate, object)`
//! triples in a small schema-free store that answers conjunctive pattern
//! queries such as `?s linksTo note:42`.
//!
//! The index is derived state: it can always be rebuilt from the notes and
//! folders themselves and never holds note content.
//!
//! # Module layout
//! - `triple`   — `Triple`, node identifiers, the persisted `TripleStore`
//! - `query`    — pattern-query parser and evaluator
//! - `links`    — wiki-link extraction, resolution and edge reconciliation
//! - `click`    — caller-owned link activation callback registry
//! - `notebook` — orchestration: save/delete with index upkeep, link views
//! - `error`    — unified error type

pub mod click;
pub mod error;
pub mod links;
pub mod notebook;
pub mod query;
pub mod triple;

pub use click::{HandlerId, LinkClickRegistry};
pub use error::GraphError;
pub use links::{extract_links, LinkResolver, LinkUpdate};
pub use notebook::{GraphEdge, GraphNode, GraphView, LinkedNote, Notebook, NotebookOptions, SavedNote};
pub use query::{Binding, Query};
pub use triple::{Backlink, Triple, TripleStore};
