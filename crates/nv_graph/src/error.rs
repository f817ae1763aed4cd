use thiserror::Error;

use nv_store::StoreError;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Query syntax error at byte {position}: {message}")]
    QuerySyntax { position: usize, message: String },

    #[error("Could not resolve link [[{link}]]: {reason}")]
    LinkResolution { link: String, reason: String },

    #[error("Folder {0} does not exist")]
    UnknownFolder(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GraphError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        GraphError::QuerySyntax {
            position,
            message: message.into(),
        }
    }

    pub fn is_decryption_failure(&self) -> bool {
        matches!(self, GraphError::Store(e) if e.is_decryption_failure())
    }

    pub fn is_missing_key(&self) -> bool {
        matches!(self, GraphError::Store(StoreError::MissingKey))
    }
}
