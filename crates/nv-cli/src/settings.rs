use std::path::Path;

use anyhow::Context;
use nv_crypto::KdfParams;
use nv_graph::NotebookOptions;
use nv_store::notes::DEFAULT_FOLDER_ID;
use serde::{Deserialize, Serialize};

/// `config.json` in the data directory. Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Must not change once a vault exists: a different cost yields a
    /// different key for the same password.
    pub kdf: KdfParams,
    pub default_folder: String,
    pub seed_folders: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            default_folder: DEFAULT_FOLDER_ID.into(),
            seed_folders: true,
            log_filter: "warn".into(),
        }
    }
}

impl Settings {
    /// Defaults when the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("writing {}", path.display()))
    }

    pub fn notebook_options(&self) -> NotebookOptions {
        NotebookOptions {
            default_folder: self.default_folder.clone(),
            seed_folders: self.seed_folders,
            kdf: self.kdf,
        }
    }
}
