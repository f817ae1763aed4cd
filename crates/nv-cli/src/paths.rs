use directories::ProjectDirs;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const APP_QUALIFIER: &str = "org";
pub const APP_ORG: &str = "notevault";
pub const APP_NAME: &str = "notevault";

pub const DATA_DIR_ENV: &str = "NOTEVAULT_DATA_DIR";

pub fn default_data_dir() -> anyhow::Result<PathBuf> {
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("cannot determine data directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}

/// `--data-dir`, else `NOTEVAULT_DATA_DIR`, else the platform data dir.
pub fn data_dir(flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    resolve_data_dir(flag, std::env::var_os(DATA_DIR_ENV))
}

fn resolve_data_dir(flag: Option<PathBuf>, env: Option<OsString>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    match env {
        Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => default_data_dir(),
    }
}

pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join("vault.db")
}

pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.json")
}
