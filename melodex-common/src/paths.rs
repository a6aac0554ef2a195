//! Root-folder and config-file resolution.
//!
//! Priority order, following the same convention as the teacher's
//! `wkmp_common::config::resolve_root_folder`:
//! 1. explicit CLI argument (highest priority)
//! 2. environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use std::path::PathBuf;

/// Resolve a directory-valued setting using the standard priority order.
pub fn resolve_path(
    cli_arg: Option<&str>,
    env_var_name: &str,
    config_file_value: Option<&str>,
    default: impl FnOnce() -> PathBuf,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }
    if let Some(path) = config_file_value {
        return PathBuf::from(path);
    }
    default()
}

/// Default per-OS application data directory (`~/.local/share/melodex` on
/// Linux, `~/Library/Application Support/melodex` on macOS, etc).
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("melodex"))
        .unwrap_or_else(|| PathBuf::from("./melodex_data"))
}

/// Default path of the active-profile database, used when no profile has
/// been configured yet.
pub fn default_db_path() -> PathBuf {
    default_data_dir().join("library.db")
}

/// Default path of the profiles file (`melodex-profiles.toml`).
pub fn default_profiles_file() -> PathBuf {
    default_data_dir().join("melodex-profiles.toml")
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(Error::Io)?;
    }
    Ok(())
}
