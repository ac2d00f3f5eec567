// src/core/paths.rs

use crate::constants::{CONFIG_DIR_NAME, CONFIG_FILENAME, HISTORY_FILENAME};
use lazy_static::lazy_static;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

lazy_static! {
    static ref TEMPSYSTEM_CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    #[error("Could not find the home directory of the current user.")]
    HomeDirNotFound,
    #[error("Could not expand path '{path}': {reason}")]
    Expansion { path: String, reason: String },
}

/// Returns the path to the tempsystem configuration directory (`~/.config/tempsystem`).
///
/// Memoized: the first call computes and caches the path. Unlike most tools we never
/// create it; the config file is optional.
pub fn get_config_dir() -> Result<PathBuf, PathError> {
    // A poisoned lock still holds a usable cache.
    let mut cached_path_guard = TEMPSYSTEM_CONFIG_DIR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(path) = &*cached_path_guard {
        return Ok(path.clone());
    }

    let config_path = dirs::config_dir()
        .ok_or(PathError::ConfigDirNotFound)?
        .join(CONFIG_DIR_NAME);
    *cached_path_guard = Some(config_path.clone());
    Ok(config_path)
}

/// Returns the path to the optional `config.toml` file.
pub fn get_config_path() -> Result<PathBuf, PathError> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILENAME))
}

/// The invoking user's zsh history file (`~/.zsh_history`).
pub fn get_host_history_path() -> Result<PathBuf, PathError> {
    dirs::home_dir()
        .map(|home| home.join(HISTORY_FILENAME))
        .ok_or(PathError::HomeDirNotFound)
}

/// Expands `~` and environment variables in a user-supplied path.
pub fn expand_path(template: &str) -> Result<PathBuf, PathError> {
    let expanded = shellexpand::full(template).map_err(|e| PathError::Expansion {
        path: template.to_string(),
        reason: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// Resolves `path` against the current directory and strips Windows verbatim prefixes.
pub fn canonicalize(path: &std::path::Path) -> std::io::Result<PathBuf> {
    dunce::canonicalize(path)
}
