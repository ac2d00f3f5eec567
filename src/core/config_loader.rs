//! # Config Loader
//!
//! Reads the optional `~/.config/tempsystem/config.toml`. A missing file means "no
//! preferences"; a file that exists but cannot be read or parsed is an error, so a typo
//! never silently falls back to defaults.

use crate::{core::paths, models::UserConfig};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Path error: {0}")]
    Path(#[from] paths::PathError),
    #[error("Could not read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Loads the user's configuration from its default location.
pub fn load_user_config() -> Result<UserConfig, ConfigError> {
    let path = paths::get_config_path()?;
    load_from(&path)
}

/// Loads a configuration file from `path`, returning defaults when it does not exist.
pub fn load_from(path: &Path) -> Result<UserConfig, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("No config file at '{}', using defaults.", path.display());
            return Ok(UserConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let config: UserConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("Loaded config from '{}': {:?}", path.display(), config);
    Ok(config)
}
