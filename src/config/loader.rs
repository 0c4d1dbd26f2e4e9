//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::source::{EnvSource, LayeredSource, TomlSource};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Load a TOML settings file.
pub fn load_file(path: &Path) -> Result<TomlSource, LoadError> {
    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    TomlSource::parse(&content).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// File settings (if a path is given) overlaid by the process environment.
pub fn load_layered(path: Option<&Path>) -> Result<LayeredSource, LoadError> {
    let mut layered = LayeredSource::new();
    if let Some(path) = path {
        layered = layered.with_layer(load_file(path)?);
        tracing::debug!(path = %path.display(), "Loaded settings file");
    }
    Ok(layered.with_layer(EnvSource::new()))
}
