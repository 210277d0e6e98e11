//! Persistent storage
//!
//! Model downloads, hub credentials and session configuration files.

pub mod huggingface;
pub mod secrets;
pub mod settings;

use directories::ProjectDirs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Could not determine a data directory for this platform")]
    NoDataDir,
}

/// Application data directory (`~/.local/share/prompt-session` on Linux)
pub fn get_data_dir() -> Result<PathBuf, StorageError> {
    ProjectDirs::from("", "", "prompt-session")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(StorageError::NoDataDir)
}

/// Default directory for downloaded models
pub fn default_models_dir() -> Result<PathBuf, StorageError> {
    Ok(get_data_dir()?.join("models"))
}
