//! Settings storage
//!
//! Reads and writes [`SessionConfig`] as pretty-printed JSON.

use crate::storage::{get_data_dir, StorageError};
use crate::types::config::SessionConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the default config file path
pub fn default_config_path() -> Result<PathBuf, StorageError> {
    Ok(get_data_dir()?.join("session.json"))
}

/// Load a session configuration from disk
pub fn load_config(path: &Path) -> Result<SessionConfig, StorageError> {
    let json = fs::read_to_string(path)?;
    let config: SessionConfig = serde_json::from_str(&json)?;
    tracing::debug!("Loaded session config from {:?}", path);
    Ok(config)
}

/// Save a session configuration to disk
pub fn save_config(path: &Path, config: &SessionConfig) -> Result<(), StorageError> {
    // Ensure the parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)?;

    tracing::debug!("Saved session config to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::model::ModelSource;

    #[test]
    fn test_settings_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let mut config = SessionConfig::new(
            ModelSource::hub("TheBloke/Llama-2-7B-GGUF", "llama-2-7b.Q4_K_M.gguf"),
            "SYSTEM: be brief\nUSER: {text}\nASSISTANT:",
        );
        config.sampling.temperature = 0.5;
        config.load.n_gpu_layers = 32;

        save_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(load_config(&missing), Err(StorageError::Io(_))));

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "{ not json").unwrap();
        assert!(matches!(load_config(&corrupt), Err(StorageError::Json(_))));
    }
}
