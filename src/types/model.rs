//! Model types
//!
//! Where a model comes from, and what a loaded model looks like.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_revision() -> String {
    "main".to_string()
}

/// Location of a model artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModelSource {
    /// A GGUF file already on disk
    Local { path: PathBuf },
    /// A file in a HuggingFace Hub repository, downloaded on first use
    Hub {
        repo_id: String,
        /// File inside the repo; empty means "the only .gguf file there"
        #[serde(default)]
        filename: String,
        #[serde(default = "default_revision")]
        revision: String,
    },
}

impl ModelSource {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local { path: path.into() }
    }

    pub fn hub(repo_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self::Hub {
            repo_id: repo_id.into(),
            filename: filename.into(),
            revision: default_revision(),
        }
    }

    /// Parse a command-line model argument.
    ///
    /// `hf:user/repo/file.gguf` and `https://huggingface.co/...` URLs name hub
    /// files; anything else is a local path.
    pub fn parse(value: &str) -> Result<Self, String> {
        let value = value.trim();
        if value.is_empty() {
            return Err("Empty model source".to_string());
        }

        let hub_ref = if let Some(rest) = value.strip_prefix("hf:") {
            Some(rest)
        } else if value.contains("huggingface.co/") {
            Some(value)
        } else {
            None
        };

        match hub_ref {
            Some(reference) => {
                let file = crate::storage::huggingface::HubFile::parse(reference)?;
                Ok(Self::Hub {
                    repo_id: file.repo_id,
                    filename: file.filename,
                    revision: file.revision,
                })
            }
            None => Ok(Self::local(value)),
        }
    }

    /// Short human-readable description for logs
    pub fn describe(&self) -> String {
        match self {
            Self::Local { path } => path.display().to_string(),
            Self::Hub {
                repo_id,
                filename,
                revision,
            } => format!("{}@{}/{}", repo_id, revision, filename),
        }
    }
}

/// Information about a loaded model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Path to the GGUF file
    pub path: PathBuf,
    /// Model size in bytes
    pub size_bytes: u64,
    pub n_threads: u32,
    pub n_batch: u32,
    /// Layers offloaded to the GPU (0 = CPU only)
    pub n_gpu_layers: u32,
    /// Context window in tokens
    pub n_ctx: u32,
}

impl ModelInfo {
    /// Display name of the model (file stem)
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}
