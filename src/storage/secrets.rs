//! HuggingFace access token lookup
//!
//! Tokens come from the environment or the token file written by
//! `huggingface-cli login`. They are never stored in configuration.

use directories::BaseDirs;
use std::fs;
use std::path::{Path, PathBuf};

const TOKEN_ENV_VARS: [&str; 2] = ["HF_TOKEN", "HUGGING_FACE_HUB_TOKEN"];

/// A hub bearer token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct HubToken(String);

impl std::fmt::Debug for HubToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HubToken(****)")
    }
}

impl HubToken {
    /// Wrap a token string, ignoring blank values
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Look for a token in the usual places. Missing tokens are not an error;
    /// public repositories download without one.
    pub fn discover() -> Option<Self> {
        for var in TOKEN_ENV_VARS {
            if let Some(token) = std::env::var(var).ok().and_then(Self::new) {
                tracing::debug!("Using hub token from ${}", var);
                return Some(token);
            }
        }

        let path = token_file_path()?;
        Self::from_file(&path)
    }

    fn from_file(path: &Path) -> Option<Self> {
        let token = fs::read_to_string(path).ok().and_then(Self::new)?;
        tracing::debug!("Using hub token from {:?}", path);
        Some(token)
    }
}

/// `$HF_HOME/token`, falling back to `~/.cache/huggingface/token`
fn token_file_path() -> Option<PathBuf> {
    if let Ok(home) = std::env::var("HF_HOME") {
        if !home.trim().is_empty() {
            return Some(PathBuf::from(home).join("token"));
        }
    }
    BaseDirs::new().map(|dirs| dirs.home_dir().join(".cache").join("huggingface").join("token"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let token = HubToken::new("hf_supersecret").unwrap();
        let debug = format!("{:?}", token);
        assert!(!debug.contains("supersecret"));
        assert_eq!(token.expose(), "hf_supersecret");
    }

    #[test]
    fn test_blank_tokens_ignored() {
        assert!(HubToken::new("").is_none());
        assert!(HubToken::new("  \n").is_none());
        assert_eq!(HubToken::new(" hf_x\n").unwrap().expose(), "hf_x");
    }

    #[test]
    fn test_token_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        fs::write(&path, "hf_fromfile\n").unwrap();
        assert_eq!(HubToken::from_file(&path).unwrap().expose(), "hf_fromfile");
        assert!(HubToken::from_file(&dir.path().join("missing")).is_none());
    }
}
