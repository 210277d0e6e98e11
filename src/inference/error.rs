//! Inference error types
//!
//! Every failure a prompt session can report falls into one of four kinds:
//! loading the model, parsing the template, validating a parameter, or
//! running generation.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error returned by [`crate::inference::PromptSession`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Model load failed: {0}")]
    ModelLoad(#[from] ModelLoadError),
    #[error("Invalid template: {0}")]
    InvalidTemplate(#[from] TemplateError),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(#[from] ParameterError),
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),
}

/// The model artifact could not be located, fetched or loaded.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("Model file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Download failed: {0}")]
    Download(String),
    #[error("Incompatible model file {}: {reason}", path.display())]
    Incompatible { path: PathBuf, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// The prompt template does not have exactly one well-formed placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Invalid placeholder name: {0:?}")]
    InvalidName(String),
    #[error("Placeholder {{{0}}} is missing")]
    MissingPlaceholder(String),
    #[error("Placeholder {{{name}}} appears {count} times, expected once")]
    DuplicatePlaceholder { name: String, count: usize },
    #[error("Unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),
    #[error("Unbalanced brace at byte {0}")]
    UnbalancedBrace(usize),
}

/// A sampling or load parameter is outside its valid range.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{name} = {value} is out of range ({expected})")]
pub struct ParameterError {
    pub name: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl ParameterError {
    pub fn new(name: &'static str, value: impl ToString, expected: &'static str) -> Self {
        Self {
            name,
            value: value.to_string(),
            expected,
        }
    }
}

/// The backend failed while producing a completion.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Tokenization failed: {0}")]
    Tokenize(String),
    #[error("Context creation failed: {0}")]
    Context(String),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Prompt is {tokens} tokens but the context window holds {n_ctx}")]
    PromptTooLong { tokens: usize, n_ctx: u32 },
    #[error("Backend returned no choices")]
    EmptyResult,
    #[error("Backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SessionError::from(ParameterError::new("top_p", 1.5, "0.0..=1.0"));
        assert_eq!(
            err.to_string(),
            "Invalid parameter: top_p = 1.5 is out of range (0.0..=1.0)"
        );

        let err = TemplateError::DuplicatePlaceholder {
            name: "text".to_string(),
            count: 2,
        };
        assert_eq!(
            err.to_string(),
            "Placeholder {text} appears 2 times, expected once"
        );
    }

    #[test]
    fn test_session_error_kinds() {
        let err: SessionError = ModelLoadError::NotFound(PathBuf::from("missing.gguf")).into();
        assert!(matches!(err, SessionError::ModelLoad(ModelLoadError::NotFound(_))));

        let err: SessionError = GenerationError::EmptyResult.into();
        assert!(matches!(err, SessionError::Generation(_)));
    }
}
