//! Prompt Session Library
//!
//! Load a local GGUF model (from disk or the HuggingFace Hub), bind it to a
//! prompt template and sampling defaults, and turn user text into model
//! output one independent call at a time.

pub mod inference;
pub mod presets;
pub mod storage;
pub mod types;

pub use inference::{
    GenerationBackend, PromptSession, PromptTemplate, SamplingOverrides, SamplingParams,
    SessionError,
};
pub use types::config::SessionConfig;
pub use types::model::ModelSource;
