//! LLM inference engine
//!
//! This module handles all interaction with llama-cpp for model loading and
//! inference, plus the prompt session built on top of it.

pub mod backend;
pub mod engine;
pub mod error;
pub mod model;
pub mod params;
pub mod session;
pub mod template;

// Re-export main types for convenience
pub use backend::{Choice, Completion, FinishReason, GenerationBackend, Usage};
pub use engine::LlamaHandle;
pub use error::{GenerationError, ModelLoadError, ParameterError, SessionError, TemplateError};
pub use model::{validate_gguf, GgufHeader, GGUF_MAGIC};
pub use params::{GenerationRequest, LoadParams, SamplingOverrides, SamplingParams};
pub use session::PromptSession;
pub use template::PromptTemplate;
