//! Generation backend seam
//!
//! A backend is anything that turns a [`GenerationRequest`] into a
//! [`Completion`]. The llama.cpp handle is the real one.

use crate::inference::error::GenerationError;
use crate::inference::params::GenerationRequest;
use serde::{Deserialize, Serialize};

/// A loaded model that can complete prompts.
///
/// Implementations block until generation finishes and must be callable from
/// several threads; the session never holds state between calls.
pub trait GenerationBackend: Send + Sync {
    fn complete(&self, request: &GenerationRequest) -> Result<Completion, GenerationError>;
}

impl<B: GenerationBackend + ?Sized> GenerationBackend for Box<B> {
    fn complete(&self, request: &GenerationRequest) -> Result<Completion, GenerationError> {
        (**self).complete(request)
    }
}

impl<B: GenerationBackend + ?Sized> GenerationBackend for std::sync::Arc<B> {
    fn complete(&self, request: &GenerationRequest) -> Result<Completion, GenerationError> {
        (**self).complete(request)
    }
}

/// Why generation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    /// End-of-generation token or a stop sequence
    Stop,
    /// `max_tokens` or the context window was exhausted
    Length,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub text: String,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Structured result of one backend call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl Completion {
    /// Build a single-choice completion from raw generated text.
    ///
    /// Applies the request's stop sequences and echo flag, so every backend
    /// treats them the same way.
    pub fn from_generated(
        request: &GenerationRequest,
        generated: &str,
        mut finish_reason: FinishReason,
        usage: Usage,
    ) -> Self {
        let mut body = generated;
        if let Some(cut) = find_stop(generated, &request.stop) {
            body = &generated[..cut];
            finish_reason = FinishReason::Stop;
        }

        let text = if request.echo {
            let mut text = String::with_capacity(request.prompt.len() + body.len());
            text.push_str(&request.prompt);
            text.push_str(body);
            text
        } else {
            body.to_string()
        };

        Self {
            choices: vec![Choice {
                text,
                finish_reason,
            }],
            usage,
        }
    }

    /// Text of the first choice.
    pub fn first_text(&self) -> Option<&str> {
        self.choices.first().map(|c| c.text.as_str())
    }
}

/// Byte offset of the earliest stop sequence in `text`, if any.
pub fn find_stop(text: &str, stops: &[String]) -> Option<usize> {
    stops
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
}
