//! Prompt sessions
//!
//! A [`PromptSession`] binds one loaded model to one prompt template and a
//! set of sampling defaults. Every call to [`PromptSession::generate`] is
//! independent: no history is kept between calls.

use crate::inference::backend::{Completion, GenerationBackend};
use crate::inference::engine::LlamaHandle;
use crate::inference::error::{GenerationError, ModelLoadError, SessionError};
use crate::inference::params::{GenerationRequest, SamplingOverrides, SamplingParams};
use crate::inference::template::PromptTemplate;
use crate::storage::default_models_dir;
use crate::storage::huggingface::resolve_model;
use crate::storage::secrets::HubToken;
use crate::types::config::SessionConfig;
use crate::types::model::{ModelInfo, ModelSource};
use std::path::PathBuf;

/// A model plus the template and sampling defaults used to prompt it
#[derive(Debug)]
pub struct PromptSession<B: GenerationBackend = LlamaHandle> {
    backend: B,
    template: PromptTemplate,
    defaults: SamplingParams,
}

impl PromptSession<LlamaHandle> {
    /// Resolve the configured model, load it, and return a ready session.
    ///
    /// The template and parameters are validated before anything is
    /// downloaded or loaded.
    pub async fn load(config: &SessionConfig) -> Result<Self, SessionError> {
        let template = config.validate()?;

        let models_dir = config.models_dir.clone().unwrap_or_else(|| {
            default_models_dir().unwrap_or_else(|_| PathBuf::from("./models"))
        });
        let token = match config.source {
            ModelSource::Hub { .. } => HubToken::discover(),
            ModelSource::Local { .. } => None,
        };

        tracing::info!("Resolving model {}", config.source.describe());
        let path = resolve_model(&config.source, &models_dir, token.as_ref()).await?;

        let load = config.load.clone();
        let handle = tokio::task::spawn_blocking(move || LlamaHandle::load(&path, &load))
            .await
            .map_err(|e| ModelLoadError::Backend(format!("Model load task failed: {}", e)))??;

        Self::new(handle, template, config.sampling.clone())
    }

    /// Load parameters and location of the underlying model
    pub fn model_info(&self) -> &ModelInfo {
        self.backend.info()
    }
}

impl<B: GenerationBackend> PromptSession<B> {
    /// Wrap an already loaded backend.
    pub fn new(
        backend: B,
        template: PromptTemplate,
        defaults: SamplingParams,
    ) -> Result<Self, SessionError> {
        defaults.validate()?;
        Ok(Self {
            backend,
            template,
            defaults,
        })
    }

    /// The prompt that would be sent for `input`
    pub fn render(&self, input: &str) -> String {
        self.template.render(input)
    }

    /// Build the backend request for `input`, applying `overrides`.
    pub fn request(
        &self,
        input: &str,
        overrides: &SamplingOverrides,
    ) -> Result<GenerationRequest, SessionError> {
        let params = if overrides.is_empty() {
            self.defaults.clone()
        } else {
            self.defaults.with_overrides(overrides)?
        };
        Ok(GenerationRequest::new(self.render(input), &params))
    }

    /// Run one generation and return the backend's full result.
    pub fn complete(
        &self,
        input: &str,
        overrides: &SamplingOverrides,
    ) -> Result<Completion, SessionError> {
        let request = self.request(input, overrides)?;
        tracing::debug!(
            "Generating: {} prompt bytes, max_tokens={}, temperature={}",
            request.prompt.len(),
            request.max_tokens,
            request.temperature
        );
        Ok(self.backend.complete(&request)?)
    }

    /// Generate text for `input` with the session defaults.
    pub fn generate(&self, input: &str) -> Result<String, SessionError> {
        self.generate_with(input, &SamplingOverrides::default())
    }

    /// Generate text for `input` with per-call overrides.
    pub fn generate_with(
        &self,
        input: &str,
        overrides: &SamplingOverrides,
    ) -> Result<String, SessionError> {
        let completion = self.complete(input, overrides)?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or_else(|| GenerationError::EmptyResult.into())
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn defaults(&self) -> &SamplingParams {
        &self.defaults
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::backend::{FinishReason, Usage};
    use std::sync::Mutex;

    const WORDS: [&str; 8] = ["alpha", "beta", "gamma", "delta", "eps", "zeta", "eta", "theta"];

    /// Picks words with a tiny LCG; greedy requests always pick the same word.
    #[derive(Default)]
    struct ScriptedBackend {
        requests: Mutex<Vec<GenerationRequest>>,
        calls: Mutex<u32>,
    }

    impl GenerationBackend for ScriptedBackend {
        fn complete(&self, request: &GenerationRequest) -> Result<Completion, GenerationError> {
            self.requests.lock().unwrap().push(request.clone());
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;

            let mut state = match (request.is_greedy(), request.seed) {
                (true, _) => 0,
                (false, Some(seed)) => seed as u64,
                (false, None) => *calls as u64 * 7919,
            };
            let mut text = String::new();
            for _ in 0..request.max_tokens.min(5) {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let word = if request.is_greedy() {
                    WORDS[0]
                } else {
                    WORDS[(state >> 61) as usize]
                };
                text.push(' ');
                text.push_str(word);
            }

            Ok(Completion::from_generated(
                request,
                &text,
                FinishReason::Length,
                Usage {
                    prompt_tokens: request.prompt.split_whitespace().count() as u32,
                    completion_tokens: request.max_tokens.min(5),
                },
            ))
        }
    }

    struct FailingBackend;

    impl GenerationBackend for FailingBackend {
        fn complete(&self, _request: &GenerationRequest) -> Result<Completion, GenerationError> {
            Err(GenerationError::Decode("out of memory".to_string()))
        }
    }

    struct EmptyBackend;

    impl GenerationBackend for EmptyBackend {
        fn complete(&self, _request: &GenerationRequest) -> Result<Completion, GenerationError> {
            Ok(Completion {
                choices: Vec::new(),
                usage: Usage::default(),
            })
        }
    }

    fn chat_template() -> PromptTemplate {
        PromptTemplate::new("USER: {text}\nASSISTANT:", "text").unwrap()
    }

    fn session(defaults: SamplingParams) -> PromptSession<ScriptedBackend> {
        PromptSession::new(ScriptedBackend::default(), chat_template(), defaults).unwrap()
    }

    #[test]
    fn test_rendered_prompt_sent_verbatim() {
        let session = session(SamplingParams::default());
        session.generate("What is 2+2?").unwrap();

        let requests = session.backend().requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].prompt, "USER: What is 2+2?\nASSISTANT:");
        assert_eq!(requests[0].max_tokens, SamplingParams::default().max_tokens);
    }

    #[test]
    fn test_greedy_generation_is_deterministic() {
        let session = session(SamplingParams {
            temperature: 0.0,
            seed: Some(42),
            ..SamplingParams::default()
        });
        let first = session.generate("same input").unwrap();
        let second = session.generate("same input").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_echo_prefix() {
        let session = session(SamplingParams {
            echo: true,
            ..SamplingParams::default()
        });
        let output = session.generate("hi").unwrap();
        assert!(output.starts_with(&session.render("hi")));

        let output = session
            .generate_with(
                "hi",
                &SamplingOverrides {
                    echo: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!output.starts_with("USER:"));
    }

    #[test]
    fn test_calls_are_independent() {
        let session = session(SamplingParams::default());
        session.generate("first").unwrap();
        session.generate("second").unwrap();

        let requests = session.backend().requests.lock().unwrap();
        assert_eq!(requests[1].prompt, "USER: second\nASSISTANT:");
        assert!(!requests[1].prompt.contains("first"));
    }

    #[test]
    fn test_overrides_apply_per_call() {
        let session = session(SamplingParams::default());
        let overrides = SamplingOverrides {
            max_tokens: Some(3),
            temperature: Some(0.0),
            ..Default::default()
        };
        session.generate_with("x", &overrides).unwrap();
        session.generate("x").unwrap();

        let requests = session.backend().requests.lock().unwrap();
        assert_eq!(requests[0].max_tokens, 3);
        assert_eq!(requests[0].temperature, 0.0);
        assert_eq!(requests[1].max_tokens, 256);
        assert_eq!(session.defaults().temperature, 0.8);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let session = session(SamplingParams::default());
        let err = session
            .generate_with(
                "x",
                &SamplingOverrides {
                    temperature: Some(-1.0),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidParameter(_)));
        assert!(session.backend().requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_defaults_rejected() {
        let result = PromptSession::new(
            ScriptedBackend::default(),
            chat_template(),
            SamplingParams {
                top_p: 1.5,
                ..SamplingParams::default()
            },
        );
        assert!(matches!(result, Err(SessionError::InvalidParameter(_))));
    }

    #[test]
    fn test_backend_errors_propagate() {
        let session =
            PromptSession::new(FailingBackend, chat_template(), SamplingParams::default()).unwrap();
        assert!(matches!(
            session.generate("x"),
            Err(SessionError::Generation(GenerationError::Decode(_)))
        ));

        let session =
            PromptSession::new(EmptyBackend, chat_template(), SamplingParams::default()).unwrap();
        assert!(matches!(
            session.generate("x"),
            Err(SessionError::Generation(GenerationError::EmptyResult))
        ));
    }

    #[test]
    fn test_complete_reports_usage() {
        let session = session(SamplingParams::default());
        let completion = session.complete("a b c", &SamplingOverrides::default()).unwrap();
        assert_eq!(completion.usage.completion_tokens, 5);
        assert_eq!(completion.choices[0].finish_reason, FinishReason::Length);
    }

    #[tokio::test]
    async fn test_load_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::new(
            ModelSource::local(dir.path().join("missing.gguf")),
            "USER: {text}\nASSISTANT:",
        );
        let err = PromptSession::load(&config).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::ModelLoad(ModelLoadError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_incompatible_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("llama-2-13b-chat.ggmlv3.q5_1.bin");
        std::fs::write(&path, b"tjgg\x03\x00\x00\x00 legacy weights").unwrap();

        let config = SessionConfig::new(ModelSource::local(&path), "USER: {text}\nASSISTANT:");
        let err = PromptSession::load(&config).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::ModelLoad(ModelLoadError::Incompatible { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_validates_before_resolving() {
        let config = SessionConfig::new(
            ModelSource::hub("nobody/does-not-exist", "model.gguf"),
            "{text} {text}",
        );
        let err = PromptSession::load(&config).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidTemplate(_)));

        let mut config = SessionConfig::new(
            ModelSource::hub("nobody/does-not-exist", "model.gguf"),
            "{text}",
        );
        config.sampling.top_p = -0.5;
        let err = PromptSession::load(&config).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidParameter(_)));
    }
}
