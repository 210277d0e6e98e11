//! Sampling and load parameters
//!
//! Parameters are validated, never clamped: an out-of-range value is an error
//! reported to the caller.

use crate::inference::error::ParameterError;
use serde::{Deserialize, Serialize};

/// Sampling defaults applied to every generation of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Maximum number of tokens to generate (>= 1)
    pub max_tokens: u32,
    /// Temperature (>= 0.0, 0.0 = greedy)
    pub temperature: f32,
    /// Top-p (nucleus sampling) parameter (0.0 - 1.0)
    pub top_p: f32,
    /// Top-k sampling parameter (0 = disabled)
    pub top_k: u32,
    /// Penalty applied to recently generated tokens (> 0.0, 1.0 = off)
    pub repeat_penalty: f32,
    /// Prefix the output with the rendered prompt
    pub echo: bool,
    /// RNG seed; `None` draws a fresh seed per call. `u32::MAX` is reserved
    /// by llama.cpp for "random" and is rejected.
    pub seed: Option<u32>,
    /// Generation stops before the first occurrence of any of these strings
    pub stop: Vec<String>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.8,
            top_p: 0.95,
            top_k: 40,
            repeat_penalty: 1.1,
            echo: false,
            seed: None,
            stop: Vec::new(),
        }
    }
}

impl SamplingParams {
    pub fn validate(&self) -> Result<(), ParameterError> {
        if self.max_tokens == 0 {
            return Err(ParameterError::new("max_tokens", self.max_tokens, ">= 1"));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(ParameterError::new("temperature", self.temperature, ">= 0.0"));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ParameterError::new("top_p", self.top_p, "0.0..=1.0"));
        }
        if self.top_k > i32::MAX as u32 {
            return Err(ParameterError::new("top_k", self.top_k, "0..=i32::MAX"));
        }
        if !self.repeat_penalty.is_finite() || self.repeat_penalty <= 0.0 {
            return Err(ParameterError::new(
                "repeat_penalty",
                self.repeat_penalty,
                "> 0.0",
            ));
        }
        if self.seed == Some(u32::MAX) {
            return Err(ParameterError::new("seed", u32::MAX, "0..u32::MAX"));
        }
        if self.stop.iter().any(|s| s.is_empty()) {
            return Err(ParameterError::new("stop", "\"\"", "non-empty strings"));
        }
        Ok(())
    }

    /// Apply per-call overrides and validate the result.
    pub fn with_overrides(&self, overrides: &SamplingOverrides) -> Result<Self, ParameterError> {
        let mut params = self.clone();
        if let Some(v) = overrides.max_tokens {
            params.max_tokens = v;
        }
        if let Some(v) = overrides.temperature {
            params.temperature = v;
        }
        if let Some(v) = overrides.top_p {
            params.top_p = v;
        }
        if let Some(v) = overrides.top_k {
            params.top_k = v;
        }
        if let Some(v) = overrides.repeat_penalty {
            params.repeat_penalty = v;
        }
        if let Some(v) = overrides.echo {
            params.echo = v;
        }
        if let Some(v) = overrides.seed {
            params.seed = Some(v);
        }
        if let Some(v) = &overrides.stop {
            params.stop = v.clone();
        }
        params.validate()?;
        Ok(params)
    }
}

/// Optional per-call replacements for [`SamplingParams`] fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingOverrides {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub repeat_penalty: Option<f32>,
    pub echo: Option<bool>,
    pub seed: Option<u32>,
    pub stop: Option<Vec<String>>,
}

impl SamplingOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Parameters fixed when the model is loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadParams {
    /// CPU threads used for generation and prompt processing
    pub n_threads: u32,
    /// Prompt tokens decoded per batch
    pub n_batch: u32,
    /// Number of layers to offload to the GPU (0 = CPU only)
    pub n_gpu_layers: u32,
    /// Context window in tokens (prompt plus completion)
    pub n_ctx: u32,
}

impl Default for LoadParams {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(2);
        Self {
            n_threads: (cores / 2).max(1),
            n_batch: 512,
            n_gpu_layers: 0,
            n_ctx: 2048,
        }
    }
}

impl LoadParams {
    pub fn validate(&self) -> Result<(), ParameterError> {
        if self.n_threads == 0 || self.n_threads > i32::MAX as u32 {
            return Err(ParameterError::new("n_threads", self.n_threads, ">= 1"));
        }
        if self.n_batch == 0 {
            return Err(ParameterError::new("n_batch", self.n_batch, ">= 1"));
        }
        if self.n_ctx < 16 || self.n_ctx > i32::MAX as u32 {
            return Err(ParameterError::new("n_ctx", self.n_ctx, "16..=i32::MAX"));
        }
        if self.n_batch > self.n_ctx {
            return Err(ParameterError::new("n_batch", self.n_batch, "<= n_ctx"));
        }
        Ok(())
    }
}

/// Everything a backend needs for one completion
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    pub echo: bool,
    pub seed: Option<u32>,
    pub stop: Vec<String>,
}

impl GenerationRequest {
    /// Build a request from an already validated parameter set.
    pub fn new(prompt: String, params: &SamplingParams) -> Self {
        Self {
            prompt,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            repeat_penalty: params.repeat_penalty,
            echo: params.echo,
            seed: params.seed,
            stop: params.stop.clone(),
        }
    }

    pub fn is_greedy(&self) -> bool {
        self.temperature == 0.0
    }
}
