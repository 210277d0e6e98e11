//! llama.cpp backend
//!
//! [`LlamaHandle`] owns one loaded model. Every completion gets its own
//! context, so nothing from a previous prompt leaks into the next one.

use crate::inference::backend::{find_stop, Completion, FinishReason, GenerationBackend, Usage};
use crate::inference::error::{GenerationError, ModelLoadError};
use crate::inference::model::validate_gguf;
use crate::inference::params::{GenerationRequest, LoadParams};
use crate::types::model::ModelInfo;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use once_cell::sync::OnceCell;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Mutex;

/// Tokens considered by the repeat penalty
const REPEAT_PENALTY_LAST_N: i32 = 64;

/// llama.cpp seed value meaning "pick a random seed"
const RANDOM_SEED: u32 = u32::MAX;

static BACKEND: OnceCell<LlamaBackend> = OnceCell::new();

/// llama.cpp may only be initialized once per process.
fn shared_backend() -> Result<&'static LlamaBackend, ModelLoadError> {
    BACKEND.get_or_try_init(|| {
        LlamaBackend::init()
            .map_err(|e| ModelLoadError::Backend(format!("Failed to init llama backend: {}", e)))
    })
}

/// A loaded llama.cpp model
pub struct LlamaHandle {
    backend: &'static LlamaBackend,
    model: LlamaModel,
    info: ModelInfo,
    /// Serializes generations; each one allocates a full context.
    generation_lock: Mutex<()>,
}

impl std::fmt::Debug for LlamaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlamaHandle").field("info", &self.info).finish()
    }
}

impl LlamaHandle {
    /// Load a GGUF model from disk. Blocks until the weights are in memory.
    ///
    /// `params` must already have passed [`LoadParams::validate`].
    pub fn load(path: &Path, params: &LoadParams) -> Result<Self, ModelLoadError> {
        let header = validate_gguf(path)?;
        tracing::info!(
            "Loading model {:?} (GGUF v{}, {} tensors, {} GPU layers)",
            path,
            header.version,
            header.tensor_count,
            params.n_gpu_layers
        );

        let backend = shared_backend()?;
        let model_params = LlamaModelParams::default().with_n_gpu_layers(params.n_gpu_layers);
        let model = LlamaModel::load_from_file(backend, path, &model_params)
            .map_err(|e| ModelLoadError::Backend(format!("Failed to load model: {}", e)))?;

        let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let info = ModelInfo {
            path: path.to_path_buf(),
            size_bytes,
            n_threads: params.n_threads,
            n_batch: params.n_batch,
            n_gpu_layers: params.n_gpu_layers,
            n_ctx: params.n_ctx,
        };

        tracing::info!("Model loaded: {}", info.name());

        Ok(Self {
            backend,
            model,
            info,
            generation_lock: Mutex::new(()),
        })
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn new_context(&self) -> Result<llama_cpp_2::context::LlamaContext<'_>, GenerationError> {
        let threads = self.info.n_threads as i32;
        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(self.info.n_ctx))
            .with_n_batch(self.info.n_batch)
            .with_n_threads(threads)
            .with_n_threads_batch(threads);

        self.model
            .new_context(self.backend, ctx_params)
            .map_err(|e| GenerationError::Context(e.to_string()))
    }

    fn build_sampler(request: &GenerationRequest) -> LlamaSampler {
        let penalties =
            LlamaSampler::penalties(REPEAT_PENALTY_LAST_N, request.repeat_penalty, 0.0, 0.0);

        if request.is_greedy() {
            return LlamaSampler::chain_simple([penalties, LlamaSampler::greedy()]);
        }

        LlamaSampler::chain_simple([
            penalties,
            LlamaSampler::top_k(request.top_k as i32),
            LlamaSampler::top_p(request.top_p, 1),
            LlamaSampler::temp(request.temperature),
            LlamaSampler::dist(request.seed.unwrap_or(RANDOM_SEED)),
        ])
    }
}

impl GenerationBackend for LlamaHandle {
    fn complete(&self, request: &GenerationRequest) -> Result<Completion, GenerationError> {
        let _guard = self
            .generation_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let tokens = self
            .model
            .str_to_token(&request.prompt, AddBos::Always)
            .map_err(|e| GenerationError::Tokenize(e.to_string()))?;

        let n_ctx = self.info.n_ctx;
        if tokens.is_empty() || tokens.len() >= n_ctx as usize {
            return Err(GenerationError::PromptTooLong {
                tokens: tokens.len(),
                n_ctx,
            });
        }

        let mut ctx = self.new_context()?;
        let n_batch = self.info.n_batch as usize;
        let mut batch = LlamaBatch::new(n_batch, 1);

        // Feed the prompt in n_batch sized chunks; only the final token needs logits.
        let last_index = tokens.len() - 1;
        let mut n_past: i32 = 0;
        for chunk in tokens.chunks(n_batch) {
            batch.clear();
            for &token in chunk {
                let is_last = n_past as usize == last_index;
                batch
                    .add(token, n_past, &[0], is_last)
                    .map_err(|e| GenerationError::Decode(e.to_string()))?;
                n_past += 1;
            }
            ctx.decode(&mut batch)
                .map_err(|e| GenerationError::Decode(e.to_string()))?;
        }

        let mut sampler = Self::build_sampler(request);
        let mut output: Vec<u8> = Vec::new();
        let mut completion_tokens: u32 = 0;
        let mut finish_reason = FinishReason::Length;

        while completion_tokens < request.max_tokens {
            if n_past as u32 >= n_ctx {
                tracing::debug!("Context window full after {} tokens", n_past);
                break;
            }

            let token = sampler.sample(&ctx, batch.n_tokens() - 1);
            sampler.accept(token);

            if self.model.is_eog_token(token) {
                finish_reason = FinishReason::Stop;
                break;
            }

            let bytes = self
                .model
                .token_to_bytes(token, Special::Plaintext)
                .map_err(|e| GenerationError::Decode(e.to_string()))?;
            output.extend_from_slice(&bytes);
            completion_tokens += 1;

            if !request.stop.is_empty()
                && find_stop(&String::from_utf8_lossy(&output), &request.stop).is_some()
            {
                finish_reason = FinishReason::Stop;
                break;
            }

            batch.clear();
            batch
                .add(token, n_past, &[0], true)
                .map_err(|e| GenerationError::Decode(e.to_string()))?;
            n_past += 1;
            ctx.decode(&mut batch)
                .map_err(|e| GenerationError::Decode(e.to_string()))?;
        }

        let generated = String::from_utf8_lossy(&output);
        let usage = Usage {
            prompt_tokens: tokens.len() as u32,
            completion_tokens,
        };

        tracing::debug!(
            "Generated {} tokens from a {} token prompt ({:?})",
            usage.completion_tokens,
            usage.prompt_tokens,
            finish_reason
        );

        Ok(Completion::from_generated(
            request,
            &generated,
            finish_reason,
            usage,
        ))
    }
}
