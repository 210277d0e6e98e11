//! Built-in session presets
//!
//! Ready-made configurations for the demo prompts: a Llama 2 chat turn (as a
//! script and as a short web demo) and a text-to-SQL helper. Callers still choose where the model lives.

use crate::inference::params::{LoadParams, SamplingParams};
use crate::types::config::SessionConfig;
use crate::types::model::ModelSource;

/// Hub repository for the chat preset
pub const LLAMA2_CHAT_REPO: &str = "TheBloke/Llama-2-13B-chat-GGUF";
/// Quantization the chat preset downloads by default
pub const LLAMA2_CHAT_FILE: &str = "llama-2-13b-chat.Q5_K_M.gguf";
/// Smaller chat model used by the SQL preset
pub const TEXT_TO_SQL_REPO: &str = "TheBloke/Llama-2-7B-Chat-GGUF";
pub const TEXT_TO_SQL_FILE: &str = "llama-2-7b-chat.Q8_0.gguf";

/// Single-turn chat prompt
pub const LLAMA2_CHAT_TEMPLATE: &str =
    "\nSYSTEM: You are helpful, respectful, and honest.\n\nUSER: {text} \n\nASSISTANT:  \n";

/// Chat prompt of the interactive demo, indented as it was typed
pub const LLAMA2_DEMO_TEMPLATE: &str = "\n   SYSTEM: You are helpful, respectful, and honest.\n   \n   USER: {text} \n   \n   ASSISTANT:\n   ";

/// SQL helper prompt; the description is fenced in triple backticks
pub const TEXT_TO_SQL_TEMPLATE: &str =
    "Create a SQL query snippet using the below text: ```{text}``` Just SQL query:";

/// Named presets selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Llama2Chat,
    Llama2Demo,
    TextToSql,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Llama2Chat, Preset::Llama2Demo, Preset::TextToSql];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Llama2Chat => "llama2-chat",
            Preset::Llama2Demo => "llama2-demo",
            Preset::TextToSql => "text-to-sql",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Build the preset configuration for `source`.
    pub fn config(self, source: ModelSource) -> SessionConfig {
        match self {
            Preset::Llama2Chat => llama2_chat(source),
            Preset::Llama2Demo => llama2_demo(source),
            Preset::TextToSql => text_to_sql(source),
        }
    }

    /// The model this preset is tuned for
    pub fn default_source(self) -> ModelSource {
        match self {
            Preset::Llama2Chat | Preset::Llama2Demo => {
                ModelSource::hub(LLAMA2_CHAT_REPO, LLAMA2_CHAT_FILE)
            }
            Preset::TextToSql => ModelSource::hub(TEXT_TO_SQL_REPO, TEXT_TO_SQL_FILE),
        }
    }
}

/// Llama 2 chat: 256 tokens, moderate temperature, strong repeat penalty,
/// prompt echoed in front of the answer.
pub fn llama2_chat(source: ModelSource) -> SessionConfig {
    let mut config = SessionConfig::new(source, LLAMA2_CHAT_TEMPLATE);
    config.sampling = SamplingParams {
        max_tokens: 256,
        temperature: 0.5,
        top_p: 0.95,
        top_k: 150,
        repeat_penalty: 1.2,
        echo: true,
        ..SamplingParams::default()
    };
    config.load = LoadParams {
        n_threads: 2,
        n_batch: 512,
        n_gpu_layers: 32,
        ..LoadParams::default()
    };
    config
}

/// Short interactive answers: 100 tokens at temperature 0.5, no echo.
pub fn llama2_demo(source: ModelSource) -> SessionConfig {
    let mut config = SessionConfig::new(source, LLAMA2_DEMO_TEMPLATE);
    config.sampling = SamplingParams {
        max_tokens: 100,
        temperature: 0.5,
        ..SamplingParams::default()
    };
    config
}

/// Text to SQL: near-greedy sampling so the same description yields the
/// same query.
pub fn text_to_sql(source: ModelSource) -> SessionConfig {
    let mut config = SessionConfig::new(source, TEXT_TO_SQL_TEMPLATE);
    config.sampling = SamplingParams {
        max_tokens: 256,
        temperature: 0.01,
        ..SamplingParams::default()
    };
    config
}
