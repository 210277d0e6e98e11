//! Configuration types
//!
//! Session configuration: every value a prompt session needs, so nothing is
//! baked into the binary.

use crate::inference::error::SessionError;
use crate::inference::params::{LoadParams, SamplingParams};
use crate::inference::template::{PromptTemplate, DEFAULT_PLACEHOLDER};
use crate::types::model::ModelSource;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER.to_string()
}

/// Prompt session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Where to find the model
    pub source: ModelSource,
    /// Prompt template containing `{placeholder}` exactly once
    pub template: String,
    /// Name of the substitution point in `template`
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    #[serde(default)]
    pub sampling: SamplingParams,
    #[serde(default)]
    pub load: LoadParams,
    /// Directory for hub downloads (defaults to the data dir's `models`)
    #[serde(default)]
    pub models_dir: Option<PathBuf>,
}

impl SessionConfig {
    pub fn new(source: ModelSource, template: impl Into<String>) -> Self {
        Self {
            source,
            template: template.into(),
            placeholder: default_placeholder(),
            sampling: SamplingParams::default(),
            load: LoadParams::default(),
            models_dir: None,
        }
    }

    /// Check template and parameters without touching the model.
    pub fn validate(&self) -> Result<PromptTemplate, SessionError> {
        let template = PromptTemplate::new(self.template.clone(), &self.placeholder)?;
        self.sampling.validate()?;
        self.load.validate()?;
        Ok(template)
    }
}
