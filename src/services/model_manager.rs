//! LLM provider selection (Groq or OpenRouter) and the Groq model fallback chain.

use crate::config::LlmSettings;
use crate::constants::{GROQ_MODELS, GROQ_TIMEOUT_SECS, OPENROUTER_TIMEOUT_SECS};
use crate::utils::mask_secret;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Groq,
    OpenRouter,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Groq => "groq",
            Provider::OpenRouter => "openrouter",
        }
    }
}

/// Selected provider plus the model fallback chain
#[derive(Debug, Clone)]
pub struct ModelManager {
    provider: Provider,
    api_key: Option<String>,
    models: Vec<String>,
    index: usize,
}

impl ModelManager {
    /// Groq when enabled and keyed, otherwise OpenRouter
    pub fn from_settings(settings: &LlmSettings) -> Self {
        match (&settings.groq_api_key, settings.use_groq) {
            (Some(key), true) => {
                info!("Using Groq models with auto-fallback, starting with {}", GROQ_MODELS[0]);
                Self {
                    provider: Provider::Groq,
                    api_key: Some(key.clone()),
                    models: GROQ_MODELS.iter().map(|m| m.to_string()).collect(),
                    index: 0,
                }
            }
            _ => {
                match &settings.openrouter_api_key {
                    Some(key) => info!("OPENROUTER_API_KEY found: {}", mask_secret(key)),
                    None => warn!("OPENROUTER_API_KEY not found. Set it in .env to enable the assistant"),
                }
                info!("Using OpenRouter model: {}", settings.openrouter_model);
                Self {
                    provider: Provider::OpenRouter,
                    api_key: settings.openrouter_api_key.clone(),
                    models: vec![settings.openrouter_model.clone()],
                    index: 0,
                }
            }
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn current_model(&self) -> &str {
        &self.models[self.index]
    }

    /// Position of the current model in the fallback chain
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn timeout(&self) -> Duration {
        match self.provider {
            Provider::Groq => Duration::from_secs(GROQ_TIMEOUT_SECS),
            Provider::OpenRouter => Duration::from_secs(OPENROUTER_TIMEOUT_SECS),
        }
    }

    pub fn has_more_models(&self) -> bool {
        self.provider == Provider::Groq && self.index + 1 < self.models.len()
    }

    /// Advance to the next Groq model; `false` when exhausted or on OpenRouter
    pub fn switch_to_next_model(&mut self) -> bool {
        if !self.has_more_models() {
            if self.provider == Provider::Groq {
                warn!("No more Groq models available for fallback");
            }
            return false;
        }
        self.index += 1;
        warn!("Switching to next Groq model: {}", self.current_model());
        true
    }

    /// Report that the model at `failed` hit a limit.
    ///
    /// Only advances when `failed` is still the current model, so concurrent
    /// requests failing on the same model move the chain by one step.
    pub fn switch_from(&mut self, failed: usize) -> bool {
        if self.index != failed {
            debug!(
                "Model {} already replaced by {}",
                self.models.get(failed).map(String::as_str).unwrap_or("?"),
                self.current_model()
            );
            return true;
        }
        self.switch_to_next_model()
    }
}
