//! Text generation boundary
//!
//! Agents never talk to a model directly; they go through [`TextGenerator`].
//! Two backends ship with the crate: an offline [`EchoGenerator`] and an
//! [`OpenAiCompatibleGenerator`] for any `/chat/completions` endpoint.

pub mod echo;
pub mod openai;

pub use echo::EchoGenerator;
pub use openai::OpenAiCompatibleGenerator;

use crate::config::GeneratorConfig;
use crate::config::constants::generator::{PROVIDER_ECHO, PROVIDER_OPENAI};
use crate::types::ConversationTurn;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Options for a single generation call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Generated text plus accounting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("Generator unavailable: {0}")]
    Unavailable(String),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("Generation timed out after {0}ms")]
    Timeout(u64),
}

impl GenerationError {
    /// Whether calling again has a reasonable chance of succeeding
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::Unavailable(_)
                | GenerationError::RateLimited
                | GenerationError::Timeout(_)
        )
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce text for `prompt`, given the prior conversation
    async fn generate(
        &self,
        prompt: &str,
        history: &[ConversationTurn],
        options: &GenerationOptions,
    ) -> Result<Generation, GenerationError>;

    /// Short identifier for logs
    fn name(&self) -> &str;
}

/// Build the generator named by `config.provider`
pub fn make_generator(config: &GeneratorConfig) -> Result<Arc<dyn TextGenerator>> {
    match config.provider.trim().to_lowercase().as_str() {
        PROVIDER_ECHO => Ok(Arc::new(EchoGenerator::new())),
        PROVIDER_OPENAI => {
            let api_key = std::env::var(&config.api_key_env).with_context(|| {
                format!(
                    "Set {} in your environment to use the '{}' generator",
                    config.api_key_env, PROVIDER_OPENAI
                )
            })?;
            Ok(Arc::new(OpenAiCompatibleGenerator::new(config, api_key)?))
        }
        other => bail!(
            "Unknown generator provider '{}' (expected '{}' or '{}')",
            other,
            PROVIDER_ECHO,
            PROVIDER_OPENAI
        ),
    }
}

/// Rough token estimate used when a backend does not report usage
pub(crate) fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() as u32).div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(GenerationError::RateLimited.is_retryable());
        assert!(GenerationError::Timeout(10).is_retryable());
        assert!(!GenerationError::InvalidRequest("bad".into()).is_retryable());
        assert!(!GenerationError::Provider("boom".into()).is_retryable());
    }

    #[test]
    fn factory_rejects_unknown_provider() {
        let config = GeneratorConfig {
            provider: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(make_generator(&config).is_err());
    }

    #[test]
    fn factory_builds_echo_by_default() {
        let generator = make_generator(&GeneratorConfig::default()).unwrap();
        assert_eq!(generator.name(), "echo");
    }
}
