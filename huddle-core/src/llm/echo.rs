use super::{Generation, GenerationError, GenerationOptions, TextGenerator, TokenUsage, estimate_tokens};
use crate::types::ConversationTurn;
use async_trait::async_trait;

const MAX_ECHO_CHARS: usize = 280;

/// Offline generator that answers by restating its prompt.
///
/// Deterministic, free, and good enough to exercise routing end to end
/// without network access.
#[derive(Debug, Clone, Default)]
pub struct EchoGenerator {
    prefix: Option<String>,
}

impl EchoGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(
        &self,
        prompt: &str,
        history: &[ConversationTurn],
        options: &GenerationOptions,
    ) -> Result<Generation, GenerationError> {
        let collapsed = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            return Err(GenerationError::InvalidRequest("prompt is empty".to_string()));
        }

        let mut text = String::new();
        if let Some(prefix) = &self.prefix {
            text.push_str(prefix);
            text.push(' ');
        }
        let body: String = collapsed.chars().take(MAX_ECHO_CHARS).collect();
        text.push_str(&body);
        if collapsed.chars().count() > MAX_ECHO_CHARS {
            text.push_str("...");
        }
        if !history.is_empty() {
            text.push_str(&format!(" ({} earlier turns considered)", history.len()));
        }

        let prompt_tokens = estimate_tokens(prompt)
            + history
                .iter()
                .map(|turn| estimate_tokens(&turn.content))
                .sum::<u32>()
            + options
                .system_prompt
                .as_deref()
                .map(estimate_tokens)
                .unwrap_or(0);

        Ok(Generation {
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens: estimate_tokens(&text),
            },
            text,
            cost_usd: 0.0,
        })
    }

    fn name(&self) -> &str {
        "echo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_collapsed_prompt() {
        let generator = EchoGenerator::with_prefix("Answer:");
        let out = generator
            .generate(
                "what   was\ndecided?",
                &[ConversationTurn::user("earlier")],
                &GenerationOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(out.text, "Answer: what was decided? (1 earlier turns considered)");
        assert!(out.usage.prompt_tokens > 0);
        assert_eq!(out.cost_usd, 0.0);
    }

    #[tokio::test]
    async fn rejects_blank_prompt() {
        let err = EchoGenerator::new()
            .generate("   ", &[], &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidRequest(_)));
    }
}
