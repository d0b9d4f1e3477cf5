use super::{Generation, GenerationError, GenerationOptions, TextGenerator, TokenUsage, estimate_tokens};
use crate::config::GeneratorConfig;
use crate::types::ConversationTurn;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::time::Duration;

/// Generator backed by an OpenAI-compatible `/chat/completions` endpoint
pub struct OpenAiCompatibleGenerator {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
    timeout_ms: u64,
}

impl OpenAiCompatibleGenerator {
    pub fn new(config: &GeneratorConfig, api_key: String) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_ms: config.request_timeout_ms,
        })
    }

    fn build_request(
        &self,
        prompt: &str,
        history: &[ConversationTurn],
        options: &GenerationOptions,
    ) -> Value {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(system) = &options.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        for turn in history {
            messages.push(json!({ "role": turn.role.to_string(), "content": turn.content }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": options.max_tokens.unwrap_or(self.max_tokens),
            "temperature": options.temperature.unwrap_or(self.temperature),
            "stream": false,
        })
    }

    fn parse_response(&self, body: Value, prompt: &str) -> Result<Generation, GenerationError> {
        let text = body["choices"]
            .get(0)
            .and_then(|choice| choice["message"]["content"].as_str())
            .ok_or_else(|| {
                GenerationError::Provider("response contained no message content".to_string())
            })?
            .to_string();

        let usage = match body.get("usage") {
            Some(usage) => TokenUsage {
                prompt_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
                completion_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
            },
            None => TokenUsage {
                prompt_tokens: estimate_tokens(prompt),
                completion_tokens: estimate_tokens(&text),
            },
        };

        Ok(Generation {
            text,
            usage,
            cost_usd: 0.0,
        })
    }
}

fn classify_status(status: StatusCode, body: String) -> GenerationError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GenerationError::Provider(format!("authentication failed (HTTP {}): {}", status, body))
        }
        s if s.is_server_error() => {
            GenerationError::Unavailable(format!("HTTP {}: {}", status, body))
        }
        _ => GenerationError::InvalidRequest(format!("HTTP {}: {}", status, body)),
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    async fn generate(
        &self,
        prompt: &str,
        history: &[ConversationTurn],
        options: &GenerationOptions,
    ) -> Result<Generation, GenerationError> {
        if self.model.trim().is_empty() {
            return Err(GenerationError::InvalidRequest(
                "Model cannot be empty".to_string(),
            ));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let request = self.build_request(prompt, history, options);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.timeout_ms)
                } else {
                    GenerationError::Unavailable(format!("Network error: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, error_text));
        }

        let body: Value = response.json().await.map_err(|e| {
            GenerationError::Provider(format!("Failed to parse response: {}", e))
        })?;

        self.parse_response(body, prompt)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> OpenAiCompatibleGenerator {
        OpenAiCompatibleGenerator::new(&GeneratorConfig::default(), "test-key".to_string())
            .unwrap()
    }

    #[test]
    fn request_includes_system_history_and_prompt() {
        let options = GenerationOptions {
            system_prompt: Some("be brief".to_string()),
            ..Default::default()
        };
        let request = generator().build_request(
            "next steps?",
            &[ConversationTurn::assistant("we shipped")],
            &options,
        );
        let messages = request["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["content"], "next steps?");
    }

    #[test]
    fn parses_usage_when_present() {
        let body = json!({
            "choices": [{ "message": { "content": "Ship on Friday." } }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 4 }
        });
        let generation = generator().parse_response(body, "when?").unwrap();
        assert_eq!(generation.text, "Ship on Friday.");
        assert_eq!(generation.usage.total(), 16);
    }

    #[test]
    fn maps_http_statuses() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            GenerationError::RateLimited
        );
        assert!(classify_status(StatusCode::BAD_GATEWAY, String::new()).is_retryable());
        assert!(!classify_status(StatusCode::BAD_REQUEST, String::new()).is_retryable());
    }
}
