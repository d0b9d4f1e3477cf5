//! Built-in specialist agents

use crate::bus::{AgentHandler, HandlerError, Message};
use crate::config::AgentNames;
use crate::llm::{GenerationOptions, TextGenerator};
use crate::types::{ConversationTurn, normalize_text};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Documents the retrieval agent grounds a prompt on
const MAX_GROUNDING_DOCUMENTS: usize = 3;

const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "did", "do", "for", "from", "how",
    "i", "in", "is", "it", "of", "on", "or", "our", "that", "the", "this", "to", "us", "was",
    "we", "what", "when", "where", "which", "who", "why", "with", "you",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Retrieval,
    Ideation,
    Analysis,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::Retrieval, AgentKind::Ideation, AgentKind::Analysis];

    /// Bus name for this kind under `names`
    pub fn agent_name(self, names: &AgentNames) -> &str {
        match self {
            AgentKind::Retrieval => &names.retrieval,
            AgentKind::Ideation => &names.ideation,
            AgentKind::Analysis => &names.analysis,
        }
    }

    fn system_prompt(self) -> &'static str {
        match self {
            AgentKind::Retrieval => {
                "You answer questions strictly from the meeting notes provided. \
                 If the notes do not contain the answer, say so."
            }
            AgentKind::Ideation => {
                "You help teams brainstorm. Offer a short list of concrete, varied ideas."
            }
            AgentKind::Analysis => {
                "You analyze meeting outcomes. Compare options, weigh risks and \
                 state a clear conclusion."
            }
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Retrieval => write!(f, "retrieval"),
            AgentKind::Ideation => write!(f, "ideation"),
            AgentKind::Analysis => write!(f, "analysis"),
        }
    }
}

/// Agent that turns a request into a role-specific prompt for the shared
/// text generator.
///
/// Request payload: `{ "text": ..., "documents": [...] }`, with compressed
/// history under the `history` context key. Reply: `{ text, usage,
/// cost_usd, agent }`.
pub struct SpecialistAgent {
    kind: AgentKind,
    name: String,
    generator: Arc<dyn TextGenerator>,
    options: GenerationOptions,
}

impl SpecialistAgent {
    pub fn new(kind: AgentKind, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            kind,
            name: kind.to_string(),
            generator,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Base options; the system prompt is always the agent's own
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    fn build_prompt(&self, text: &str, documents: &[String]) -> Option<String> {
        match self.kind {
            AgentKind::Retrieval if !documents.is_empty() => {
                let relevant = rank_documents(text, documents, MAX_GROUNDING_DOCUMENTS);
                if relevant.is_empty() {
                    return None;
                }
                let notes = relevant
                    .iter()
                    .map(|note| format!("- {}", note.trim()))
                    .collect::<Vec<_>>()
                    .join("\n");
                Some(format!("Question: {}\n\nRelevant notes:\n{}", text, notes))
            }
            AgentKind::Retrieval => Some(format!("Question about past meetings: {}", text)),
            AgentKind::Ideation => Some(format!("Brainstorm: {}", text)),
            AgentKind::Analysis => Some(format!("Analyze: {}", text)),
        }
    }
}

#[async_trait]
impl AgentHandler for SpecialistAgent {
    async fn handle(&self, message: Message) -> Result<Value, HandlerError> {
        let text = message
            .text()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| HandlerError::fatal("request has no text"))?
            .to_string();

        let history: Vec<ConversationTurn> = match message.context.get("history") {
            Some(Value::Null) | None => Vec::new(),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|err| HandlerError::fatal(format!("malformed history: {}", err)))?,
        };

        let documents: Vec<String> = message
            .payload
            .get("documents")
            .and_then(Value::as_array)
            .map(|docs| {
                docs.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let Some(prompt) = self.build_prompt(&text, &documents) else {
            debug!(agent = %self.name, documents = documents.len(), "no matching documents");
            return Ok(json!({
                "text": "",
                "usage": { "prompt_tokens": 0, "completion_tokens": 0 },
                "cost_usd": 0.0,
                "agent": self.name,
            }));
        };

        let options = GenerationOptions {
            system_prompt: Some(self.kind.system_prompt().to_string()),
            ..self.options.clone()
        };
        let generation = self
            .generator
            .generate(&prompt, &history, &options)
            .await
            .map_err(|err| HandlerError::generation(&err))?;

        debug!(
            agent = %self.name,
            generator = self.generator.name(),
            tokens = generation.usage.total(),
            "generated reply"
        );

        Ok(json!({
            "text": generation.text,
            "usage": generation.usage,
            "cost_usd": generation.cost_usd,
            "agent": self.name,
        }))
    }
}

fn content_tokens(text: &str) -> HashSet<String> {
    normalize_text(text)
        .split_whitespace()
        .filter(|token| !STOPWORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Documents sharing at least one content word with `query`, best first
pub fn rank_documents<'a>(query: &str, documents: &'a [String], limit: usize) -> Vec<&'a str> {
    let wanted = content_tokens(query);
    let mut scored: Vec<(usize, &str)> = documents
        .iter()
        .map(|doc| (content_tokens(doc).intersection(&wanted).count(), doc.as_str()))
        .filter(|(score, _)| *score > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(limit).map(|(_, doc)| doc).collect()
}
