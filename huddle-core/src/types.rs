//! Values shared between the router, agents and generators

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnRole::System => write!(f, "system"),
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry of a conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(TurnRole::System, content)
    }
}

/// Caller-supplied context travelling with a routed request.
///
/// Passed explicitly into every call; nothing here is shared between
/// requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Conversation so far, oldest first
    #[serde(default)]
    pub history: Vec<ConversationTurn>,

    /// Meeting notes or transcripts the retrieval agent may ground on
    #[serde(default)]
    pub documents: Vec<String>,

    /// Free-form session data (user, meeting id, locale, ...)
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.documents.push(document.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Lowercase, strip punctuation and collapse whitespace.
///
/// Used for cache keys, batch similarity and keyword matching so that
/// trivially different phrasings land on the same key.
pub fn normalize_text(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric() || *c == '\'' || *c == '-')
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_case_and_punctuation() {
        assert_eq!(
            normalize_text("  What did we DECIDE,   about the budget?? "),
            "what did we decide about the budget"
        );
        assert_eq!(normalize_text("!!!"), "");
    }

    #[test]
    fn context_builder_accumulates() {
        let ctx = RequestContext::new()
            .with_document("notes")
            .with_attribute("meeting", "weekly-sync")
            .with_history(vec![ConversationTurn::user("hi")]);
        assert_eq!(ctx.documents.len(), 1);
        assert_eq!(ctx.attributes["meeting"], "weekly-sync");
        assert_eq!(ctx.history[0].role, TurnRole::User);
    }
}
