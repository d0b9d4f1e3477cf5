use super::message::MessageStatus;
use serde::{Deserialize, Serialize};

/// What went wrong inside an agent handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerErrorKind {
    /// The agent itself failed
    Failure,
    /// The agent's text generator failed
    Generation,
}

/// Error returned by an [`AgentHandler`](super::AgentHandler).
///
/// Retryable unless `fatal` is set.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    pub kind: HandlerErrorKind,
    pub fatal: bool,
    /// For generation failures: whether the router may try again
    pub generation_retryable: bool,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: HandlerErrorKind::Failure,
            fatal: false,
            generation_retryable: false,
        }
    }

    /// A failure the bus must not retry
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            fatal: true,
            ..Self::new(message)
        }
    }

    /// Generation failures are surfaced to the router instead of being
    /// retried by the bus
    pub fn generation(error: &crate::llm::GenerationError) -> Self {
        Self {
            message: error.to_string(),
            kind: HandlerErrorKind::Generation,
            fatal: true,
            generation_retryable: error.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BusError {
    #[error("Unknown agent '{0}'")]
    UnknownAgent(String),

    #[error("Agent '{0}' is already registered")]
    DuplicateAgent(String),

    #[error("Agent '{agent}' failed after {attempts} attempt(s): {cause}")]
    Handler {
        agent: String,
        attempts: u32,
        cause: HandlerError,
    },

    #[error("Agent '{agent}' exceeded {timeout_ms}ms on attempt {attempts}")]
    Timeout {
        agent: String,
        timeout_ms: u64,
        attempts: u32,
    },

    #[error("Queue for agent '{agent}' is full ({capacity} messages)")]
    QueueFull { agent: String, capacity: usize },

    #[error("Message has no recipient")]
    MissingRecipient,

    #[error("Message {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: String,
        from: MessageStatus,
        to: MessageStatus,
    },

    #[error("Send was cancelled")]
    Cancelled,

    #[error("Message bus is shut down")]
    ShutDown,
}

impl BusError {
    /// Errors the bus resolves internally by re-delivering
    pub fn is_retryable(&self) -> bool {
        match self {
            BusError::Handler { cause, .. } => !cause.fatal,
            BusError::Timeout { .. } => true,
            _ => false,
        }
    }
}
