//! Messages exchanged between agents and their delivery state machine

use super::error::BusError;
use crate::config::constants::messages::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_PRIORITY, DEFAULT_TIMEOUT_MS, MAX_PRIORITY, MIN_PRIORITY,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Delivery priority: 1 is the most urgent, 10 the least
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(u8);

impl Priority {
    pub const HIGHEST: Priority = Priority(MIN_PRIORITY);
    pub const LOWEST: Priority = Priority(MAX_PRIORITY);

    /// Out-of-range values are clamped into 1..=10
    pub fn new(value: u8) -> Self {
        Priority(value.clamp(MIN_PRIORITY, MAX_PRIORITY))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority(DEFAULT_PRIORITY)
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        Priority::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Request,
    Response,
    Notification,
    Broadcast,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl MessageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Completed | MessageStatus::Failed)
    }

    /// Legal edges of the delivery state machine
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        matches!(
            (self, next),
            (MessageStatus::Pending, MessageStatus::Processing)
                | (MessageStatus::Processing, MessageStatus::Completed)
                | (MessageStatus::Processing, MessageStatus::Failed)
                | (MessageStatus::Processing, MessageStatus::Pending)
        )
    }
}

/// A unit of work passed between agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub kind: MessageKind,
    pub sender: String,
    /// Absent for broadcasts
    pub recipient: Option<String>,
    pub payload: Value,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    pub priority: Priority,
    pub status: MessageStatus,
    /// Delivery attempts started so far
    pub attempt: u32,
    pub max_attempts: u32,
    pub timeout_ms: u64,
    pub correlation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Message {
    fn new(
        kind: MessageKind,
        sender: impl Into<String>,
        recipient: Option<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            sender: sender.into(),
            recipient,
            payload,
            context: HashMap::new(),
            priority: Priority::default(),
            status: MessageStatus::Pending,
            attempt: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            correlation_id: None,
            created_at: Utc::now(),
            processing_started_at: None,
            completed_at: None,
        }
    }

    pub fn request(sender: impl Into<String>, recipient: impl Into<String>, payload: Value) -> Self {
        Self::new(MessageKind::Request, sender, Some(recipient.into()), payload)
    }

    pub fn notification(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self::new(MessageKind::Notification, sender, Some(recipient.into()), payload)
    }

    pub fn broadcast(sender: impl Into<String>, payload: Value) -> Self {
        Self::new(MessageKind::Broadcast, sender, None, payload)
    }

    /// Reply to `request`, already in its terminal state
    pub fn response_to(request: &Message, payload: Value) -> Self {
        Self::reply(request, MessageKind::Response, payload, MessageStatus::Completed)
    }

    /// Error reply to `request`
    pub fn error_for(request: &Message, detail: impl Into<String>) -> Self {
        Self::reply(
            request,
            MessageKind::Error,
            Value::String(detail.into()),
            MessageStatus::Failed,
        )
    }

    fn reply(request: &Message, kind: MessageKind, payload: Value, status: MessageStatus) -> Self {
        let responder = request.recipient.clone().unwrap_or_default();
        let mut reply = Self::new(kind, responder, Some(request.sender.clone()), payload);
        reply.priority = request.priority;
        reply.correlation_id = Some(request.id.clone());
        reply.status = status;
        reply.attempt = 1;
        reply.max_attempts = 1;
        reply.processing_started_at = Some(reply.created_at);
        reply.completed_at = Some(reply.created_at);
        reply
    }

    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// At least one attempt is always made
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Shortcut for payloads shaped like `{ "text": ... }`
    pub fn text(&self) -> Option<&str> {
        self.payload
            .get("text")
            .and_then(Value::as_str)
            .or_else(|| self.payload.as_str())
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Time from creation to completion, once completed
    pub fn latency(&self) -> Option<Duration> {
        self.completed_at
            .and_then(|done| (done - self.created_at).to_std().ok())
    }

    fn transition(&mut self, next: MessageStatus) -> Result<(), BusError> {
        if !self.status.can_transition_to(next) {
            return Err(BusError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Pending -> Processing; counts the attempt
    pub fn begin_processing(&mut self) -> Result<(), BusError> {
        if self.attempt >= self.max_attempts {
            return Err(BusError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: MessageStatus::Processing,
            });
        }
        self.transition(MessageStatus::Processing)?;
        self.attempt += 1;
        self.processing_started_at = Some(not_before(self.created_at));
        Ok(())
    }

    /// Processing -> Pending after a retryable failure
    pub fn requeue(&mut self) -> Result<(), BusError> {
        self.transition(MessageStatus::Pending)
    }

    /// Processing -> Completed
    pub fn complete(&mut self) -> Result<(), BusError> {
        self.transition(MessageStatus::Completed)?;
        self.completed_at = Some(self.finish_time());
        Ok(())
    }

    /// Processing -> Failed
    pub fn fail(&mut self) -> Result<(), BusError> {
        self.transition(MessageStatus::Failed)?;
        self.completed_at = Some(self.finish_time());
        Ok(())
    }

    fn finish_time(&self) -> DateTime<Utc> {
        not_before(self.processing_started_at.unwrap_or(self.created_at))
    }
}

/// Wall-clock now, never earlier than `floor`
fn not_before(floor: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn priority_is_clamped() {
        assert_eq!(Priority::new(0), Priority::HIGHEST);
        assert_eq!(Priority::new(42), Priority::LOWEST);
        assert_eq!(Priority::default().value(), 5);
    }

    #[test]
    fn happy_path_transitions_set_timestamps() {
        let mut message = Message::request("orchestrator", "retrieval", json!({"text": "hi"}));
        message.begin_processing().unwrap();
        assert_eq!(message.status, MessageStatus::Processing);
        assert_eq!(message.attempt, 1);
        message.complete().unwrap();

        let started = message.processing_started_at.unwrap();
        let completed = message.completed_at.unwrap();
        assert!(started >= message.created_at);
        assert!(completed >= started);
        assert!(message.latency().is_some());
    }

    #[test]
    fn terminal_states_cannot_be_left() {
        let mut message = Message::request("a", "b", json!(null)).with_max_attempts(5);
        message.begin_processing().unwrap();
        message.fail().unwrap();
        assert!(message.status.is_terminal());
        assert!(message.requeue().is_err());
        assert!(message.begin_processing().is_err());
        assert!(message.complete().is_err());
    }

    #[test]
    fn failing_twice_is_rejected_and_keeps_the_first_failure() {
        let mut message = Message::request("a", "b", json!(null));
        message.begin_processing().unwrap();
        message.fail().unwrap();
        let failed_at = message.completed_at;

        assert!(matches!(
            message.fail(),
            Err(BusError::InvalidTransition {
                from: MessageStatus::Failed,
                to: MessageStatus::Failed,
                ..
            })
        ));
        assert_eq!(message.status, MessageStatus::Failed);
        assert_eq!(message.completed_at, failed_at);
    }

    #[test]
    fn pending_cannot_skip_processing() {
        let mut message = Message::request("a", "b", json!(null));
        assert!(matches!(
            message.complete(),
            Err(BusError::InvalidTransition { .. })
        ));
        assert!(message.fail().is_err());
    }

    #[test]
    fn attempts_never_exceed_maximum() {
        let mut message = Message::request("a", "b", json!(null)).with_max_attempts(2);
        message.begin_processing().unwrap();
        message.requeue().unwrap();
        message.begin_processing().unwrap();
        message.requeue().unwrap();
        assert!(!message.can_retry());
        assert!(message.begin_processing().is_err());
        assert_eq!(message.attempt, 2);
    }

    #[test]
    fn response_is_correlated() {
        let request = Message::request("orchestrator", "ideation", json!({"text": "ideas"}))
            .with_priority(2);
        let response = Message::response_to(&request, json!({"text": "three ideas"}));
        assert_eq!(response.kind, MessageKind::Response);
        assert_eq!(response.sender, "ideation");
        assert_eq!(response.recipient.as_deref(), Some("orchestrator"));
        assert_eq!(response.correlation_id.as_deref(), Some(request.id.as_str()));
        assert_eq!(response.priority.value(), 2);
        assert_eq!(response.text(), Some("three ideas"));
    }

    #[test]
    fn serializes_with_rfc3339_timestamps() {
        let message = Message::broadcast("orchestrator", json!("meeting moved"));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["kind"], "broadcast");
        assert_eq!(value["priority"], 5);
        assert!(value["recipient"].is_null());
        let created = value["created_at"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(created).is_ok());
    }
}
