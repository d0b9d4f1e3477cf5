//! Interaction log
//!
//! Every routed request can be recorded for later review. Logging is fire
//! and forget: the orchestrator spawns the write and only reports failures
//! through `tracing`.

use crate::config::constants::agents::ORCHESTRATOR;
use crate::router::{IntentCategory, RouteError, RouteResponse, RouteStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Outcome of a logged interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    Answered,
    NotFound,
    Guidance,
    /// Routing failed; `error` holds the reason
    Error,
}

impl From<RouteStatus> for InteractionStatus {
    fn from(status: RouteStatus) -> Self {
        match status {
            RouteStatus::Answered => InteractionStatus::Answered,
            RouteStatus::NotFound => InteractionStatus::NotFound,
            RouteStatus::Guidance => InteractionStatus::Guidance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub request: String,
    pub response: String,
    pub source_agent: String,
    /// Unknown when routing failed
    #[serde(default)]
    pub category: Option<IntentCategory>,
    pub status: InteractionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub served_from_cache: bool,
    pub latency_ms: u64,
}

impl InteractionRecord {
    pub fn new(request: &str, response: &RouteResponse) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            request: request.to_string(),
            response: response.text.clone(),
            source_agent: response.source_agent.clone(),
            category: Some(response.category),
            status: response.status.into(),
            error: None,
            served_from_cache: response.served_from_cache,
            latency_ms: response.latency_ms,
        }
    }

    pub fn failed(request: &str, error: &RouteError, latency_ms: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            request: request.to_string(),
            response: String::new(),
            source_agent: error.agent().unwrap_or(ORCHESTRATOR).to_string(),
            category: None,
            status: InteractionStatus::Error,
            error: Some(error.to_string()),
            served_from_cache: false,
            latency_ms,
        }
    }
}

#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn log_interaction(&self, record: InteractionRecord) -> Result<()>;

    /// Most recent records, oldest first
    async fn recent(&self, limit: usize) -> Result<Vec<InteractionRecord>>;
}

/// In-process store, mostly for tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<InteractionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn log_interaction(&self, record: InteractionRecord) -> Result<()> {
        self.records.lock().push(record);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<InteractionRecord>> {
        let records = self.records.lock();
        let skip = records.len().saturating_sub(limit);
        Ok(records[skip..].to_vec())
    }
}

/// Append-only JSON lines file
#[derive(Debug, Clone)]
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PersistenceStore for JsonlStore {
    async fn log_interaction(&self, record: InteractionRecord) -> Result<()> {
        let mut line =
            serde_json::to_string(&record).context("failed to serialize interaction record")?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("failed to create log directory: {}", parent.display())
                })?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open interaction log: {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to write interaction log: {}", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<InteractionRecord>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read interaction log: {}", self.path.display()))?;

        let mut records = Vec::new();
        for (index, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<InteractionRecord>(line) {
                Ok(record) => records.push(record),
                Err(err) => warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    "skipping malformed interaction record: {}",
                    err
                ),
            }
        }

        let skip = records.len().saturating_sub(limit);
        Ok(records.split_off(skip))
    }
}
