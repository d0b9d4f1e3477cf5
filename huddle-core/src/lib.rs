//! # huddle-core - Agent runtime for Huddle
//!
//! `huddle-core` powers the Huddle meeting assistant. A request from the
//! user is classified, handed to a specialist agent over an in-process
//! message bus, and answered through a shared text generator. A small
//! optimization layer sits in front of the agents.
//!
//! ## Highlights
//!
//! - **Message Bus**: per-agent priority queues with retry, backoff,
//!   deadlines, broadcast and cancellation.
//! - **Intent Router**: keyword classification with multi-intent splitting
//!   and short-circuits for trivial input.
//! - **Response Cache**: TTL plus LRU eviction, keyed on normalized text.
//! - **Batching**: similar concurrent requests share one upstream call.
//! - **Context Compression**: conversation history trimmed to a token budget
//!   keeping salient and recent turns.
//! - **Configuration-First**: everything is driven by `huddle.toml`, with
//!   defaults centralized in `config::constants`.
//!
//! ## Architecture Overview
//!
//! - `bus/`: messages, delivery state machine, queues and workers.
//! - `router/`: intent classification and the routing pipeline.
//! - `cache`, `batch`, `compression`: the optimization layer.
//! - `agents`: built-in retrieval, ideation and analysis agents.
//! - `llm/`: the [`TextGenerator`] boundary and its backends.
//! - `persistence`: interaction log stores.
//! - `orchestrator`: wires everything into a runnable [`Orchestrator`].
//!
//! ## Quickstart
//!
//! ```rust,ignore
//! use huddle_core::{ConfigManager, Orchestrator, RequestContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigManager::load()?.into_config();
//!     let orchestrator = Orchestrator::new(config)?;
//!
//!     let context = RequestContext::new()
//!         .with_document("Launch moved to March 14; Dana owns the checklist.");
//!     let response = orchestrator
//!         .route("What did we decide about the launch?", &context)
//!         .await?;
//!     println!("{} (from {})", response.text, response.source_agent);
//!
//!     orchestrator.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Custom agents
//!
//! ```rust,ignore
//! use huddle_core::bus::handler_fn;
//!
//! orchestrator.register_agent("scheduler", handler_fn(|message| async move {
//!     Ok(serde_json::json!({ "text": format!("Booked: {}", message.text().unwrap_or_default()) }))
//! }))?;
//! ```

pub mod agents;
pub mod batch;
pub mod bus;
pub mod cache;
pub mod compression;
pub mod config;
pub mod llm;
pub mod orchestrator;
pub mod persistence;
pub mod router;
pub mod types;

pub use agents::{AgentKind, SpecialistAgent};
pub use batch::{BatchAggregator, BatchOutcome, BatchStats};
pub use bus::{
    AgentHandler, BusError, BusStats, HandlerError, Message, MessageBus, MessageKind,
    MessageStatus, Priority, handler_fn,
};
pub use cache::{CacheStats, ResponseCache};
pub use compression::{CompressedContext, ContextCompressor};
pub use config::{ConfigManager, HuddleConfig};
pub use llm::{EchoGenerator, GenerationError, TextGenerator};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, SystemStats};
pub use persistence::{
    InteractionRecord, InteractionStatus, JsonlStore, MemoryStore, PersistenceStore,
};
pub use router::{
    IntentCategory, IntentClassifier, KeywordClassifier, RouteError, RouteResponse, RouteStage,
    RouteStatus, Router,
};
pub use types::{ConversationTurn, RequestContext, TurnRole};
