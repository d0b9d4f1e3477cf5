//! Top-level runtime: bus, built-in agents and router wired together

use crate::agents::{AgentKind, SpecialistAgent};
use crate::batch::BatchStats;
use crate::bus::{AgentHandler, BusError, BusStats, MessageBus};
use crate::cache::CacheStats;
use crate::config::HuddleConfig;
use crate::llm::{GenerationOptions, TextGenerator, make_generator};
use crate::persistence::{InteractionRecord, JsonlStore, PersistenceStore};
use crate::router::{IntentClassifier, RouteError, RouteResponse, Router};
use crate::types::RequestContext;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Telemetry snapshot across all components
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub bus: BusStats,
    pub cache: CacheStats,
    pub batch: BatchStats,
}

pub struct OrchestratorBuilder {
    config: HuddleConfig,
    workspace: Option<PathBuf>,
    generator: Option<Arc<dyn TextGenerator>>,
    classifier: Option<Arc<dyn IntentClassifier>>,
    store: Option<Arc<dyn PersistenceStore>>,
    builtin_agents: bool,
}

impl OrchestratorBuilder {
    /// Resolve relative persistence paths against `workspace`
    pub fn workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    /// Use `generator` instead of the one named in the configuration
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Log interactions to `store` regardless of `[persistence]`
    pub fn store(mut self, store: Arc<dyn PersistenceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Skip registering the retrieval/ideation/analysis agents
    pub fn without_builtin_agents(mut self) -> Self {
        self.builtin_agents = false;
        self
    }

    /// Build and start the runtime. Must be called from within a Tokio
    /// runtime because agent workers are spawned immediately.
    pub fn build(self) -> Result<Orchestrator> {
        let config = self.config;
        let generator = match self.generator {
            Some(generator) => generator,
            None => make_generator(&config.generator).context("failed to create text generator")?,
        };

        let bus = MessageBus::new(config.bus.clone());
        if self.builtin_agents {
            let options = GenerationOptions {
                system_prompt: None,
                max_tokens: Some(config.generator.max_tokens),
                temperature: Some(config.generator.temperature),
            };
            for kind in AgentKind::ALL {
                let name = kind.agent_name(&config.router.agents).to_string();
                let agent = SpecialistAgent::new(kind, generator.clone())
                    .with_name(name.clone())
                    .with_options(options.clone());
                bus.register(name.clone(), agent)
                    .with_context(|| format!("failed to register agent '{}'", name))?;
            }
        }
        bus.start();

        let store = match self.store {
            Some(store) => Some(store),
            None if config.persistence.enabled => {
                let path = match &self.workspace {
                    Some(workspace) if config.persistence.path.is_relative() => {
                        workspace.join(&config.persistence.path)
                    }
                    _ => config.persistence.path.clone(),
                };
                info!(path = %path.display(), "logging interactions");
                Some(Arc::new(JsonlStore::new(path)) as Arc<dyn PersistenceStore>)
            }
            None => None,
        };

        let mut router = Router::new(&config, bus.clone(), generator.clone());
        if let Some(classifier) = self.classifier {
            router = router.with_classifier(classifier);
        }

        info!(
            generator = generator.name(),
            agents = ?bus.agents(),
            "orchestrator ready"
        );

        Ok(Orchestrator {
            config,
            bus,
            router,
            generator,
            store,
        })
    }
}

/// Entry point for routing requests
pub struct Orchestrator {
    config: HuddleConfig,
    bus: MessageBus,
    router: Router,
    generator: Arc<dyn TextGenerator>,
    store: Option<Arc<dyn PersistenceStore>>,
}

impl Orchestrator {
    pub fn builder(config: HuddleConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            workspace: None,
            generator: None,
            classifier: None,
            store: None,
            builtin_agents: true,
        }
    }

    /// Runtime with the built-in agents and the configured generator
    pub fn new(config: HuddleConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub async fn route(
        &self,
        text: &str,
        context: &RequestContext,
    ) -> Result<RouteResponse, RouteError> {
        let started = Instant::now();
        let result = self.router.route(text, context).await;

        if let Some(store) = &self.store {
            let store = store.clone();
            let record = match &result {
                Ok(response) => InteractionRecord::new(text, response),
                Err(err) => {
                    InteractionRecord::failed(text, err, started.elapsed().as_millis() as u64)
                }
            };
            tokio::spawn(async move {
                if let Err(err) = store.log_interaction(record).await {
                    warn!("failed to log interaction: {:#}", err);
                }
            });
        }

        result
    }

    /// Add a custom agent. Route it by naming it in `[router.agents]`.
    pub fn register_agent(
        &self,
        name: impl Into<String>,
        handler: impl AgentHandler,
    ) -> Result<(), BusError> {
        self.bus.register(name, handler)
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn config(&self) -> &HuddleConfig {
        &self.config
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    pub fn stats(&self) -> SystemStats {
        SystemStats {
            bus: self.bus.stats(),
            cache: self.router.cache_stats(),
            batch: self.router.batch_stats(),
        }
    }

    pub async fn shutdown(&self) {
        self.bus.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{HandlerError, Message, handler_fn};
    use crate::llm::EchoGenerator;
    use crate::persistence::{InteractionStatus, MemoryStore};
    use crate::router::RouteStatus;
    use serde_json::Value;
    use std::time::Duration;

    #[tokio::test]
    async fn builds_with_builtin_agents() {
        let orchestrator = Orchestrator::builder(HuddleConfig::default())
            .generator(Arc::new(EchoGenerator::new()))
            .build()
            .unwrap();
        assert_eq!(
            orchestrator.bus().agents(),
            vec!["analysis", "ideation", "retrieval"]
        );
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn interactions_are_logged_in_background() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = Orchestrator::builder(HuddleConfig::default())
            .generator(Arc::new(EchoGenerator::new()))
            .store(store.clone())
            .build()
            .unwrap();

        let response = orchestrator
            .route("brainstorm ideas for the team offsite", &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(response.status, RouteStatus::Answered);
        assert_eq!(response.source_agent, "ideation");

        for _ in 0..50 {
            if !store.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let records = store.recent(1).await.unwrap();
        assert_eq!(records[0].source_agent, "ideation");

        let stats = orchestrator.stats();
        assert_eq!(stats.bus.completed, 1);
        assert_eq!(stats.cache.size, 1);
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn failed_routes_are_logged_as_errors() {
        let mut config = HuddleConfig::default();
        config.bus.retry = crate::config::RetryPolicy::immediate();
        let store = Arc::new(MemoryStore::new());
        let orchestrator = Orchestrator::builder(config)
            .generator(Arc::new(EchoGenerator::new()))
            .store(store.clone())
            .without_builtin_agents()
            .build()
            .unwrap();
        orchestrator
            .register_agent(
                "analysis",
                handler_fn(|_message: Message| async {
                    Err::<Value, _>(HandlerError::fatal("spreadsheet is locked"))
                }),
            )
            .unwrap();

        let err = orchestrator
            .route("Compare the two hiring plans", &RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.agent(), Some("analysis"));

        for _ in 0..50 {
            if !store.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let records = store.recent(1).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, InteractionStatus::Error);
        assert_eq!(records[0].source_agent, "analysis");
        assert!(records[0].response.is_empty());
        assert!(
            records[0]
                .error
                .as_deref()
                .unwrap_or_default()
                .contains("spreadsheet is locked")
        );
        orchestrator.shutdown().await;
    }
}
