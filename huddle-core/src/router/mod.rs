//! Intent routing
//!
//! The router decides who answers a request and drives the optimization
//! pipeline around that decision:
//!
//! ```text
//! classify -> cache lookup -> compress history -> batch submit -> bus send -> cache put
//! ```
//!
//! Trivial inputs (blank text, greetings, help) are answered before
//! classification and never touch the bus.

pub mod classifier;

pub use classifier::{Classification, IntentCategory, IntentClassifier, KeywordClassifier};

use crate::batch::{BatchAbandoned, BatchAggregator, BatchStats};
use crate::bus::{BusError, HandlerErrorKind, Message, MessageBus};
use crate::cache::{CacheStats, ResponseCache, cache_key};
use crate::compression::ContextCompressor;
use crate::config::HuddleConfig;
use crate::config::RouterConfig;
use crate::config::constants::agents::ORCHESTRATOR;
use crate::llm::{GenerationError, GenerationOptions, TextGenerator};
use crate::types::{ConversationTurn, RequestContext, normalize_text};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const GUIDANCE_TEXT: &str = "Ask me about your meetings: what was decided, ideas for the next \
     session, or an analysis of past discussions. Type `help` for examples.";

const NOT_FOUND_TEXT: &str = "I couldn't find anything relevant to that request.";

const DIRECT_SYSTEM_PROMPT: &str = "You are Huddle, a concise meeting assistant. Answer \
     directly and briefly.";

const DEFAULT_SHORT_COMMANDS: &[(&str, &str)] = &[
    (
        "help",
        "Try: \"What did we decide about the launch date?\", \"Brainstorm agenda ideas for \
         Friday\" or \"Compare this sprint's blockers with last sprint's\".",
    ),
    ("hi", "Hi! What would you like to know about your meetings?"),
    ("hello", "Hello! What would you like to know about your meetings?"),
    ("thanks", "You're welcome."),
    ("thank you", "You're welcome."),
    (
        "stats",
        "Runtime statistics are available with `huddle stats` or `/stats` in chat.",
    ),
];

static SENTENCE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[^.!?\n]+[.!?]*").ok());

/// How a request was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Answered,
    /// The destination produced no content
    NotFound,
    /// The input was empty; the reply explains what to ask
    Guidance,
}

/// Pipeline steps, recorded in execution order on every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStage {
    ShortCircuit,
    Classify,
    CacheLookup,
    Compress,
    BatchSubmit,
    BusSend,
    CachePut,
    DirectAnswer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    pub text: String,
    /// Agent that produced the answer; comma separated for split requests
    pub source_agent: String,
    pub served_from_cache: bool,
    /// Shared an upstream call with other concurrent requests
    pub coalesced: bool,
    pub latency_ms: u64,
    pub category: IntentCategory,
    pub confidence: f64,
    pub status: RouteStatus,
    pub stages: Vec<RouteStage>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RouteError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    BatchAbandoned(#[from] BatchAbandoned),
}

impl RouteError {
    /// Generation failures the router may retry, whether raised locally or
    /// reported by an agent through the bus
    pub fn is_retryable_generation(&self) -> bool {
        match self {
            RouteError::Generation(err) => err.is_retryable(),
            RouteError::Bus(BusError::Handler { cause, .. }) => {
                cause.kind == HandlerErrorKind::Generation && cause.generation_retryable
            }
            _ => false,
        }
    }

    /// Agent the failure came from, when it came from one
    pub fn agent(&self) -> Option<&str> {
        match self {
            RouteError::Bus(
                BusError::Handler { agent, .. }
                | BusError::Timeout { agent, .. }
                | BusError::QueueFull { agent, .. },
            ) => Some(agent.as_str()),
            RouteError::Bus(BusError::UnknownAgent(agent)) => Some(agent.as_str()),
            _ => None,
        }
    }
}

/// One batch member's request to an agent
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub text: String,
    pub history: Vec<ConversationTurn>,
    pub documents: Vec<String>,
    pub attributes: HashMap<String, String>,
}

#[derive(Debug)]
struct Answer {
    text: String,
    agent: String,
    from_cache: bool,
    coalesced: bool,
    stages: Vec<RouteStage>,
}

pub struct Router {
    config: RouterConfig,
    classifier: Arc<dyn IntentClassifier>,
    bus: MessageBus,
    generator: Arc<dyn TextGenerator>,
    options: GenerationOptions,
    cache: Arc<ResponseCache<String>>,
    cache_enabled: bool,
    batcher: BatchAggregator<AgentRequest, String, RouteError>,
    compressor: ContextCompressor,
    short_commands: HashMap<String, String>,
}

impl Router {
    pub fn new(config: &HuddleConfig, bus: MessageBus, generator: Arc<dyn TextGenerator>) -> Self {
        let mut short_commands: HashMap<String, String> = DEFAULT_SHORT_COMMANDS
            .iter()
            .map(|(command, reply)| (command.to_string(), reply.to_string()))
            .collect();
        for (command, reply) in &config.router.short_commands {
            short_commands.insert(normalize_text(command), reply.clone());
        }

        Self {
            config: config.router.clone(),
            classifier: Arc::new(KeywordClassifier::default()),
            bus,
            generator,
            options: GenerationOptions {
                system_prompt: Some(DIRECT_SYSTEM_PROMPT.to_string()),
                max_tokens: Some(config.generator.max_tokens),
                temperature: Some(config.generator.temperature),
            },
            cache: Arc::new(ResponseCache::from_config(&config.cache)),
            cache_enabled: config.cache.enabled,
            batcher: BatchAggregator::new(&config.batch),
            compressor: ContextCompressor::new(config.compression.clone()),
            short_commands,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn classifier(&self) -> &dyn IntentClassifier {
        self.classifier.as_ref()
    }

    pub fn cache(&self) -> &Arc<ResponseCache<String>> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn batch_stats(&self) -> BatchStats {
        self.batcher.stats()
    }

    /// Agent registered for `category`; `None` for Direct
    pub fn agent_for(&self, category: IntentCategory) -> Option<&str> {
        match category {
            IntentCategory::Retrieval => Some(&self.config.agents.retrieval),
            IntentCategory::Ideation => Some(&self.config.agents.ideation),
            IntentCategory::Analysis => Some(&self.config.agents.analysis),
            IntentCategory::Direct => None,
        }
    }

    pub async fn route(
        &self,
        text: &str,
        context: &RequestContext,
    ) -> Result<RouteResponse, RouteError> {
        let started = Instant::now();
        let trimmed = text.trim();

        if trimmed.is_empty() {
            return Ok(Self::short_circuit(GUIDANCE_TEXT, RouteStatus::Guidance, started));
        }

        let length = trimmed.chars().count();
        if length < self.config.min_length {
            if let Some(reply) = self.short_commands.get(&normalize_text(trimmed)) {
                debug!(command = trimmed, "answering short command");
                return Ok(Self::short_circuit(reply, RouteStatus::Answered, started));
            }
        }

        if length > self.config.max_length {
            let truncated: String = trimmed.chars().take(self.config.max_length).collect();
            info!(
                length,
                max_length = self.config.max_length,
                "request too long, answering directly"
            );
            let answer = self.answer_directly(&truncated, context).await?;
            return Ok(Self::finish(answer, IntentCategory::Direct, 1.0, started));
        }

        let classification = self.classifier.classify(trimmed);
        debug!(
            category = %classification.category,
            confidence = classification.confidence,
            "classified request"
        );

        let strong = classification.strong_delegated(self.config.multi_intent_threshold);
        if strong.len() >= 2 {
            if let Some(response) = self
                .route_split(trimmed, context, &classification, started)
                .await?
            {
                return Ok(response);
            }
        }

        let mut answer = self
            .answer(classification.category, trimmed, context)
            .await?;
        answer.stages.insert(0, RouteStage::Classify);
        Ok(Self::finish(
            answer,
            classification.category,
            classification.confidence,
            started,
        ))
    }

    fn short_circuit(text: &str, status: RouteStatus, started: Instant) -> RouteResponse {
        RouteResponse {
            text: text.to_string(),
            source_agent: ORCHESTRATOR.to_string(),
            served_from_cache: false,
            coalesced: false,
            latency_ms: started.elapsed().as_millis() as u64,
            category: IntentCategory::Direct,
            confidence: 1.0,
            status,
            stages: vec![RouteStage::ShortCircuit],
        }
    }

    fn finish(
        answer: Answer,
        category: IntentCategory,
        confidence: f64,
        started: Instant,
    ) -> RouteResponse {
        let (text, status) = if answer.text.trim().is_empty() {
            (NOT_FOUND_TEXT.to_string(), RouteStatus::NotFound)
        } else {
            (answer.text, RouteStatus::Answered)
        };
        RouteResponse {
            text,
            source_agent: answer.agent,
            served_from_cache: answer.from_cache,
            coalesced: answer.coalesced,
            latency_ms: started.elapsed().as_millis() as u64,
            category,
            confidence,
            status,
            stages: answer.stages,
        }
    }

    async fn answer(
        &self,
        category: IntentCategory,
        text: &str,
        context: &RequestContext,
    ) -> Result<Answer, RouteError> {
        match self.agent_for(category) {
            Some(agent) => self.delegate(agent, text, context).await,
            None => self.answer_directly(text, context).await,
        }
    }

    /// Handle a request mixing several intents: answer each part with its
    /// own agent and stitch the results together under headings. Returns
    /// `None` when the text cannot be split into at least two parts.
    async fn route_split(
        &self,
        text: &str,
        context: &RequestContext,
        classification: &Classification,
        started: Instant,
    ) -> Result<Option<RouteResponse>, RouteError> {
        let parts = self.split_by_intent(text);
        if parts.len() < 2 {
            return Ok(None);
        }
        info!(parts = parts.len(), "splitting multi-intent request");

        let mut sections = Vec::with_capacity(parts.len());
        let mut agents = Vec::with_capacity(parts.len());
        let mut stages = vec![RouteStage::Classify];
        let mut all_cached = true;
        let mut coalesced = false;
        let mut found_any = false;

        for (category, segment) in parts {
            let answer = self.answer(category, &segment, context).await?;
            let body = if answer.text.trim().is_empty() {
                NOT_FOUND_TEXT.to_string()
            } else {
                found_any = true;
                answer.text.trim().to_string()
            };
            sections.push(format!("## {}\n{}", category.heading(), body));
            agents.push(answer.agent);
            stages.extend(answer.stages);
            all_cached &= answer.from_cache;
            coalesced |= answer.coalesced;
        }

        Ok(Some(RouteResponse {
            text: sections.join("\n\n"),
            source_agent: agents.join(","),
            served_from_cache: all_cached,
            coalesced,
            latency_ms: started.elapsed().as_millis() as u64,
            category: classification.category,
            confidence: classification.confidence,
            status: if found_any {
                RouteStatus::Answered
            } else {
                RouteStatus::NotFound
            },
            stages,
        }))
    }

    /// Group sentences by their strongest delegated intent, keeping the
    /// order in which each intent first appears. Sentences with no
    /// delegated signal stay with the part before them.
    fn split_by_intent(&self, text: &str) -> Vec<(IntentCategory, String)> {
        let sentences: Vec<&str> = match SENTENCE.as_ref() {
            Some(pattern) => pattern
                .find_iter(text)
                .map(|m| m.as_str().trim())
                .filter(|s| !s.is_empty())
                .collect(),
            None => vec![text],
        };

        let mut parts: Vec<(IntentCategory, Vec<&str>)> = Vec::new();
        let mut leading: Vec<&str> = Vec::new();
        let mut current: Option<usize> = None;

        for sentence in sentences {
            let classification = self.classifier.classify(sentence);
            let best = classification
                .scores
                .iter()
                .filter(|(category, score)| category.is_delegated() && *score > 0.0)
                .fold(None::<(IntentCategory, f64)>, |best, (category, score)| match best {
                    Some((_, top)) if top >= *score => best,
                    _ => Some((*category, *score)),
                })
                .map(|(category, _)| category);

            match best {
                Some(category) => {
                    let index = match parts.iter().position(|(c, _)| *c == category) {
                        Some(index) => index,
                        None => {
                            parts.push((category, Vec::new()));
                            parts.len() - 1
                        }
                    };
                    if !leading.is_empty() {
                        parts[index].1.append(&mut leading);
                    }
                    parts[index].1.push(sentence);
                    current = Some(index);
                }
                None => match current {
                    Some(index) => parts[index].1.push(sentence),
                    None => leading.push(sentence),
                },
            }
        }

        parts
            .into_iter()
            .map(|(category, sentences)| (category, sentences.join(" ")))
            .collect()
    }

    async fn delegate(
        &self,
        agent: &str,
        text: &str,
        context: &RequestContext,
    ) -> Result<Answer, RouteError> {
        let mut stages = Vec::new();
        let key = cache_key(agent, text, context);

        if self.cache_enabled {
            stages.push(RouteStage::CacheLookup);
            if let Some(hit) = self.cache.get(&key) {
                debug!(agent, "served from cache");
                return Ok(Answer {
                    text: hit,
                    agent: agent.to_string(),
                    from_cache: true,
                    coalesced: false,
                    stages,
                });
            }
        }

        stages.push(RouteStage::Compress);
        let compressed = self
            .compressor
            .compress(&context.history, self.config.context_budget_tokens);
        // only requests with the same question and the same context share
        // a group, so one reply is correct for every member
        let scope = batch_scope(&key, &compressed.turns);
        let request = AgentRequest {
            text: text.to_string(),
            history: compressed.turns,
            documents: context.documents.clone(),
            attributes: context.attributes.clone(),
        };

        let mut retries = 0;
        let outcome = loop {
            stages.push(RouteStage::BatchSubmit);
            let log = Arc::new(Mutex::new(Vec::new()));
            let dispatch = self.dispatcher(agent, log.clone());
            let result = self
                .batcher
                .submit(&scope, text, request.clone(), dispatch)
                .await;
            stages.extend(log.lock().drain(..));

            match result {
                Ok(outcome) => break outcome,
                Err(err)
                    if err.is_retryable_generation() && retries < self.config.generation_retries =>
                {
                    retries += 1;
                    warn!(agent, retries, "agent generation failed, retrying: {}", err);
                    tokio::time::sleep(Duration::from_millis(
                        self.config.generation_retry_delay_ms,
                    ))
                    .await;
                }
                Err(err) => return Err(err),
            }
        };

        if self.cache_enabled && !outcome.value.trim().is_empty() {
            self.cache
                .put(key, outcome.value.clone(), self.cache.default_ttl());
            stages.push(RouteStage::CachePut);
        }

        Ok(Answer {
            text: outcome.value.clone(),
            agent: agent.to_string(),
            from_cache: false,
            coalesced: outcome.was_coalesced(),
            stages,
        })
    }

    /// Closure sending one request for a whole batch group
    fn dispatcher(
        &self,
        agent: &str,
        log: Arc<Mutex<Vec<RouteStage>>>,
    ) -> impl FnOnce(Vec<AgentRequest>) -> BoxFuture<'static, Result<String, RouteError>>
    + Send
    + 'static {
        let bus = self.bus.clone();
        let agent = agent.to_string();
        let options = SendOptions {
            priority: self.config.agent_priority,
            max_attempts: self.config.agent_max_attempts,
            timeout_ms: self.config.agent_timeout_ms,
        };
        move |items: Vec<AgentRequest>| -> BoxFuture<'static, Result<String, RouteError>> {
            Box::pin(send_group(bus, agent, items, options, log))
        }
    }

    async fn answer_directly(
        &self,
        text: &str,
        context: &RequestContext,
    ) -> Result<Answer, RouteError> {
        let compressed = self
            .compressor
            .compress(&context.history, self.config.context_budget_tokens);

        let mut retries = 0;
        loop {
            match self
                .generator
                .generate(text, &compressed.turns, &self.options)
                .await
            {
                Ok(generation) => {
                    return Ok(Answer {
                        text: generation.text,
                        agent: ORCHESTRATOR.to_string(),
                        from_cache: false,
                        coalesced: false,
                        stages: vec![RouteStage::Compress, RouteStage::DirectAnswer],
                    });
                }
                Err(err) if err.is_retryable() && retries < self.config.generation_retries => {
                    retries += 1;
                    warn!(retries, "direct generation failed, retrying: {}", err);
                    tokio::time::sleep(Duration::from_millis(
                        self.config.generation_retry_delay_ms,
                    ))
                    .await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SendOptions {
    priority: u8,
    max_attempts: u32,
    timeout_ms: u64,
}

/// Batch scope for a delegated request: its cache key plus the compressed
/// history the agent will see
fn batch_scope(key: &str, history: &[ConversationTurn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    for turn in history {
        hasher.update([0u8]);
        hasher.update(serde_json::to_vec(turn).unwrap_or_default());
    }
    format!("{:x}", hasher.finalize())
}

/// Send one request for a batch group. Members share a batch scope, so the
/// leader's request stands for all of them.
async fn send_group(
    bus: MessageBus,
    agent: String,
    items: Vec<AgentRequest>,
    options: SendOptions,
    log: Arc<Mutex<Vec<RouteStage>>>,
) -> Result<String, RouteError> {
    let Some(leader) = items.first() else {
        return Err(RouteError::BatchAbandoned(BatchAbandoned));
    };

    let message = Message::request(
        ORCHESTRATOR,
        agent.as_str(),
        json!({ "text": leader.text, "documents": leader.documents }),
    )
    .with_priority(options.priority)
    .with_max_attempts(options.max_attempts)
    .with_timeout_ms(options.timeout_ms)
    .with_context(
        "history",
        serde_json::to_value(&leader.history).unwrap_or(Value::Null),
    )
    .with_context(
        "attributes",
        serde_json::to_value(&leader.attributes).unwrap_or(Value::Null),
    )
    .with_context("batch_size", json!(items.len()));

    log.lock().push(RouteStage::BusSend);
    debug!(agent = %agent, members = items.len(), "sending batch group");
    let delivery = bus.request(message).await?;
    Ok(reply_text(delivery.value()))
}

fn reply_text(value: &Value) -> String {
    value
        .get("text")
        .and_then(Value::as_str)
        .or_else(|| value.as_str())
        .unwrap_or_default()
        .to_string()
}
