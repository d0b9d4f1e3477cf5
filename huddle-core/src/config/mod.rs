//! Configuration for the Huddle runtime
//!
//! Everything is driven by `huddle.toml`. Every section and field has a
//! default, so an empty file (or no file at all) yields a working runtime.

pub mod constants;
pub mod loader;

pub use loader::ConfigManager;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use constants::{agents, batch, bus, cache, compression, files, generator, router};

/// Main configuration structure for Huddle
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HuddleConfig {
    /// Message bus sizing and retry policy
    #[serde(default)]
    pub bus: BusConfig,

    /// Response cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Request batching
    #[serde(default)]
    pub batch: BatchConfig,

    /// Conversation history compression
    #[serde(default)]
    pub compression: CompressionConfig,

    /// Intent routing
    #[serde(default)]
    pub router: RouterConfig,

    /// Text generation backend
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Interaction log
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Backoff applied between delivery attempts of a failed message
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryPolicy {
    /// Delay before the first retry
    #[serde(default = "default_retry_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Multiplier applied per retry; 1.0 gives a fixed delay
    #[serde(default = "default_retry_multiplier")]
    pub multiplier: f64,

    /// Upper bound for any single delay
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Fixed delay between every attempt
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            initial_delay_ms: delay_ms,
            multiplier: 1.0,
            max_delay_ms: delay_ms,
        }
    }

    /// Re-enqueue immediately
    pub fn immediate() -> Self {
        Self::fixed(0)
    }

    /// Delay before re-delivering a message that has completed `attempt` attempts
    pub fn delay_for(&self, attempt: u32) -> std::time::Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        let delay = (self.initial_delay_ms as f64 * multiplier.powi(exponent)) as u64;
        std::time::Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_retry_initial_delay_ms(),
            multiplier: default_retry_multiplier(),
            max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BusConfig {
    /// Maximum queued messages per agent before `send` rejects
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// How long `shutdown` waits for workers to exit
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            retry: RetryPolicy::default(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of cached responses
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Time-to-live for routed responses
    #[serde(default = "default_cache_ttl_ms")]
    pub default_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_cache_capacity(),
            default_ttl_ms: default_cache_ttl_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How long a group stays open for similar requests
    #[serde(default = "default_batch_window_ms")]
    pub window_ms: u64,

    /// A group dispatches early once it has this many members
    #[serde(default = "default_batch_max_members")]
    pub max_members: usize,

    /// Minimum token-overlap ratio for two requests to share a group
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: default_batch_window_ms(),
            max_members: default_batch_max_members(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompressionConfig {
    /// Phrases that mark a conversation turn as worth keeping
    #[serde(default = "default_salient_keywords")]
    pub salient_keywords: Vec<String>,

    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,

    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,

    /// Rough token estimate: characters per token
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            salient_keywords: default_salient_keywords(),
            keyword_weight: default_keyword_weight(),
            recency_weight: default_recency_weight(),
            chars_per_token: default_chars_per_token(),
        }
    }
}

/// Agent name per routed category
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentNames {
    #[serde(default = "default_retrieval_agent")]
    pub retrieval: String,
    #[serde(default = "default_ideation_agent")]
    pub ideation: String,
    #[serde(default = "default_analysis_agent")]
    pub analysis: String,
}

impl Default for AgentNames {
    fn default() -> Self {
        Self {
            retrieval: default_retrieval_agent(),
            ideation: default_ideation_agent(),
            analysis: default_analysis_agent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterConfig {
    /// Inputs shorter than this are checked against the short command list
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    /// Inputs longer than this are truncated and answered directly
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Score a second category must reach before a request is split
    #[serde(default = "default_multi_intent_threshold")]
    pub multi_intent_threshold: f64,

    /// Token budget for conversation history forwarded to agents
    #[serde(default = "default_context_budget_tokens")]
    pub context_budget_tokens: i64,

    #[serde(default = "default_agent_timeout_ms")]
    pub agent_timeout_ms: u64,

    #[serde(default = "default_agent_max_attempts")]
    pub agent_max_attempts: u32,

    #[serde(default = "default_agent_priority")]
    pub agent_priority: u8,

    /// Router-level retries for generation failures (the bus never retries those)
    #[serde(default = "default_generation_retries")]
    pub generation_retries: u32,

    #[serde(default = "default_generation_retry_delay_ms")]
    pub generation_retry_delay_ms: u64,

    #[serde(default)]
    pub agents: AgentNames,

    /// Extra canned replies for short commands, keyed by command
    #[serde(default)]
    pub short_commands: HashMap<String, String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
            max_length: default_max_length(),
            multi_intent_threshold: default_multi_intent_threshold(),
            context_budget_tokens: default_context_budget_tokens(),
            agent_timeout_ms: default_agent_timeout_ms(),
            agent_max_attempts: default_agent_max_attempts(),
            agent_priority: default_agent_priority(),
            generation_retries: default_generation_retries(),
            generation_retry_delay_ms: default_generation_retry_delay_ms(),
            agents: AgentNames::default(),
            short_commands: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneratorConfig {
    /// `echo` (offline) or `openai` (any OpenAI-compatible endpoint)
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub enabled: bool,

    /// JSON lines file, relative to the workspace
    #[serde(default = "default_interaction_log")]
    pub path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_interaction_log(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_retry_initial_delay_ms() -> u64 {
    bus::DEFAULT_RETRY_INITIAL_DELAY_MS
}
fn default_retry_multiplier() -> f64 {
    bus::DEFAULT_RETRY_MULTIPLIER
}
fn default_retry_max_delay_ms() -> u64 {
    bus::DEFAULT_RETRY_MAX_DELAY_MS
}
fn default_queue_capacity() -> usize {
    bus::DEFAULT_QUEUE_CAPACITY
}
fn default_shutdown_grace_ms() -> u64 {
    bus::DEFAULT_SHUTDOWN_GRACE_MS
}
fn default_cache_capacity() -> usize {
    cache::DEFAULT_CAPACITY
}
fn default_cache_ttl_ms() -> u64 {
    cache::DEFAULT_TTL_MS
}
fn default_batch_window_ms() -> u64 {
    batch::DEFAULT_WINDOW_MS
}
fn default_batch_max_members() -> usize {
    batch::DEFAULT_MAX_MEMBERS
}
fn default_similarity_threshold() -> f64 {
    batch::DEFAULT_SIMILARITY_THRESHOLD
}
fn default_salient_keywords() -> Vec<String> {
    compression::DEFAULT_SALIENT_KEYWORDS
        .iter()
        .map(|k| k.to_string())
        .collect()
}
fn default_keyword_weight() -> f64 {
    compression::DEFAULT_KEYWORD_WEIGHT
}
fn default_recency_weight() -> f64 {
    compression::DEFAULT_RECENCY_WEIGHT
}
fn default_chars_per_token() -> usize {
    compression::DEFAULT_CHARS_PER_TOKEN
}
fn default_retrieval_agent() -> String {
    agents::RETRIEVAL.to_string()
}
fn default_ideation_agent() -> String {
    agents::IDEATION.to_string()
}
fn default_analysis_agent() -> String {
    agents::ANALYSIS.to_string()
}
fn default_min_length() -> usize {
    router::DEFAULT_MIN_LENGTH
}
fn default_max_length() -> usize {
    router::DEFAULT_MAX_LENGTH
}
fn default_multi_intent_threshold() -> f64 {
    router::DEFAULT_MULTI_INTENT_THRESHOLD
}
fn default_context_budget_tokens() -> i64 {
    router::DEFAULT_CONTEXT_BUDGET_TOKENS
}
fn default_agent_timeout_ms() -> u64 {
    router::DEFAULT_AGENT_TIMEOUT_MS
}
fn default_agent_max_attempts() -> u32 {
    constants::messages::DEFAULT_MAX_ATTEMPTS
}
fn default_agent_priority() -> u8 {
    constants::messages::DEFAULT_PRIORITY
}
fn default_generation_retries() -> u32 {
    router::DEFAULT_GENERATION_RETRIES
}
fn default_generation_retry_delay_ms() -> u64 {
    router::DEFAULT_GENERATION_RETRY_DELAY_MS
}
fn default_provider() -> String {
    generator::PROVIDER_ECHO.to_string()
}
fn default_base_url() -> String {
    generator::DEFAULT_BASE_URL.to_string()
}
fn default_model() -> String {
    generator::DEFAULT_MODEL.to_string()
}
fn default_api_key_env() -> String {
    generator::DEFAULT_API_KEY_ENV.to_string()
}
fn default_max_tokens() -> u32 {
    generator::DEFAULT_MAX_TOKENS
}
fn default_temperature() -> f32 {
    generator::DEFAULT_TEMPERATURE
}
fn default_request_timeout_ms() -> u64 {
    generator::DEFAULT_REQUEST_TIMEOUT_MS
}
fn default_interaction_log() -> PathBuf {
    PathBuf::from(files::DEFAULT_INTERACTION_LOG)
}
