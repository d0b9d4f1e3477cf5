/// Agent names registered by the default orchestrator
pub mod agents {
    pub const ORCHESTRATOR: &str = "orchestrator";
    pub const RETRIEVAL: &str = "retrieval";
    pub const IDEATION: &str = "ideation";
    pub const ANALYSIS: &str = "analysis";
}

/// Message delivery defaults
pub mod messages {
    pub const MIN_PRIORITY: u8 = 1;
    pub const MAX_PRIORITY: u8 = 10;
    pub const DEFAULT_PRIORITY: u8 = 5;
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
}

/// Bus sizing and retry backoff defaults
pub mod bus {
    pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
    pub const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 100;
    pub const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;
    pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 2_000;
    pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;
}

pub mod cache {
    pub const DEFAULT_CAPACITY: usize = 512;
    /// 30 minutes
    pub const DEFAULT_TTL_MS: u64 = 30 * 60 * 1000;
}

pub mod batch {
    pub const DEFAULT_WINDOW_MS: u64 = 25;
    pub const DEFAULT_MAX_MEMBERS: usize = 8;
    pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;
}

pub mod compression {
    pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;
    pub const DEFAULT_KEYWORD_WEIGHT: f64 = 2.0;
    pub const DEFAULT_RECENCY_WEIGHT: f64 = 1.0;
    pub const DEFAULT_SALIENT_KEYWORDS: &[&str] = &[
        "decision",
        "decided",
        "agreed",
        "action item",
        "deadline",
        "owner",
        "blocker",
        "risk",
        "follow up",
        "follow-up",
        "budget",
        "todo",
    ];
}

pub mod router {
    pub const DEFAULT_MIN_LENGTH: usize = 12;
    pub const DEFAULT_MAX_LENGTH: usize = 4_000;
    pub const DEFAULT_MULTI_INTENT_THRESHOLD: f64 = 2.0;
    pub const DEFAULT_CONTEXT_BUDGET_TOKENS: i64 = 1_500;
    pub const DEFAULT_AGENT_TIMEOUT_MS: u64 = 60_000;
    pub const DEFAULT_GENERATION_RETRIES: u32 = 1;
    pub const DEFAULT_GENERATION_RETRY_DELAY_MS: u64 = 250;
}

pub mod generator {
    pub const PROVIDER_ECHO: &str = "echo";
    pub const PROVIDER_OPENAI: &str = "openai";
    pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
    pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
    pub const DEFAULT_MAX_TOKENS: u32 = 800;
    pub const DEFAULT_TEMPERATURE: f32 = 0.3;
    pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 45_000;
}

/// Configuration file locations
pub mod files {
    pub const CONFIG_FILE_NAME: &str = "huddle.toml";
    pub const CONFIG_DIR_NAME: &str = ".huddle";
    pub const DEFAULT_INTERACTION_LOG: &str = ".huddle/interactions.jsonl";
}
