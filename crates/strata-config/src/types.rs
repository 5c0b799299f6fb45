//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [platform]               # GraphQL endpoint + credentials
//! [retry]                  # transport retry policy
//! [agent]                  # streaming agent defaults
//! [providers.anthropic]    # direct provider credentials (one table per provider)
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. project-local
/// overrides) can be loaded and layered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Platform endpoint and credentials.
    pub platform: Option<PlatformConfig>,

    /// Transport retry policy.
    pub retry: Option<RetrySection>,

    /// Streaming agent defaults.
    pub agent: Option<AgentSection>,

    /// Direct LLM provider settings keyed by provider name (`openai`, `groq`, ...).
    pub providers: BTreeMap<String, ProviderSection>,
}

impl StrataConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// `[platform]` and `[providers.*]` merge field by field so a project file
    /// can override a single value; `[retry]` and `[agent]` replace wholesale.
    pub fn merge(&mut self, other: StrataConfig) {
        match (&mut self.platform, other.platform) {
            (Some(base), Some(over)) => base.merge(over),
            (slot @ None, Some(over)) => *slot = Some(over),
            _ => {}
        }

        if other.retry.is_some() {
            self.retry = other.retry;
        }

        if other.agent.is_some() {
            self.agent = other.agent;
        }

        for (name, section) in other.providers {
            match self.providers.get_mut(&name) {
                Some(existing) => existing.merge(section),
                None => {
                    self.providers.insert(name, section);
                }
            }
        }
    }

    /// The platform section, or an empty one.
    pub fn platform(&self) -> PlatformConfig {
        self.platform.clone().unwrap_or_default()
    }

    /// The retry section, or defaults.
    pub fn retry(&self) -> RetrySection {
        self.retry.clone().unwrap_or_default()
    }

    /// The agent section, or defaults.
    pub fn agent(&self) -> AgentSection {
        self.agent.clone().unwrap_or_default()
    }

    /// Settings for a named provider, if configured.
    pub fn provider(&self, name: &str) -> Option<&ProviderSection> {
        self.providers.get(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Platform
// ─────────────────────────────────────────────────────────────────────────────

/// `[platform]` section: where the GraphQL API lives and how to authenticate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// GraphQL endpoint URL.
    pub api_uri: Option<String>,
    /// Organization ID used in JWT claims.
    pub organization_id: Option<String>,
    /// Environment ID used in JWT claims.
    pub environment_id: Option<String>,
    /// HS256 signing secret for the JWT.
    pub jwt_secret: Option<String>,
    /// Optional owner scoping for multi-tenant applications.
    pub owner_id: Option<String>,
    /// Optional end-user scoping.
    pub user_id: Option<String>,
    /// Pre-minted bearer token; bypasses local JWT signing.
    pub token: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

impl PlatformConfig {
    fn merge(&mut self, other: PlatformConfig) {
        merge_opt(&mut self.api_uri, other.api_uri);
        merge_opt(&mut self.organization_id, other.organization_id);
        merge_opt(&mut self.environment_id, other.environment_id);
        merge_opt(&mut self.jwt_secret, other.jwt_secret);
        merge_opt(&mut self.owner_id, other.owner_id);
        merge_opt(&mut self.user_id, other.user_id);
        merge_opt(&mut self.token, other.token);
        merge_opt(&mut self.timeout_secs, other.timeout_secs);
    }

    /// The API endpoint, or an error naming how to set it.
    pub fn require_api_uri(&self) -> Result<&str> {
        self.api_uri
            .as_deref()
            .ok_or_else(|| ConfigError::missing("api_uri", "[platform]", "STRATA_API_URI"))
    }

    /// Whether a plaintext secret is stored in this section.
    pub fn has_plaintext_secret(&self) -> bool {
        self.jwt_secret.is_some() || self.token.is_some()
    }

    /// Whether enough is configured to authenticate.
    ///
    /// Either a pre-minted token, or the organization/environment/secret triple.
    pub fn has_credentials(&self) -> bool {
        self.token.is_some()
            || (self.organization_id.is_some()
                && self.environment_id.is_some()
                && self.jwt_secret.is_some())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Retry
// ─────────────────────────────────────────────────────────────────────────────

/// `[retry]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay.
    pub max_delay_ms: u64,
    /// Randomize delays to avoid synchronized retries.
    pub jitter: bool,
    /// HTTP status codes worth retrying.
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 300,
            max_delay_ms: 30_000,
            jitter: true,
            retryable_status_codes: vec![429, 500, 502, 503, 504],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// How streamed text is split into display units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingSetting {
    Character,
    #[default]
    Word,
    Sentence,
}

/// `[agent]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Maximum tool-calling rounds per prompt.
    pub max_tool_rounds: u32,
    /// Completion token limit when the specification sets none.
    pub max_tokens: u32,
    /// Emit message updates in smoothed chunks.
    pub smoothing: bool,
    /// Chunking strategy for smoothing.
    pub chunking: ChunkingSetting,
    /// Delay between smoothed chunks.
    pub smoothing_delay_ms: u64,
    /// Emit per-token message updates at all.
    pub show_token_stream: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_tool_rounds: 100,
            max_tokens: 4096,
            smoothing: false,
            chunking: ChunkingSetting::Word,
            smoothing_delay_ms: 30,
            show_token_stream: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────────────────────────────────────

/// `[providers.<name>]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    /// API key (prefer the provider's environment variable).
    pub api_key: Option<String>,
    /// Override the provider's API base URL.
    pub base_url: Option<String>,
    /// AWS region (Bedrock only).
    pub region: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Retries for transient errors when opening a stream.
    pub max_retries: Option<u32>,
    /// Route inline `<think>` tags to reasoning events.
    pub strip_think_tags: Option<bool>,
    /// Extended thinking token budget (Anthropic, Google).
    pub thinking_budget: Option<u32>,
}

impl ProviderSection {
    fn merge(&mut self, other: ProviderSection) {
        merge_opt(&mut self.api_key, other.api_key);
        merge_opt(&mut self.base_url, other.base_url);
        merge_opt(&mut self.region, other.region);
        merge_opt(&mut self.timeout_secs, other.timeout_secs);
        merge_opt(&mut self.max_retries, other.max_retries);
        merge_opt(&mut self.strip_think_tags, other.strip_think_tags);
        merge_opt(&mut self.thinking_budget, other.thinking_budget);
    }
}

fn merge_opt<T>(base: &mut Option<T>, over: Option<T>) {
    if over.is_some() {
        *base = over;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
