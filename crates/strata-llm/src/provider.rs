//! Provider identification, backend construction and model-name resolution.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::anthropic::{AnthropicBackend, AnthropicConfig};
use crate::backend::SharedBackend;
use crate::cohere::{CohereBackend, CohereConfig};
use crate::error::{LlmError, Result};
use crate::google::{GoogleBackend, GoogleConfig};
use crate::openai::{OpenAiBackend, OpenAiConfig};

/// Region used for Bedrock when none is configured.
const DEFAULT_BEDROCK_REGION: &str = "us-east-1";

// ─────────────────────────────────────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────────────────────────────────────

/// A model provider the agent can stream from directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
    Groq,
    Cerebras,
    Cohere,
    Mistral,
    Bedrock,
    Deepseek,
}

impl Provider {
    pub const ALL: [Provider; 9] = [
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Google,
        Provider::Groq,
        Provider::Cerebras,
        Provider::Cohere,
        Provider::Mistral,
        Provider::Bedrock,
        Provider::Deepseek,
    ];

    /// Lowercase config name, e.g. `openai`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Groq => "groq",
            Provider::Cerebras => "cerebras",
            Provider::Cohere => "cohere",
            Provider::Mistral => "mistral",
            Provider::Bedrock => "bedrock",
            Provider::Deepseek => "deepseek",
        }
    }

    /// Environment variable holding the provider's API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::Google => "GOOGLE_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
            Provider::Cerebras => "CEREBRAS_API_KEY",
            Provider::Cohere => "COHERE_API_KEY",
            Provider::Mistral => "MISTRAL_API_KEY",
            Provider::Bedrock => "AWS_BEARER_TOKEN_BEDROCK",
            Provider::Deepseek => "DEEPSEEK_API_KEY",
        }
    }

    /// Default API base URL. Bedrock's depends on the region.
    pub fn default_base_url(&self, region: Option<&str>) -> String {
        match self {
            Provider::OpenAi => OpenAiConfig::openai("").base_url,
            Provider::Groq => OpenAiConfig::groq("").base_url,
            Provider::Cerebras => OpenAiConfig::cerebras("").base_url,
            Provider::Mistral => OpenAiConfig::mistral("").base_url,
            Provider::Deepseek => OpenAiConfig::deepseek("").base_url,
            Provider::Bedrock => {
                OpenAiConfig::bedrock("", region.unwrap_or(DEFAULT_BEDROCK_REGION)).base_url
            }
            Provider::Anthropic => AnthropicConfig::new("").base_url,
            Provider::Google => GoogleConfig::new("").base_url,
            Provider::Cohere => CohereConfig::new("").base_url,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', '-'], "");
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| LlmError::Config(format!("Unknown provider: {}", s)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Everything needed to construct one provider backend.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub provider: Provider,
    pub api_key: String,
    pub base_url: Option<String>,
    /// AWS region (Bedrock only).
    pub region: Option<String>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    /// Overrides the provider's default for `<think>` tag splitting.
    pub strip_think_tags: Option<bool>,
    /// Extended thinking budget passed on every request to this provider.
    pub thinking_budget: Option<u32>,
}

impl ProviderSettings {
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            base_url: None,
            region: None,
            timeout: None,
            max_retries: None,
            strip_think_tags: None,
            thinking_budget: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn with_strip_think_tags(mut self, enabled: bool) -> Self {
        self.strip_think_tags = Some(enabled);
        self
    }

    pub fn with_thinking_budget(mut self, budget: u32) -> Self {
        self.thinking_budget = Some(budget);
        self
    }

    /// Construct the backend these settings describe.
    pub fn build(&self) -> Result<SharedBackend> {
        if self.api_key.trim().is_empty() {
            return Err(LlmError::Config(format!(
                "No API key for provider {} (set {})",
                self.provider,
                self.provider.env_var()
            )));
        }
        let key = self.api_key.clone();

        let backend: SharedBackend = match self.provider {
            Provider::Anthropic => {
                let mut config = AnthropicConfig::new(key);
                if let Some(url) = &self.base_url {
                    config = config.with_base_url(url);
                }
                if let Some(timeout) = self.timeout {
                    config = config.with_timeout(timeout);
                }
                if let Some(retries) = self.max_retries {
                    config = config.with_max_retries(retries);
                }
                Arc::new(AnthropicBackend::new(config)?)
            }
            Provider::Google => {
                let mut config = GoogleConfig::new(key);
                if let Some(url) = &self.base_url {
                    config = config.with_base_url(url);
                }
                if let Some(timeout) = self.timeout {
                    config = config.with_timeout(timeout);
                }
                if let Some(retries) = self.max_retries {
                    config = config.with_max_retries(retries);
                }
                Arc::new(GoogleBackend::new(config)?)
            }
            Provider::Cohere => {
                let mut config = CohereConfig::new(key);
                if let Some(url) = &self.base_url {
                    config = config.with_base_url(url);
                }
                if let Some(retries) = self.max_retries {
                    config = config.with_max_retries(retries);
                }
                Arc::new(CohereBackend::new(config)?)
            }
            openai_family => {
                let mut config = match openai_family {
                    Provider::Groq => OpenAiConfig::groq(key),
                    Provider::Cerebras => OpenAiConfig::cerebras(key),
                    Provider::Mistral => OpenAiConfig::mistral(key),
                    Provider::Deepseek => OpenAiConfig::deepseek(key),
                    Provider::Bedrock => OpenAiConfig::bedrock(
                        key,
                        self.region.as_deref().unwrap_or(DEFAULT_BEDROCK_REGION),
                    ),
                    _ => OpenAiConfig::openai(key),
                };
                if let Some(url) = &self.base_url {
                    config = config.with_base_url(url);
                }
                if let Some(timeout) = self.timeout {
                    config = config.with_timeout(timeout);
                }
                if let Some(retries) = self.max_retries {
                    config = config.with_max_retries(retries);
                }
                if let Some(strip) = self.strip_think_tags {
                    config = config.with_strip_think_tags(strip);
                }
                Arc::new(OpenAiBackend::new(config)?)
            }
        };
        Ok(backend)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

struct Registered {
    backend: SharedBackend,
    thinking_budget: Option<u32>,
}

/// Configured backends keyed by provider.
#[derive(Default)]
pub struct ProviderRegistry {
    backends: HashMap<Provider, Registered>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers = self.providers();
        providers.sort();
        f.debug_struct("ProviderRegistry")
            .field("providers", &providers)
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from explicit settings.
    pub fn from_settings(settings: impl IntoIterator<Item = ProviderSettings>) -> Result<Self> {
        let mut registry = Self::new();
        for s in settings {
            let backend = s.build()?;
            tracing::debug!(provider = %s.provider, "Registered LLM backend");
            registry.backends.insert(
                s.provider,
                Registered {
                    backend,
                    thinking_budget: s.thinking_budget,
                },
            );
        }
        Ok(registry)
    }

    /// Build a registry from provider API keys in the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Build a registry using a custom environment lookup.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let settings = Provider::ALL.into_iter().filter_map(|provider| {
            let key = lookup(provider.env_var())?;
            let mut s = ProviderSettings::new(provider, key);
            if provider == Provider::Bedrock
                && let Some(region) = lookup("AWS_REGION")
            {
                s = s.with_region(region);
            }
            Some(s)
        });
        Self::from_settings(settings.collect::<Vec<_>>())
    }

    /// Register a backend directly (tests, custom providers).
    pub fn register(&mut self, provider: Provider, backend: SharedBackend) {
        self.backends.insert(
            provider,
            Registered {
                backend,
                thinking_budget: None,
            },
        );
    }

    pub fn get(&self, provider: Provider) -> Option<SharedBackend> {
        self.backends.get(&provider).map(|r| Arc::clone(&r.backend))
    }

    pub fn contains(&self, provider: Provider) -> bool {
        self.backends.contains_key(&provider)
    }

    pub fn thinking_budget(&self, provider: Provider) -> Option<u32> {
        self.backends.get(&provider).and_then(|r| r.thinking_budget)
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.backends.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Model Names
// ─────────────────────────────────────────────────────────────────────────────

/// Platform model enums and the provider API ids they stand for.
const MODEL_TABLE: &[(Provider, &str, &str)] = &[
    (Provider::OpenAi, "GPT4O_128K", "gpt-4o"),
    (Provider::OpenAi, "GPT4O_MINI_128K", "gpt-4o-mini"),
    (Provider::OpenAi, "GPT41_1024K", "gpt-4.1"),
    (Provider::OpenAi, "GPT41_MINI_1024K", "gpt-4.1-mini"),
    (Provider::OpenAi, "GPT41_NANO_1024K", "gpt-4.1-nano"),
    (Provider::OpenAi, "O3_200K", "o3"),
    (Provider::OpenAi, "O3_MINI_200K", "o3-mini"),
    (Provider::OpenAi, "O4_MINI_200K", "o4-mini"),
    (Provider::OpenAi, "GPT5_400K", "gpt-5"),
    (Provider::OpenAi, "GPT5_MINI_400K", "gpt-5-mini"),
    (Provider::Anthropic, "CLAUDE_3_5_HAIKU", "claude-3-5-haiku-latest"),
    (Provider::Anthropic, "CLAUDE_3_7_SONNET", "claude-3-7-sonnet-latest"),
    (Provider::Anthropic, "CLAUDE_4_SONNET", "claude-sonnet-4-0"),
    (Provider::Anthropic, "CLAUDE_4_OPUS", "claude-opus-4-0"),
    (Provider::Anthropic, "CLAUDE_4_1_OPUS", "claude-opus-4-1"),
    (Provider::Anthropic, "CLAUDE_4_5_SONNET", "claude-sonnet-4-5"),
    (Provider::Google, "GEMINI_2_0_FLASH", "gemini-2.0-flash"),
    (Provider::Google, "GEMINI_2_5_FLASH", "gemini-2.5-flash"),
    (Provider::Google, "GEMINI_2_5_FLASH_LITE", "gemini-2.5-flash-lite"),
    (Provider::Google, "GEMINI_2_5_PRO", "gemini-2.5-pro"),
    (Provider::Groq, "LLAMA_3_3_70B", "llama-3.3-70b-versatile"),
    (Provider::Groq, "LLAMA_3_1_8B", "llama-3.1-8b-instant"),
    (Provider::Groq, "DEEPSEEK_R1_LLAMA_70B", "deepseek-r1-distill-llama-70b"),
    (Provider::Groq, "QWEN_3_32B", "qwen/qwen3-32b"),
    (Provider::Groq, "KIMI_K2_INSTRUCT", "moonshotai/kimi-k2-instruct"),
    (Provider::Cerebras, "LLAMA_3_3_70B", "llama-3.3-70b"),
    (Provider::Cerebras, "LLAMA_3_1_8B", "llama3.1-8b"),
    (Provider::Cerebras, "QWEN_3_32B", "qwen-3-32b"),
    (Provider::Cohere, "COMMAND_A", "command-a-03-2025"),
    (Provider::Cohere, "COMMAND_R_PLUS", "command-r-plus"),
    (Provider::Cohere, "COMMAND_R", "command-r"),
    (Provider::Cohere, "COMMAND_R7B", "command-r7b-12-2024"),
    (Provider::Mistral, "MISTRAL_LARGE", "mistral-large-latest"),
    (Provider::Mistral, "MISTRAL_MEDIUM", "mistral-medium-latest"),
    (Provider::Mistral, "MISTRAL_SMALL", "mistral-small-latest"),
    (Provider::Mistral, "CODESTRAL", "codestral-latest"),
    (Provider::Bedrock, "GPT_OSS_120B", "openai.gpt-oss-120b-1:0"),
    (Provider::Bedrock, "GPT_OSS_20B", "openai.gpt-oss-20b-1:0"),
    (Provider::Deepseek, "DEEPSEEK_CHAT", "deepseek-chat"),
    (Provider::Deepseek, "DEEPSEEK_REASONER", "deepseek-reasoner"),
];

/// Resolve the provider API model id for a specification.
///
/// An explicit `model_name` wins. Otherwise the platform enum is looked up;
/// unknown enums resolve to `None` so callers can fall back to the
/// platform's own prompting.
pub fn resolve_model_name(
    provider: Provider,
    model_enum: Option<&str>,
    model_name: Option<&str>,
) -> Option<String> {
    if let Some(name) = model_name.map(str::trim).filter(|n| !n.is_empty()) {
        return Some(name.to_string());
    }
    let model_enum = model_enum?;
    MODEL_TABLE
        .iter()
        .find(|(p, e, _)| *p == provider && *e == model_enum)
        .map(|(_, _, id)| (*id).to_string())
}
