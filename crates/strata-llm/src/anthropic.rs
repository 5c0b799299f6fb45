//! Anthropic API backend implementation.
//!
//! Our request types already follow the Messages API shape, so conversion is
//! mostly borrowing. The SSE stream maps one-to-one onto [`StreamEvent`].

use async_trait::async_trait;
use reqwest::{Client, header};
use std::collections::HashSet;
use std::time::Duration;

use crate::backend::{
    BlockStart, ContentDelta, LlmBackend, ResponseStream, StreamEvent, error_from_response,
    with_retry,
};
use crate::error::{LlmError, Result};
use crate::sse::{SseDecoder, decode_sse};
use crate::types::{
    CompletionRequest, Content, ContentBlock, Message, StopReason, ToolChoice, ToolDefinition,
    Usage,
};

/// Default API base URL.
const DEFAULT_API_BASE: &str = "https://api.anthropic.com";

/// Default API version.
const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Default timeout for requests.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Headroom added on top of the thinking budget for the visible answer.
const THINKING_ANSWER_TOKENS: u32 = 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the Anthropic backend.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key for authentication.
    pub api_key: String,

    /// Base URL for the API.
    pub base_url: String,

    /// API version header.
    pub api_version: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Maximum retries for transient errors.
    pub max_retries: u32,

    /// Initial backoff duration for retries.
    pub retry_backoff: Duration,
}

impl AnthropicConfig {
    /// Create a new config with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set max retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set retry backoff.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Anthropic Backend
// ─────────────────────────────────────────────────────────────────────────────

/// Anthropic API backend.
pub struct AnthropicBackend {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicBackend {
    /// Create a new Anthropic backend with the given configuration.
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Add authentication and API headers to a request.
    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .header(header::CONTENT_TYPE, "application/json")
    }
}

/// Wire request; borrows everything except the filtered messages.
#[derive(Debug, serde::Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolDefinition],
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    stop_sequences: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
    stream: bool,
}

#[derive(Debug, serde::Serialize)]
struct ThinkingConfig {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

impl<'a> AnthropicRequest<'a> {
    fn from_request(request: &'a CompletionRequest) -> Self {
        let thinking = request.thinking_budget.map(|budget| ThinkingConfig {
            kind: "enabled",
            budget_tokens: budget,
        });
        // Extended thinking requires max_tokens above the budget and no sampling overrides.
        let (max_tokens, temperature, top_p) = match request.thinking_budget {
            Some(budget) => (
                request.max_tokens.max(budget + THINKING_ANSWER_TOKENS),
                None,
                None,
            ),
            None => (request.max_tokens, request.temperature, request.top_p),
        };

        Self {
            model: &request.model,
            max_tokens,
            messages: request.messages.iter().map(strip_unsigned_thinking).collect(),
            system: request.system.as_deref(),
            tools: &request.tools,
            tool_choice: if request.tools.is_empty() {
                None
            } else {
                request.tool_choice.as_ref()
            },
            temperature,
            top_p,
            stop_sequences: &request.stop_sequences,
            thinking,
            stream: true,
        }
    }
}

/// Drop thinking blocks without a signature; the API rejects them.
fn strip_unsigned_thinking(message: &Message) -> Message {
    match &message.content {
        Content::Text(_) => message.clone(),
        Content::Blocks(blocks) => Message {
            role: message.role,
            content: Content::Blocks(
                blocks
                    .iter()
                    .filter(|b| {
                        !matches!(
                            b,
                            ContentBlock::Thinking {
                                signature: None,
                                ..
                            }
                        )
                    })
                    .cloned()
                    .collect(),
            ),
        },
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn complete_stream(&self, request: CompletionRequest) -> Result<ResponseStream> {
        let body = AnthropicRequest::from_request(&request);

        tracing::debug!(
            backend = "anthropic",
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            thinking = body.thinking.is_some(),
            "Sending Anthropic request"
        );

        let response = with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            "anthropic",
            || async {
                let response = self
                    .add_headers(self.client.post(self.url("messages")))
                    .json(&body)
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(error_from_response(response).await);
                }
                Ok(response)
            },
        )
        .await?;

        Ok(decode_sse(response, AnthropicDecoder::default()))
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .add_headers(self.client.get(self.url("models")))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream Decoding
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct AnthropicDecoder {
    /// Blocks we emitted a start for; others (redacted thinking) are skipped.
    open: HashSet<usize>,
    usage: Usage,
    done: bool,
}

impl SseDecoder for AnthropicDecoder {
    fn decode(&mut self, _event: &str, data: &str) -> Result<Vec<StreamEvent>> {
        let event: AnthropicEvent = serde_json::from_str(data)?;
        let out = match event {
            AnthropicEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.usage.merge_latest(&usage.into());
                }
                vec![StreamEvent::MessageStart {
                    id: message.id,
                    model: message.model,
                }]
            }
            AnthropicEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let block = match content_block {
                    WireBlock::Text { .. } => BlockStart::Text,
                    WireBlock::Thinking { .. } => BlockStart::Thinking,
                    WireBlock::ToolUse { id, name } => BlockStart::ToolUse { id, name },
                    WireBlock::Other => {
                        tracing::debug!(index, "Skipping unsupported Anthropic block");
                        return Ok(Vec::new());
                    }
                };
                self.open.insert(index);
                vec![StreamEvent::ContentBlockStart { index, block }]
            }
            AnthropicEvent::ContentBlockDelta { index, delta } => {
                if !self.open.contains(&index) {
                    return Ok(Vec::new());
                }
                let delta = match delta {
                    WireDelta::TextDelta { text } => ContentDelta::TextDelta(text),
                    WireDelta::ThinkingDelta { thinking } => ContentDelta::ThinkingDelta(thinking),
                    WireDelta::SignatureDelta { signature } => {
                        ContentDelta::SignatureDelta(signature)
                    }
                    WireDelta::InputJsonDelta { partial_json } => {
                        ContentDelta::InputJsonDelta(partial_json)
                    }
                    WireDelta::Other => return Ok(Vec::new()),
                };
                vec![StreamEvent::ContentBlockDelta { index, delta }]
            }
            AnthropicEvent::ContentBlockStop { index } => {
                if self.open.remove(&index) {
                    vec![StreamEvent::ContentBlockStop { index }]
                } else {
                    Vec::new()
                }
            }
            AnthropicEvent::MessageDelta { delta, usage } => {
                if let Some(usage) = usage {
                    self.usage.merge_latest(&usage.into());
                }
                vec![StreamEvent::MessageDelta {
                    stop_reason: delta.stop_reason.as_deref().map(map_stop_reason),
                    usage: self.usage,
                }]
            }
            AnthropicEvent::MessageStop => {
                self.done = true;
                vec![StreamEvent::MessageStop]
            }
            AnthropicEvent::Ping => vec![StreamEvent::Ping],
            AnthropicEvent::Error { error } => vec![StreamEvent::Error {
                message: format!("{}: {}", error.error_type, error.message),
            }],
        };
        Ok(out)
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }
        tracing::warn!(backend = "anthropic", "Stream ended without message_stop");
        Vec::new()
    }
}

fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "tool_use" => StopReason::ToolUse,
        "max_tokens" => StopReason::MaxTokens,
        "stop_sequence" => StopReason::StopSequence,
        "refusal" => StopReason::ContentFilter,
        _ => StopReason::EndTurn,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicEvent {
    MessageStart {
        message: WireMessage,
    },
    ContentBlockStart {
        index: usize,
        content_block: WireBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: WireDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: WireMessageDelta,
        usage: Option<WireUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: WireError,
    },
}

#[derive(Debug, serde::Deserialize)]
struct WireMessage {
    id: String,
    model: String,
    usage: Option<WireUsage>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {},
    Thinking {},
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, serde::Deserialize)]
struct WireMessageDelta {
    stop_reason: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(usage: WireUsage) -> Self {
        Usage::new(usage.input_tokens, usage.output_tokens)
    }
}

#[derive(Debug, serde::Deserialize)]
struct WireError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
