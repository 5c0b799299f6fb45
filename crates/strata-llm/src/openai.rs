//! OpenAI-compatible API backend implementation.
//!
//! `OpenAiBackend` speaks the Chat Completions streaming protocol, which is
//! shared by OpenAI, Groq, Cerebras, Mistral, Deepseek and Bedrock's
//! OpenAI-compatible runtime endpoint. Provider differences are captured in
//! [`OpenAiConfig`] presets.

use async_trait::async_trait;
use reqwest::{Client, header};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{
    ContentDelta, LlmBackend, ResponseStream, StreamEvent, error_from_response, with_retry,
};
use crate::error::{LlmError, Result};
use crate::reasoning::split_think_tags;
use crate::sse::{BlockTracker, OpenKind, SseDecoder, decode_sse, generate_tool_id};
use crate::types::{
    CompletionRequest, ContentBlock, Message, Role, StopReason, ToolChoice, Usage,
};

/// Default OpenAI API base URL.
const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

/// Default timeout for requests.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication.
    pub api_key: Option<String>,

    /// Base URL for the API.
    pub base_url: String,

    /// Model to use when set; otherwise the request's model.
    pub model: Option<String>,

    /// Request timeout.
    pub timeout: Duration,

    /// Maximum retries for transient errors.
    pub max_retries: u32,

    /// Initial backoff duration for retries.
    pub retry_backoff: Duration,

    /// Name for this backend instance.
    pub name: String,

    /// Send `stream_options.include_usage`.
    pub include_usage: bool,

    /// Send `max_completion_tokens` instead of `max_tokens`.
    pub max_completion_tokens: bool,

    /// Split inline `<think>` tags into thinking blocks.
    pub strip_think_tags: bool,
}

impl OpenAiConfig {
    fn preset(name: &str, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: base_url.into(),
            model: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            name: name.to_string(),
            include_usage: false,
            max_completion_tokens: false,
            strip_think_tags: false,
        }
    }

    /// Create a new config for OpenAI.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            include_usage: true,
            max_completion_tokens: true,
            ..Self::preset("openai", api_key, DEFAULT_OPENAI_BASE)
        }
    }

    /// Create a new config for Groq.
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self {
            include_usage: true,
            strip_think_tags: true,
            ..Self::preset("groq", api_key, "https://api.groq.com/openai/v1")
        }
    }

    /// Create a new config for Cerebras.
    pub fn cerebras(api_key: impl Into<String>) -> Self {
        Self {
            strip_think_tags: true,
            ..Self::preset("cerebras", api_key, "https://api.cerebras.ai/v1")
        }
    }

    /// Create a new config for Mistral.
    pub fn mistral(api_key: impl Into<String>) -> Self {
        Self::preset("mistral", api_key, "https://api.mistral.ai/v1")
    }

    /// Create a new config for Deepseek.
    pub fn deepseek(api_key: impl Into<String>) -> Self {
        Self {
            include_usage: true,
            strip_think_tags: true,
            ..Self::preset("deepseek", api_key, "https://api.deepseek.com/v1")
        }
    }

    /// Create a new config for Bedrock's OpenAI-compatible endpoint.
    pub fn bedrock(api_key: impl Into<String>, region: &str) -> Self {
        Self {
            strip_think_tags: true,
            ..Self::preset(
                "bedrock",
                api_key,
                format!("https://bedrock-runtime.{region}.amazonaws.com/openai/v1"),
            )
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the backend name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
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

    /// Set the initial retry backoff.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Enable or disable `<think>` tag splitting.
    pub fn with_strip_think_tags(mut self, enabled: bool) -> Self {
        self.strip_think_tags = enabled;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Backend
// ─────────────────────────────────────────────────────────────────────────────

/// OpenAI-compatible API backend.
pub struct OpenAiBackend {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    /// Create a new OpenAI-compatible backend with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    /// Build the chat completions endpoint URL.
    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Add authentication headers to a request.
    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream");

        if let Some(ref api_key) = self.config.api_key {
            builder.bearer_auth(api_key)
        } else {
            builder
        }
    }

    /// Convert our CompletionRequest to OpenAI-compatible format.
    fn to_openai_request(&self, request: &CompletionRequest) -> OpenAiChatRequest {
        let mut messages: Vec<OpenAiMessage> = Vec::new();

        if let Some(ref system) = request.system {
            messages.push(OpenAiMessage::text("system", system.clone()));
        }

        for m in &request.messages {
            convert_message(m, &mut messages);
        }

        let tools: Option<Vec<OpenAiTool>> = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| OpenAiTool {
                        tool_type: "function".to_string(),
                        function: OpenAiFunction {
                            name: t.name.clone(),
                            description: Some(t.description.clone()),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        let tool_choice = match (&request.tool_choice, tools.is_some()) {
            (Some(choice), true) => Some(tool_choice_value(choice)),
            _ => None,
        };

        let stop = if request.stop_sequences.is_empty() {
            None
        } else {
            Some(request.stop_sequences.clone())
        };

        let model = self
            .config
            .model
            .clone()
            .unwrap_or_else(|| request.model.clone());

        let (max_tokens, max_completion_tokens) = if self.config.max_completion_tokens {
            (None, Some(request.max_tokens))
        } else {
            (Some(request.max_tokens), None)
        };

        OpenAiChatRequest {
            model,
            messages,
            max_tokens,
            max_completion_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stream: true,
            stream_options: self
                .config
                .include_usage
                .then_some(StreamOptions { include_usage: true }),
            tools,
            tool_choice,
            stop,
        }
    }
}

/// Append the OpenAI messages for one of ours.
///
/// Tool results become one `tool` message each; thinking blocks are not sent
/// back since compatible providers reject them.
fn convert_message(m: &Message, out: &mut Vec<OpenAiMessage>) {
    let blocks = m.content.blocks();

    let tool_calls: Vec<_> = blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolUse { id, name, input } => Some(OpenAiToolCall {
                id: id.clone(),
                call_type: "function".to_string(),
                function: OpenAiFunctionCall {
                    name: name.clone(),
                    arguments: input.to_string(),
                },
            }),
            _ => None,
        })
        .collect();

    let text_content: String = blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("");

    let mut has_results = false;
    for block in &blocks {
        if let ContentBlock::ToolResult {
            tool_use_id,
            content,
            ..
        } = block
        {
            has_results = true;
            out.push(OpenAiMessage {
                role: "tool".to_string(),
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: Some(tool_use_id.clone()),
            });
        }
    }
    if has_results {
        return;
    }

    if !tool_calls.is_empty() {
        out.push(OpenAiMessage {
            role: "assistant".to_string(),
            content: (!text_content.is_empty()).then_some(text_content),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        });
    } else {
        let role = match m.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        out.push(OpenAiMessage::text(role, text_content));
    }
}

fn tool_choice_value(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::Auto => serde_json::json!("auto"),
        ToolChoice::Any => serde_json::json!("required"),
        ToolChoice::None => serde_json::json!("none"),
        ToolChoice::Tool { name } => serde_json::json!({
            "type": "function",
            "function": { "name": name },
        }),
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete_stream(&self, request: CompletionRequest) -> Result<ResponseStream> {
        let openai_request = self.to_openai_request(&request);

        tracing::debug!(
            backend = %self.config.name,
            model = %openai_request.model,
            messages = openai_request.messages.len(),
            tools = openai_request.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "Sending OpenAI-compatible request"
        );

        let response = with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            &self.config.name,
            || async {
                let response = self
                    .add_headers(self.client.post(self.completions_url()))
                    .json(&openai_request)
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(error_from_response(response).await);
                }
                Ok(response)
            },
        )
        .await?;

        let stream = decode_sse(response, OpenAiDecoder::default());
        if self.config.strip_think_tags {
            Ok(split_think_tags(stream))
        } else {
            Ok(stream)
        }
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .add_headers(
                self.client
                    .get(format!("{}/models", self.config.base_url.trim_end_matches('/'))),
            )
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }
}

/// Create a shared OpenAI-compatible backend.
pub fn create_shared_backend(config: OpenAiConfig) -> Result<Arc<dyn LlmBackend>> {
    Ok(Arc::new(OpenAiBackend::new(config)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream Decoding
// ─────────────────────────────────────────────────────────────────────────────

/// Chat Completions chunk decoder.
#[derive(Debug, Default)]
struct OpenAiDecoder {
    started: bool,
    done: bool,
    blocks: BlockTracker,
    /// Tool calls whose function name has not arrived yet, keyed by
    /// provider index.
    unnamed: BTreeMap<usize, PendingCall>,
    stop_reason: Option<StopReason>,
    usage: Usage,
}

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    arguments: String,
}

impl OpenAiDecoder {
    fn handle_chunk(&mut self, chunk: OpenAiStreamChunk, out: &mut Vec<StreamEvent>) {
        if !self.started {
            self.started = true;
            out.push(StreamEvent::MessageStart {
                id: chunk.id.clone().unwrap_or_default(),
                model: chunk.model.clone().unwrap_or_default(),
            });
        }

        if let Some(usage) = chunk
            .usage
            .or_else(|| chunk.x_groq.and_then(|x| x.usage))
        {
            self.usage.merge_latest(&Usage::new(
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
            ));
        }

        for choice in chunk.choices {
            let delta = choice.delta;

            let reasoning = delta.reasoning_content.or(delta.reasoning);
            if let Some(reasoning) = reasoning.filter(|r| !r.is_empty()) {
                let index = self.blocks.ensure(OpenKind::Thinking, out);
                out.push(StreamEvent::ContentBlockDelta {
                    index,
                    delta: ContentDelta::ThinkingDelta(reasoning),
                });
            }

            if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
                let index = self.blocks.ensure(OpenKind::Text, out);
                out.push(StreamEvent::ContentBlockDelta {
                    index,
                    delta: ContentDelta::TextDelta(text),
                });
            }

            for (position, call) in delta.tool_calls.into_iter().enumerate() {
                let provider_index = call.index.unwrap_or(position);
                let function = call.function.unwrap_or_default();
                let args = function.arguments.filter(|a| !a.is_empty());

                let index = match self.blocks.tool_index(provider_index) {
                    Some(index) => index,
                    None => {
                        let name = function.name.filter(|n| !n.trim().is_empty());
                        let pending = self.unnamed.entry(provider_index).or_default();
                        if let Some(id) = call.id.filter(|id| !id.is_empty()) {
                            pending.id = Some(id);
                        }
                        let Some(name) = name else {
                            // Hold the fragment until the call is named.
                            pending.arguments.push_str(args.as_deref().unwrap_or_default());
                            continue;
                        };
                        let pending = self.unnamed.remove(&provider_index).unwrap_or_default();
                        let index = self.blocks.open_tool(
                            provider_index,
                            pending.id.unwrap_or_else(generate_tool_id),
                            name,
                            out,
                        );
                        if !pending.arguments.is_empty() {
                            out.push(StreamEvent::ContentBlockDelta {
                                index,
                                delta: ContentDelta::InputJsonDelta(pending.arguments),
                            });
                        }
                        index
                    }
                };
                if let Some(args) = args {
                    out.push(StreamEvent::ContentBlockDelta {
                        index,
                        delta: ContentDelta::InputJsonDelta(args),
                    });
                }
            }

            if let Some(reason) = choice.finish_reason {
                self.stop_reason = Some(map_finish_reason(&reason));
            }
        }
    }

    fn close(&mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if self.done || !self.started {
            return out;
        }
        self.done = true;
        if let Some((provider_index, pending)) = self.unnamed.pop_first() {
            tracing::warn!(
                provider_index,
                id = ?pending.id,
                "Tool call finished without a function name"
            );
            out.push(StreamEvent::Error {
                message: format!("tool call {provider_index} arrived without a function name"),
            });
            return out;
        }
        self.blocks.close(&mut out);
        let stop_reason = if self.blocks.has_tools() {
            Some(StopReason::ToolUse)
        } else {
            self.stop_reason
        };
        out.push(StreamEvent::MessageDelta {
            stop_reason,
            usage: self.usage,
        });
        out.push(StreamEvent::MessageStop);
        out
    }
}

impl SseDecoder for OpenAiDecoder {
    fn decode(&mut self, _event: &str, data: &str) -> Result<Vec<StreamEvent>> {
        if data.trim() == "[DONE]" {
            return Ok(self.close());
        }

        let value: serde_json::Value = serde_json::from_str(data)?;
        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown stream error")
                .to_string();
            return Ok(vec![StreamEvent::Error { message }]);
        }

        let chunk: OpenAiStreamChunk = serde_json::from_value(value)?;
        let mut out = Vec::new();
        self.handle_chunk(chunk, &mut out);
        Ok(out)
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        self.close()
    }
}

fn map_finish_reason(reason: &str) -> StopReason {
    match reason {
        "tool_calls" | "function_call" => StopReason::ToolUse,
        "length" | "model_length" => StopReason::MaxTokens,
        "content_filter" => StopReason::ContentFilter,
        _ => StopReason::EndTurn,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI API Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, serde::Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, serde::Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, serde::Serialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAiMessage {
    fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAiFunction,
}

#[derive(Debug, serde::Serialize)]
struct OpenAiFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    parameters: serde_json::Value,
}

#[derive(Debug, serde::Serialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, serde::Serialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiStreamChunk {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
    x_groq: Option<GroqExtension>,
}

#[derive(Debug, serde::Deserialize)]
struct GroqExtension {
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCallDelta>,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiToolCallDelta {
    index: Option<usize>,
    id: Option<String>,
    function: Option<OpenAiFunctionDelta>,
}

#[derive(Debug, Default, Clone, serde::Deserialize)]
struct OpenAiFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BlockStart;
    use crate::stream::StreamAccumulator;
    use crate::types::{ToolDefinition, ToolResultBlock};

    fn decode_all(chunks: &[&str]) -> Vec<StreamEvent> {
        let mut decoder = OpenAiDecoder::default();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(decoder.decode("", chunk).unwrap());
        }
        events.extend(decoder.finish());
        events
    }

    #[test]
    fn test_presets() {
        let openai = OpenAiConfig::openai("k");
        assert_eq!(openai.base_url, DEFAULT_OPENAI_BASE);
        assert!(openai.include_usage);
        assert!(!openai.strip_think_tags);

        assert!(OpenAiConfig::groq("k").strip_think_tags);
        assert!(OpenAiConfig::cerebras("k").strip_think_tags);
        assert!(OpenAiConfig::deepseek("k").strip_think_tags);
        assert!(!OpenAiConfig::mistral("k").strip_think_tags);

        let bedrock = OpenAiConfig::bedrock("k", "us-west-2");
        assert_eq!(
            bedrock.base_url,
            "https://bedrock-runtime.us-west-2.amazonaws.com/openai/v1"
        );
        assert!(bedrock.strip_think_tags);
    }

    #[test]
    fn test_config_builder() {
        let config = OpenAiConfig::openai("key")
            .with_base_url("http://custom.api/")
            .with_model("gpt-4o")
            .with_name("custom")
            .with_timeout(Duration::from_secs(60));

        assert_eq!(config.model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.name, "custom");
        assert_eq!(config.timeout, Duration::from_secs(60));

        let backend = OpenAiBackend::new(config).unwrap();
        assert_eq!(
            backend.completions_url(),
            "http://custom.api/chat/completions"
        );
    }

    #[test]
    fn test_request_conversion() {
        let backend = OpenAiBackend::new(OpenAiConfig::mistral("k")).unwrap();
        let request = CompletionRequest::new(
            "mistral-large-latest",
            vec![
                Message::user("weather?"),
                Message::assistant_blocks(vec![
                    ContentBlock::thinking("hmm"),
                    ContentBlock::text("checking"),
                    ContentBlock::tool_use("c1", "weather", serde_json::json!({"city": "Oslo"})),
                ]),
                Message::tool_results(vec![ToolResultBlock::success("c1", "sunny")]),
            ],
            256,
        )
        .with_system("be brief")
        .with_tools(vec![ToolDefinition::new(
            "weather",
            "Get weather",
            serde_json::json!({"type": "object"}),
        )])
        .with_tool_choice(ToolChoice::Any);

        let body = serde_json::to_value(backend.to_openai_request(&request)).unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["content"], "checking");
        assert_eq!(messages[2]["tool_calls"][0]["function"]["name"], "weather");
        assert_eq!(
            messages[2]["tool_calls"][0]["function"]["arguments"],
            r#"{"city":"Oslo"}"#
        );
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "c1");
        assert_eq!(body["tool_choice"], "required");
        assert_eq!(body["max_tokens"], 256);
        assert!(body.get("stream_options").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_openai_uses_max_completion_tokens() {
        let backend = OpenAiBackend::new(OpenAiConfig::openai("k")).unwrap();
        let request = CompletionRequest::new("gpt-4o", vec![Message::user("hi")], 64);
        let body = serde_json::to_value(backend.to_openai_request(&request)).unwrap();
        assert_eq!(body["max_completion_tokens"], 64);
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn test_decode_text_stream() {
        let events = decode_all(&[
            r#"{"id":"c-1","model":"gpt-4o","choices":[{"delta":{"role":"assistant","content":""}}]}"#,
            r#"{"id":"c-1","choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"{"id":"c-1","choices":[{"delta":{"content":"lo"},"finish_reason":"stop"}]}"#,
            r#"{"id":"c-1","choices":[],"usage":{"prompt_tokens":5,"completion_tokens":2}}"#,
            "[DONE]",
        ]);

        assert_eq!(
            events[0],
            StreamEvent::MessageStart {
                id: "c-1".into(),
                model: "gpt-4o".into()
            }
        );
        let mut acc = StreamAccumulator::new();
        for e in &events {
            acc.push(e).unwrap();
        }
        let response = acc.finish();
        assert_eq!(response.text(), "Hello");
        assert_eq!(response.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(response.usage, Usage::new(5, 2));
        assert_eq!(events.last(), Some(&StreamEvent::MessageStop));
    }

    #[test]
    fn test_decode_tool_call_deltas() {
        let events = decode_all(&[
            r#"{"id":"c","model":"m","choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"search","arguments":""}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"q\":"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"rust\"}"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"time","arguments":"{}"}}]},"finish_reason":"tool_calls"}]}"#,
        ]);

        assert!(events.contains(&StreamEvent::ContentBlockStart {
            index: 0,
            block: BlockStart::ToolUse {
                id: "call_a".into(),
                name: "search".into()
            }
        }));

        let mut acc = StreamAccumulator::new();
        for e in &events {
            acc.push(e).unwrap();
        }
        let response = acc.finish();
        let uses = response.tool_uses();
        assert_eq!(uses.len(), 2);
        assert_eq!(uses[0].input, serde_json::json!({"q": "rust"}));
        assert_eq!(uses[1].name, "time");
        assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
    }

    #[test]
    fn test_tool_call_waits_for_name() {
        let events = decode_all(&[
            r#"{"id":"c","model":"m","choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"arguments":"{\"q\":"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"search","arguments":"\"rust\"}"}}]}}]}"#,
        ]);
        assert!(events.iter().all(|e| e.validate().is_ok()));

        let mut acc = StreamAccumulator::new();
        for e in &events {
            acc.push(e).unwrap();
        }
        let response = acc.into_response().unwrap();
        let uses = response.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].id, "call_a");
        assert_eq!(uses[0].name, "search");
        assert_eq!(uses[0].input, serde_json::json!({"q": "rust"}));
    }

    #[test]
    fn test_nameless_tool_call_is_an_error() {
        let events = decode_all(&[
            r#"{"id":"c","model":"m","choices":[{"delta":{"tool_calls":[{"index":0,"id":"c","function":{"arguments":"{}"}}]}}]}"#,
            "[DONE]",
        ]);
        assert!(!events.iter().any(|e| matches!(
            e,
            StreamEvent::ContentBlockStart {
                block: BlockStart::ToolUse { .. },
                ..
            }
        )));
        assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));

        let mut acc = StreamAccumulator::new();
        let result: Result<()> = events.iter().try_for_each(|e| acc.push(e));
        assert!(matches!(result, Err(LlmError::Stream(msg)) if msg.contains("function name")));
    }

    #[test]
    fn test_decode_reasoning_fields() {
        let events = decode_all(&[
            r#"{"id":"d","model":"deepseek-reasoner","choices":[{"delta":{"reasoning_content":"think"}}]}"#,
            r#"{"choices":[{"delta":{"reasoning":" more"}}]}"#,
            r#"{"choices":[{"delta":{"content":"answer"}}]}"#,
            "[DONE]",
        ]);

        let mut acc = StreamAccumulator::new();
        for e in &events {
            acc.push(e).unwrap();
        }
        let response = acc.finish();
        assert_eq!(response.thinking().as_deref(), Some("think more"));
        assert_eq!(response.text(), "answer");
    }

    #[test]
    fn test_groq_usage_extension() {
        let events = decode_all(&[
            r#"{"id":"g","model":"llama","choices":[{"delta":{"content":"x"},"finish_reason":"stop"}],"x_groq":{"usage":{"prompt_tokens":9,"completion_tokens":1}}}"#,
        ]);
        assert!(events.contains(&StreamEvent::MessageDelta {
            stop_reason: Some(StopReason::EndTurn),
            usage: Usage::new(9, 1),
        }));
    }

    #[test]
    fn test_stream_error_payload() {
        let mut decoder = OpenAiDecoder::default();
        let events = decoder
            .decode("", r#"{"error":{"message":"overloaded"}}"#)
            .unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::Error {
                message: "overloaded".into()
            }]
        );
    }

    #[test]
    fn test_missing_tool_id_is_generated() {
        let events = decode_all(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"f","arguments":"{}"}}]}}]}"#,
        ]);
        let start = events.iter().find_map(|e| match e {
            StreamEvent::ContentBlockStart {
                block: BlockStart::ToolUse { id, .. },
                ..
            } => Some(id.clone()),
            _ => None,
        });
        assert!(start.unwrap().starts_with("call_"));
    }
}
