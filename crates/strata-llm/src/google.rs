//! Google Gemini backend.
//!
//! Uses `streamGenerateContent?alt=sse`. Gemini delivers function calls whole,
//! without ids, so each one becomes a start/delta/stop triple with a generated
//! id. Tool results are sent back as `functionResponse` parts keyed by the
//! function name, recovered from the earlier tool-use block.

use async_trait::async_trait;
use reqwest::{Client, header};
use std::collections::HashMap;
use std::time::Duration;

use crate::backend::{
    ContentDelta, LlmBackend, ResponseStream, StreamEvent, error_from_response, with_retry,
};
use crate::error::{LlmError, Result};
use crate::sse::{BlockTracker, OpenKind, SseDecoder, decode_sse, generate_tool_id};
use crate::types::{CompletionRequest, ContentBlock, Role, StopReason, ToolChoice, Usage};

/// Default API base URL.
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default timeout for requests.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// JSON Schema keywords Gemini rejects in function parameters.
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &["$schema", "additionalProperties", "$id", "$defs"];

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the Gemini backend.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl GoogleConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend
// ─────────────────────────────────────────────────────────────────────────────

pub struct GoogleBackend {
    client: Client,
    config: GoogleConfig,
}

impl GoogleBackend {
    pub fn new(config: GoogleConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }
}

fn to_gemini_request(request: &CompletionRequest) -> GeminiRequest {
    let mut tool_names: HashMap<String, String> = HashMap::new();
    let mut contents = Vec::with_capacity(request.messages.len());

    for message in &request.messages {
        let mut parts = Vec::new();
        for block in message.content.blocks() {
            match block {
                ContentBlock::Text { text } => {
                    if !text.is_empty() {
                        parts.push(serde_json::json!({ "text": text }));
                    }
                }
                // Gemini thoughts are not replayed.
                ContentBlock::Thinking { .. } => {}
                ContentBlock::ToolUse { id, name, input } => {
                    parts.push(serde_json::json!({
                        "functionCall": { "name": name, "args": input }
                    }));
                    tool_names.insert(id, name);
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => {
                    let name = tool_names
                        .get(&tool_use_id)
                        .cloned()
                        .unwrap_or_else(|| tool_use_id.clone());
                    let response = match serde_json::from_str::<serde_json::Value>(&content) {
                        Ok(value) if value.is_object() && !is_error => value,
                        _ if is_error => serde_json::json!({ "error": content }),
                        _ => serde_json::json!({ "result": content }),
                    };
                    parts.push(serde_json::json!({
                        "functionResponse": { "name": name, "response": response }
                    }));
                }
            }
        }
        if parts.is_empty() {
            continue;
        }
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "model",
        };
        contents.push(GeminiContent {
            role: Some(role.to_string()),
            parts,
        });
    }

    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(vec![serde_json::json!({
            "functionDeclarations": request
                .tools
                .iter()
                .map(|t| serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": sanitize_schema(&t.input_schema),
                }))
                .collect::<Vec<_>>()
        })])
    };

    let tool_config = match (&request.tool_choice, tools.is_some()) {
        (Some(choice), true) => Some(match choice {
            ToolChoice::Auto => serde_json::json!({ "functionCallingConfig": { "mode": "AUTO" } }),
            ToolChoice::Any => serde_json::json!({ "functionCallingConfig": { "mode": "ANY" } }),
            ToolChoice::None => serde_json::json!({ "functionCallingConfig": { "mode": "NONE" } }),
            ToolChoice::Tool { name } => serde_json::json!({
                "functionCallingConfig": { "mode": "ANY", "allowedFunctionNames": [name] }
            }),
        }),
        _ => None,
    };

    let thinking_config = request.thinking_budget.map(|budget| ThinkingConfig {
        thinking_budget: budget,
        include_thoughts: true,
    });

    GeminiRequest {
        contents,
        system_instruction: request.system.as_ref().map(|s| GeminiContent {
            role: None,
            parts: vec![serde_json::json!({ "text": s })],
        }),
        tools,
        tool_config,
        generation_config: GenerationConfig {
            max_output_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stop_sequences: request.stop_sequences.clone(),
            thinking_config,
        },
    }
}

/// Remove schema keywords the API rejects, recursively.
fn sanitize_schema(schema: &serde_json::Value) -> serde_json::Value {
    match schema {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .filter(|(k, _)| !UNSUPPORTED_SCHEMA_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), sanitize_schema(v)))
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sanitize_schema).collect())
        }
        other => other.clone(),
    }
}

#[async_trait]
impl LlmBackend for GoogleBackend {
    async fn complete_stream(&self, request: CompletionRequest) -> Result<ResponseStream> {
        let body = to_gemini_request(&request);
        let url = self.stream_url(&request.model);

        tracing::debug!(
            backend = "google",
            model = %request.model,
            contents = body.contents.len(),
            tools = request.tools.len(),
            "Sending Gemini request"
        );

        let response = with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            "google",
            || async {
                let response = self
                    .client
                    .post(&url)
                    .header("x-goog-api-key", &self.config.api_key)
                    .header(header::CONTENT_TYPE, "application/json")
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

        Ok(decode_sse(response, GeminiDecoder::new(&request.model)))
    }

    fn name(&self) -> &str {
        "google"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream Decoding
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct GeminiDecoder {
    model: String,
    started: bool,
    done: bool,
    blocks: BlockTracker,
    calls: usize,
    stop_reason: Option<StopReason>,
    usage: Usage,
}

impl GeminiDecoder {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            started: false,
            done: false,
            blocks: BlockTracker::default(),
            calls: 0,
            stop_reason: None,
            usage: Usage::default(),
        }
    }

    fn handle_chunk(&mut self, chunk: GeminiChunk, out: &mut Vec<StreamEvent>) {
        if !self.started {
            self.started = true;
            out.push(StreamEvent::MessageStart {
                id: chunk
                    .response_id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                model: chunk
                    .model_version
                    .clone()
                    .unwrap_or_else(|| self.model.clone()),
            });
        }

        if let Some(usage) = chunk.usage_metadata {
            self.usage.merge_latest(&Usage::new(
                usage.prompt_token_count,
                usage.candidates_token_count + usage.thoughts_token_count,
            ));
        }

        let Some(candidate) = chunk.candidates.into_iter().next() else {
            return;
        };

        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(call) = part.function_call {
                let provider_index = self.calls;
                self.calls += 1;
                let index = self
                    .blocks
                    .open_tool(provider_index, generate_tool_id(), call.name, out);
                out.push(StreamEvent::ContentBlockDelta {
                    index,
                    delta: ContentDelta::InputJsonDelta(call.args.to_string()),
                });
                self.blocks.close(out);
                continue;
            }
            let Some(text) = part.text.filter(|t| !t.is_empty()) else {
                continue;
            };
            let (kind, delta) = if part.thought {
                (OpenKind::Thinking, ContentDelta::ThinkingDelta(text))
            } else {
                (OpenKind::Text, ContentDelta::TextDelta(text))
            };
            let index = self.blocks.ensure(kind, out);
            out.push(StreamEvent::ContentBlockDelta { index, delta });
        }

        if let Some(reason) = candidate.finish_reason {
            self.stop_reason = Some(map_finish_reason(&reason));
        }
    }

    fn close(&mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if self.done || !self.started {
            return out;
        }
        self.done = true;
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

impl SseDecoder for GeminiDecoder {
    fn decode(&mut self, _event: &str, data: &str) -> Result<Vec<StreamEvent>> {
        let value: serde_json::Value = serde_json::from_str(data)?;
        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown stream error")
                .to_string();
            return Ok(vec![StreamEvent::Error { message }]);
        }
        let chunk: GeminiChunk = serde_json::from_value(value)?;
        let mut out = Vec::new();
        self.handle_chunk(chunk, &mut out);
        Ok(out)
    }

    // Gemini has no terminator; the stream simply ends.
    fn is_done(&self) -> bool {
        self.done
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        self.close()
    }
}

fn map_finish_reason(reason: &str) -> StopReason {
    match reason {
        "MAX_TOKENS" => StopReason::MaxTokens,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            StopReason::ContentFilter
        }
        _ => StopReason::EndTurn,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<serde_json::Value>,
    generation_config: GenerationConfig,
}

#[derive(Debug, serde::Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<serde_json::Value>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
    include_thoughts: bool,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
    model_version: Option<String>,
    response_id: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, serde::Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GeminiUsage {
    prompt_token_count: u32,
    candidates_token_count: u32,
    thoughts_token_count: u32,
}
