//! Cohere Chat v2 backend.

use async_trait::async_trait;
use reqwest::{Client, header};
use std::time::Duration;

use crate::backend::{
    ContentDelta, LlmBackend, ResponseStream, StreamEvent, error_from_response, with_retry,
};
use crate::error::{LlmError, Result};
use crate::sse::{BlockTracker, OpenKind, SseDecoder, decode_sse, generate_tool_id};
use crate::types::{CompletionRequest, ContentBlock, Role, StopReason, ToolChoice, Usage};

const DEFAULT_API_BASE: &str = "https://api.cohere.com/v2";

const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the Cohere backend.
#[derive(Debug, Clone)]
pub struct CohereConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl CohereConfig {
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

pub struct CohereBackend {
    client: Client,
    config: CohereConfig,
}

impl CohereBackend {
    pub fn new(config: CohereConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat", self.config.base_url.trim_end_matches('/'))
    }
}

fn to_cohere_request(request: &CompletionRequest) -> serde_json::Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(serde_json::json!({ "role": "system", "content": system }));
    }

    for message in &request.messages {
        let blocks = message.content.blocks();
        let mut text = String::new();
        let mut plan = String::new();
        let mut tool_calls = Vec::new();
        let mut had_results = false;

        for block in blocks {
            match block {
                ContentBlock::Text { text: t } => text.push_str(&t),
                ContentBlock::Thinking { thinking, .. } => plan.push_str(&thinking),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(serde_json::json!({
                    "id": id,
                    "type": "function",
                    "function": { "name": name, "arguments": input.to_string() },
                })),
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => {
                    had_results = true;
                    messages.push(serde_json::json!({
                        "role": "tool",
                        "tool_call_id": tool_use_id,
                        "content": content,
                    }));
                }
            }
        }
        if had_results {
            continue;
        }

        match message.role {
            Role::User => messages.push(serde_json::json!({ "role": "user", "content": text })),
            Role::Assistant if tool_calls.is_empty() => {
                messages.push(serde_json::json!({ "role": "assistant", "content": text }))
            }
            Role::Assistant => {
                let mut m = serde_json::json!({ "role": "assistant", "tool_calls": tool_calls });
                if !plan.is_empty() {
                    m["tool_plan"] = serde_json::Value::String(plan);
                }
                if !text.is_empty() {
                    m["content"] = serde_json::Value::String(text);
                }
                messages.push(m);
            }
        }
    }

    let mut body = serde_json::json!({
        "model": request.model,
        "messages": messages,
        "stream": true,
        "max_tokens": request.max_tokens,
    });
    if !request.tools.is_empty() {
        body["tools"] = request
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect();
        match request.tool_choice {
            Some(ToolChoice::Any) | Some(ToolChoice::Tool { .. }) => {
                body["tool_choice"] = "REQUIRED".into()
            }
            Some(ToolChoice::None) => body["tool_choice"] = "NONE".into(),
            _ => {}
        }
    }
    if let Some(t) = request.temperature {
        body["temperature"] = t.into();
    }
    if let Some(p) = request.top_p {
        body["p"] = p.into();
    }
    if !request.stop_sequences.is_empty() {
        body["stop_sequences"] = request.stop_sequences.clone().into();
    }
    if let Some(budget) = request.thinking_budget {
        body["thinking"] = serde_json::json!({ "type": "enabled", "token_budget": budget });
    }
    body
}

#[async_trait]
impl LlmBackend for CohereBackend {
    async fn complete_stream(&self, request: CompletionRequest) -> Result<ResponseStream> {
        let body = to_cohere_request(&request);

        tracing::debug!(
            backend = "cohere",
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending Cohere request"
        );

        let response = with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            "cohere",
            || async {
                let response = self
                    .client
                    .post(self.chat_url())
                    .bearer_auth(&self.config.api_key)
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::ACCEPT, "text/event-stream")
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

        Ok(decode_sse(response, CohereDecoder::new(&request.model)))
    }

    fn name(&self) -> &str {
        "cohere"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream Decoding
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct CohereDecoder {
    model: String,
    started: bool,
    done: bool,
    blocks: BlockTracker,
}

impl CohereDecoder {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            started: false,
            done: false,
            blocks: BlockTracker::default(),
        }
    }

    fn start(&mut self, id: Option<String>, out: &mut Vec<StreamEvent>) {
        if !self.started {
            self.started = true;
            out.push(StreamEvent::MessageStart {
                id: id.unwrap_or_default(),
                model: self.model.clone(),
            });
        }
    }

    fn push_content(&mut self, kind: OpenKind, text: String, out: &mut Vec<StreamEvent>) {
        let index = self.blocks.ensure(kind, out);
        if text.is_empty() {
            return;
        }
        let delta = match kind {
            OpenKind::Thinking => ContentDelta::ThinkingDelta(text),
            _ => ContentDelta::TextDelta(text),
        };
        out.push(StreamEvent::ContentBlockDelta { index, delta });
    }

    fn end(&mut self, stop_reason: Option<StopReason>, usage: Usage) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if self.done {
            return out;
        }
        self.start(None, &mut out);
        self.done = true;
        self.blocks.close(&mut out);
        let stop_reason = if self.blocks.has_tools() {
            Some(StopReason::ToolUse)
        } else {
            stop_reason
        };
        out.push(StreamEvent::MessageDelta { stop_reason, usage });
        out.push(StreamEvent::MessageStop);
        out
    }
}

impl SseDecoder for CohereDecoder {
    fn decode(&mut self, event: &str, data: &str) -> Result<Vec<StreamEvent>> {
        let parsed: CohereEvent = serde_json::from_str(data)?;
        let kind = parsed.kind.as_deref().unwrap_or(event);
        let delta = parsed.delta.unwrap_or_default();
        let message = delta.message.unwrap_or_default();
        let mut out = Vec::new();

        match kind {
            "message-start" => self.start(parsed.id, &mut out),
            "content-start" | "content-delta" => {
                self.start(None, &mut out);
                let content = message.content.unwrap_or_default();
                if let Some(thinking) = content.thinking {
                    self.push_content(OpenKind::Thinking, thinking, &mut out);
                } else if content.kind.as_deref() == Some("thinking") {
                    self.push_content(OpenKind::Thinking, String::new(), &mut out);
                } else {
                    self.push_content(OpenKind::Text, content.text.unwrap_or_default(), &mut out);
                }
            }
            "content-end" => self.blocks.close(&mut out),
            "tool-plan-delta" => {
                self.start(None, &mut out);
                if let Some(plan) = message.tool_plan {
                    self.push_content(OpenKind::Thinking, plan, &mut out);
                }
            }
            "tool-call-start" => {
                self.start(None, &mut out);
                let call = message.tool_calls.unwrap_or_default();
                let function = call.function.unwrap_or_default();
                let index = self.blocks.open_tool(
                    parsed.index.unwrap_or(0),
                    call.id.filter(|id| !id.is_empty()).unwrap_or_else(generate_tool_id),
                    function.name.unwrap_or_default(),
                    &mut out,
                );
                if let Some(args) = function.arguments.filter(|a| !a.is_empty()) {
                    out.push(StreamEvent::ContentBlockDelta {
                        index,
                        delta: ContentDelta::InputJsonDelta(args),
                    });
                }
            }
            "tool-call-delta" => {
                let args = message
                    .tool_calls
                    .and_then(|c| c.function)
                    .and_then(|f| f.arguments)
                    .filter(|a| !a.is_empty());
                if let (Some(args), Some(index)) = (
                    args,
                    self.blocks.tool_index(parsed.index.unwrap_or(0)),
                ) {
                    out.push(StreamEvent::ContentBlockDelta {
                        index,
                        delta: ContentDelta::InputJsonDelta(args),
                    });
                }
            }
            "tool-call-end" => self.blocks.close(&mut out),
            "message-end" => {
                if let Some(error) = delta.error {
                    out.push(StreamEvent::Error { message: error });
                    self.done = true;
                    return Ok(out);
                }
                let usage = delta
                    .usage
                    .and_then(|u| u.tokens.or(u.billed_units))
                    .map(|t| {
                        Usage::new(
                            t.input_tokens.unwrap_or(0.0) as u32,
                            t.output_tokens.unwrap_or(0.0) as u32,
                        )
                    })
                    .unwrap_or_default();
                let stop_reason = delta.finish_reason.as_deref().map(map_finish_reason);
                out.extend(self.end(stop_reason, usage));
            }
            other => tracing::trace!(event = other, "Ignoring Cohere event"),
        }
        Ok(out)
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        if self.done || !self.started {
            return Vec::new();
        }
        self.end(None, Usage::default())
    }
}

fn map_finish_reason(reason: &str) -> StopReason {
    match reason {
        "TOOL_CALL" => StopReason::ToolUse,
        "MAX_TOKENS" => StopReason::MaxTokens,
        "STOP_SEQUENCE" => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct CohereEvent {
    #[serde(rename = "type")]
    kind: Option<String>,
    id: Option<String>,
    index: Option<usize>,
    delta: Option<CohereDelta>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct CohereDelta {
    message: Option<CohereDeltaMessage>,
    finish_reason: Option<String>,
    usage: Option<CohereUsage>,
    error: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct CohereDeltaMessage {
    content: Option<CohereContent>,
    tool_calls: Option<CohereToolCall>,
    tool_plan: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct CohereContent {
    #[serde(rename = "type")]
    kind: Option<String>,
    text: Option<String>,
    thinking: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct CohereToolCall {
    id: Option<String>,
    function: Option<CohereFunction>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct CohereFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct CohereUsage {
    tokens: Option<CohereTokens>,
    billed_units: Option<CohereTokens>,
}

#[derive(Debug, serde::Deserialize)]
struct CohereTokens {
    input_tokens: Option<f64>,
    output_tokens: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamAccumulator;
    use crate::types::{Message, ToolDefinition, ToolResultBlock};

    fn run(events: &[(&str, &str)]) -> Vec<StreamEvent> {
        let mut decoder = CohereDecoder::new("command-a-03-2025");
        let mut out = Vec::new();
        for (event, data) in events {
            out.extend(decoder.decode(event, data).unwrap());
        }
        out.extend(decoder.finish());
        out
    }

    fn response(events: &[StreamEvent]) -> crate::types::CompletionResponse {
        let mut acc = StreamAccumulator::new();
        for e in events {
            acc.push(e).unwrap();
        }
        acc.finish()
    }

    #[test]
    fn test_request_conversion() {
        let request = CompletionRequest::new(
            "command-a-03-2025",
            vec![
                Message::user("hi"),
                Message::assistant_blocks(vec![
                    ContentBlock::thinking("I will call"),
                    ContentBlock::tool_use("t1", "lookup", serde_json::json!({})),
                ]),
                Message::tool_results(vec![ToolResultBlock::success("t1", "42")]),
            ],
            300,
        )
        .with_tools(vec![ToolDefinition::new(
            "lookup",
            "Look up",
            serde_json::json!({"type": "object"}),
        )])
        .with_tool_choice(ToolChoice::Any)
        .with_top_p(0.5);

        let body = to_cohere_request(&request);
        assert_eq!(body["messages"][1]["tool_plan"], "I will call");
        assert_eq!(body["messages"][1]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(body["messages"][2]["role"], "tool");
        assert_eq!(body["tool_choice"], "REQUIRED");
        assert_eq!(body["p"], 0.5);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_decode_text() {
        let events = run(&[
            ("message-start", r#"{"type":"message-start","id":"m1","delta":{"message":{"role":"assistant"}}}"#),
            ("content-start", r#"{"type":"content-start","index":0,"delta":{"message":{"content":{"type":"text","text":""}}}}"#),
            ("content-delta", r#"{"type":"content-delta","index":0,"delta":{"message":{"content":{"text":"Hello"}}}}"#),
            ("content-end", r#"{"type":"content-end","index":0}"#),
            ("message-end", r#"{"type":"message-end","delta":{"finish_reason":"COMPLETE","usage":{"billed_units":{"input_tokens":3,"output_tokens":1},"tokens":{"input_tokens":70,"output_tokens":1}}}}"#),
        ]);
        let r = response(&events);
        assert_eq!(r.id, "m1");
        assert_eq!(r.text(), "Hello");
        assert_eq!(r.usage, Usage::new(70, 1));
        assert_eq!(r.stop_reason, Some(StopReason::EndTurn));
    }

    #[test]
    fn test_decode_tool_calls_and_plan() {
        let events = run(&[
            ("message-start", r#"{"type":"message-start","id":"m2"}"#),
            ("tool-plan-delta", r#"{"type":"tool-plan-delta","delta":{"message":{"tool_plan":"I need weather"}}}"#),
            ("tool-call-start", r#"{"type":"tool-call-start","index":0,"delta":{"message":{"tool_calls":{"id":"w_1","type":"function","function":{"name":"weather","arguments":""}}}}}"#),
            ("tool-call-delta", r#"{"type":"tool-call-delta","index":0,"delta":{"message":{"tool_calls":{"function":{"arguments":"{\"city\":"}}}}}"#),
            ("tool-call-delta", r#"{"type":"tool-call-delta","index":0,"delta":{"message":{"tool_calls":{"function":{"arguments":"\"Lima\"}"}}}}}"#),
            ("tool-call-end", r#"{"type":"tool-call-end","index":0}"#),
            ("message-end", r#"{"type":"message-end","delta":{"finish_reason":"TOOL_CALL"}}"#),
        ]);
        let r = response(&events);
        assert_eq!(r.thinking().as_deref(), Some("I need weather"));
        let uses = r.tool_uses();
        assert_eq!(uses[0].id, "w_1");
        assert_eq!(uses[0].input, serde_json::json!({"city": "Lima"}));
        assert_eq!(r.stop_reason, Some(StopReason::ToolUse));
    }

    #[test]
    fn test_decode_thinking_content() {
        let events = run(&[
            ("content-start", r#"{"type":"content-start","index":0,"delta":{"message":{"content":{"type":"thinking","thinking":""}}}}"#),
            ("content-delta", r#"{"type":"content-delta","index":0,"delta":{"message":{"content":{"thinking":"hmm"}}}}"#),
            ("content-end", r#"{"type":"content-end","index":0}"#),
            ("content-start", r#"{"type":"content-start","index":1,"delta":{"message":{"content":{"type":"text","text":""}}}}"#),
            ("content-delta", r#"{"type":"content-delta","index":1,"delta":{"message":{"content":{"text":"ok"}}}}"#),
        ]);
        let r = response(&events);
        assert_eq!(r.thinking().as_deref(), Some("hmm"));
        assert_eq!(r.text(), "ok");
        assert_eq!(events.last(), Some(&StreamEvent::MessageStop));
    }

    #[test]
    fn test_message_end_error() {
        let events = run(&[(
            "message-end",
            r#"{"type":"message-end","delta":{"error":"model overloaded"}}"#,
        )]);
        assert_eq!(
            events,
            vec![StreamEvent::Error {
                message: "model overloaded".into()
            }]
        );
    }
}
