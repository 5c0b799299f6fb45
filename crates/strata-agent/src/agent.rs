//! The streaming agent loop.
//!
//! [`Agent::stream_agent`] resolves the conversation's specification, then
//! either streams rounds directly from a configured provider backend while
//! executing tools locally, or lets the platform run the model and only
//! executes the tools it asks for. Both paths emit the same [`AgentEvent`]s.

use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use strata_client::{
    ConversationRole, ConversationToolResponseInput, ModelServiceType, PromptConversation,
    Specification,
};
use strata_llm::{
    BlockStart, CompletionRequest, CompletionResponse, ContentBlock, ContentDelta, Message,
    Provider, ProviderRegistry, SharedBackend, StreamAccumulator, StreamEvent, ToolResultBlock,
    Usage, resolve_model_name,
};

use crate::error::{AgentError, Result};
use crate::events::{AgentEvent, ReasoningFormat, ToolCall, ToolStatus};
use crate::options::AgentOptions;
use crate::service::ConversationService;
use crate::smoothing::ChunkBuffer;
use crate::tool::{ToolContext, ToolRegistry, ToolResult};

/// Events buffered between the run task and the consumer.
const EVENT_BUFFER: usize = 64;

/// Thinking budget used when a specification enables thinking without one.
const DEFAULT_THINKING_BUDGET: u32 = 2048;

/// Error reported on tool calls skipped by `max_tool_rounds`.
const TOOL_ROUND_LIMIT: &str = "tool round limit reached";

/// A boxed stream of agent events.
pub type AgentStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send + 'static>>;

// ─────────────────────────────────────────────────────────────────────────────
// Request / Result
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct AgentRequest {
    pub prompt: String,
    /// Continue this conversation; one is created when absent.
    pub conversation_id: Option<String>,
    pub specification_id: Option<String>,
}

impl AgentRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_specification(mut self, id: impl Into<String>) -> Self {
        self.specification_id = Some(id.into());
        self
    }
}

/// A finished tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub tool_call_id: String,
    pub name: String,
    pub result: ToolResult,
}

/// Outcome of [`Agent::prompt_agent`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentResult {
    pub message: String,
    pub conversation_id: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolCallResult>,
    /// Model calls made.
    pub rounds: u32,
    pub usage: Usage,
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// Runs prompts against a conversation with local tools.
#[derive(Clone)]
pub struct Agent {
    service: Arc<dyn ConversationService>,
    providers: Arc<ProviderRegistry>,
    tools: Arc<ToolRegistry>,
    options: AgentOptions,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("providers", &self.providers)
            .field("tools", &self.tools)
            .field("options", &self.options)
            .finish()
    }
}

impl Agent {
    pub fn new(service: Arc<dyn ConversationService>, providers: Arc<ProviderRegistry>) -> Self {
        Self {
            service,
            providers,
            tools: Arc::new(ToolRegistry::new()),
            options: AgentOptions::default(),
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    pub fn with_options(mut self, options: AgentOptions) -> Self {
        self.options = options;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// Start a run and stream its events.
    ///
    /// The run executes on a spawned task. Cancelling `cancellation` stops it
    /// at the next stream poll, tool call or platform request and ends the
    /// stream with an `aborted` error event.
    pub fn stream_agent(&self, request: AgentRequest, cancellation: CancellationToken) -> AgentStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let run = Run {
            service: Arc::clone(&self.service),
            providers: Arc::clone(&self.providers),
            tools: Arc::clone(&self.tools),
            options: self.options.clone(),
            tx,
            cancellation,
        };
        tokio::spawn(run.drive(request));
        Box::pin(ReceiverStream::new(rx))
    }

    /// Run to completion and collect the result.
    pub async fn prompt_agent(
        &self,
        request: AgentRequest,
        cancellation: CancellationToken,
    ) -> Result<AgentResult> {
        let mut quiet = self.clone();
        quiet.options.show_token_stream = false;
        quiet.options.smoothing.enabled = false;

        let mut stream = quiet.stream_agent(request, cancellation);
        let mut result = AgentResult::default();

        while let Some(event) = stream.next().await {
            match event {
                AgentEvent::ConversationStarted {
                    conversation_id, ..
                } => result.conversation_id = conversation_id,
                AgentEvent::ToolUpdate {
                    tool_call,
                    status: ToolStatus::Executing,
                    ..
                } => result.tool_calls.push(tool_call),
                AgentEvent::ToolUpdate {
                    tool_call,
                    result: Some(tool_result),
                    ..
                } => result.tool_results.push(ToolCallResult {
                    tool_call_id: tool_call.id,
                    name: tool_call.name,
                    result: tool_result,
                }),
                AgentEvent::ConversationCompleted {
                    message,
                    usage,
                    rounds,
                } => {
                    result.message = message;
                    result.usage = usage;
                    result.rounds = rounds;
                    return Ok(result);
                }
                AgentEvent::Error {
                    message,
                    code,
                    recoverable,
                } => {
                    return Err(match code.as_deref() {
                        Some("aborted") => AgentError::Cancelled,
                        _ => AgentError::Run {
                            message,
                            recoverable,
                        },
                    });
                }
                _ => {}
            }
        }

        Err(AgentError::internal("Agent stream ended without a terminal event"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Run
// ─────────────────────────────────────────────────────────────────────────────

/// Provider routing resolved from a specification.
struct Route {
    provider: Provider,
    backend: SharedBackend,
    model: String,
    system_prompt: Option<String>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    max_tokens: u32,
    thinking_budget: Option<u32>,
}

struct Outcome {
    message: String,
    usage: Usage,
    rounds: u32,
}

/// Text shown so far, with optional smoothing.
struct Transcript {
    text: String,
    shown: String,
    buffer: ChunkBuffer,
    new_round: bool,
}

impl Transcript {
    fn new(options: &AgentOptions) -> Self {
        Self {
            text: String::new(),
            shown: String::new(),
            buffer: ChunkBuffer::new(options.smoothing.strategy),
            new_round: false,
        }
    }

    /// Rounds are separated by a blank line once text exists.
    fn start_round(&mut self) {
        self.new_round = !self.text.is_empty();
    }

    fn append(&mut self, delta: &str) -> String {
        let mut delta = delta.to_string();
        if std::mem::take(&mut self.new_round) {
            delta.insert_str(0, "\n\n");
        }
        self.text.push_str(&delta);
        delta
    }
}

struct Run {
    service: Arc<dyn ConversationService>,
    providers: Arc<ProviderRegistry>,
    tools: Arc<ToolRegistry>,
    options: AgentOptions,
    tx: mpsc::Sender<AgentEvent>,
    cancellation: CancellationToken,
}

impl Run {
    async fn drive(self, request: AgentRequest) {
        let terminal = match self.execute(&request).await {
            Ok(outcome) => {
                info!(
                    rounds = outcome.rounds,
                    output_tokens = outcome.usage.output_tokens,
                    "Agent run completed"
                );
                AgentEvent::ConversationCompleted {
                    message: outcome.message,
                    usage: outcome.usage,
                    rounds: outcome.rounds,
                }
            }
            Err(err) => {
                if matches!(err, AgentError::Cancelled) {
                    info!("Agent run aborted");
                } else {
                    warn!(error = %err, "Agent run failed");
                }
                AgentEvent::Error {
                    message: err.to_string(),
                    code: Some(err.code().to_string()),
                    recoverable: err.is_recoverable(),
                }
            }
        };
        if self.tx.send(terminal).await.is_err() {
            debug!("Event receiver dropped before the run finished");
        }
    }

    /// Await `fut` unless the run is cancelled first.
    async fn guard<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(AgentError::Cancelled),
            out = fut => Ok(out),
        }
    }

    async fn emit(&self, event: AgentEvent) -> Result<()> {
        self.guard(self.tx.send(event))
            .await?
            .map_err(|_| AgentError::Cancelled)
    }

    async fn execute(&self, request: &AgentRequest) -> Result<Outcome> {
        let specification_id = request.specification_id.as_deref();
        let specification = match specification_id {
            Some(id) => Some(self.guard(self.service.get_specification(id)).await??),
            None => None,
        };
        let route = specification.as_ref().and_then(|spec| self.route(spec));

        let conversation_id = match &request.conversation_id {
            Some(id) => id.clone(),
            None => {
                self.guard(self.service.create_conversation(specification_id))
                    .await??
            }
        };
        info!(
            conversation_id = %conversation_id,
            provider = route.as_ref().map(|r| r.provider.as_str()).unwrap_or("platform"),
            "Agent run started"
        );
        self.emit(AgentEvent::ConversationStarted {
            conversation_id: conversation_id.clone(),
            timestamp: Utc::now(),
            model: route.as_ref().map(|r| r.model.clone()),
        })
        .await?;

        let mut transcript = Transcript::new(&self.options);
        let outcome = match route {
            Some(route) => {
                self.run_backend(&conversation_id, request, route, &mut transcript)
                    .await?
            }
            None => {
                self.run_platform(&conversation_id, request, &mut transcript)
                    .await?
            }
        };

        if self.options.show_token_stream && !outcome.message.is_empty() {
            self.emit(AgentEvent::MessageUpdate {
                message: outcome.message.clone(),
                is_streaming: false,
            })
            .await?;
        }
        Ok(outcome)
    }

    fn route(&self, spec: &Specification) -> Option<Route> {
        let provider = provider_for(spec.service_type?)?;
        let Some(backend) = self.providers.get(provider) else {
            debug!(%provider, "No backend configured, using platform completion");
            return None;
        };
        let props = spec.model_properties().cloned().unwrap_or_default();
        let Some(model) =
            resolve_model_name(provider, props.model.as_deref(), props.model_name.as_deref())
        else {
            debug!(%provider, model = ?props.model, "Unknown model, using platform completion");
            return None;
        };

        let thinking_budget = match props.enable_thinking {
            Some(true) => Some(
                props
                    .thinking_token_limit
                    .or_else(|| self.providers.thinking_budget(provider))
                    .unwrap_or(DEFAULT_THINKING_BUDGET),
            ),
            Some(false) => None,
            None => self.providers.thinking_budget(provider),
        };

        Some(Route {
            provider,
            backend,
            model,
            system_prompt: spec.system_prompt.clone(),
            temperature: props.temperature,
            top_p: props.probability,
            max_tokens: props
                .completion_token_limit
                .unwrap_or(self.options.max_tokens),
            thinking_budget,
        })
    }

    // ── Direct provider streaming ──────────────────────────────────────────

    async fn run_backend(
        &self,
        conversation_id: &str,
        request: &AgentRequest,
        route: Route,
        transcript: &mut Transcript,
    ) -> Result<Outcome> {
        let formatted = self
            .guard(self.service.format_conversation(
                conversation_id,
                &request.prompt,
                request.specification_id.as_deref(),
            ))
            .await??;
        let (history_system, mut messages) = history_messages(&formatted, &request.prompt);
        let system = [route.system_prompt.clone(), history_system]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("\n\n");
        let tools = self.tools.to_llm_definitions();
        let started = Instant::now();

        let mut usage = Usage::default();
        let mut rounds = 0;
        let mut tool_rounds = 0;

        loop {
            rounds += 1;
            let mut completion =
                CompletionRequest::new(route.model.clone(), messages.clone(), route.max_tokens);
            if !system.is_empty() {
                completion = completion.with_system(system.clone());
            }
            if !tools.is_empty() {
                completion = completion.with_tools(tools.clone());
            }
            if let Some(t) = route.temperature {
                completion = completion.with_temperature(t);
            }
            if let Some(p) = route.top_p {
                completion = completion.with_top_p(p);
            }
            if let Some(budget) = route.thinking_budget {
                completion = completion.with_thinking_budget(budget);
            }

            debug!(round = rounds, model = %route.model, messages = messages.len(), "Streaming round");
            transcript.start_round();
            let response = self.stream_round(&route, completion, rounds, transcript).await?;
            usage.accumulate(&response.usage);

            let tool_uses = response.tool_uses();
            if tool_uses.is_empty() {
                break;
            }
            if tool_rounds >= self.options.max_tool_rounds {
                let skipped = tool_uses
                    .into_iter()
                    .map(|t| ToolCall::new(t.id, t.name, t.input));
                self.skip_tools(skipped, false).await?;
                break;
            }
            tool_rounds += 1;

            messages.push(Message::assistant_blocks(response.content.clone()));
            let mut results = Vec::with_capacity(tool_uses.len());
            for tool_use in tool_uses {
                let call = ToolCall::new(tool_use.id, tool_use.name, tool_use.input);
                let id = call.id.clone();
                let result = self.run_tool(conversation_id, rounds, call).await?;
                results.push(if result.is_error() {
                    ToolResultBlock::error(id, result.to_llm_content())
                } else {
                    ToolResultBlock::success(id, result.to_llm_content())
                });
            }
            messages.push(Message::tool_results(results));
        }

        self.flush_text(transcript).await?;
        let elapsed = started.elapsed().as_secs_f64();
        self.guard(self.service.complete_conversation(
            conversation_id,
            &transcript.text,
            Some(elapsed),
        ))
        .await??;

        Ok(Outcome {
            message: transcript.text.clone(),
            usage,
            rounds,
        })
    }

    async fn stream_round(
        &self,
        route: &Route,
        request: CompletionRequest,
        round: u32,
        transcript: &mut Transcript,
    ) -> Result<CompletionResponse> {
        let mut stream = self.guard(route.backend.complete_stream(request)).await??;
        let mut accumulator = StreamAccumulator::new();
        let mut reasoning: Option<(usize, ReasoningFormat, String)> = None;

        while let Some(event) = self.guard(stream.next()).await? {
            let event = event?;
            accumulator.push(&event)?;

            match event {
                StreamEvent::ContentBlockStart {
                    index,
                    block: BlockStart::Thinking,
                } => reasoning = Some((index, ReasoningFormat::Thinking, String::new())),
                StreamEvent::ContentBlockStart {
                    index,
                    block: BlockStart::InlineThinking,
                } => reasoning = Some((index, ReasoningFormat::ThinkTag, String::new())),
                StreamEvent::ContentBlockStart {
                    block: BlockStart::ToolUse { id, name },
                    ..
                } => {
                    debug!(round, tool = %name, "Model is preparing a tool call");
                    let call = ToolCall::new(id, name, serde_json::Value::Null);
                    self.emit(AgentEvent::tool(call, ToolStatus::Preparing))
                        .await?;
                }
                StreamEvent::ContentBlockDelta {
                    delta: ContentDelta::TextDelta(text),
                    ..
                } => self.show_text(transcript, &text).await?,
                StreamEvent::ContentBlockDelta {
                    index,
                    delta: ContentDelta::ThinkingDelta(text),
                } => {
                    let (_, format, content) = reasoning
                        .get_or_insert_with(|| (index, ReasoningFormat::Thinking, String::new()));
                    content.push_str(&text);
                    let (format, content) = (*format, content.clone());
                    self.emit(AgentEvent::ReasoningUpdate {
                        content,
                        format,
                        is_complete: false,
                    })
                    .await?;
                }
                StreamEvent::ContentBlockStop { index } => {
                    if let Some((open, format, content)) =
                        reasoning.take_if(|(open, _, _)| *open == index)
                    {
                        debug!(index = open, chars = content.len(), "Reasoning block finished");
                        self.emit(AgentEvent::ReasoningUpdate {
                            content,
                            format,
                            is_complete: true,
                        })
                        .await?;
                    }
                }
                _ => {}
            }
        }

        if !accumulator.is_finished() {
            warn!(round, "Provider stream ended without MessageStop");
        }
        Ok(accumulator.into_response()?)
    }

    // ── Platform-side completion ───────────────────────────────────────────

    async fn run_platform(
        &self,
        conversation_id: &str,
        request: &AgentRequest,
        transcript: &mut Transcript,
    ) -> Result<Outcome> {
        let mut response = self
            .guard(self.service.prompt_conversation(
                conversation_id,
                &request.prompt,
                request.specification_id.as_deref(),
                self.tools.to_platform_definitions(),
            ))
            .await??;

        let mut usage = Usage::default();
        let mut rounds = 0;
        let mut tool_rounds = 0;

        loop {
            rounds += 1;
            let Some(message) = response.message.take() else {
                return Err(AgentError::internal(
                    "Platform completion returned no message",
                ));
            };
            if let Some(tokens) = message.tokens {
                usage.output_tokens += tokens;
            }

            transcript.start_round();
            if !message.text().is_empty() {
                self.show_text(transcript, message.text()).await?;
            }

            if message.tool_calls.is_empty() {
                break;
            }
            if tool_rounds >= self.options.max_tool_rounds {
                let skipped = message.tool_calls.iter().map(|t| {
                    ToolCall::new(t.id.clone(), t.name.clone(), parse_arguments(&t.arguments))
                });
                self.skip_tools(skipped, true).await?;
                break;
            }
            tool_rounds += 1;

            let mut responses = Vec::with_capacity(message.tool_calls.len());
            for requested in &message.tool_calls {
                let call = ToolCall::new(
                    requested.id.clone(),
                    requested.name.clone(),
                    parse_arguments(&requested.arguments),
                );
                self.emit(AgentEvent::tool(call.clone(), ToolStatus::Preparing))
                    .await?;
                let result = self.run_tool(conversation_id, rounds, call).await?;
                responses.push(ConversationToolResponseInput {
                    id: requested.id.clone(),
                    content: result.to_llm_content(),
                });
            }

            response = self
                .guard(self.service.continue_conversation(conversation_id, responses))
                .await??;
        }

        self.flush_text(transcript).await?;
        Ok(Outcome {
            message: transcript.text.clone(),
            usage,
            rounds,
        })
    }

    // ── Shared steps ───────────────────────────────────────────────────────

    /// Close out tool calls left unexecuted by the round limit. `announce`
    /// emits `Preparing` first for calls the stream has not reported yet.
    async fn skip_tools(&self, calls: impl Iterator<Item = ToolCall>, announce: bool) -> Result<()> {
        warn!(
            max_tool_rounds = self.options.max_tool_rounds,
            "Tool round limit reached, finishing without executing tools"
        );
        for call in calls {
            if announce {
                self.emit(AgentEvent::tool(call.clone(), ToolStatus::Preparing))
                    .await?;
            }
            self.emit(AgentEvent::ToolUpdate {
                tool_call: call,
                status: ToolStatus::Failed,
                result: None,
                error: Some(TOOL_ROUND_LIMIT.to_string()),
            })
            .await?;
        }
        Ok(())
    }

    /// Execute one tool call, reporting its lifecycle.
    ///
    /// Unknown tools and tool failures become error results for the model.
    /// Only a fatal result or cancellation ends the run.
    async fn run_tool(&self, conversation_id: &str, round: u32, call: ToolCall) -> Result<ToolResult> {
        self.emit(AgentEvent::tool(call.clone(), ToolStatus::Executing))
            .await?;

        let ctx = ToolContext::new(conversation_id, round)
            .with_cancellation(self.cancellation.child_token())
            .with_tool_call(call.id.clone());
        let outcome = self
            .guard(self.tools.execute(&call.name, call.arguments.clone(), &ctx))
            .await?;

        let result = match outcome {
            Ok(result) => result,
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(AgentError::ToolNotFound(name)) => {
                warn!(tool = %name, "Model called an unknown tool");
                ToolResult::error(format!("Unknown tool: {}", name))
            }
            Err(e) => ToolResult::error(e.to_string()),
        };

        let event = match &result {
            ToolResult::Error { message, .. } => {
                debug!(tool = %call.name, error = %message, "Tool failed");
                AgentEvent::ToolUpdate {
                    tool_call: call,
                    status: ToolStatus::Failed,
                    result: Some(result.clone()),
                    error: Some(message.clone()),
                }
            }
            _ => AgentEvent::ToolUpdate {
                tool_call: call,
                status: ToolStatus::Completed,
                result: Some(result.clone()),
                error: None,
            },
        };
        self.emit(event).await?;

        if let ToolResult::Error {
            message,
            recoverable: false,
        } = &result
        {
            return Err(AgentError::tool(message.clone()));
        }
        Ok(result)
    }

    async fn show_text(&self, transcript: &mut Transcript, delta: &str) -> Result<()> {
        let delta = transcript.append(delta);
        if !self.options.show_token_stream {
            return Ok(());
        }
        if !self.options.smoothing.enabled {
            transcript.shown.clone_from(&transcript.text);
            return self
                .emit(AgentEvent::MessageUpdate {
                    message: transcript.text.clone(),
                    is_streaming: true,
                })
                .await;
        }
        for chunk in transcript.buffer.push(&delta) {
            self.show_chunk(transcript, &chunk).await?;
            self.guard(tokio::time::sleep(self.options.smoothing.delay))
                .await?;
        }
        Ok(())
    }

    async fn flush_text(&self, transcript: &mut Transcript) -> Result<()> {
        if self.options.show_token_stream
            && self.options.smoothing.enabled
            && let Some(rest) = transcript.buffer.flush()
        {
            self.show_chunk(transcript, &rest).await?;
        }
        Ok(())
    }

    async fn show_chunk(&self, transcript: &mut Transcript, chunk: &str) -> Result<()> {
        transcript.shown.push_str(chunk);
        self.emit(AgentEvent::MessageUpdate {
            message: transcript.shown.clone(),
            is_streaming: true,
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn provider_for(service_type: ModelServiceType) -> Option<Provider> {
    Some(match service_type {
        ModelServiceType::OpenAi => Provider::OpenAi,
        ModelServiceType::Anthropic => Provider::Anthropic,
        ModelServiceType::Google => Provider::Google,
        ModelServiceType::Groq => Provider::Groq,
        ModelServiceType::Cerebras => Provider::Cerebras,
        ModelServiceType::Cohere => Provider::Cohere,
        ModelServiceType::Mistral => Provider::Mistral,
        ModelServiceType::Bedrock => Provider::Bedrock,
        ModelServiceType::Deepseek => Provider::Deepseek,
        ModelServiceType::Unknown => return None,
    })
}

/// Tool arguments arrive as a JSON string; empty means no arguments.
fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// Convert a formatted conversation into provider messages.
///
/// System messages are returned separately. The formatted prompt replaces a
/// trailing user message in the history, or is appended.
fn history_messages(formatted: &PromptConversation, prompt: &str) -> (Option<String>, Vec<Message>) {
    let history = formatted
        .details
        .as_ref()
        .map(|d| d.messages.as_slice())
        .unwrap_or_default();
    let history = match history.split_last() {
        Some((last, rest)) if last.role == ConversationRole::User => rest,
        _ => history,
    };

    let mut system = Vec::new();
    let mut messages = Vec::new();
    let mut results: Vec<ToolResultBlock> = Vec::new();

    for message in history {
        if message.role != ConversationRole::Tool && !results.is_empty() {
            messages.push(Message::tool_results(std::mem::take(&mut results)));
        }
        match message.role {
            ConversationRole::System => system.push(message.text().to_string()),
            ConversationRole::User => messages.push(Message::user(message.text())),
            ConversationRole::Assistant if message.tool_calls.is_empty() => {
                messages.push(Message::assistant(message.text()))
            }
            ConversationRole::Assistant => {
                let mut blocks = Vec::with_capacity(message.tool_calls.len() + 1);
                if !message.text().is_empty() {
                    blocks.push(ContentBlock::text(message.text()));
                }
                blocks.extend(message.tool_calls.iter().map(|call| {
                    ContentBlock::tool_use(&call.id, &call.name, parse_arguments(&call.arguments))
                }));
                messages.push(Message::assistant_blocks(blocks));
            }
            ConversationRole::Tool => match &message.tool_call_id {
                Some(id) => results.push(ToolResultBlock::success(id, message.text())),
                None => warn!("Skipping tool message without a tool call id"),
            },
            ConversationRole::Unknown => debug!("Skipping message with unknown role"),
        }
    }
    if !results.is_empty() {
        messages.push(Message::tool_results(results));
    }

    let prompt = formatted
        .message
        .as_ref()
        .map(|m| m.text())
        .filter(|text| !text.is_empty())
        .unwrap_or(prompt);
    messages.push(Message::user(prompt));

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, messages)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::time::Duration;
    use strata_client::ToolDefinitionInput;
    use strata_llm::{Content, LlmError, MockBackend, MockResponse, Role, StopReason};

    use crate::smoothing::{ChunkingStrategy, SmoothingOptions};
    use crate::tool::MockTool;

    // ── Fixtures ───────────────────────────────────────────────────────────

    #[derive(Default)]
    struct MockService {
        specification: Option<serde_json::Value>,
        format: Option<serde_json::Value>,
        prompts: Mutex<VecDeque<serde_json::Value>>,
        completions: Mutex<Vec<String>>,
        continuations: Mutex<Vec<Vec<ConversationToolResponseInput>>>,
        prompted_tools: Mutex<Vec<ToolDefinitionInput>>,
        reject_create: bool,
    }

    impl MockService {
        fn with_specification(service_type: &str, props: serde_json::Value) -> Self {
            let field = match service_type {
                "OPEN_AI" => "openAI".to_string(),
                other => other.to_ascii_lowercase(),
            };
            let mut spec = json!({
                "id": "spec-1",
                "name": "Chat",
                "serviceType": service_type,
                "systemPrompt": "Be brief.",
            });
            spec[field.as_str()] = props;
            Self {
                specification: Some(spec),
                ..Default::default()
            }
        }

        fn with_prompts(self, prompts: Vec<serde_json::Value>) -> Self {
            *self.prompts.lock() = prompts.into();
            self
        }
    }

    #[async_trait]
    impl ConversationService for MockService {
        async fn get_specification(&self, _id: &str) -> Result<Specification> {
            match &self.specification {
                Some(spec) => Ok(serde_json::from_value(spec.clone())?),
                None => Err(AgentError::Client(strata_client::Error::NotFound(
                    "specification".into(),
                ))),
            }
        }

        async fn create_conversation(&self, _specification_id: Option<&str>) -> Result<String> {
            if self.reject_create {
                return Err(AgentError::Client(strata_client::Error::Api {
                    status: 500,
                    message: "create failed".into(),
                    retry_after: None,
                }));
            }
            Ok("conv-1".to_string())
        }

        async fn format_conversation(
            &self,
            _conversation_id: &str,
            prompt: &str,
            _specification_id: Option<&str>,
        ) -> Result<PromptConversation> {
            let value = self.format.clone().unwrap_or_else(|| {
                json!({
                    "conversation": {"id": "conv-1"},
                    "message": {"role": "USER", "message": format!("[ctx] {prompt}")},
                })
            });
            Ok(serde_json::from_value(value)?)
        }

        async fn complete_conversation(
            &self,
            _conversation_id: &str,
            completion: &str,
            _completion_time_secs: Option<f64>,
        ) -> Result<()> {
            self.completions.lock().push(completion.to_string());
            Ok(())
        }

        async fn prompt_conversation(
            &self,
            _conversation_id: &str,
            _prompt: &str,
            _specification_id: Option<&str>,
            tools: Vec<ToolDefinitionInput>,
        ) -> Result<PromptConversation> {
            *self.prompted_tools.lock() = tools;
            self.next_prompt()
        }

        async fn continue_conversation(
            &self,
            _conversation_id: &str,
            responses: Vec<ConversationToolResponseInput>,
        ) -> Result<PromptConversation> {
            self.continuations.lock().push(responses);
            self.next_prompt()
        }
    }

    impl MockService {
        fn next_prompt(&self) -> Result<PromptConversation> {
            let value = self
                .prompts
                .lock()
                .pop_front()
                .ok_or_else(|| AgentError::internal("no scripted prompt response"))?;
            Ok(serde_json::from_value(value)?)
        }
    }

    fn anthropic_service() -> Arc<MockService> {
        Arc::new(MockService::with_specification(
            "ANTHROPIC",
            json!({"model": "CLAUDE_3_7_SONNET", "temperature": 0.1}),
        ))
    }

    fn providers(backend: Arc<MockBackend>) -> Arc<ProviderRegistry> {
        let mut registry = ProviderRegistry::new();
        registry.register(Provider::Anthropic, backend);
        Arc::new(registry)
    }

    fn request() -> AgentRequest {
        AgentRequest::new("What is new?").with_specification("spec-1")
    }

    async fn collect(stream: AgentStream) -> Vec<AgentEvent> {
        stream.collect().await
    }

    fn assert_well_formed(events: &[AgentEvent]) {
        assert!(
            matches!(events.first(), Some(AgentEvent::ConversationStarted { .. })),
            "first event: {:?}",
            events.first()
        );
        let terminals = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminals, 1);
        assert!(events.last().is_some_and(AgentEvent::is_terminal));
    }

    fn tool_statuses(events: &[AgentEvent]) -> Vec<(String, ToolStatus)> {
        events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::ToolUpdate {
                    tool_call, status, ..
                } => Some((tool_call.name.clone(), *status)),
                _ => None,
            })
            .collect()
    }

    /// Status and error of every update for one tool call id.
    fn updates_for(events: &[AgentEvent], id: &str) -> Vec<(ToolStatus, Option<String>)> {
        events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::ToolUpdate {
                    tool_call,
                    status,
                    error,
                    ..
                } if tool_call.id == id => Some((*status, error.clone())),
                _ => None,
            })
            .collect()
    }

    // ── Backend path ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_backend_text_run() {
        let backend = Arc::new(MockBackend::new(vec![MockResponse::text_chunks(&[
            "Hello", " world",
        ])]));
        let service = anthropic_service();
        let agent = Agent::new(service.clone(), providers(backend.clone()));

        let events = collect(agent.stream_agent(request(), CancellationToken::new())).await;
        assert_well_formed(&events);

        match &events[0] {
            AgentEvent::ConversationStarted {
                conversation_id,
                model,
                ..
            } => {
                assert_eq!(conversation_id, "conv-1");
                assert_eq!(model.as_deref(), Some("claude-3-7-sonnet-latest"));
            }
            other => panic!("unexpected {other:?}"),
        }
        let updates: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::MessageUpdate {
                    message,
                    is_streaming,
                } => Some((message.as_str(), *is_streaming)),
                _ => None,
            })
            .collect();
        assert_eq!(
            updates,
            vec![("Hello", true), ("Hello world", true), ("Hello world", false)]
        );
        match events.last() {
            Some(AgentEvent::ConversationCompleted {
                message, rounds, ..
            }) => {
                assert_eq!(message, "Hello world");
                assert_eq!(*rounds, 1);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(*service.completions.lock(), vec!["Hello world".to_string()]);
        let sent = &backend.requests()[0];
        assert_eq!(sent.model, "claude-3-7-sonnet-latest");
        assert_eq!(sent.system.as_deref(), Some("Be brief."));
        assert_eq!(sent.temperature, Some(0.1));
        assert_eq!(sent.messages.len(), 1);
        assert_eq!(sent.messages[0].content.to_text(), "[ctx] What is new?");
    }

    #[tokio::test]
    async fn test_backend_tool_round() {
        let backend = Arc::new(MockBackend::new(vec![
            MockResponse::tool_call("t1", "lookup", json!({"id": "42"})),
            MockResponse::text("Order 42 shipped."),
        ]));
        let lookup = Arc::new(MockTool::new("lookup").with_response(ToolResult::text("shipped")));
        let mut tools = ToolRegistry::new();
        tools.register_arc(lookup.clone());

        let agent = Agent::new(anthropic_service(), providers(backend.clone())).with_tools(tools);
        let events = collect(agent.stream_agent(request(), CancellationToken::new())).await;
        assert_well_formed(&events);

        assert_eq!(
            tool_statuses(&events),
            vec![
                ("lookup".to_string(), ToolStatus::Preparing),
                ("lookup".to_string(), ToolStatus::Executing),
                ("lookup".to_string(), ToolStatus::Completed),
            ]
        );
        assert_eq!(lookup.calls(), vec![json!({"id": "42"})]);
        let ctx = &lookup.contexts()[0];
        assert_eq!(ctx.conversation_id, "conv-1");
        assert_eq!(ctx.round, 1);
        assert_eq!(ctx.tool_call_id.as_deref(), Some("t1"));

        let second = &backend.requests()[1];
        assert_eq!(second.tools.len(), 1);
        assert_eq!(second.messages.len(), 3);
        assert_eq!(second.messages[1].role, Role::Assistant);
        match &second.messages[2].content {
            Content::Blocks(blocks) => assert_eq!(
                blocks[0],
                ContentBlock::ToolResult {
                    tool_use_id: "t1".into(),
                    content: "shipped".into(),
                    is_error: false,
                }
            ),
            other => panic!("unexpected {other:?}"),
        }

        match events.last() {
            Some(AgentEvent::ConversationCompleted { rounds, usage, .. }) => {
                assert_eq!(*rounds, 2);
                assert_eq!(usage.input_tokens, 20);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fed_back() {
        let backend = Arc::new(MockBackend::new(vec![
            MockResponse::tool_call("t1", "missing", json!({})),
            MockResponse::text("Sorry."),
        ]));
        let agent = Agent::new(anthropic_service(), providers(backend.clone()));
        let events = collect(agent.stream_agent(request(), CancellationToken::new())).await;
        assert_well_formed(&events);

        let failed = events.iter().find_map(|e| match e {
            AgentEvent::ToolUpdate {
                status: ToolStatus::Failed,
                error,
                ..
            } => error.clone(),
            _ => None,
        });
        assert_eq!(failed.as_deref(), Some("Unknown tool: missing"));
        assert!(matches!(
            events.last(),
            Some(AgentEvent::ConversationCompleted { .. })
        ));

        let second = &backend.requests()[1];
        match &second.messages[2].content {
            Content::Blocks(blocks) => {
                assert!(matches!(&blocks[0], ContentBlock::ToolResult { is_error: true, .. }))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fatal_tool_error_ends_run() {
        let backend = Arc::new(MockBackend::new(vec![MockResponse::tool_call(
            "t1",
            "deploy",
            json!({}),
        )]));
        let mut tools = ToolRegistry::new();
        tools.register(MockTool::new("deploy").with_response(ToolResult::fatal_error("no access")));
        let agent = Agent::new(anthropic_service(), providers(backend)).with_tools(tools);

        let events = collect(agent.stream_agent(request(), CancellationToken::new())).await;
        assert_well_formed(&events);
        match events.last() {
            Some(AgentEvent::Error {
                code, recoverable, ..
            }) => {
                assert_eq!(code.as_deref(), Some("tool_error"));
                assert!(!recoverable);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_max_tool_rounds_stops_loop() {
        let backend = Arc::new(MockBackend::new(vec![
            MockResponse::tool_call("t1", "lookup", json!({})),
            MockResponse::tool_call("t2", "lookup", json!({})),
            MockResponse::text("never reached"),
        ]));
        let lookup = Arc::new(MockTool::new("lookup"));
        let mut tools = ToolRegistry::new();
        tools.register_arc(lookup.clone());

        let agent = Agent::new(anthropic_service(), providers(backend.clone()))
            .with_tools(tools)
            .with_options(AgentOptions::new().with_max_tool_rounds(1));
        let events = collect(agent.stream_agent(request(), CancellationToken::new())).await;
        assert_well_formed(&events);

        assert_eq!(lookup.call_count(), 1);
        assert_eq!(backend.request_count(), 2);
        assert!(matches!(
            events.last(),
            Some(AgentEvent::ConversationCompleted { rounds: 2, .. })
        ));

        assert_eq!(
            updates_for(&events, "t1"),
            vec![
                (ToolStatus::Preparing, None),
                (ToolStatus::Executing, None),
                (ToolStatus::Completed, None),
            ]
        );
        assert_eq!(
            updates_for(&events, "t2"),
            vec![
                (ToolStatus::Preparing, None),
                (ToolStatus::Failed, Some(TOOL_ROUND_LIMIT.to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_reasoning_updates() {
        let response = CompletionResponse::new(
            "m1",
            "mock-model",
            vec![ContentBlock::thinking("Let me think"), ContentBlock::text("42")],
            StopReason::EndTurn,
            Usage::new(3, 4),
        );
        let backend = Arc::new(MockBackend::new(vec![MockResponse::Response(response)]));
        let agent = Agent::new(anthropic_service(), providers(backend));
        let events = collect(agent.stream_agent(request(), CancellationToken::new())).await;
        assert_well_formed(&events);

        let reasoning: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::ReasoningUpdate {
                    content,
                    format,
                    is_complete,
                } => Some((content.as_str(), *format, *is_complete)),
                _ => None,
            })
            .collect();
        assert_eq!(
            reasoning,
            vec![
                ("Let me think", ReasoningFormat::Thinking, false),
                ("Let me think", ReasoningFormat::Thinking, true),
            ]
        );
    }

    #[tokio::test]
    async fn test_reasoning_format_follows_block_origin() {
        let thinking_block = |index: usize, block: BlockStart, text: &str| {
            vec![
                StreamEvent::ContentBlockStart { index, block },
                StreamEvent::ContentBlockDelta {
                    index,
                    delta: ContentDelta::ThinkingDelta(text.into()),
                },
                StreamEvent::ContentBlockStop { index },
            ]
        };
        let mut events = vec![StreamEvent::MessageStart {
            id: "m".into(),
            model: "deepseek-reasoner".into(),
        }];
        events.extend(thinking_block(0, BlockStart::Thinking, "native"));
        events.extend(thinking_block(1, BlockStart::InlineThinking, "tagged"));
        events.push(StreamEvent::MessageStop);

        let backend = Arc::new(MockBackend::new(vec![MockResponse::Events(events)]));
        let mut registry = ProviderRegistry::new();
        registry.register(Provider::Deepseek, backend);
        let service = Arc::new(MockService::with_specification(
            "DEEPSEEK",
            json!({"model": "DEEPSEEK_REASONER"}),
        ));
        let agent = Agent::new(service, Arc::new(registry));
        let events = collect(agent.stream_agent(request(), CancellationToken::new())).await;
        assert_well_formed(&events);

        let finished: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::ReasoningUpdate {
                    content,
                    format,
                    is_complete: true,
                } => Some((content.as_str(), *format)),
                _ => None,
            })
            .collect();
        assert_eq!(
            finished,
            vec![
                ("native", ReasoningFormat::Thinking),
                ("tagged", ReasoningFormat::ThinkTag),
            ]
        );
    }

    #[tokio::test]
    async fn test_provider_error_recoverability() {
        for (error, expected) in [
            (LlmError::Network("reset".into()), true),
            (LlmError::Auth("bad key".into()), false),
        ] {
            let backend = Arc::new(MockBackend::new(vec![MockResponse::Error(error)]));
            let service = anthropic_service();
            let agent = Agent::new(service.clone(), providers(backend));
            let events = collect(agent.stream_agent(request(), CancellationToken::new())).await;
            assert_well_formed(&events);
            match events.last() {
                Some(AgentEvent::Error { recoverable, .. }) => assert_eq!(*recoverable, expected),
                other => panic!("unexpected {other:?}"),
            }
            assert!(service.completions.lock().is_empty());
        }
    }

    #[tokio::test]
    async fn test_malformed_tool_block_ends_run() {
        let backend = Arc::new(MockBackend::new(vec![MockResponse::Events(vec![
            StreamEvent::MessageStart {
                id: "m".into(),
                model: "mock".into(),
            },
            StreamEvent::ContentBlockStart {
                index: 0,
                block: BlockStart::ToolUse {
                    id: "t1".into(),
                    name: String::new(),
                },
            },
            StreamEvent::MessageStop,
        ])]));
        let lookup = Arc::new(MockTool::new("lookup"));
        let mut tools = ToolRegistry::new();
        tools.register_arc(lookup.clone());
        let service = anthropic_service();
        let agent = Agent::new(service.clone(), providers(backend)).with_tools(tools);

        let events = collect(agent.stream_agent(request(), CancellationToken::new())).await;
        assert_well_formed(&events);
        assert!(tool_statuses(&events).is_empty());
        assert!(matches!(events.last(), Some(AgentEvent::Error { .. })));
        assert_eq!(lookup.call_count(), 0);
        assert!(service.completions.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_mid_stream() {
        let backend = Arc::new(MockBackend::new(vec![MockResponse::Stall(vec![
            StreamEvent::MessageStart {
                id: "m".into(),
                model: "mock".into(),
            },
            StreamEvent::ContentBlockStart {
                index: 0,
                block: BlockStart::Text,
            },
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::TextDelta("partial".into()),
            },
        ])]));
        let service = anthropic_service();
        let agent = Agent::new(service.clone(), providers(backend));
        let token = CancellationToken::new();
        let mut stream = agent.stream_agent(request(), token.clone());

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            if matches!(event, AgentEvent::MessageUpdate { .. }) {
                token.cancel();
            }
            events.push(event);
        }
        assert_well_formed(&events);
        match events.last() {
            Some(AgentEvent::Error {
                code, recoverable, ..
            }) => {
                assert_eq!(code.as_deref(), Some("aborted"));
                assert!(!recoverable);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(service.completions.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_during_tool() {
        let backend = Arc::new(MockBackend::new(vec![MockResponse::tool_call(
            "t1",
            "slow",
            json!({}),
        )]));
        let mut tools = ToolRegistry::new();
        tools.register(crate::tool::FnTool::new(
            "slow",
            "Never finishes",
            json!({"type": "object"}),
            |_, ctx| async move {
                ctx.cancellation.cancelled().await;
                Ok(ToolResult::text("unreachable"))
            },
        ));
        let agent = Agent::new(anthropic_service(), providers(backend)).with_tools(tools);
        let token = CancellationToken::new();
        let mut stream = agent.stream_agent(request(), token.clone());

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            if matches!(
                event,
                AgentEvent::ToolUpdate {
                    status: ToolStatus::Executing,
                    ..
                }
            ) {
                token.cancel();
            }
            events.push(event);
        }
        assert!(matches!(
            events.last(),
            Some(AgentEvent::Error { code: Some(code), .. }) if code == "aborted"
        ));
        assert!(!tool_statuses(&events).iter().any(|(_, s)| *s == ToolStatus::Completed));
    }

    #[tokio::test]
    async fn test_smoothing_emits_word_chunks() {
        let backend = Arc::new(MockBackend::new(vec![MockResponse::text_chunks(&[
            "Hel", "lo wor", "ld",
        ])]));
        let options = AgentOptions::new().with_smoothing(SmoothingOptions::enabled(
            ChunkingStrategy::Word,
            Duration::ZERO,
        ));
        let agent = Agent::new(anthropic_service(), providers(backend)).with_options(options);
        let events = collect(agent.stream_agent(request(), CancellationToken::new())).await;

        let updates: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::MessageUpdate { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(updates, vec!["Hello ", "Hello world", "Hello world"]);
    }

    #[tokio::test]
    async fn test_specification_error_before_conversation() {
        let backend = Arc::new(MockBackend::with_text("unused"));
        let agent = Agent::new(Arc::new(MockService::default()), providers(backend));
        let events = collect(agent.stream_agent(request(), CancellationToken::new())).await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            AgentEvent::Error { code, .. } => assert_eq!(code.as_deref(), Some("platform_error")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_error_before_conversation() {
        let mut service = MockService::with_specification(
            "ANTHROPIC",
            json!({"model": "CLAUDE_3_7_SONNET"}),
        );
        service.reject_create = true;
        let backend = Arc::new(MockBackend::with_text("unused"));
        let agent = Agent::new(Arc::new(service), providers(backend.clone()));
        let events = collect(
            agent.stream_agent(AgentRequest::new("hi").with_specification("spec-1"), CancellationToken::new()),
        )
        .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], AgentEvent::Error { .. }));
        assert_eq!(backend.request_count(), 0);
    }

    // ── Platform path ──────────────────────────────────────────────────────

    fn platform_service() -> Arc<MockService> {
        Arc::new(
            MockService::with_specification("COHERE", json!({"model": "COMMAND_R_PLUS"}))
                .with_prompts(vec![
                    json!({
                        "conversation": {"id": "conv-1"},
                        "message": {
                            "role": "ASSISTANT",
                            "message": "Checking.",
                            "tokens": 5,
                            "toolCalls": [{"id": "c1", "name": "lookup", "arguments": "{\"id\":\"7\"}"}]
                        }
                    }),
                    json!({
                        "conversation": {"id": "conv-1"},
                        "message": {"role": "ASSISTANT", "message": "Order 7 is late.", "tokens": 6}
                    }),
                ]),
        )
    }

    #[tokio::test]
    async fn test_platform_fallback_runs_tools_locally() {
        let service = platform_service();
        let lookup = Arc::new(MockTool::new("lookup").with_response(ToolResult::text("late")));
        let mut tools = ToolRegistry::new();
        tools.register_arc(lookup.clone());

        // No backend for Cohere is registered.
        let agent = Agent::new(service.clone(), Arc::new(ProviderRegistry::new())).with_tools(tools);
        let events = collect(agent.stream_agent(request(), CancellationToken::new())).await;
        assert_well_formed(&events);

        assert!(matches!(
            &events[0],
            AgentEvent::ConversationStarted { model: None, .. }
        ));
        assert_eq!(
            tool_statuses(&events).iter().map(|(_, s)| *s).collect::<Vec<_>>(),
            vec![ToolStatus::Preparing, ToolStatus::Executing, ToolStatus::Completed]
        );
        assert_eq!(lookup.calls(), vec![json!({"id": "7"})]);
        assert_eq!(service.prompted_tools.lock()[0].name, "lookup");
        assert_eq!(
            *service.continuations.lock(),
            vec![vec![ConversationToolResponseInput {
                id: "c1".into(),
                content: "late".into(),
            }]]
        );
        assert!(service.completions.lock().is_empty());

        match events.last() {
            Some(AgentEvent::ConversationCompleted {
                message,
                usage,
                rounds,
            }) => {
                assert_eq!(message, "Checking.\n\nOrder 7 is late.");
                assert_eq!(usage.output_tokens, 11);
                assert_eq!(*rounds, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_platform_round_limit_fails_pending_calls() {
        let tool_prompt = |id: &str| {
            json!({
                "conversation": {"id": "conv-1"},
                "message": {
                    "role": "ASSISTANT",
                    "message": "Checking.",
                    "toolCalls": [{"id": id, "name": "lookup", "arguments": "{}"}]
                }
            })
        };
        let service = Arc::new(
            MockService::with_specification("COHERE", json!({"model": "COMMAND_R_PLUS"}))
                .with_prompts(vec![tool_prompt("c1"), tool_prompt("c2")]),
        );
        let lookup = Arc::new(MockTool::new("lookup"));
        let mut tools = ToolRegistry::new();
        tools.register_arc(lookup.clone());

        let agent = Agent::new(service.clone(), Arc::new(ProviderRegistry::new()))
            .with_tools(tools)
            .with_options(AgentOptions::new().with_max_tool_rounds(1));
        let events = collect(agent.stream_agent(request(), CancellationToken::new())).await;
        assert_well_formed(&events);

        assert_eq!(lookup.call_count(), 1);
        assert_eq!(service.continuations.lock().len(), 1);
        assert_eq!(
            updates_for(&events, "c2"),
            vec![
                (ToolStatus::Preparing, None),
                (ToolStatus::Failed, Some(TOOL_ROUND_LIMIT.to_string())),
            ]
        );
        assert!(matches!(
            events.last(),
            Some(AgentEvent::ConversationCompleted { rounds: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_prompt_agent_collects_result() {
        let lookup = Arc::new(MockTool::new("lookup").with_response(ToolResult::text("late")));
        let mut tools = ToolRegistry::new();
        tools.register_arc(lookup);
        let agent =
            Agent::new(platform_service(), Arc::new(ProviderRegistry::new())).with_tools(tools);

        let result = agent
            .prompt_agent(request(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.conversation_id, "conv-1");
        assert_eq!(result.message, "Checking.\n\nOrder 7 is late.");
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_results[0].tool_call_id, "c1");
        assert_eq!(result.tool_results[0].result, ToolResult::text("late"));
        assert_eq!(result.rounds, 2);
    }

    #[tokio::test]
    async fn test_prompt_agent_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let agent = Agent::new(platform_service(), Arc::new(ProviderRegistry::new()));
        let err = agent.prompt_agent(request(), token).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    // ── History conversion ─────────────────────────────────────────────────

    #[test]
    fn test_history_messages() {
        let formatted: PromptConversation = serde_json::from_value(json!({
            "conversation": {"id": "conv-1"},
            "message": {"role": "USER", "message": "[ctx] and now?"},
            "details": {"messages": [
                {"role": "SYSTEM", "message": "Cite sources."},
                {"role": "USER", "message": "find order 7"},
                {"role": "ASSISTANT", "message": "", "toolCalls": [
                    {"id": "c1", "name": "lookup", "arguments": "{\"id\":\"7\"}"},
                    {"id": "c2", "name": "lookup", "arguments": ""}
                ]},
                {"role": "TOOL", "message": "late", "toolCallId": "c1"},
                {"role": "TOOL", "message": "none", "toolCallId": "c2"},
                {"role": "ASSISTANT", "message": "It is late."},
                {"role": "USER", "message": "and now?"}
            ]}
        }))
        .unwrap();

        let (system, messages) = history_messages(&formatted, "and now?");
        assert_eq!(system.as_deref(), Some("Cite sources."));
        assert_eq!(messages.len(), 5);

        match &messages[1].content {
            Content::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2);
                assert_eq!(blocks[0], ContentBlock::tool_use("c1", "lookup", json!({"id": "7"})));
                assert_eq!(blocks[1], ContentBlock::tool_use("c2", "lookup", json!({})));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &messages[2].content {
            Content::Blocks(blocks) => assert_eq!(blocks.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(messages[3].content.to_text(), "It is late.");
        assert_eq!(messages[4].content.to_text(), "[ctx] and now?");
    }

    #[test]
    fn test_provider_for_service_type() {
        assert_eq!(provider_for(ModelServiceType::OpenAi), Some(Provider::OpenAi));
        assert_eq!(provider_for(ModelServiceType::Deepseek), Some(Provider::Deepseek));
        assert_eq!(provider_for(ModelServiceType::Cohere), Some(Provider::Cohere));
        assert_eq!(provider_for(ModelServiceType::Unknown), None);
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_arguments("not json"), json!("not json"));
    }
}
