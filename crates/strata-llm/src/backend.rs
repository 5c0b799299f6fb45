//! LLM backend trait and the unified stream event model.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LlmError, ResponseValidationError, Result};
use crate::types::{CompletionRequest, CompletionResponse, StopReason, Usage};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Execute an async operation with exponential backoff retry.
///
/// Retries only on transient errors (network failures, rate limits, 5xx).
/// A rate limit's `retry_after` replaces the computed backoff for that attempt.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let wait = e.retry_after().unwrap_or(backoff);
                attempt += 1;
                tracing::warn!(
                    backend = backend_name,
                    attempt,
                    max_retries,
                    backoff_ms = wait.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(wait).await;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming Types
// ─────────────────────────────────────────────────────────────────────────────

/// A streaming response from an LLM backend.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send + 'static>>;

/// Events emitted during streaming.
///
/// Every backend normalizes its wire format to this sequence:
/// `MessageStart`, then per block `ContentBlockStart` / deltas /
/// `ContentBlockStop`, then `MessageDelta` and a final `MessageStop`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    MessageStart { id: String, model: String },
    ContentBlockStart { index: usize, block: BlockStart },
    ContentBlockDelta { index: usize, delta: ContentDelta },
    ContentBlockStop { index: usize },
    /// Final stop reason and usage.
    MessageDelta {
        stop_reason: Option<StopReason>,
        usage: Usage,
    },
    MessageStop,
    /// Keep-alive.
    Ping,
    Error { message: String },
}

/// Kind of content block being opened.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockStart {
    Text,
    Thinking,
    /// Reasoning split out of inline `<think>` tags in the text.
    InlineThinking,
    ToolUse { id: String, name: String },
}

/// Delta content in a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentDelta {
    TextDelta(String),
    ThinkingDelta(String),
    /// Anthropic thinking-block signature.
    SignatureDelta(String),
    /// Partial JSON for tool input.
    InputJsonDelta(String),
}

impl StreamEvent {
    pub fn validate(&self) -> std::result::Result<(), ResponseValidationError> {
        match self {
            StreamEvent::ContentBlockStart {
                block: BlockStart::ToolUse { id, name },
                ..
            } => {
                if id.trim().is_empty() {
                    return Err(ResponseValidationError::invalid_stream_event(
                        "tool_use block has empty id",
                    ));
                }
                if name.trim().is_empty() {
                    return Err(ResponseValidationError::invalid_stream_event(
                        "tool_use block has empty name",
                    ));
                }
                Ok(())
            }
            StreamEvent::Error { message } if message.trim().is_empty() => Err(
                ResponseValidationError::invalid_stream_event("Error event has empty message"),
            ),
            _ => Ok(()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StreamEvent::Error { .. })
    }

    /// Returns true if this is the final event in a message.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::MessageStop | StreamEvent::Error { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for LLM backend providers.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Execute a completion request and return the full response.
    ///
    /// The default drains [`complete_stream`](Self::complete_stream).
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let stream = self.complete_stream(request).await?;
        crate::stream::collect_response(stream).await
    }

    /// Execute a completion request and return a stream of events.
    async fn complete_stream(&self, request: CompletionRequest) -> Result<ResponseStream>;

    /// Get the name of this backend.
    fn name(&self) -> &str;

    /// Check if the backend is available and properly configured.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    /// Returns true if the provider accepts tool definitions natively.
    fn supports_native_tools(&self) -> bool {
        true
    }
}

/// A backend that can be shared across threads.
pub type SharedBackend = Arc<dyn LlmBackend>;

/// Map a non-success HTTP response to an error.
pub(crate) async fn error_from_response(response: reqwest::Response) -> LlmError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.unwrap_or_default();
    LlmError::from_status(status, &body, retry_after.as_deref())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
