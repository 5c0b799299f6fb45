//! Provider-agnostic LLM streaming for Strata.
//!
//! Every provider is adapted to the [`LlmBackend`] trait and normalizes its
//! wire protocol to one [`StreamEvent`] sequence, so the agent loop never
//! sees provider differences.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  LlmBackend trait                        │
//! │  - complete_stream() -> Stream<Event>    │
//! │  - complete() = collect(complete_stream) │
//! └──────────────────────────────────────────┘
//!                     │
//!     ┌───────────┬───┴───────┬───────────┐
//!     ▼           ▼           ▼           ▼
//! ┌────────┐ ┌─────────┐ ┌────────┐ ┌────────┐
//! │ OpenAI │ │Anthropic│ │ Gemini │ │ Cohere │
//! └────────┘ └─────────┘ └────────┘ └────────┘
//!   Groq, Cerebras, Mistral, Deepseek and Bedrock
//!   ride on the OpenAI-compatible backend.
//! ```

pub mod backend;
pub mod error;
pub mod provider;
pub mod reasoning;
pub mod stream;
pub mod types;

mod sse;

// Provider implementations
pub mod anthropic;
pub mod cohere;
pub mod google;
pub mod openai;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

pub use backend::{
    BlockStart, ContentDelta, LlmBackend, ResponseStream, SharedBackend, StreamEvent, with_retry,
};
pub use error::{LlmError, RateLimitInfo, ResponseValidationError, Result};
pub use provider::{Provider, ProviderRegistry, ProviderSettings, resolve_model_name};
pub use reasoning::{FilteredChunk, ThinkTagFilter, split_think_tags};
pub use stream::{StreamAccumulator, collect_response};
pub use types::{
    CompletionRequest, CompletionResponse, Content, ContentBlock, Message, Role, StopReason,
    ToolChoice, ToolDefinition, ToolResultBlock, ToolUseBlock, Usage,
};

pub use anthropic::{AnthropicBackend, AnthropicConfig};
pub use cohere::{CohereBackend, CohereConfig};
pub use google::{GoogleBackend, GoogleConfig};
pub use openai::{OpenAiBackend, OpenAiConfig};

#[cfg(any(test, feature = "testing"))]
pub use mock::{MockBackend, MockResponse};
