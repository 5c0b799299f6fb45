//! Streaming tool-calling agent for the Strata platform.
//!
//! The agent runs a prompt against a platform conversation. When a backend
//! for the specification's provider is configured it streams completions
//! directly and executes tool calls locally in rounds; otherwise the platform
//! runs the model and the agent only answers its tool calls. Progress is
//! reported as a stream of [`AgentEvent`]s.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use strata_agent::{Agent, AgentRequest, ToolRegistry};
//! use strata_llm::ProviderRegistry;
//! use tokio_util::sync::CancellationToken;
//!
//! let agent = Agent::new(Arc::new(client), Arc::new(ProviderRegistry::from_env()?))
//!     .with_tools(ToolRegistry::new());
//! let mut events = agent.stream_agent(
//!     AgentRequest::new("Summarize the latest filings").with_specification(spec_id),
//!     CancellationToken::new(),
//! );
//! while let Some(event) = events.next().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod agent;
pub mod error;
pub mod events;
pub mod options;
pub mod service;
pub mod smoothing;
pub mod tool;

pub use agent::{Agent, AgentRequest, AgentResult, AgentStream, ToolCallResult};
pub use error::{AgentError, Result};
pub use events::{AgentEvent, ReasoningFormat, ToolCall, ToolStatus};
pub use options::{AgentOptions, DEFAULT_MAX_TOKENS, DEFAULT_MAX_TOOL_ROUNDS};
pub use service::ConversationService;
pub use smoothing::{ChunkBuffer, ChunkingStrategy, SmoothingOptions};
pub use tool::{
    FnTool, ParamExt, ParamResult, ParameterValidationError, Tool, ToolContext, ToolRegistry,
    ToolResult,
};

pub use tokio_util::sync::CancellationToken;
