//! Error types for the agent crate.

use thiserror::Error;

/// Result type alias using the agent error type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Error type for agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// LLM backend error.
    #[error("LLM error: {0}")]
    Llm(#[from] strata_llm::LlmError),

    /// Platform API error.
    #[error("Platform error: {0}")]
    Client(#[from] strata_client::Error),

    /// Tool execution error.
    #[error("Tool error: {0}")]
    Tool(String),

    /// Tool not found in registry.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Invalid tool parameters.
    #[error("Invalid tool parameters: {0}")]
    InvalidToolParams(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A streamed run ended with an error event.
    #[error("Agent run failed: {message}")]
    Run { message: String, recoverable: bool },

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Run was cancelled.
    #[error("Run cancelled")]
    Cancelled,
}

impl AgentError {
    /// Create a tool error.
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable code reported on `AgentEvent::Error`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Llm(e) => e.code(),
            Self::Client(_) => "platform_error",
            Self::Tool(_) | Self::ToolNotFound(_) | Self::InvalidToolParams(_) => "tool_error",
            Self::Config(_) => "config_error",
            Self::Serialization(_) => "serialization_error",
            Self::Run { .. } => "run_failed",
            Self::Internal(_) => "internal_error",
            Self::Cancelled => "aborted",
        }
    }

    /// Whether retrying the same run could succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Llm(e) => e.is_retryable(),
            Self::Client(e) => e.is_transient(),
            Self::Run { recoverable, .. } => *recoverable,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_llm::LlmError;

    #[test]
    fn test_error_display() {
        let err = AgentError::tool("failed to read file");
        assert!(err.to_string().contains("Tool error"));
        assert!(err.to_string().contains("failed to read file"));
    }

    #[test]
    fn test_tool_not_found() {
        let err = AgentError::ToolNotFound("unknown_tool".to_string());
        assert!(err.to_string().contains("Tool not found"));
        assert_eq!(err.code(), "tool_error");
    }

    #[test]
    fn test_recoverable_follows_provider_error() {
        let err = AgentError::from(LlmError::Network("reset".into()));
        assert!(err.is_recoverable());
        assert_eq!(err.code(), "network_error");

        let err = AgentError::from(LlmError::Auth("bad key".into()));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_cancelled_code() {
        assert_eq!(AgentError::Cancelled.code(), "aborted");
        assert!(!AgentError::Cancelled.is_recoverable());
    }
}
