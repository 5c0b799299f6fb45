//! Per-run agent settings.

use crate::smoothing::SmoothingOptions;

/// Default cap on tool rounds per run.
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 100;

/// Default completion token limit.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, PartialEq)]
pub struct AgentOptions {
    /// Tool execution rounds allowed per run.
    pub max_tool_rounds: u32,
    /// Completion token limit when the specification sets none.
    pub max_tokens: u32,
    pub smoothing: SmoothingOptions,
    /// Emit a `MessageUpdate` per delta. When off, text is only reported in
    /// the terminal event.
    pub show_token_stream: bool,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            max_tokens: DEFAULT_MAX_TOKENS,
            smoothing: SmoothingOptions::default(),
            show_token_stream: true,
        }
    }
}

impl AgentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_smoothing(mut self, smoothing: SmoothingOptions) -> Self {
        self.smoothing = smoothing;
        self
    }

    pub fn with_token_stream(mut self, show: bool) -> Self {
        self.show_token_stream = show;
        self
    }
}
