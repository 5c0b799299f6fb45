//! Events emitted by a streamed agent run.
//!
//! A run always starts with [`AgentEvent::ConversationStarted`] once the
//! conversation exists, and ends with exactly one terminal event:
//! [`AgentEvent::ConversationCompleted`] or [`AgentEvent::Error`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use strata_llm::Usage;

use crate::tool::ToolResult;

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Parsed arguments; `Null` while the call is still being streamed.
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Lifecycle of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// The model started emitting the call.
    Preparing,
    Executing,
    Completed,
    Failed,
}

/// Where reasoning text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningFormat {
    /// Native reasoning blocks or fields.
    Thinking,
    /// Inline `<think>` spans split out of the text.
    ThinkTag,
}

/// An event in an agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    ConversationStarted {
        conversation_id: String,
        timestamp: DateTime<Utc>,
        model: Option<String>,
    },
    /// `message` is the full text so far, not a delta.
    MessageUpdate { message: String, is_streaming: bool },
    ToolUpdate {
        tool_call: ToolCall,
        status: ToolStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<ToolResult>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// `content` is the full reasoning text of the current block.
    ReasoningUpdate {
        content: String,
        format: ReasoningFormat,
        is_complete: bool,
    },
    ConversationCompleted {
        message: String,
        usage: Usage,
        rounds: u32,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        recoverable: bool,
    },
}

impl AgentEvent {
    pub fn tool(tool_call: ToolCall, status: ToolStatus) -> Self {
        AgentEvent::ToolUpdate {
            tool_call,
            status,
            result: None,
            error: None,
        }
    }

    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentEvent::ConversationCompleted { .. } | AgentEvent::Error { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let event = AgentEvent::Error {
            message: "Run cancelled".into(),
            code: Some("aborted".into()),
            recoverable: false,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "error", "message": "Run cancelled", "code": "aborted", "recoverable": false})
        );
        assert!(event.is_terminal());

        let update = AgentEvent::tool(ToolCall::new("t1", "search", json!({})), ToolStatus::Preparing);
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["status"], "preparing");
        assert!(value.get("result").is_none());
        assert!(!update.is_terminal());
    }

    #[test]
    fn test_reasoning_format_wire_names() {
        let update = AgentEvent::ReasoningUpdate {
            content: "hm".into(),
            format: ReasoningFormat::ThinkTag,
            is_complete: false,
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["format"], "think_tag");
        assert_eq!(
            serde_json::to_value(ReasoningFormat::Thinking).unwrap(),
            "thinking"
        );
    }
}
