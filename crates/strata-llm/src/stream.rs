//! Folding a [`StreamEvent`] sequence back into a [`CompletionResponse`].

use std::collections::BTreeMap;

use futures::StreamExt;

use crate::backend::{BlockStart, ContentDelta, ResponseStream, StreamEvent};
use crate::error::{LlmError, Result};
use crate::types::{CompletionResponse, ContentBlock, StopReason, Usage};

#[derive(Debug)]
enum PartialBlock {
    Text(String),
    Thinking {
        thinking: String,
        signature: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        json: String,
    },
}

/// Accumulates streamed events into a complete response.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    id: String,
    model: String,
    blocks: BTreeMap<usize, PartialBlock>,
    stop_reason: Option<StopReason>,
    usage: Usage,
    finished: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Provider error events and malformed events become
    /// `Err`.
    pub fn push(&mut self, event: &StreamEvent) -> Result<()> {
        if let StreamEvent::Error { message } = event {
            return Err(LlmError::Stream(message.clone()));
        }
        event.validate()?;
        match event {
            StreamEvent::MessageStart { id, model } => {
                self.id = id.clone();
                self.model = model.clone();
            }
            StreamEvent::ContentBlockStart { index, block } => {
                let partial = match block {
                    BlockStart::Text => PartialBlock::Text(String::new()),
                    BlockStart::Thinking | BlockStart::InlineThinking => PartialBlock::Thinking {
                        thinking: String::new(),
                        signature: None,
                    },
                    BlockStart::ToolUse { id, name } => PartialBlock::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        json: String::new(),
                    },
                };
                self.blocks.insert(*index, partial);
            }
            StreamEvent::ContentBlockDelta { index, delta } => self.apply_delta(*index, delta),
            StreamEvent::ContentBlockStop { .. } | StreamEvent::Ping => {}
            StreamEvent::MessageDelta { stop_reason, usage } => {
                if stop_reason.is_some() {
                    self.stop_reason = *stop_reason;
                }
                self.usage.merge_latest(usage);
            }
            StreamEvent::MessageStop => self.finished = true,
            StreamEvent::Error { .. } => {}
        }
        Ok(())
    }

    fn apply_delta(&mut self, index: usize, delta: &ContentDelta) {
        let Some(block) = self.blocks.get_mut(&index) else {
            tracing::warn!(index, "Delta for unopened content block");
            // Tolerate providers that skip the start event for plain text
            if let ContentDelta::TextDelta(text) = delta {
                self.blocks.insert(index, PartialBlock::Text(text.clone()));
            }
            return;
        };

        match (block, delta) {
            (PartialBlock::Text(buf), ContentDelta::TextDelta(text)) => buf.push_str(text),
            (PartialBlock::Thinking { thinking, .. }, ContentDelta::ThinkingDelta(text)) => {
                thinking.push_str(text)
            }
            (PartialBlock::Thinking { signature, .. }, ContentDelta::SignatureDelta(sig)) => {
                signature.get_or_insert_with(String::new).push_str(sig)
            }
            (PartialBlock::ToolUse { json, .. }, ContentDelta::InputJsonDelta(part)) => {
                json.push_str(part)
            }
            (_, delta) => {
                tracing::warn!(index, ?delta, "Delta does not match block type");
            }
        }
    }

    /// Whether `MessageStop` has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Visible text so far.
    pub fn text(&self) -> String {
        self.blocks
            .values()
            .filter_map(|b| match b {
                PartialBlock::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Build the final response.
    ///
    /// Tool arguments that are empty or not valid JSON become `{}`.
    pub fn finish(self) -> CompletionResponse {
        let mut has_tools = false;
        let content: Vec<ContentBlock> = self
            .blocks
            .into_values()
            .filter_map(|block| match block {
                PartialBlock::Text(text) if text.is_empty() => None,
                PartialBlock::Text(text) => Some(ContentBlock::Text { text }),
                PartialBlock::Thinking { thinking, .. } if thinking.is_empty() => None,
                PartialBlock::Thinking {
                    thinking,
                    signature,
                } => Some(ContentBlock::Thinking {
                    thinking,
                    signature,
                }),
                PartialBlock::ToolUse { id, name, json } => {
                    has_tools = true;
                    let input = parse_tool_input(&name, &json);
                    Some(ContentBlock::ToolUse { id, name, input })
                }
            })
            .collect();

        let stop_reason = if has_tools {
            Some(StopReason::ToolUse)
        } else {
            self.stop_reason.or(Some(StopReason::EndTurn))
        };

        CompletionResponse {
            id: self.id,
            content,
            model: self.model,
            stop_reason,
            usage: self.usage,
        }
    }
}

impl StreamAccumulator {
    /// Build the final response and check its structure.
    pub fn into_response(self) -> Result<CompletionResponse> {
        let response = self.finish();
        response.validate()?;
        Ok(response)
    }
}

fn parse_tool_input(name: &str, json: &str) -> serde_json::Value {
    if json.trim().is_empty() {
        return serde_json::json!({});
    }
    match serde_json::from_str::<serde_json::Value>(json) {
        Ok(value) if value.is_object() => value,
        Ok(other) => {
            tracing::warn!(tool = name, value = %other, "Tool arguments are not an object");
            serde_json::json!({})
        }
        Err(e) => {
            tracing::warn!(tool = name, error = %e, "Invalid tool argument JSON");
            serde_json::json!({})
        }
    }
}

/// Drain a stream into a complete response.
pub async fn collect_response(mut stream: ResponseStream) -> Result<CompletionResponse> {
    let mut acc = StreamAccumulator::new();
    while let Some(event) = stream.next().await {
        acc.push(&event?)?;
    }
    acc.into_response()
}
