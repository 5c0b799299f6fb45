//! Shared SSE driver for provider backends.
//!
//! Each backend implements [`SseDecoder`] as a small synchronous state
//! machine; [`decode_sse`] feeds it server-sent events and yields the
//! resulting [`StreamEvent`]s.

use eventsource_stream::Eventsource;
use futures::StreamExt;

use crate::backend::{BlockStart, ResponseStream, StreamEvent};
use crate::error::{LlmError, Result};

/// Provider-specific translation from SSE events to [`StreamEvent`]s.
pub(crate) trait SseDecoder: Send + 'static {
    /// Handle one SSE event. `event` is the SSE `event:` field (often empty).
    fn decode(&mut self, event: &str, data: &str) -> Result<Vec<StreamEvent>>;

    /// Whether the provider signalled the end of the message.
    fn is_done(&self) -> bool;

    /// Close out a stream that ended without an explicit terminator.
    fn finish(&mut self) -> Vec<StreamEvent>;
}

/// Drive `decoder` over the SSE body of `response`.
pub(crate) fn decode_sse<D: SseDecoder>(response: reqwest::Response, mut decoder: D) -> ResponseStream {
    let mut events = response.bytes_stream().eventsource();
    Box::pin(async_stream::stream! {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    if event.data.is_empty() {
                        continue;
                    }
                    match decoder.decode(&event.event, &event.data) {
                        Ok(out) => {
                            for e in out {
                                yield Ok(e);
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                    if decoder.is_done() {
                        break;
                    }
                }
                Err(e) => {
                    yield Err(LlmError::Network(e.to_string()));
                    return;
                }
            }
        }
        for e in decoder.finish() {
            yield Ok(e);
        }
    })
}

/// Kind of the block a decoder currently has open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenKind {
    Text,
    Thinking,
    /// Provider-side tool call index.
    Tool(usize),
}

/// Block bookkeeping shared by the decoders.
///
/// Providers interleave text, reasoning and tool-call fragments without
/// explicit block boundaries. This assigns indices and emits the start/stop
/// events so downstream consumers always see well-formed blocks.
#[derive(Debug, Default)]
pub(crate) struct BlockTracker {
    next_index: usize,
    open: Option<(OpenKind, usize)>,
    tools: Vec<(usize, usize)>,
}

impl BlockTracker {
    /// Ensure a text or thinking block is open, returning its index.
    pub(crate) fn ensure(&mut self, kind: OpenKind, out: &mut Vec<StreamEvent>) -> usize {
        if let Some((open, index)) = self.open
            && open == kind
        {
            return index;
        }
        self.close(out);
        let index = self.alloc();
        let block = match kind {
            OpenKind::Thinking => BlockStart::Thinking,
            _ => BlockStart::Text,
        };
        out.push(StreamEvent::ContentBlockStart { index, block });
        self.open = Some((kind, index));
        index
    }

    /// Open a tool block for the provider's tool index.
    pub(crate) fn open_tool(
        &mut self,
        provider_index: usize,
        id: String,
        name: String,
        out: &mut Vec<StreamEvent>,
    ) -> usize {
        self.close(out);
        let index = self.alloc();
        out.push(StreamEvent::ContentBlockStart {
            index,
            block: BlockStart::ToolUse { id, name },
        });
        self.open = Some((OpenKind::Tool(provider_index), index));
        self.tools.push((provider_index, index));
        index
    }

    /// Our index for a previously opened tool.
    pub(crate) fn tool_index(&self, provider_index: usize) -> Option<usize> {
        self.tools
            .iter()
            .find(|(p, _)| *p == provider_index)
            .map(|(_, i)| *i)
    }

    pub(crate) fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    pub(crate) fn close(&mut self, out: &mut Vec<StreamEvent>) {
        if let Some((_, index)) = self.open.take() {
            out.push(StreamEvent::ContentBlockStop { index });
        }
    }

    fn alloc(&mut self) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        index
    }
}

/// A fresh tool call id for providers that don't supply one.
pub(crate) fn generate_tool_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_switches_blocks() {
        let mut tracker = BlockTracker::default();
        let mut out = Vec::new();
        let t = tracker.ensure(OpenKind::Thinking, &mut out);
        assert_eq!(tracker.ensure(OpenKind::Thinking, &mut out), t);
        let x = tracker.ensure(OpenKind::Text, &mut out);
        assert_ne!(t, x);
        let tool = tracker.open_tool(0, "c1".into(), "search".into(), &mut out);
        tracker.close(&mut out);

        assert_eq!(tracker.tool_index(0), Some(tool));
        assert!(tracker.has_tools());
        assert_eq!(
            out,
            vec![
                StreamEvent::ContentBlockStart {
                    index: 0,
                    block: BlockStart::Thinking
                },
                StreamEvent::ContentBlockStop { index: 0 },
                StreamEvent::ContentBlockStart {
                    index: 1,
                    block: BlockStart::Text
                },
                StreamEvent::ContentBlockStop { index: 1 },
                StreamEvent::ContentBlockStart {
                    index: 2,
                    block: BlockStart::ToolUse {
                        id: "c1".into(),
                        name: "search".into()
                    }
                },
                StreamEvent::ContentBlockStop { index: 2 },
            ]
        );
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(generate_tool_id(), generate_tool_id());
        assert!(generate_tool_id().starts_with("call_"));
    }
}
