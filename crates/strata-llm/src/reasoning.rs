//! Inline reasoning extraction.
//!
//! Several open-weight models emit their chain of thought inline as
//! `<think>...</think>`. [`ThinkTagFilter`] splits that out of a text stream,
//! and [`split_think_tags`] applies it to a whole [`ResponseStream`], turning
//! the tagged spans into proper thinking blocks.

use std::collections::HashMap;

use futures::StreamExt;

use crate::backend::{BlockStart, ContentDelta, ResponseStream, StreamEvent};

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// A piece of filtered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilteredChunk {
    Text(String),
    Reasoning(String),
}

impl FilteredChunk {
    fn is_reasoning(&self) -> bool {
        matches!(self, FilteredChunk::Reasoning(_))
    }
}

/// Incremental `<think>` tag splitter.
///
/// Tags may be split across chunk boundaries; a possible partial tag at the
/// end of a chunk is held back until the next chunk decides it.
#[derive(Debug, Default)]
pub struct ThinkTagFilter {
    in_think: bool,
    pending: String,
}

impl ThinkTagFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the filter is currently inside a reasoning span.
    pub fn in_reasoning(&self) -> bool {
        self.in_think
    }

    pub fn push(&mut self, chunk: &str) -> Vec<FilteredChunk> {
        let mut buf = std::mem::take(&mut self.pending);
        buf.push_str(chunk);

        let mut out = Vec::new();
        let mut rest = buf.as_str();

        loop {
            let tag = if self.in_think { CLOSE_TAG } else { OPEN_TAG };
            if let Some(pos) = rest.find(tag) {
                self.emit(&mut out, &rest[..pos]);
                self.in_think = !self.in_think;
                rest = &rest[pos + tag.len()..];
                continue;
            }

            let hold = partial_tag_suffix(rest, tag);
            let (emit_now, held) = rest.split_at(rest.len() - hold);
            self.emit(&mut out, emit_now);
            self.pending = held.to_string();
            break;
        }

        out
    }

    /// Emit anything held back. Unterminated reasoning is flushed as reasoning.
    pub fn flush(&mut self) -> Vec<FilteredChunk> {
        let pending = std::mem::take(&mut self.pending);
        let mut out = Vec::new();
        self.emit(&mut out, &pending);
        out
    }

    fn emit(&self, out: &mut Vec<FilteredChunk>, text: &str) {
        if text.is_empty() {
            return;
        }
        match (out.last_mut(), self.in_think) {
            (Some(FilteredChunk::Reasoning(prev)), true) | (Some(FilteredChunk::Text(prev)), false) => {
                prev.push_str(text)
            }
            (_, true) => out.push(FilteredChunk::Reasoning(text.to_string())),
            (_, false) => out.push(FilteredChunk::Text(text.to_string())),
        }
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `tag`.
fn partial_tag_suffix(text: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&n| text.len() >= n && text.is_char_boundary(text.len() - n) && tag.starts_with(&text[text.len() - n..]))
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream adaptor
// ─────────────────────────────────────────────────────────────────────────────

/// Rewrites a text stream so `<think>` spans become thinking blocks.
///
/// Block indices are reassigned because one upstream text block may become
/// several alternating text/thinking blocks.
#[derive(Debug, Default)]
struct ThinkSplitter {
    filter: ThinkTagFilter,
    next_index: usize,
    /// Currently open synthesized block: (is_reasoning, index).
    open: Option<(bool, usize)>,
    /// Upstream index → our index for passthrough blocks.
    passthrough: HashMap<usize, usize>,
}

impl ThinkSplitter {
    fn process(&mut self, event: StreamEvent) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        match event {
            StreamEvent::ContentBlockStart {
                block: BlockStart::Text,
                ..
            } => {}
            StreamEvent::ContentBlockStart { index, block } => {
                self.close_open(&mut out);
                let ours = self.alloc();
                self.passthrough.insert(index, ours);
                out.push(StreamEvent::ContentBlockStart { index: ours, block });
            }
            StreamEvent::ContentBlockDelta {
                index,
                delta: ContentDelta::TextDelta(text),
            } if !self.passthrough.contains_key(&index) => {
                let chunks = self.filter.push(&text);
                self.emit_chunks(chunks, &mut out);
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                let ours = self.passthrough.get(&index).copied().unwrap_or(index);
                out.push(StreamEvent::ContentBlockDelta { index: ours, delta });
            }
            StreamEvent::ContentBlockStop { index } => match self.passthrough.remove(&index) {
                Some(ours) => out.push(StreamEvent::ContentBlockStop { index: ours }),
                None => {
                    let chunks = self.filter.flush();
                    self.emit_chunks(chunks, &mut out);
                    self.close_open(&mut out);
                }
            },
            event @ (StreamEvent::MessageDelta { .. } | StreamEvent::MessageStop) => {
                let chunks = self.filter.flush();
                self.emit_chunks(chunks, &mut out);
                self.close_open(&mut out);
                out.push(event);
            }
            other => out.push(other),
        }
        out
    }

    fn alloc(&mut self) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    fn close_open(&mut self, out: &mut Vec<StreamEvent>) {
        if let Some((_, index)) = self.open.take() {
            out.push(StreamEvent::ContentBlockStop { index });
        }
    }

    fn emit_chunks(&mut self, chunks: Vec<FilteredChunk>, out: &mut Vec<StreamEvent>) {
        for chunk in chunks {
            let reasoning = chunk.is_reasoning();
            let index = match self.open {
                Some((kind, index)) if kind == reasoning => index,
                _ => {
                    self.close_open(out);
                    let index = self.alloc();
                    let block = if reasoning {
                        BlockStart::InlineThinking
                    } else {
                        BlockStart::Text
                    };
                    out.push(StreamEvent::ContentBlockStart { index, block });
                    self.open = Some((reasoning, index));
                    index
                }
            };
            let delta = match chunk {
                FilteredChunk::Text(text) => ContentDelta::TextDelta(text),
                FilteredChunk::Reasoning(text) => ContentDelta::ThinkingDelta(text),
            };
            out.push(StreamEvent::ContentBlockDelta { index, delta });
        }
    }
}

/// Wrap a stream so inline `<think>` spans become thinking blocks.
pub fn split_think_tags(mut inner: ResponseStream) -> ResponseStream {
    Box::pin(async_stream::stream! {
        let mut splitter = ThinkSplitter::default();
        while let Some(item) = inner.next().await {
            match item {
                Ok(event) => {
                    for out in splitter.process(event) {
                        yield Ok(out);
                    }
                }
                Err(e) => yield Err(e),
            }
        }
    })
}
