//! Scripted backend for deterministic tests.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::backend::{BlockStart, ContentDelta, LlmBackend, ResponseStream, StreamEvent};
use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse, ContentBlock, StopReason, Usage};

/// One scripted reply.
#[derive(Debug)]
pub enum MockResponse {
    /// Streamed as one start/delta/stop triple per block.
    Response(CompletionResponse),
    /// Raw events, emitted verbatim.
    Events(Vec<StreamEvent>),
    /// Emit the events, then never finish.
    Stall(Vec<StreamEvent>),
    /// Fail before any event is produced.
    Error(LlmError),
}

impl MockResponse {
    pub fn text(text: impl Into<String>) -> Self {
        MockResponse::Response(CompletionResponse::new(
            "mock_msg",
            "mock-model",
            vec![ContentBlock::text(text)],
            StopReason::EndTurn,
            Usage::new(10, 20),
        ))
    }

    /// Text delivered across several deltas.
    pub fn text_chunks(chunks: &[&str]) -> Self {
        let mut events = vec![
            StreamEvent::MessageStart {
                id: "mock_msg".into(),
                model: "mock-model".into(),
            },
            StreamEvent::ContentBlockStart {
                index: 0,
                block: BlockStart::Text,
            },
        ];
        events.extend(chunks.iter().map(|c| StreamEvent::ContentBlockDelta {
            index: 0,
            delta: ContentDelta::TextDelta((*c).to_string()),
        }));
        events.extend([
            StreamEvent::ContentBlockStop { index: 0 },
            StreamEvent::MessageDelta {
                stop_reason: Some(StopReason::EndTurn),
                usage: Usage::new(10, chunks.len() as u32),
            },
            StreamEvent::MessageStop,
        ]);
        MockResponse::Events(events)
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        MockResponse::Response(CompletionResponse::new(
            "mock_msg",
            "mock-model",
            vec![ContentBlock::tool_use(id, name, input)],
            StopReason::ToolUse,
            Usage::new(10, 5),
        ))
    }

    fn into_events(self) -> Result<(Vec<StreamEvent>, bool)> {
        match self {
            MockResponse::Response(response) => Ok((response_events(&response), false)),
            MockResponse::Events(events) => Ok((events, false)),
            MockResponse::Stall(events) => Ok((events, true)),
            MockResponse::Error(e) => Err(e),
        }
    }
}

/// The event sequence a well-behaved provider would emit for `response`.
pub fn response_events(response: &CompletionResponse) -> Vec<StreamEvent> {
    let mut events = vec![StreamEvent::MessageStart {
        id: response.id.clone(),
        model: response.model.clone(),
    }];
    for (index, block) in response.content.iter().enumerate() {
        let (start, deltas) = match block {
            ContentBlock::Text { text } => {
                (BlockStart::Text, vec![ContentDelta::TextDelta(text.clone())])
            }
            ContentBlock::Thinking {
                thinking,
                signature,
            } => {
                let mut deltas = vec![ContentDelta::ThinkingDelta(thinking.clone())];
                if let Some(sig) = signature {
                    deltas.push(ContentDelta::SignatureDelta(sig.clone()));
                }
                (BlockStart::Thinking, deltas)
            }
            ContentBlock::ToolUse { id, name, input } => (
                BlockStart::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                },
                vec![ContentDelta::InputJsonDelta(input.to_string())],
            ),
            ContentBlock::ToolResult { .. } => continue,
        };
        events.push(StreamEvent::ContentBlockStart {
            index,
            block: start,
        });
        events.extend(
            deltas
                .into_iter()
                .map(|delta| StreamEvent::ContentBlockDelta { index, delta }),
        );
        events.push(StreamEvent::ContentBlockStop { index });
    }
    events.push(StreamEvent::MessageDelta {
        stop_reason: response.stop_reason,
        usage: response.usage,
    });
    events.push(StreamEvent::MessageStop);
    events
}

/// A mock backend for testing purposes.
///
/// Returns scripted responses in order and records every request. Running
/// out of responses is a backend error.
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    responses: Mutex<VecDeque<MockResponse>>,
    request_log: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl MockBackend {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            name: "mock".to_string(),
            responses: Mutex::new(responses.into()),
            request_log: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Create a mock backend with a single text response.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![MockResponse::text(text)])
    }

    /// Sleep between emitted events.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Queue another response.
    pub fn push(&self, response: MockResponse) {
        self.responses.lock().push_back(response);
    }

    /// All requests made to this backend.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.request_log.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.request_log.lock().len()
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete_stream(&self, request: CompletionRequest) -> Result<ResponseStream> {
        self.request_log.lock().push(request);

        let next = self.responses.lock().pop_front();
        let Some(next) = next else {
            return Err(LlmError::Backend(
                "MockBackend: no more responses available".to_string(),
            ));
        };
        let (events, stall) = next.into_events()?;
        let delay = self.delay;

        let stream = futures::stream::iter(events).then(move |event| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, LlmError>(event)
        });
        if stall {
            Ok(Box::pin(stream.chain(futures::stream::pending())))
        } else {
            Ok(Box::pin(stream))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
