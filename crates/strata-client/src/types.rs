//! Request and response types for the platform API.
//!
//! Only the fields the SDK reads are modelled. Enums carry an `Unknown`
//! fallback so new server values never break deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Shared
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state shared by most entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityState {
    Created,
    Enabled,
    Disabled,
    Initialized,
    Finished,
    Errored,
    Deleted,
    Opened,
    Closed,
    #[serde(other)]
    Unknown,
}

impl EntityState {
    /// Whether processing has stopped (successfully or not).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Errored | Self::Deleted)
    }
}

/// Reference to an entity by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReference {
    pub id: String,
}

impl EntityReference {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl From<&str> for EntityReference {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Result of a delete mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedEntity {
    pub id: String,
    #[serde(default)]
    pub state: Option<EntityState>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Contents
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    File,
    Page,
    Text,
    Message,
    Post,
    Email,
    Event,
    Issue,
    #[serde(other)]
    Unknown,
}

/// Format of ingested raw text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TextType {
    #[default]
    Plain,
    Markdown,
    Html,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<EntityState>,
    #[serde(rename = "type", default)]
    pub content_type: Option<ContentType>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub markdown: Option<String>,
    #[serde(default)]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub states: Option<Vec<EntityState>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<ContentType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feeds: Option<Vec<EntityReference>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentUpdateInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Feeds
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedType {
    Web,
    Rss,
    Site,
    Search,
    Reddit,
    Slack,
    Email,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<EntityState>,
    #[serde(rename = "type", default)]
    pub feed_type: Option<FeedType>,
    #[serde(default)]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_read_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebFeedProperties {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RssFeedProperties {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedInput {
    pub name: String,
    #[serde(rename = "type")]
    pub feed_type: FeedType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web: Option<WebFeedProperties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rss: Option<RssFeedProperties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<EntityReference>,
    /// Connector-specific blocks (`slack`, `reddit`, ...) passed through as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl FeedInput {
    /// Web crawl feed rooted at `uri`.
    pub fn web(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            feed_type: FeedType::Web,
            web: Some(WebFeedProperties {
                uri: uri.into(),
                read_limit: None,
            }),
            rss: None,
            workflow: None,
            extra: Default::default(),
        }
    }

    /// RSS feed at `uri`.
    pub fn rss(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            feed_type: FeedType::Rss,
            web: None,
            rss: Some(RssFeedProperties {
                uri: uri.into(),
                read_limit: None,
            }),
            workflow: None,
            extra: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedUpdateInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<EntityReference>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<FeedType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub states: Option<Vec<EntityState>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Workflows
// ─────────────────────────────────────────────────────────────────────────────

/// A content processing workflow.
///
/// Stage configuration is large and server-defined, so it is kept as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<EntityState>,
    #[serde(default)]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ingestion: Option<Value>,
    #[serde(default)]
    pub preparation: Option<Value>,
    #[serde(default)]
    pub extraction: Option<Value>,
    #[serde(default)]
    pub enrichment: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preparation: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowUpdateInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preparation: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Specifications
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpecificationType {
    Completion,
    Extraction,
    Preparation,
    Summarization,
    #[serde(other)]
    Unknown,
}

/// Which model provider a specification targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelServiceType {
    OpenAi,
    Anthropic,
    Google,
    Groq,
    Cerebras,
    Cohere,
    Mistral,
    Bedrock,
    Deepseek,
    #[serde(other)]
    Unknown,
}

/// Per-provider model settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelProperties {
    /// Platform model enum, e.g. `CLAUDE_3_7_SONNET`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Explicit provider model id; takes precedence over `model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_token_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_thinking: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_token_limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specification {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<EntityState>,
    #[serde(rename = "type", default)]
    pub specification_type: Option<SpecificationType>,
    #[serde(default)]
    pub service_type: Option<ModelServiceType>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(rename = "openAI", default)]
    pub openai: Option<ModelProperties>,
    #[serde(default)]
    pub anthropic: Option<ModelProperties>,
    #[serde(default)]
    pub google: Option<ModelProperties>,
    #[serde(default)]
    pub groq: Option<ModelProperties>,
    #[serde(default)]
    pub cerebras: Option<ModelProperties>,
    #[serde(default)]
    pub cohere: Option<ModelProperties>,
    #[serde(default)]
    pub mistral: Option<ModelProperties>,
    #[serde(default)]
    pub bedrock: Option<ModelProperties>,
    #[serde(default)]
    pub deepseek: Option<ModelProperties>,
}

impl Specification {
    /// The property block matching `service_type`.
    pub fn model_properties(&self) -> Option<&ModelProperties> {
        match self.service_type? {
            ModelServiceType::OpenAi => self.openai.as_ref(),
            ModelServiceType::Anthropic => self.anthropic.as_ref(),
            ModelServiceType::Google => self.google.as_ref(),
            ModelServiceType::Groq => self.groq.as_ref(),
            ModelServiceType::Cerebras => self.cerebras.as_ref(),
            ModelServiceType::Cohere => self.cohere.as_ref(),
            ModelServiceType::Mistral => self.mistral.as_ref(),
            ModelServiceType::Bedrock => self.bedrock.as_ref(),
            ModelServiceType::Deepseek => self.deepseek.as_ref(),
            ModelServiceType::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecificationInput {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub specification_type: Option<SpecificationType>,
    pub service_type: ModelServiceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Provider block keyed by its GraphQL field name (`openAI`, `anthropic`, ...).
    #[serde(flatten)]
    pub properties: serde_json::Map<String, Value>,
}

impl SpecificationInput {
    /// Completion specification for a single provider.
    pub fn completion(
        name: impl Into<String>,
        service_type: ModelServiceType,
        properties: ModelProperties,
    ) -> Self {
        let mut map = serde_json::Map::new();
        if let Some(field) = service_field(service_type)
            && let Ok(value) = serde_json::to_value(properties)
        {
            map.insert(field.to_string(), value);
        }
        Self {
            name: name.into(),
            specification_type: Some(SpecificationType::Completion),
            service_type,
            system_prompt: None,
            properties: map,
        }
    }
}

/// GraphQL field carrying a provider's model properties.
pub fn service_field(service_type: ModelServiceType) -> Option<&'static str> {
    Some(match service_type {
        ModelServiceType::OpenAi => "openAI",
        ModelServiceType::Anthropic => "anthropic",
        ModelServiceType::Google => "google",
        ModelServiceType::Groq => "groq",
        ModelServiceType::Cerebras => "cerebras",
        ModelServiceType::Cohere => "cohere",
        ModelServiceType::Mistral => "mistral",
        ModelServiceType::Bedrock => "bedrock",
        ModelServiceType::Deepseek => "deepseek",
        ModelServiceType::Unknown => return None,
    })
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecificationUpdateInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(flatten)]
    pub properties: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecificationFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_types: Option<Vec<ModelServiceType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversations
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationRole {
    System,
    User,
    Assistant,
    Tool,
    #[serde(other)]
    Unknown,
}

/// A tool call recorded on a message. Arguments are a JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub role: ConversationRole,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ConversationToolCall>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub tokens: Option<u32>,
    #[serde(default)]
    pub throughput: Option<f64>,
    /// Seconds spent producing the completion.
    #[serde(default)]
    pub completion_time: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub model_service: Option<ModelServiceType>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ConversationMessage {
    pub fn text(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<EntityState>,
    #[serde(default)]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub specification: Option<EntityReference>,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specification: Option<EntityReference>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationUpdateInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specification: Option<EntityReference>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub states: Option<Vec<EntityState>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Tool offered to server-side completion. `schema` is a JSON Schema string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinitionInput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: String,
}

/// Result of a locally executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationToolResponseInput {
    pub id: String,
    pub content: String,
}

/// Diagnostics attached to a prompt/format response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetails {
    #[serde(default)]
    pub model_service: Option<ModelServiceType>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub supports_tool_calling: Option<bool>,
    #[serde(default)]
    pub source_count: Option<u32>,
    #[serde(default)]
    pub token_limit: Option<u32>,
    #[serde(default)]
    pub completion_token_limit: Option<u32>,
    /// Prompt history as the model will see it.
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
}

/// Response of `promptConversation`, `continueConversation`,
/// `formatConversation` and `completeConversation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptConversation {
    pub conversation: Option<EntityReference>,
    #[serde(default)]
    pub message: Option<ConversationMessage>,
    #[serde(default)]
    pub message_count: Option<u32>,
    #[serde(default)]
    pub details: Option<ConversationDetails>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_enum_values() {
        let state: EntityState = serde_json::from_str("\"ARCHIVED\"").unwrap();
        assert_eq!(state, EntityState::Unknown);
        let service: ModelServiceType = serde_json::from_str("\"OPEN_AI\"").unwrap();
        assert_eq!(service, ModelServiceType::OpenAi);
    }

    #[test]
    fn test_specification_model_properties() {
        let spec: Specification = serde_json::from_value(serde_json::json!({
            "id": "s-1",
            "name": "Chat",
            "serviceType": "OPEN_AI",
            "openAI": { "model": "GPT4O_128K", "temperature": 0.2 },
            "anthropic": { "model": "CLAUDE_3_7_SONNET" }
        }))
        .unwrap();
        let props = spec.model_properties().unwrap();
        assert_eq!(props.model.as_deref(), Some("GPT4O_128K"));
        assert_eq!(props.temperature, Some(0.2));
    }

    #[test]
    fn test_specification_input_places_provider_block() {
        let input = SpecificationInput::completion(
            "Claude",
            ModelServiceType::Anthropic,
            ModelProperties {
                model: Some("CLAUDE_3_7_SONNET".into()),
                ..Default::default()
            },
        );
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["serviceType"], "ANTHROPIC");
        assert_eq!(json["type"], "COMPLETION");
        assert_eq!(json["anthropic"]["model"], "CLAUDE_3_7_SONNET");
    }

    #[test]
    fn test_feed_input_serialization() {
        let json = serde_json::to_value(FeedInput::rss("News", "https://x/rss")).unwrap();
        assert_eq!(json["type"], "RSS");
        assert_eq!(json["rss"]["uri"], "https://x/rss");
        assert!(json.get("web").is_none());
    }

    #[test]
    fn test_message_with_tool_calls() {
        let message: ConversationMessage = serde_json::from_value(serde_json::json!({
            "role": "ASSISTANT",
            "toolCalls": [{ "id": "t1", "name": "search", "arguments": "{\"q\":\"x\"}" }],
            "timestamp": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(message.role, ConversationRole::Assistant);
        assert_eq!(message.tool_calls[0].name, "search");
        assert_eq!(message.text(), "");
    }

    #[test]
    fn test_terminal_states() {
        assert!(EntityState::Finished.is_terminal());
        assert!(EntityState::Errored.is_terminal());
        assert!(!EntityState::Enabled.is_terminal());
    }
}
