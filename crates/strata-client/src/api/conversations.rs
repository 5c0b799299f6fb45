//! Conversations API.
//!
//! Besides CRUD this exposes the four completion entry points:
//!
//! - [`prompt`](ConversationsApi::prompt): the server runs the model.
//! - [`continue_with`](ConversationsApi::continue_with): hand tool results back
//!   to a server-side completion.
//! - [`format`](ConversationsApi::format): the server builds the augmented
//!   prompt only, so the caller can stream from a provider directly.
//! - [`complete`](ConversationsApi::complete): record the caller's completion.

use serde_json::json;

use crate::client::StrataClient;
use crate::error::Result;
use crate::graphql::Results;
use crate::types::{
    Conversation, ConversationFilter, ConversationInput, ConversationToolResponseInput,
    ConversationUpdateInput, DeletedEntity, EntityReference, PromptConversation,
    ToolDefinitionInput,
};

const CREATE_CONVERSATION: &str = concat!(
    "mutation CreateConversation($conversation: ConversationInput!) ",
    "{ createConversation(conversation: $conversation) { id name state creationDate specification { id } } }"
);

const GET_CONVERSATION: &str = concat!(
    "query GetConversation($id: ID!) { conversation(id: $id) { id name state creationDate specification { id } messages { ",
    message_fields!(),
    " } } }"
);

const QUERY_CONVERSATIONS: &str = concat!(
    "query QueryConversations($filter: ConversationFilter) { conversations(filter: $filter) { results { ",
    "id name state creationDate specification { id }",
    " } } }"
);

const UPDATE_CONVERSATION: &str = concat!(
    "mutation UpdateConversation($conversation: ConversationUpdateInput!) ",
    "{ updateConversation(conversation: $conversation) { id name state creationDate specification { id } } }"
);

const DELETE_CONVERSATION: &str =
    "mutation DeleteConversation($id: ID!) { deleteConversation(id: $id) { id state } }";

const PROMPT_CONVERSATION: &str = concat!(
    "mutation PromptConversation($prompt: String!, $id: ID, $specification: EntityReferenceInput, $tools: [ToolDefinitionInput!]) ",
    "{ promptConversation(prompt: $prompt, id: $id, specification: $specification, tools: $tools) { ",
    prompt_fields!(),
    " } }"
);

const CONTINUE_CONVERSATION: &str = concat!(
    "mutation ContinueConversation($id: ID!, $responses: [ConversationToolResponseInput!]!) ",
    "{ continueConversation(id: $id, responses: $responses) { ",
    prompt_fields!(),
    " } }"
);

const FORMAT_CONVERSATION: &str = concat!(
    "mutation FormatConversation($prompt: String!, $id: ID, $specification: EntityReferenceInput) ",
    "{ formatConversation(prompt: $prompt, id: $id, specification: $specification) { ",
    prompt_fields!(),
    " } }"
);

const COMPLETE_CONVERSATION: &str = concat!(
    "mutation CompleteConversation($completion: String!, $id: ID!, $completionTime: TimeSpan) ",
    "{ completeConversation(completion: $completion, id: $id, completionTime: $completionTime) { ",
    prompt_fields!(),
    " } }"
);

/// Arguments for [`ConversationsApi::prompt`].
#[derive(Debug, Clone, Default)]
pub struct PromptRequest {
    pub prompt: String,
    /// Continue this conversation; a new one is created when absent.
    pub conversation_id: Option<String>,
    pub specification: Option<EntityReference>,
    pub tools: Vec<ToolDefinitionInput>,
}

impl PromptRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn specification(mut self, id: impl Into<String>) -> Self {
        self.specification = Some(EntityReference::new(id));
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDefinitionInput>) -> Self {
        self.tools = tools;
        self
    }
}

/// Conversations API client.
pub struct ConversationsApi {
    client: StrataClient,
}

impl ConversationsApi {
    pub(crate) fn new(client: StrataClient) -> Self {
        Self { client }
    }

    pub async fn create(&self, conversation: ConversationInput) -> Result<Conversation> {
        self.client
            .field(
                "CreateConversation",
                CREATE_CONVERSATION,
                &json!({ "conversation": conversation }),
                "createConversation",
            )
            .await
    }

    /// Get a conversation with its messages.
    pub async fn get(&self, id: &str) -> Result<Conversation> {
        self.client
            .field(
                "GetConversation",
                GET_CONVERSATION,
                &json!({ "id": id }),
                "conversation",
            )
            .await
    }

    pub async fn query(&self, filter: ConversationFilter) -> Result<Vec<Conversation>> {
        let results: Results<Conversation> = self
            .client
            .field(
                "QueryConversations",
                QUERY_CONVERSATIONS,
                &json!({ "filter": filter }),
                "conversations",
            )
            .await?;
        Ok(results.results)
    }

    pub async fn update(&self, conversation: ConversationUpdateInput) -> Result<Conversation> {
        self.client
            .field(
                "UpdateConversation",
                UPDATE_CONVERSATION,
                &json!({ "conversation": conversation }),
                "updateConversation",
            )
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<DeletedEntity> {
        self.client
            .field(
                "DeleteConversation",
                DELETE_CONVERSATION,
                &json!({ "id": id }),
                "deleteConversation",
            )
            .await
    }

    /// Prompt with server-side completion.
    ///
    /// When the model asks for tools, the returned message carries
    /// `tool_calls`; answer them with [`continue_with`](Self::continue_with).
    pub async fn prompt(&self, request: PromptRequest) -> Result<PromptConversation> {
        let tools = (!request.tools.is_empty()).then_some(&request.tools);
        let vars = json!({
            "prompt": request.prompt,
            "id": request.conversation_id,
            "specification": request.specification,
            "tools": tools,
        });
        self.client
            .field(
                "PromptConversation",
                PROMPT_CONVERSATION,
                &vars,
                "promptConversation",
            )
            .await
    }

    /// Submit tool results and let the server continue the completion.
    pub async fn continue_with(
        &self,
        id: &str,
        responses: Vec<ConversationToolResponseInput>,
    ) -> Result<PromptConversation> {
        self.client
            .field(
                "ContinueConversation",
                CONTINUE_CONVERSATION,
                &json!({ "id": id, "responses": responses }),
                "continueConversation",
            )
            .await
    }

    /// Build the retrieval-augmented prompt without running a model.
    pub async fn format(
        &self,
        prompt: &str,
        id: Option<&str>,
        specification: Option<EntityReference>,
    ) -> Result<PromptConversation> {
        let vars = json!({
            "prompt": prompt,
            "id": id,
            "specification": specification,
        });
        self.client
            .field(
                "FormatConversation",
                FORMAT_CONVERSATION,
                &vars,
                "formatConversation",
            )
            .await
    }

    /// Record a completion produced outside the platform.
    ///
    /// `completion_time_secs` is how long the model took, if known.
    pub async fn complete(
        &self,
        id: &str,
        completion: &str,
        completion_time_secs: Option<f64>,
    ) -> Result<PromptConversation> {
        let vars = json!({
            "id": id,
            "completion": completion,
            "completionTime": completion_time_secs,
        });
        self.client
            .field(
                "CompleteConversation",
                COMPLETE_CONVERSATION,
                &vars,
                "completeConversation",
            )
            .await
    }
}
