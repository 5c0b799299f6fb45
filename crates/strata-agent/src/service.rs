//! Platform operations the agent depends on.
//!
//! [`ConversationService`] is implemented for [`StrataClient`]; tests supply
//! their own implementation.

use async_trait::async_trait;

use strata_client::{
    ConversationInput, ConversationToolResponseInput, EntityReference, PromptConversation,
    PromptRequest, Specification, StrataClient, ToolDefinitionInput,
};

use crate::error::Result;

#[async_trait]
pub trait ConversationService: Send + Sync {
    async fn get_specification(&self, id: &str) -> Result<Specification>;

    /// Create a conversation and return its id.
    async fn create_conversation(&self, specification_id: Option<&str>) -> Result<String>;

    /// Build the prompt history without running a model.
    async fn format_conversation(
        &self,
        conversation_id: &str,
        prompt: &str,
        specification_id: Option<&str>,
    ) -> Result<PromptConversation>;

    /// Record a completion produced by a local backend.
    async fn complete_conversation(
        &self,
        conversation_id: &str,
        completion: &str,
        completion_time_secs: Option<f64>,
    ) -> Result<()>;

    /// Prompt with server-side completion.
    async fn prompt_conversation(
        &self,
        conversation_id: &str,
        prompt: &str,
        specification_id: Option<&str>,
        tools: Vec<ToolDefinitionInput>,
    ) -> Result<PromptConversation>;

    /// Hand tool results back to a server-side completion.
    async fn continue_conversation(
        &self,
        conversation_id: &str,
        responses: Vec<ConversationToolResponseInput>,
    ) -> Result<PromptConversation>;
}

#[async_trait]
impl ConversationService for StrataClient {
    async fn get_specification(&self, id: &str) -> Result<Specification> {
        Ok(self.specifications().get(id).await?)
    }

    async fn create_conversation(&self, specification_id: Option<&str>) -> Result<String> {
        let input = ConversationInput {
            name: None,
            specification: specification_id.map(EntityReference::new),
        };
        Ok(self.conversations().create(input).await?.id)
    }

    async fn format_conversation(
        &self,
        conversation_id: &str,
        prompt: &str,
        specification_id: Option<&str>,
    ) -> Result<PromptConversation> {
        Ok(self
            .conversations()
            .format(
                prompt,
                Some(conversation_id),
                specification_id.map(EntityReference::new),
            )
            .await?)
    }

    async fn complete_conversation(
        &self,
        conversation_id: &str,
        completion: &str,
        completion_time_secs: Option<f64>,
    ) -> Result<()> {
        self.conversations()
            .complete(conversation_id, completion, completion_time_secs)
            .await?;
        Ok(())
    }

    async fn prompt_conversation(
        &self,
        conversation_id: &str,
        prompt: &str,
        specification_id: Option<&str>,
        tools: Vec<ToolDefinitionInput>,
    ) -> Result<PromptConversation> {
        let mut request = PromptRequest::new(prompt)
            .conversation(conversation_id)
            .tools(tools);
        if let Some(id) = specification_id {
            request = request.specification(id);
        }
        Ok(self.conversations().prompt(request).await?)
    }

    async fn continue_conversation(
        &self,
        conversation_id: &str,
        responses: Vec<ConversationToolResponseInput>,
    ) -> Result<PromptConversation> {
        Ok(self
            .conversations()
            .continue_with(conversation_id, responses)
            .await?)
    }
}
