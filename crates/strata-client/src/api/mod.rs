//! Typed GraphQL operations.
//!
//! Selection sets are shared between operations through the field macros
//! below, so documents stay `&'static str`.

macro_rules! content_fields {
    () => {
        "id name state type uri mimeType markdown creationDate finishedDate error"
    };
}

macro_rules! feed_fields {
    () => {
        "id name state type creationDate lastReadDate error"
    };
}

macro_rules! workflow_fields {
    () => {
        "id name state creationDate ingestion preparation extraction enrichment"
    };
}

macro_rules! model_fields {
    () => {
        "{ model modelName temperature probability completionTokenLimit enableThinking thinkingTokenLimit }"
    };
}

macro_rules! specification_fields {
    () => {
        concat!(
            "id name state type serviceType systemPrompt",
            " openAI ", model_fields!(),
            " anthropic ", model_fields!(),
            " google ", model_fields!(),
            " groq ", model_fields!(),
            " cerebras ", model_fields!(),
            " cohere ", model_fields!(),
            " mistral ", model_fields!(),
            " bedrock ", model_fields!(),
            " deepseek ", model_fields!()
        )
    };
}

macro_rules! message_fields {
    () => {
        "role author message tokens throughput completionTime timestamp modelService model toolCallId toolCalls { id name arguments }"
    };
}

macro_rules! prompt_fields {
    () => {
        concat!(
            "conversation { id } message { ",
            message_fields!(),
            " } messageCount details { modelService model supportsToolCalling sourceCount tokenLimit completionTokenLimit messages { ",
            message_fields!(),
            " } }"
        )
    };
}

mod contents;
mod conversations;
mod feeds;
mod specifications;
mod workflows;

pub use contents::ContentsApi;
pub use conversations::{ConversationsApi, PromptRequest};
pub use feeds::FeedsApi;
pub use specifications::SpecificationsApi;
pub use workflows::WorkflowsApi;
