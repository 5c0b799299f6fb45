//! Contents API.

use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use crate::client::StrataClient;
use crate::error::{Error, Result};
use crate::graphql::{BooleanResult, Results};
use crate::types::{Content, ContentFilter, ContentUpdateInput, DeletedEntity, EntityReference, TextType};

const INGEST_URI: &str = concat!(
    "mutation IngestUri($uri: URL!, $name: String, $workflow: EntityReferenceInput, $isSynchronous: Boolean) ",
    "{ ingestUri(uri: $uri, name: $name, workflow: $workflow, isSynchronous: $isSynchronous) { ",
    content_fields!(),
    " } }"
);

const INGEST_TEXT: &str = concat!(
    "mutation IngestText($text: String!, $name: String, $textType: TextTypes, $workflow: EntityReferenceInput, $isSynchronous: Boolean) ",
    "{ ingestText(text: $text, name: $name, textType: $textType, workflow: $workflow, isSynchronous: $isSynchronous) { ",
    content_fields!(),
    " } }"
);

const GET_CONTENT: &str = concat!(
    "query GetContent($id: ID!) { content(id: $id) { ",
    content_fields!(),
    " } }"
);

const QUERY_CONTENTS: &str = concat!(
    "query QueryContents($filter: ContentFilter) { contents(filter: $filter) { results { ",
    content_fields!(),
    " } } }"
);

const UPDATE_CONTENT: &str = concat!(
    "mutation UpdateContent($content: ContentUpdateInput!) { updateContent(content: $content) { ",
    content_fields!(),
    " } }"
);

const DELETE_CONTENT: &str =
    "mutation DeleteContent($id: ID!) { deleteContent(id: $id) { id state } }";

const IS_CONTENT_DONE: &str =
    "query IsContentDone($id: ID!) { isContentDone(id: $id) { result } }";

/// Contents API client.
pub struct ContentsApi {
    client: StrataClient,
}

impl ContentsApi {
    pub(crate) fn new(client: StrataClient) -> Self {
        Self { client }
    }

    /// Ingest a web page or file by URI.
    pub async fn ingest_uri(
        &self,
        uri: &str,
        name: Option<&str>,
        workflow: Option<EntityReference>,
        is_synchronous: bool,
    ) -> Result<Content> {
        let vars = json!({
            "uri": uri,
            "name": name,
            "workflow": workflow,
            "isSynchronous": is_synchronous,
        });
        self.client.field("IngestUri", INGEST_URI, &vars, "ingestUri").await
    }

    /// Ingest raw text.
    pub async fn ingest_text(
        &self,
        text: &str,
        name: Option<&str>,
        text_type: TextType,
        is_synchronous: bool,
    ) -> Result<Content> {
        let vars = json!({
            "text": text,
            "name": name,
            "textType": text_type,
            "isSynchronous": is_synchronous,
        });
        self.client
            .field("IngestText", INGEST_TEXT, &vars, "ingestText")
            .await
    }

    /// Get a content item by ID.
    pub async fn get(&self, id: &str) -> Result<Content> {
        self.client
            .field("GetContent", GET_CONTENT, &json!({ "id": id }), "content")
            .await
    }

    /// Query contents.
    pub async fn query(&self, filter: ContentFilter) -> Result<Vec<Content>> {
        let results: Results<Content> = self
            .client
            .field(
                "QueryContents",
                QUERY_CONTENTS,
                &json!({ "filter": filter }),
                "contents",
            )
            .await?;
        Ok(results.results)
    }

    pub async fn update(&self, input: ContentUpdateInput) -> Result<Content> {
        self.client
            .field(
                "UpdateContent",
                UPDATE_CONTENT,
                &json!({ "content": input }),
                "updateContent",
            )
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<DeletedEntity> {
        self.client
            .field(
                "DeleteContent",
                DELETE_CONTENT,
                &json!({ "id": id }),
                "deleteContent",
            )
            .await
    }

    /// Whether ingestion of a content item has finished.
    pub async fn is_done(&self, id: &str) -> Result<bool> {
        let done: BooleanResult = self
            .client
            .field(
                "IsContentDone",
                IS_CONTENT_DONE,
                &json!({ "id": id }),
                "isContentDone",
            )
            .await?;
        Ok(done.result)
    }

    /// Poll until ingestion finishes, then return the content.
    pub async fn wait_until_done(
        &self,
        id: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Content> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_done(id).await? {
                return self.get(id).await;
            }
            if Instant::now() + poll_interval > deadline {
                return Err(Error::Timeout(format!(
                    "content {} not done after {:?}",
                    id, timeout
                )));
            }
            tracing::debug!(content_id = id, "Content still processing");
            tokio::time::sleep(poll_interval).await;
        }
    }
}
