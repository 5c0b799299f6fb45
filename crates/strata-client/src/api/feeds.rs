//! Feeds API.

use serde_json::json;

use crate::client::StrataClient;
use crate::error::Result;
use crate::graphql::{BooleanResult, Results};
use crate::types::{DeletedEntity, Feed, FeedFilter, FeedInput, FeedUpdateInput};

const CREATE_FEED: &str = concat!(
    "mutation CreateFeed($feed: FeedInput!) { createFeed(feed: $feed) { ",
    feed_fields!(),
    " } }"
);

const GET_FEED: &str = concat!("query GetFeed($id: ID!) { feed(id: $id) { ", feed_fields!(), " } }");

const QUERY_FEEDS: &str = concat!(
    "query QueryFeeds($filter: FeedFilter) { feeds(filter: $filter) { results { ",
    feed_fields!(),
    " } } }"
);

const UPDATE_FEED: &str = concat!(
    "mutation UpdateFeed($feed: FeedUpdateInput!) { updateFeed(feed: $feed) { ",
    feed_fields!(),
    " } }"
);

const DELETE_FEED: &str = "mutation DeleteFeed($id: ID!) { deleteFeed(id: $id) { id state } }";

const IS_FEED_DONE: &str = "query IsFeedDone($id: ID!) { isFeedDone(id: $id) { result } }";

/// Feeds API client.
pub struct FeedsApi {
    client: StrataClient,
}

impl FeedsApi {
    pub(crate) fn new(client: StrataClient) -> Self {
        Self { client }
    }

    pub async fn create(&self, feed: FeedInput) -> Result<Feed> {
        self.client
            .field("CreateFeed", CREATE_FEED, &json!({ "feed": feed }), "createFeed")
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Feed> {
        self.client
            .field("GetFeed", GET_FEED, &json!({ "id": id }), "feed")
            .await
    }

    pub async fn query(&self, filter: FeedFilter) -> Result<Vec<Feed>> {
        let results: Results<Feed> = self
            .client
            .field("QueryFeeds", QUERY_FEEDS, &json!({ "filter": filter }), "feeds")
            .await?;
        Ok(results.results)
    }

    pub async fn update(&self, feed: FeedUpdateInput) -> Result<Feed> {
        self.client
            .field("UpdateFeed", UPDATE_FEED, &json!({ "feed": feed }), "updateFeed")
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<DeletedEntity> {
        self.client
            .field("DeleteFeed", DELETE_FEED, &json!({ "id": id }), "deleteFeed")
            .await
    }

    /// Whether the feed has finished its current read.
    pub async fn is_done(&self, id: &str) -> Result<bool> {
        let done: BooleanResult = self
            .client
            .field("IsFeedDone", IS_FEED_DONE, &json!({ "id": id }), "isFeedDone")
            .await?;
        Ok(done.result)
    }
}
