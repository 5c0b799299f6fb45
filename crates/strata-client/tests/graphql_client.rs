//! Transport-level tests against a mock GraphQL endpoint.

use std::time::{Duration, Instant};

use serde_json::json;
use strata_client::{
    ContentFilter, EntityState, Error, PromptRequest, RetryConfig, StrataClient,
    ToolDefinitionInput,
};
use wiremock::matchers::{body_partial_json, header, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        jitter: false,
        ..RetryConfig::default()
    }
}

fn client_for(server: &MockServer, retry: RetryConfig) -> StrataClient {
    StrataClient::builder()
        .api_uri(format!("{}/graphql", server.uri()))
        .organization_id("org-1")
        .environment_id("env-1")
        .jwt_secret("test-secret")
        .retry(retry)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_get_content_sends_operation_and_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header_regex("authorization", r"^Bearer [\w-]+\.[\w-]+\.[\w-]+$"))
        .and(body_partial_json(json!({
            "operationName": "GetContent",
            "variables": { "id": "c-1" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "content": { "id": "c-1", "name": "Report", "state": "FINISHED", "type": "FILE" } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, fast_retry(1));
    let content = client.contents().get("c-1").await.unwrap();
    assert_eq!(content.id, "c-1");
    assert_eq!(content.state, Some(EntityState::Finished));
}

#[tokio::test]
async fn test_pre_minted_token_used_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer fixed-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "contents": { "results": [] } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = StrataClient::builder()
        .api_uri(format!("{}/graphql", server.uri()))
        .token("fixed-token")
        .build()
        .unwrap();
    let contents = client.contents().query(ContentFilter::default()).await.unwrap();
    assert!(contents.is_empty());
}

#[tokio::test]
async fn test_graphql_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [
                { "message": "Invalid filter", "extensions": { "code": "BAD_USER_INPUT" } },
                { "message": "Also wrong" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, fast_retry(5));
    let err = client
        .contents()
        .query(ContentFilter::default())
        .await
        .unwrap_err();
    match &err {
        Error::GraphQl { operation, errors } => {
            assert_eq!(operation, "QueryContents");
            assert_eq!(errors.len(), 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.graphql_code(), Some("BAD_USER_INPUT"));
    assert!(err.to_string().contains("Invalid filter; Also wrong"));
}

#[tokio::test]
async fn test_null_data_is_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": null })))
        .mount(&server)
        .await;

    let client = client_for(&server, fast_retry(1));
    let err = client.feeds().get("f-1").await.unwrap_err();
    assert!(matches!(err, Error::EmptyResponse { .. }));
}

#[tokio::test]
async fn test_null_field_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "specification": null }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, fast_retry(1));
    let err = client.specifications().get("missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_server_errors_retried_then_succeed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "isContentDone": { "result": true } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, fast_retry(5));
    assert!(client.contents().is_done("c-1").await.unwrap());
}

#[tokio::test]
async fn test_retries_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server, fast_retry(3));
    let err = client.workflows().get("w-1").await.unwrap_err();
    assert!(err.is_server_error());
    assert_eq!(err.status(), Some(502));
}

/// Computed backoff of 1ms, so only an honoured `Retry-After` explains a
/// one second pause.
fn retry_after_policy() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_secs(30),
        jitter: false,
        ..RetryConfig::default()
    }
}

async fn mount_retry_after_then_ok(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(status).insert_header("retry-after", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "isFeedDone": { "result": false } }
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_rate_limit_honours_retry_after() {
    let server = MockServer::start().await;
    mount_retry_after_then_ok(&server, 429).await;

    let client = client_for(&server, retry_after_policy());
    let started = Instant::now();
    assert!(!client.feeds().is_done("f-1").await.unwrap());
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn test_server_error_honours_retry_after() {
    let server = MockServer::start().await;
    mount_retry_after_then_ok(&server, 503).await;

    let client = client_for(&server, retry_after_policy());
    let started = Instant::now();
    assert!(!client.feeds().is_done("f-1").await.unwrap());
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn test_server_error_exposes_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let client = client_for(&server, RetryConfig::none());
    let err = client.feeds().is_done("f-1").await.unwrap_err();
    assert_eq!(err.status(), Some(502));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn test_auth_failure_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, fast_retry(5));
    let err = client.conversations().get("conv-1").await.unwrap_err();
    assert!(err.is_auth_error());
}

#[tokio::test]
async fn test_prompt_sends_tools_and_parses_tool_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "operationName": "PromptConversation",
            "variables": {
                "prompt": "What's the weather?",
                "specification": { "id": "spec-1" },
                "tools": [{ "name": "weather", "schema": "{}" }]
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "promptConversation": {
                "conversation": { "id": "conv-9" },
                "message": {
                    "role": "ASSISTANT",
                    "message": "",
                    "toolCalls": [{ "id": "call-1", "name": "weather", "arguments": "{\"city\":\"Oslo\"}" }]
                },
                "messageCount": 2
            } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, fast_retry(1));
    let response = client
        .conversations()
        .prompt(
            PromptRequest::new("What's the weather?")
                .specification("spec-1")
                .tools(vec![ToolDefinitionInput {
                    name: "weather".into(),
                    description: None,
                    schema: "{}".into(),
                }]),
        )
        .await
        .unwrap();

    assert_eq!(response.conversation.unwrap().id, "conv-9");
    let message = response.message.unwrap();
    assert_eq!(message.tool_calls.len(), 1);
    assert_eq!(message.tool_calls[0].arguments, "{\"city\":\"Oslo\"}");
}

#[tokio::test]
async fn test_wait_until_done_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "isContentDone": { "result": false } }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, fast_retry(1));
    let err = client
        .contents()
        .wait_until_done("c-1", Duration::from_millis(10), Duration::from_millis(30))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
}
