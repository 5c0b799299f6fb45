//! Main client implementation.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::api::{ContentsApi, ConversationsApi, FeedsApi, SpecificationsApi, WorkflowsApi};
use crate::auth::{Credentials, JwtSigner};
use crate::error::{Error, Result};
use crate::graphql::{GraphQlRequest, GraphQlResponse};
use crate::retry::RetryConfig;

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Strata platform client.
///
/// Provides typed access to the platform's GraphQL operations.
///
/// # Example
///
/// ```no_run
/// use strata_client::StrataClient;
///
/// # async fn example() -> strata_client::Result<()> {
/// let client = StrataClient::builder()
///     .api_uri("https://data-scus.strata.dev/api/v1/graphql")
///     .organization_id("org")
///     .environment_id("env")
///     .jwt_secret("secret")
///     .build()?;
///
/// let contents = client.contents().query(Default::default()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct StrataClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    api_uri: Url,
    credentials: Credentials,
    retry: RetryConfig,
}

impl std::fmt::Debug for StrataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrataClient")
            .field("api_uri", &self.inner.api_uri.as_str())
            .finish_non_exhaustive()
    }
}

impl StrataClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The GraphQL endpoint.
    pub fn api_uri(&self) -> &Url {
        &self.inner.api_uri
    }

    /// The retry policy in effect.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.inner.retry
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access the contents API.
    pub fn contents(&self) -> ContentsApi {
        ContentsApi::new(self.clone())
    }

    /// Access the feeds API.
    pub fn feeds(&self) -> FeedsApi {
        FeedsApi::new(self.clone())
    }

    /// Access the workflows API.
    pub fn workflows(&self) -> WorkflowsApi {
        WorkflowsApi::new(self.clone())
    }

    /// Access the specifications API.
    pub fn specifications(&self) -> SpecificationsApi {
        SpecificationsApi::new(self.clone())
    }

    /// Access the conversations API.
    pub fn conversations(&self) -> ConversationsApi {
        ConversationsApi::new(self.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────────

    /// Run a GraphQL operation and deserialize its `data` object.
    ///
    /// Transient failures are retried per the client's [`RetryConfig`].
    pub async fn execute<V, T>(&self, operation_name: &str, document: &str, variables: &V) -> Result<T>
    where
        V: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let data = self.execute_raw(operation_name, document, variables).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Run an operation and deserialize one root field of `data`.
    ///
    /// A `null` field means the entity does not exist.
    pub(crate) async fn field<V, T>(
        &self,
        operation_name: &str,
        document: &str,
        variables: &V,
        field: &str,
    ) -> Result<T>
    where
        V: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut data = self.execute_raw(operation_name, document, variables).await?;
        match data.get_mut(field).map(Value::take) {
            None | Some(Value::Null) => Err(Error::NotFound(format!(
                "{} returned no {}",
                operation_name, field
            ))),
            Some(value) => Ok(serde_json::from_value(value)?),
        }
    }

    async fn execute_raw<V>(&self, operation_name: &str, document: &str, variables: &V) -> Result<Value>
    where
        V: Serialize + ?Sized,
    {
        let retry = &self.inner.retry;
        let mut attempt = 0;

        loop {
            match self.send_once(operation_name, document, variables).await {
                Ok(data) => return Ok(data),
                Err(err) if attempt + 1 < retry.max_attempts && retry.should_retry(&err) => {
                    let delay = retry.delay_for(attempt, err.retry_after());
                    tracing::warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_attempts = retry.max_attempts,
                        status = ?err.status(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying GraphQL request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once<V>(&self, operation_name: &str, document: &str, variables: &V) -> Result<Value>
    where
        V: Serialize + ?Sized,
    {
        let token = self.inner.credentials.bearer()?;
        let body = GraphQlRequest {
            query: document,
            variables,
            operation_name,
        };

        tracing::debug!(operation = operation_name, "Sending GraphQL request");

        let response = self
            .inner
            .http
            .post(self.inner.api_uri.clone())
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::extract_error(operation_name, response).await);
        }

        let envelope: GraphQlResponse = response.json().await?;
        if !envelope.errors.is_empty() {
            return Err(Error::GraphQl {
                operation: operation_name.to_string(),
                errors: envelope.errors,
            });
        }

        match envelope.data {
            Some(data) if !data.is_null() => Ok(data),
            _ => Err(Error::EmptyResponse {
                operation: operation_name.to_string(),
            }),
        }
    }

    /// Map a failed HTTP response to an error.
    async fn extract_error(operation_name: &str, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = response.text().await.unwrap_or_default();

        // Some gateways report validation failures as non-2xx GraphQL envelopes
        if let Ok(envelope) = serde_json::from_str::<GraphQlResponse>(&text)
            && !envelope.errors.is_empty()
            && status < 500
            && !matches!(status, 401 | 403 | 429)
        {
            return Error::GraphQl {
                operation: operation_name.to_string(),
                errors: envelope.errors,
            };
        }

        let message = if text.is_empty() {
            format!("HTTP {}", status)
        } else {
            text
        };

        match status {
            401 | 403 => Error::Auth(message),
            404 => Error::NotFound(message),
            429 => Error::RateLimited {
                message,
                retry_after,
            },
            _ => Error::Api {
                status,
                message,
                retry_after,
            },
        }
    }
}

/// Builder for creating a StrataClient.
#[derive(Debug)]
pub struct ClientBuilder {
    api_uri: Option<String>,
    organization_id: Option<String>,
    environment_id: Option<String>,
    jwt_secret: Option<String>,
    owner_id: Option<String>,
    user_id: Option<String>,
    token: Option<String>,
    timeout: Duration,
    retry: RetryConfig,
    user_agent: Option<String>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            api_uri: None,
            organization_id: None,
            environment_id: None,
            jwt_secret: None,
            owner_id: None,
            user_id: None,
            token: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
            user_agent: None,
        }
    }

    /// Set the GraphQL endpoint.
    pub fn api_uri(mut self, uri: impl Into<String>) -> Self {
        self.api_uri = Some(uri.into());
        self
    }

    pub fn organization_id(mut self, id: impl Into<String>) -> Self {
        self.organization_id = Some(id.into());
        self
    }

    pub fn environment_id(mut self, id: impl Into<String>) -> Self {
        self.environment_id = Some(id.into());
        self
    }

    /// Set the secret used to sign tokens.
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = Some(secret.into());
        self
    }

    pub fn owner_id(mut self, id: impl Into<String>) -> Self {
        self.owner_id = Some(id.into());
        self
    }

    pub fn user_id(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    /// Use a pre-minted bearer token instead of signing one.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<StrataClient> {
        let api_uri = self
            .api_uri
            .ok_or_else(|| Error::Config("api_uri is required".to_string()))?;
        let api_uri = Url::parse(&api_uri)?;

        let credentials = match self.token {
            Some(token) => Credentials::Token(token),
            None => {
                let organization_id = self.organization_id.ok_or_else(|| {
                    Error::Config("organization_id is required without a token".to_string())
                })?;
                let environment_id = self.environment_id.ok_or_else(|| {
                    Error::Config("environment_id is required without a token".to_string())
                })?;
                let secret = self.jwt_secret.ok_or_else(|| {
                    Error::Config("jwt_secret is required without a token".to_string())
                })?;

                let mut signer = JwtSigner::new(organization_id, environment_id, &secret);
                if let Some(owner) = self.owner_id {
                    signer = signer.with_owner(owner);
                }
                if let Some(user) = self.user_id {
                    signer = signer.with_user(user);
                }
                Credentials::Signed(signer)
            }
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("strata-client/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .timeout(self.timeout)
            .build()?;

        Ok(StrataClient {
            inner: Arc::new(ClientInner {
                http,
                api_uri,
                credentials,
                retry: self.retry,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_api_uri() {
        let err = ClientBuilder::new().token("t").build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_builder_requires_credentials_without_token() {
        let err = ClientBuilder::new()
            .api_uri("https://api.example.com/graphql")
            .organization_id("org")
            .environment_id("env")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("jwt_secret"));
    }

    #[test]
    fn test_builder_with_token_skips_signing_fields() {
        let client = ClientBuilder::new()
            .api_uri("https://api.example.com/graphql")
            .token("pre-minted")
            .build()
            .unwrap();
        assert_eq!(client.api_uri().path(), "/graphql");
    }

    #[test]
    fn test_builder_rejects_bad_uri() {
        let err = ClientBuilder::new()
            .api_uri("not a url")
            .token("t")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[test]
    fn test_clone_shares_inner() {
        let client = ClientBuilder::new()
            .api_uri("https://api.example.com/graphql")
            .token("t")
            .retry(RetryConfig::none())
            .build()
            .unwrap();
        let other = client.clone();
        assert!(Arc::ptr_eq(&client.inner, &other.inner));
        assert_eq!(other.retry_config().max_attempts, 1);
    }
}
