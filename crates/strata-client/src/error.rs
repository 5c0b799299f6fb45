//! Client error types.

use std::time::Duration;

use thiserror::Error;

use crate::graphql::GraphQlError;

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Signing the bearer token failed.
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Server returned a non-success HTTP status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or status text.
        message: String,
        /// `Retry-After` sent with the response, if any.
        retry_after: Option<Duration>,
    },

    /// Server asked us to slow down.
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Response body or status text.
        message: String,
        /// Delay requested by the server, if any.
        retry_after: Option<Duration>,
    },

    /// The GraphQL response carried errors.
    #[error("GraphQL error in {operation}: {}", join_messages(.errors))]
    GraphQl {
        /// Operation name that failed.
        operation: String,
        /// Errors reported by the server.
        errors: Vec<GraphQlError>,
    },

    /// The GraphQL response had neither data nor errors.
    #[error("Empty response for {operation}")]
    EmptyResponse {
        /// Operation name.
        operation: String,
    },

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A polling helper gave up.
    #[error("Timed out: {0}")]
    Timeout(String),
}

fn join_messages(errors: &[GraphQlError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_)) || matches!(self, Error::Api { status: 404, .. })
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth(_))
            || matches!(self, Error::Api { status: 401 | 403, .. })
            || self.graphql_code() == Some("UNAUTHENTICATED")
    }

    /// Check if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    /// Check if this is a server error.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Api { status, .. } if *status >= 500)
    }

    /// Check if this is a transient transport failure (connect/timeout).
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::RateLimited { .. } => Some(429),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Server-requested retry delay, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after, .. } | Error::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// The first GraphQL error code (`extensions.code`), if any.
    pub fn graphql_code(&self) -> Option<&str> {
        match self {
            Error::GraphQl { errors, .. } => errors.iter().find_map(|e| e.code()),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
