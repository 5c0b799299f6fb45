//! Error types for the LLM crate.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the LLM error type.
pub type Result<T> = std::result::Result<T, LlmError>;

// ─────────────────────────────────────────────────────────────────────────────
// Rate Limit Info
// ─────────────────────────────────────────────────────────────────────────────

/// Information about a rate limit error.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// The error message from the provider.
    pub message: String,
    /// How long to wait before retrying (if the provider specified).
    pub retry_after: Option<Duration>,
}

impl RateLimitInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(message: impl Into<String>, retry_after: Duration) -> Self {
        Self {
            message: message.into(),
            retry_after: Some(retry_after),
        }
    }

    /// Build from a 429 response.
    ///
    /// The `Retry-After` header wins; otherwise the body is searched for
    /// Groq-style "try again in 6.5s" hints.
    pub fn from_response(message: &str, retry_after_header: Option<&str>) -> Self {
        let retry_after = retry_after_header
            .and_then(parse_retry_after_header)
            .or_else(|| parse_try_again_in(message));
        Self {
            message: message.to_string(),
            retry_after,
        }
    }
}

impl std::fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(retry_after) = self.retry_after {
            write!(f, " (retry after {:.2}s)", retry_after.as_secs_f64())?;
        }
        Ok(())
    }
}

/// Parse "try again in Xs" / "Xms" hints.
fn parse_try_again_in(message: &str) -> Option<Duration> {
    let lower = message.to_ascii_lowercase();
    for pattern in ["try again in ", "retry in "] {
        let Some(idx) = lower.find(pattern) else {
            continue;
        };
        let rest = &lower[idx + pattern.len()..];
        let num: String = rest
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let Ok(value) = num.parse::<f64>() else {
            continue;
        };
        let unit = &rest[num.len()..];
        let seconds = if unit.starts_with("ms") {
            value / 1000.0
        } else if unit.starts_with('m') {
            value * 60.0
        } else {
            value
        };
        return Some(Duration::from_secs_f64(seconds));
    }
    None
}

/// Parse a `Retry-After` header given in seconds.
fn parse_retry_after_header(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
}

// ─────────────────────────────────────────────────────────────────────────────
// Response Validation Errors
// ─────────────────────────────────────────────────────────────────────────────

/// A response from a provider didn't match the expected structure.
#[derive(Debug, Clone, Error)]
pub enum ResponseValidationError {
    #[error("missing required field '{field}' in response")]
    MissingField { field: &'static str },

    #[error("invalid tool_use block '{id}': {reason}")]
    InvalidToolUse { id: String, reason: String },

    #[error("invalid stop_reason: {reason}")]
    InvalidStopReason { reason: String },

    #[error("invalid stream event: {reason}")]
    InvalidStreamEvent { reason: String },

    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ResponseValidationError>),
}

impl ResponseValidationError {
    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    pub fn invalid_tool_use(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidToolUse {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_stop_reason(reason: impl Into<String>) -> Self {
        Self::InvalidStopReason {
            reason: reason.into(),
        }
    }

    pub fn invalid_stream_event(reason: impl Into<String>) -> Self {
        Self::InvalidStreamEvent {
            reason: reason.into(),
        }
    }
}

impl From<ResponseValidationError> for LlmError {
    fn from(err: ResponseValidationError) -> Self {
        LlmError::InvalidResponse(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmError
// ─────────────────────────────────────────────────────────────────────────────

/// Error type for LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Backend/API error from the provider.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Provider returned a 5xx (retryable).
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Network/connectivity error (retryable).
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error (API key missing, etc.).
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The provider sent something we could not interpret.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded (retryable with backoff).
    #[error("Rate limit exceeded: {0}")]
    RateLimit(RateLimitInfo),

    #[error("Authentication error: {0}")]
    Auth(String),

    /// The provider reported an error mid-stream.
    #[error("Stream error: {0}")]
    Stream(String),
}

impl LlmError {
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit(RateLimitInfo::new(message))
    }

    pub fn rate_limit_with_retry(message: impl Into<String>, retry_after: Duration) -> Self {
        Self::RateLimit(RateLimitInfo::with_retry_after(message, retry_after))
    }

    /// Get the retry-after duration if this is a rate limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit(info) => info.retry_after,
            _ => None,
        }
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimit(_) | Self::Server { .. }
        )
    }

    /// Short machine-readable code, surfaced on agent error events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "backend_error",
            Self::Server { .. } => "server_error",
            Self::Network(_) => "network_error",
            Self::Config(_) => "config_error",
            Self::Serialization(_) => "serialization_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidResponse(_) => "invalid_response",
            Self::RateLimit(_) => "rate_limited",
            Self::Auth(_) => "auth_error",
            Self::Stream(_) => "stream_error",
        }
    }

    /// Map a non-success HTTP status and body to an error.
    pub fn from_status(status: u16, body: &str, retry_after_header: Option<&str>) -> Self {
        match status {
            401 | 403 => Self::Auth(body.to_string()),
            429 => Self::RateLimit(RateLimitInfo::from_response(body, retry_after_header)),
            400 | 404 | 413 | 422 => Self::InvalidRequest(format!("{}: {}", status, body)),
            s if s >= 500 => Self::Server {
                status: s,
                message: body.to_string(),
            },
            s => Self::Backend(format!("{}: {}", s, body)),
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            LlmError::Network(format!("Connection failed: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(LlmError::Network("timeout".to_string()).is_retryable());
        assert!(LlmError::rate_limit("rate limited").is_retryable());
        assert!(
            LlmError::Server {
                status: 503,
                message: "overloaded".into()
            }
            .is_retryable()
        );
        assert!(!LlmError::Config("bad config".to_string()).is_retryable());
        assert!(!LlmError::Auth("unauthorized".to_string()).is_retryable());
        assert!(!LlmError::InvalidRequest("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_parse_groq_retry_after() {
        let info = RateLimitInfo::from_response(
            "Rate limit reached. Please try again in 6.57792s. Need more tokens?",
            None,
        );
        let retry = info.retry_after.unwrap();
        assert!((retry.as_secs_f64() - 6.57792).abs() < 0.001);

        let info = RateLimitInfo::from_response("Rate limit reached. Try again in 250ms.", None);
        assert_eq!(info.retry_after, Some(Duration::from_millis(250)));

        let info = RateLimitInfo::from_response("Rate limit exceeded", None);
        assert!(info.retry_after.is_none());
    }

    #[test]
    fn test_header_wins_over_body() {
        let info = RateLimitInfo::from_response("try again in 10s", Some("3"));
        assert_eq!(info.retry_after, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_parse_retry_after_header() {
        assert_eq!(parse_retry_after_header("5"), Some(Duration::from_secs(5)));
        assert_eq!(
            parse_retry_after_header(" 10 "),
            Some(Duration::from_secs(10))
        );
        assert_eq!(
            parse_retry_after_header("1.5"),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(parse_retry_after_header("invalid"), None);
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(
            LlmError::from_status(401, "nope", None),
            LlmError::Auth(_)
        ));
        assert!(matches!(
            LlmError::from_status(429, "slow", Some("2")),
            LlmError::RateLimit(_)
        ));
        assert!(matches!(
            LlmError::from_status(529, "overloaded", None),
            LlmError::Server { status: 529, .. }
        ));
        assert!(matches!(
            LlmError::from_status(400, "bad", None),
            LlmError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_rate_limit_info_display() {
        let info = RateLimitInfo::new("Rate limited");
        assert_eq!(info.to_string(), "Rate limited");

        let info = RateLimitInfo::with_retry_after("Rate limited", Duration::from_secs_f64(6.5));
        assert!(info.to_string().contains("retry after 6.50s"));
    }

    #[test]
    fn test_validation_error_into_llm_error() {
        let llm_err: LlmError = ResponseValidationError::missing_field("id").into();
        assert!(matches!(llm_err, LlmError::InvalidResponse(_)));
    }
}
