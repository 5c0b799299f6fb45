//! GraphQL request/response envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The body posted for every operation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlRequest<'a, V: Serialize + ?Sized> {
    pub query: &'a str,
    pub variables: &'a V,
    pub operation_name: &'a str,
}

/// The envelope every response arrives in.
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

/// A single error entry from a GraphQL response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: &str) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: Some(serde_json::json!({ "code": code })),
        }
    }

    /// `extensions.code`, when the server sets one.
    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.get("code")?.as_str()
    }
}

/// `{ results: [...] }` wrapper returned by query operations.
#[derive(Debug, Clone, Deserialize)]
pub struct Results<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

/// `{ result: bool }` wrapper returned by `is*Done` operations.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BooleanResult {
    #[serde(default)]
    pub result: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_operation_name_key() {
        let vars = serde_json::json!({ "id": "c-1" });
        let request = GraphQlRequest {
            query: "query GetContent($id: ID!) { content(id: $id) { id } }",
            variables: &vars,
            operation_name: "GetContent",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["operationName"], "GetContent");
        assert_eq!(json["variables"]["id"], "c-1");
    }

    #[test]
    fn test_request_accepts_unsized_variables() {
        fn body<V: Serialize + ?Sized>(variables: &V) -> Value {
            serde_json::to_value(GraphQlRequest {
                query: "query Ids { ids }",
                variables,
                operation_name: "Ids",
            })
            .unwrap()
        }
        let ids: &[&str] = &["a", "b"];
        assert_eq!(body(ids)["variables"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_response_without_errors_field() {
        let response: GraphQlResponse =
            serde_json::from_str(r#"{"data":{"content":{"id":"x"}}}"#).unwrap();
        assert!(response.errors.is_empty());
        assert!(response.data.is_some());
    }

    #[test]
    fn test_error_code() {
        let err: GraphQlError = serde_json::from_str(
            r#"{"message":"nope","path":["content"],"extensions":{"code":"FORBIDDEN"}}"#,
        )
        .unwrap();
        assert_eq!(err.code(), Some("FORBIDDEN"));
        assert_eq!(GraphQlError::new("plain").code(), None);
    }
}
