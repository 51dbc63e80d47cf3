//! Request and Response envelopes.
//!
//! Every command the bridge sends is wrapped in a [`Request`] carrying a
//! unique id; the hub answers with a [`Response`] echoing that id. The
//! hub's READY handshake is a `Response` with the reserved nil id, sent
//! before any request exists.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::HubCommand;

// ============================================================================
// Request
// ============================================================================

/// A command request from the bridge to the hub.
///
/// # Format
///
/// ```json
/// {
///   "id": "uuid",
///   "method": "hub.methodName",
///   "params": { ... }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Unique identifier for request/response correlation.
    pub id: RequestId,

    /// Command with method and params.
    #[serde(flatten)]
    pub command: HubCommand,
}

impl Request {
    /// Creates a new request with auto-generated ID.
    #[inline]
    #[must_use]
    pub fn new(command: HubCommand) -> Self {
        Self {
            id: RequestId::generate(),
            command,
        }
    }

    /// Creates a new request with specific ID.
    #[inline]
    #[must_use]
    pub fn with_id(id: RequestId, command: HubCommand) -> Self {
        Self { id, command }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from the hub to the bridge.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": "uuid", "type": "success", "result": { ... } }
/// ```
///
/// Error:
/// ```json
/// { "id": "uuid", "type": "error", "error": "code", "message": "detail" }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    /// Matches the request `id`; nil for the READY handshake.
    pub id: RequestId,

    /// Response type.
    #[serde(rename = "type")]
    pub response_type: ResponseType,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error code (if error).
    #[serde(default)]
    pub error: Option<String>,

    /// Error message (if error).
    #[serde(default)]
    pub message: Option<String>,
}

impl Response {
    /// Returns `true` if this is a success response.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.response_type == ResponseType::Success
    }

    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.response_type == ResponseType::Error
    }

    /// Extracts the result value, returning error if response was error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the response was an error.
    pub fn into_result(self) -> Result<Value> {
        match self.response_type {
            ResponseType::Success => Ok(self.result.unwrap_or(Value::Null)),
            ResponseType::Error => {
                let error_code = self.error.unwrap_or_else(|| "unknown error".to_string());
                let message = self.message.unwrap_or_else(|| error_code.clone());
                Err(Error::protocol(message))
            }
        }
    }

    /// Gets a string value from the result.
    ///
    /// Returns empty string if key not found or not a string.
    #[inline]
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.result
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Gets a u64 value from the result.
    ///
    /// Returns 0 if key not found or not a number.
    #[inline]
    #[must_use]
    pub fn get_u64(&self, key: &str) -> u64 {
        self.result
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(|v| v.as_u64())
            .unwrap_or_default()
    }

    /// Gets a field from the result, `Null` when absent.
    #[inline]
    #[must_use]
    pub fn get_value(&self, key: &str) -> Value {
        self.result
            .as_ref()
            .and_then(|v| v.get(key))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

// ============================================================================
// ResponseType
// ============================================================================

/// Response type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Successful response.
    Success,
    /// Error response.
    Error,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Broadcast, HubCommand};

    #[test]
    fn test_request_serialization() {
        let command = HubCommand::OpenTab {
            url: "https://web.whatsapp.com/".to_string(),
            window_name: "AcrossTab".to_string(),
        };

        let request = Request::new(command);
        let json = serde_json::to_string(&request).expect("serialize");

        assert!(json.contains("hub.openTab"));
        assert!(json.contains("\"id\""));
        assert!(json.contains("params"));
    }

    #[test]
    fn test_request_ids_are_distinct() {
        let a = Request::new(HubCommand::GetAllTabs);
        let b = Request::new(HubCommand::GetAllTabs);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_request_with_id() {
        let id = RequestId::generate();
        let request = Request::with_id(
            id,
            HubCommand::BroadcastAll {
                payload: Broadcast::code("1"),
                expect_reply: false,
            },
        );
        assert_eq!(request.id, id);
    }

    #[test]
    fn test_success_response() {
        let json_str = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "type": "success",
            "result": {"tabId": "tab-7"}
        }"#;

        let response: Response = serde_json::from_str(json_str).expect("parse");
        assert!(response.is_success());
        assert!(!response.is_error());
        assert_eq!(response.get_string("tabId"), "tab-7");
    }

    #[test]
    fn test_error_response() {
        let json_str = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "type": "error",
            "error": "popup blocked",
            "message": "Tab could not be opened"
        }"#;

        let response: Response = serde_json::from_str(json_str).expect("parse");
        assert!(response.is_error());
        assert!(response.into_result().is_err());
    }

    #[test]
    fn test_ready_response_has_nil_id() {
        let json_str = r#"{
            "id": "00000000-0000-0000-0000-000000000000",
            "type": "success",
            "result": {"hubId": "hub-1"}
        }"#;

        let response: Response = serde_json::from_str(json_str).expect("parse");
        assert!(response.id.is_ready());
    }

    #[test]
    fn test_get_value_missing_is_null() {
        let json_str = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "type": "success",
            "result": {"result": 42}
        }"#;

        let response: Response = serde_json::from_str(json_str).expect("parse");
        assert_eq!(response.get_value("result"), serde_json::json!(42));
        assert_eq!(response.get_value("error"), Value::Null);
    }
}
