//! Hub event message types.
//!
//! Events are notifications pushed from the hub to the bridge; none of
//! them expect a reply.
//!
//! | Event | Payload | Meaning |
//! |-------|---------|---------|
//! | `hub.handshake` | `{id}` | a child tab completed its handshake |
//! | `hub.pollTick` | `{}` | the hub's liveness timer fired |
//! | `hub.childResult` | `{id, result, error}` | a child answered a broadcast |

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

use crate::identifiers::{EventId, TabId};

// ============================================================================
// HubEvent
// ============================================================================

/// An event notification from the hub.
///
/// # Format
///
/// ```json
/// {
///   "type": "event",
///   "method": "hub.eventName",
///   "params": { ... }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct HubEvent {
    /// Event type marker (always "event").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event name in `hub.eventName` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,
}

impl HubEvent {
    /// Returns the event name from the method.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.method.split('.').nth(1).unwrap_or_default()
    }

    /// Parses the event into a typed variant.
    #[must_use]
    pub fn parse(&self) -> ParsedHubEvent {
        match self.method.as_str() {
            "hub.handshake" => ParsedHubEvent::TabHandshake {
                tab_id: TabId::new(self.get_string("id")),
            },

            "hub.pollTick" => ParsedHubEvent::PollTick,

            "hub.childResult" => ParsedHubEvent::ChildResult {
                id: self
                    .params
                    .get("id")
                    .and_then(|v| v.as_str())
                    .and_then(EventId::from_wire),
                result: self.get_value("result"),
                error: self.get_value("error"),
            },

            _ => ParsedHubEvent::Unknown {
                method: self.method.clone(),
                params: self.params.clone(),
            },
        }
    }

    /// Gets a string from params.
    #[inline]
    fn get_string(&self, key: &str) -> String {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Gets a field from params, `Null` when absent.
    #[inline]
    fn get_value(&self, key: &str) -> Value {
        self.params.get(key).cloned().unwrap_or(Value::Null)
    }
}

// ============================================================================
// ParsedHubEvent
// ============================================================================

/// Parsed hub events for type-safe handling.
#[derive(Debug, Clone)]
pub enum ParsedHubEvent {
    /// A child tab completed its cross-tab handshake.
    TabHandshake {
        /// The handshaking tab.
        tab_id: TabId,
    },

    /// The hub's liveness poll timer fired.
    PollTick,

    /// A child tab answered a broadcast.
    ChildResult {
        /// Correlation id echoed by the child; `None` if missing or
        /// unparseable (such results are dropped as unmatched).
        id: Option<EventId>,
        /// Result value reported by the child.
        result: Value,
        /// Error value reported by the child (`Null` on success).
        error: Value,
    },

    /// Unknown event type.
    Unknown {
        /// Event method.
        method: String,
        /// Event params.
        params: Value,
    },
}

// ============================================================================
// Tests
// ============================================================================
