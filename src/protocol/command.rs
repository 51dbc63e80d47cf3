//! Hub command definitions.
//!
//! Commands follow `module.methodName` format. The single `hub` module
//! covers everything the bridge asks of the browser-side controller:
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `hub.openTab` | open a child tab at a URL |
//! | `hub.getAllTabs` | list currently live child tabs |
//! | `hub.broadcastAll` | send a payload to every child tab |
//! | `hub.closeAllTabs` | close every tracked child tab |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::identifiers::{EventId, TabId};

// ============================================================================
// HubCommand
// ============================================================================

/// Commands the bridge sends to the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum HubCommand {
    /// Open a new child tab.
    ///
    /// The hub responds with `{tabId}`.
    #[serde(rename = "hub.openTab")]
    OpenTab {
        /// URL to open the tab at.
        url: String,
        /// Window name passed to the browser's open call.
        #[serde(rename = "windowName")]
        window_name: String,
    },

    /// List all currently live child tabs.
    ///
    /// The hub responds with `{tabs: [{id, url}]}`.
    #[serde(rename = "hub.getAllTabs")]
    GetAllTabs,

    /// Broadcast a payload to every open child tab.
    ///
    /// With `expectReply` set, the hub relays the first child reply as
    /// this command's response (`{result, error}`); otherwise it just
    /// acknowledges dispatch.
    #[serde(rename = "hub.broadcastAll")]
    BroadcastAll {
        /// The payload delivered to each child tab.
        payload: Broadcast,
        /// Whether a child reply should be relayed as the response.
        #[serde(rename = "expectReply", default)]
        expect_reply: bool,
    },

    /// Close every tracked child tab.
    #[serde(rename = "hub.closeAllTabs")]
    CloseAllTabs,
}

// ============================================================================
// Broadcast
// ============================================================================

/// Payload broadcast to child tabs.
///
/// Wire shape: `{code, isEvent, id?}`. Code evaluations carry no `id`
/// (callers serialize those); event subscriptions carry the correlation
/// id the child echoes back in its `hub.childResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broadcast {
    /// Code to evaluate, or the event name for event subscriptions.
    pub code: String,

    /// Whether this payload is an event subscription.
    #[serde(rename = "isEvent")]
    pub is_event: bool,

    /// Correlation id, present only on event subscriptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EventId>,
}

impl Broadcast {
    /// Creates a code-evaluation payload (no correlation id).
    #[inline]
    #[must_use]
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            is_event: false,
            id: None,
        }
    }

    /// Creates an event-subscription payload.
    #[inline]
    #[must_use]
    pub fn event(id: EventId, event_name: impl Into<String>) -> Self {
        Self {
            code: event_name.into(),
            is_event: true,
            id: Some(id),
        }
    }
}

// ============================================================================
// TabInfo
// ============================================================================

/// A live child tab as reported by `hub.getAllTabs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabInfo {
    /// Tab identifier.
    pub id: TabId,

    /// URL the tab currently points at, if the hub reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_tab_serialization() {
        let cmd = HubCommand::OpenTab {
            url: "https://web.whatsapp.com/".to_string(),
            window_name: "AcrossTab".to_string(),
        };
        let json = serde_json::to_string(&cmd).expect("serialize");
        assert!(json.contains("hub.openTab"));
        assert!(json.contains("https://web.whatsapp.com/"));
        assert!(json.contains("windowName"));
    }

    #[test]
    fn test_get_all_tabs_has_no_params() {
        let cmd = HubCommand::GetAllTabs;
        let json = serde_json::to_string(&cmd).expect("serialize");
        assert!(json.contains("hub.getAllTabs"));
    }

    #[test]
    fn test_broadcast_code_omits_id() {
        let payload = Broadcast::code("window.Store.ready");
        let json = serde_json::to_string(&payload).expect("serialize");

        assert!(json.contains("\"code\":\"window.Store.ready\""));
        assert!(json.contains("\"isEvent\":false"));
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn test_broadcast_event_carries_string_id() {
        let id = EventId::next();
        let payload = Broadcast::event(id, "message.received");
        let json = serde_json::to_string(&payload).expect("serialize");

        assert!(json.contains("\"isEvent\":true"));
        assert!(json.contains(&format!("\"id\":\"{id}\"")));
    }

    #[test]
    fn test_broadcast_all_serialization() {
        let cmd = HubCommand::BroadcastAll {
            payload: Broadcast::code("1 + 1"),
            expect_reply: true,
        };
        let json = serde_json::to_string(&cmd).expect("serialize");
        assert!(json.contains("hub.broadcastAll"));
        assert!(json.contains("expectReply"));
    }

    #[test]
    fn test_tab_info_without_url() {
        let info: TabInfo = serde_json::from_str(r#"{"id":"tab-1"}"#).expect("parse");
        assert_eq!(info.id.as_str(), "tab-1");
        assert!(info.url.is_none());
    }
}
