//! Type-safe identifiers for bridge entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time:
//!
//! | Type | Backing | Generated by |
//! |------|---------|--------------|
//! | [`TabId`] | opaque string | the hub, when a tab is opened |
//! | [`RequestId`] | UUIDv4 | the bridge, per wire request |
//! | [`EventId`] | monotonic counter | the bridge, per broadcast event |
//!
//! `EventId` deliberately replaces random short-string correlation ids:
//! a process-wide counter cannot collide within a session.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

// ============================================================================
// TabId
// ============================================================================

/// Identifier of a child browser tab, assigned by the hub.
///
/// Treated as an opaque string; the bridge never parses it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    /// Creates a tab ID from any string-like value.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TabId {
    #[inline]
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TabId {
    #[inline]
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// RequestId
// ============================================================================

/// Identifier correlating a wire request with its response.
///
/// The nil UUID is reserved for the hub's READY handshake message,
/// which arrives before any request has been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a fresh random request ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the reserved READY handshake ID (nil UUID).
    #[inline]
    #[must_use]
    pub const fn ready() -> Self {
        Self(Uuid::nil())
    }

    /// Returns `true` if this is the READY handshake ID.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// EventId
// ============================================================================

/// Counter for allocating event correlation IDs.
static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Correlation identifier for a broadcast event awaiting a child reply.
///
/// Allocated from a process-wide monotonic counter. On the wire it is
/// carried as a decimal string, matching the broadcast payload's `id`
/// field being a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    /// Allocates the next event ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw counter value.
    #[inline]
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Parses an event ID from its wire (decimal string) form.
    #[inline]
    #[must_use]
    pub fn from_wire(s: &str) -> Option<Self> {
        s.parse().ok().map(Self)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_wire(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid event id: {s}")))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tab_id_display() {
        let id = TabId::new("tab-42");
        assert_eq!(id.to_string(), "tab-42");
        assert_eq!(id.as_str(), "tab-42");
    }

    #[test]
    fn test_tab_id_serde_transparent() {
        let id = TabId::new("abc");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"abc\"");

        let back: TabId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn test_request_id_ready_is_nil() {
        assert!(RequestId::ready().is_ready());
        assert!(!RequestId::generate().is_ready());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_event_ids_are_monotonic() {
        let a = EventId::next();
        let b = EventId::next();
        assert!(b > a);
    }

    #[test]
    fn test_event_id_wire_round_trip() {
        let id = EventId::next();
        let json = serde_json::to_string(&id).expect("serialize");
        // Carried as a string on the wire.
        assert!(json.starts_with('"'));

        let back: EventId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn test_event_id_rejects_garbage() {
        assert!(EventId::from_wire("not-a-number").is_none());
        let result: Result<EventId, _> = serde_json::from_str("\"xyz\"");
        assert!(result.is_err());
    }
}
