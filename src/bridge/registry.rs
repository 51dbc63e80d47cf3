//! Bounded, expiring registry of one-shot reply handlers.
//!
//! Every broadcast event registers a handler here under its correlation
//! id; the handler runs when the child's reply arrives. A child that
//! never replies no longer leaks its entry: entries carry a TTL and are
//! swept on insertion and on every hub poll tick. Capacity is bounded;
//! a full registry rejects new handlers.

// ============================================================================
// Imports
// ============================================================================

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::EventId;

// ============================================================================
// Types
// ============================================================================

/// One-shot handler invoked with the child's `(result, error)` pair.
pub(crate) type ReplyHandler = Box<dyn FnOnce(Value, Value) + Send>;

/// A registered handler awaiting its reply.
struct PendingReply {
    handler: ReplyHandler,
    expires_at: Instant,
}

// ============================================================================
// ReplyRegistry
// ============================================================================

/// Bounded map from correlation id to one-shot reply handler.
pub(crate) struct ReplyRegistry {
    entries: Mutex<FxHashMap<EventId, PendingReply>>,
    capacity: usize,
    ttl: Duration,
}

impl ReplyRegistry {
    /// Creates a registry with the given capacity and entry TTL.
    pub(crate) fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            capacity,
            ttl,
        }
    }

    /// Registers a handler under `id`.
    ///
    /// Expired entries are swept first; if the registry is still full,
    /// the handler is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistryFull`] when no slot is free.
    pub(crate) fn insert(&self, id: EventId, handler: ReplyHandler) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        Self::sweep_locked(&mut entries, now);

        if entries.len() >= self.capacity {
            return Err(Error::registry_full(self.capacity));
        }

        entries.insert(
            id,
            PendingReply {
                handler,
                expires_at: now + self.ttl,
            },
        );
        Ok(())
    }

    /// Removes and returns the handler for `id`, if registered.
    pub(crate) fn take(&self, id: EventId) -> Option<ReplyHandler> {
        self.entries.lock().remove(&id).map(|entry| entry.handler)
    }

    /// Removes the handler for `id` without invoking it.
    ///
    /// Returns `true` if an entry was removed.
    pub(crate) fn remove(&self, id: EventId) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    /// Drops all expired entries, returning how many were evicted.
    pub(crate) fn sweep(&self) -> usize {
        let mut entries = self.entries.lock();
        let evicted = Self::sweep_locked(&mut entries, Instant::now());
        if evicted > 0 {
            debug!(evicted, "Evicted expired reply handlers");
        }
        evicted
    }

    /// Number of pending handlers.
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Drops every pending handler.
    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    fn sweep_locked(entries: &mut FxHashMap<EventId, PendingReply>, now: Instant) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn noop() -> ReplyHandler {
        Box::new(|_, _| {})
    }

    #[test]
    fn test_insert_and_take() {
        let registry = ReplyRegistry::new(4, Duration::from_secs(60));
        let id = EventId::next();

        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);

        registry
            .insert(
                id,
                Box::new(move |result, _error| {
                    assert_eq!(result, serde_json::json!({"a": 1}));
                    fired_clone.store(true, Ordering::SeqCst);
                }),
            )
            .expect("insert");
        assert_eq!(registry.len(), 1);

        let handler = registry.take(id).expect("handler");
        handler(serde_json::json!({"a": 1}), Value::Null);

        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(registry.len(), 0);
        assert!(registry.take(id).is_none());
    }

    #[test]
    fn test_capacity_rejects_when_full() {
        let registry = ReplyRegistry::new(2, Duration::from_secs(60));

        registry.insert(EventId::next(), noop()).expect("first");
        registry.insert(EventId::next(), noop()).expect("second");

        let result = registry.insert(EventId::next(), noop());
        assert!(matches!(result, Err(Error::RegistryFull { capacity: 2 })));
    }

    #[test]
    fn test_ttl_eviction_frees_capacity() {
        let registry = ReplyRegistry::new(1, Duration::from_millis(10));

        registry.insert(EventId::next(), noop()).expect("first");
        std::thread::sleep(Duration::from_millis(20));

        // Insert sweeps the expired entry and succeeds.
        registry.insert(EventId::next(), noop()).expect("second");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_sweep_reports_evictions() {
        let registry = ReplyRegistry::new(8, Duration::from_millis(10));

        registry.insert(EventId::next(), noop()).expect("a");
        registry.insert(EventId::next(), noop()).expect("b");
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(registry.sweep(), 2);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_remove_cancels_without_invoking() {
        let registry = ReplyRegistry::new(4, Duration::from_secs(60));
        let id = EventId::next();

        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);
        registry
            .insert(
                id,
                Box::new(move |_, _| fired_clone.store(true, Ordering::SeqCst)),
            )
            .expect("insert");

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_clear_drops_everything() {
        let registry = ReplyRegistry::new(4, Duration::from_secs(60));
        registry.insert(EventId::next(), noop()).expect("a");
        registry.insert(EventId::next(), noop()).expect("b");

        registry.clear();
        assert_eq!(registry.len(), 0);
    }
}
