//! Per-tab liveness monitoring with transition deduplication.
//!
//! Each monitored tab owns its own listener; one hub poll tick drives a
//! single live-tab query whose result is compared against every tab's
//! last recorded state. A listener fires only when its tab's
//! connectedness changes — and on the first observation, which has no
//! prior state to match.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::identifiers::TabId;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked with the tab's new connectedness on each transition.
pub(crate) type ConnectionListener = Box<dyn Fn(bool) + Send + Sync>;

/// A monitored tab: its listener and last observed state.
struct TabWatch {
    listener: ConnectionListener,
    /// `None` until the first poll observation.
    last_state: Option<bool>,
}

// ============================================================================
// LivenessMonitor
// ============================================================================

/// Map of monitored tabs, keyed by tab id.
pub(crate) struct LivenessMonitor {
    watches: Mutex<FxHashMap<TabId, TabWatch>>,
}

impl LivenessMonitor {
    /// Creates an empty monitor.
    pub(crate) fn new() -> Self {
        Self {
            watches: Mutex::new(FxHashMap::default()),
        }
    }

    /// Installs `listener` for `tab_id`, replacing any prior listener
    /// for that tab only.
    ///
    /// The tab's recorded state survives replacement, so swapping
    /// listeners mid-session does not re-fire an unchanged state.
    pub(crate) fn set_listener(&self, tab_id: TabId, listener: ConnectionListener) {
        let mut watches = self.watches.lock();
        match watches.get_mut(&tab_id) {
            Some(watch) => watch.listener = listener,
            None => {
                watches.insert(
                    tab_id,
                    TabWatch {
                        listener,
                        last_state: None,
                    },
                );
            }
        }
    }

    /// Uninstalls the listener for `tab_id` and forgets its state.
    ///
    /// Returns `true` if a listener was installed.
    pub(crate) fn remove_listener(&self, tab_id: &TabId) -> bool {
        self.watches.lock().remove(tab_id).is_some()
    }

    /// Feeds one poll observation: `live` is the current live-tab set.
    ///
    /// Fires each monitored tab's listener whose connectedness differs
    /// from its last recorded value, then records the new value.
    pub(crate) fn observe(&self, live: &[TabId]) {
        let mut watches = self.watches.lock();
        for (tab_id, watch) in watches.iter_mut() {
            let state = live.contains(tab_id);
            if watch.last_state != Some(state) {
                debug!(%tab_id, state, "Tab connection state changed");
                (watch.listener)(state);
                watch.last_state = Some(state);
            }
        }
    }

    /// Number of monitored tabs.
    pub(crate) fn monitored_count(&self) -> usize {
        self.watches.lock().len()
    }

    /// Uninstalls every listener.
    pub(crate) fn clear(&self) {
        self.watches.lock().clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use proptest::prelude::*;

    /// Installs a listener that records every invocation.
    fn recording_listener(monitor: &LivenessMonitor, tab: &TabId) -> Arc<Mutex<Vec<bool>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        monitor.set_listener(
            tab.clone(),
            Box::new(move |state| seen_clone.lock().push(state)),
        );
        seen
    }

    #[test]
    fn test_first_observation_fires() {
        let monitor = LivenessMonitor::new();
        let tab = TabId::new("t1");
        let seen = recording_listener(&monitor, &tab);

        monitor.observe(&[tab.clone()]);
        assert_eq!(*seen.lock(), vec![true]);
    }

    #[test]
    fn test_unchanged_state_does_not_refire() {
        let monitor = LivenessMonitor::new();
        let tab = TabId::new("t1");
        let seen = recording_listener(&monitor, &tab);

        monitor.observe(&[tab.clone()]);
        monitor.observe(&[tab.clone()]);
        monitor.observe(&[tab.clone()]);
        assert_eq!(*seen.lock(), vec![true]);
    }

    #[test]
    fn test_poll_sequence_true_true_false_true() {
        let monitor = LivenessMonitor::new();
        let tab = TabId::new("t1");
        let seen = recording_listener(&monitor, &tab);

        monitor.observe(&[tab.clone()]);
        monitor.observe(&[tab.clone()]);
        monitor.observe(&[]);
        monitor.observe(&[tab.clone()]);

        // The initial observation fires, then each transition.
        assert_eq!(*seen.lock(), vec![true, false, true]);
    }

    #[test]
    fn test_tabs_are_monitored_independently() {
        let monitor = LivenessMonitor::new();
        let t1 = TabId::new("t1");
        let t2 = TabId::new("t2");
        let seen1 = recording_listener(&monitor, &t1);
        let seen2 = recording_listener(&monitor, &t2);

        monitor.observe(&[t1.clone(), t2.clone()]);
        monitor.observe(&[t2.clone()]);

        assert_eq!(*seen1.lock(), vec![true, false]);
        assert_eq!(*seen2.lock(), vec![true]);

        // Removing one tab's listener leaves the other untouched.
        assert!(monitor.remove_listener(&t1));
        monitor.observe(&[]);
        assert_eq!(*seen2.lock(), vec![true, false]);
    }

    #[test]
    fn test_replacing_listener_keeps_recorded_state() {
        let monitor = LivenessMonitor::new();
        let tab = TabId::new("t1");
        let first = recording_listener(&monitor, &tab);

        monitor.observe(&[tab.clone()]);
        assert_eq!(*first.lock(), vec![true]);

        // Replace the listener; the tab is still live, so nothing fires.
        let second = recording_listener(&monitor, &tab);
        monitor.observe(&[tab.clone()]);
        assert!(second.lock().is_empty());

        monitor.observe(&[]);
        assert_eq!(*second.lock(), vec![false]);
    }

    #[test]
    fn test_remove_listener_forgets_state() {
        let monitor = LivenessMonitor::new();
        let tab = TabId::new("t1");
        let _ = recording_listener(&monitor, &tab);

        monitor.observe(&[tab.clone()]);
        assert!(monitor.remove_listener(&tab));

        // Re-installing starts fresh: the first observation fires again.
        let seen = recording_listener(&monitor, &tab);
        monitor.observe(&[tab.clone()]);
        assert_eq!(*seen.lock(), vec![true]);
    }

    proptest! {
        /// For any poll sequence, the listener sees exactly the sequence
        /// with consecutive duplicates collapsed.
        #[test]
        fn prop_listener_fires_once_per_transition(polls in proptest::collection::vec(any::<bool>(), 0..20)) {
            let monitor = LivenessMonitor::new();
            let tab = TabId::new("t1");
            let seen = recording_listener(&monitor, &tab);

            for &connected in &polls {
                if connected {
                    monitor.observe(&[tab.clone()]);
                } else {
                    monitor.observe(&[]);
                }
            }

            let mut expected = Vec::new();
            for &state in &polls {
                if expected.last() != Some(&state) {
                    expected.push(state);
                }
            }

            prop_assert_eq!(&*seen.lock(), &expected);
        }
    }
}
