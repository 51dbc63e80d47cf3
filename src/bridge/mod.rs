//! The bridge itself: tab lifecycle, code broadcast, event replies,
//! liveness notifications.
//!
//! A [`TabBridge`] owns:
//! - the WebSocket [`Connection`] to the browser-side hub
//! - the bounded reply registry for broadcast events
//! - the per-tab liveness monitor
//!
//! # Example
//!
//! ```no_run
//! use tab_bridge::TabBridge;
//!
//! # async fn example() -> tab_bridge::Result<()> {
//! let pending = TabBridge::builder().bind().await?;
//! // Hand pending.hub_url() to the page hosting the hub script.
//! let bridge = pending.initialize().await?;
//!
//! let tab = bridge.connect(|_| {}, |_| {}).await?;
//! bridge.evaluate_js("window.Store !== undefined", false).await?;
//! bridge.dispose().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Builder pattern for bridge configuration.
pub mod builder;

/// Per-tab liveness monitoring.
mod monitor;

/// Bounded, expiring reply registry.
mod registry;

pub use builder::{BridgeBuilder, PendingBridge};

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{EventId, TabId};
use crate::protocol::{Broadcast, HubCommand, HubEvent, ParsedHubEvent, Request, Response, TabInfo};
use crate::transport::{Connection, ReadyData};

use builder::BridgeConfig;
use monitor::LivenessMonitor;
use registry::ReplyRegistry;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for a bridge.
struct BridgeInner {
    /// WebSocket connection to the hub.
    connection: Connection,
    /// Pending reply handlers for broadcast events.
    registry: ReplyRegistry,
    /// Monitored tabs and their listeners.
    monitor: LivenessMonitor,
    /// Resolved configuration.
    config: BridgeConfig,
    /// Identifier the hub chose for itself.
    hub_id: String,
    /// Interval of the hub's poll timer, in milliseconds.
    poll_interval_ms: u64,
    /// Port the WebSocket server was bound to.
    port: u16,
    /// Set by `dispose`; all operations fail afterwards.
    disposed: AtomicBool,
}

// ============================================================================
// TabBridge
// ============================================================================

/// Handle to an initialized tab bridge.
///
/// Cheap to clone; all clones share the same connection and state.
/// Obtained from [`PendingBridge::initialize`].
#[derive(Clone)]
pub struct TabBridge {
    /// Shared inner state.
    inner: Arc<BridgeInner>,
}

// ============================================================================
// TabBridge - Display
// ============================================================================

impl fmt::Debug for TabBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabBridge")
            .field("hub_id", &self.inner.hub_id)
            .field("port", &self.inner.port)
            .field("disposed", &self.inner.disposed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TabBridge - Constructor
// ============================================================================

impl TabBridge {
    /// Creates a configuration builder for the bridge.
    #[inline]
    #[must_use]
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    /// Creates a bridge over an established hub connection.
    pub(crate) fn new(
        connection: Connection,
        ready: ReadyData,
        config: BridgeConfig,
        port: u16,
    ) -> Self {
        let inner = Arc::new(BridgeInner {
            registry: ReplyRegistry::new(config.registry_capacity, config.reply_ttl),
            monitor: LivenessMonitor::new(),
            connection,
            config,
            hub_id: ready.hub_id,
            poll_interval_ms: ready.poll_interval_ms,
            port,
            disposed: AtomicBool::new(false),
        });

        Self::spawn_event_pump(&inner);

        info!(hub_id = %inner.hub_id, port = inner.port, "Bridge initialized");

        Self { inner }
    }

    /// Routes hub events from the connection into a pump task.
    ///
    /// The pump holds only a weak reference so a dropped bridge does
    /// not keep itself alive; the channel ends when the connection's
    /// event loop terminates.
    fn spawn_event_pump(inner: &Arc<BridgeInner>) {
        let (tx, rx) = mpsc::unbounded_channel();
        inner
            .connection
            .set_event_handler(Box::new(move |event| {
                let _ = tx.send(event);
            }));

        tokio::spawn(Self::run_event_pump(rx, Arc::downgrade(inner)));
    }

    /// Pump task: dispatches child results, poll ticks, handshakes.
    async fn run_event_pump(
        mut rx: mpsc::UnboundedReceiver<HubEvent>,
        inner: Weak<BridgeInner>,
    ) {
        while let Some(event) = rx.recv().await {
            let Some(inner) = inner.upgrade() else { break };

            match event.parse() {
                ParsedHubEvent::ChildResult { id, result, error } => {
                    Self::dispatch_child_result(&inner, id, result, error);
                }

                ParsedHubEvent::PollTick => {
                    Self::handle_poll_tick(&inner).await;
                }

                ParsedHubEvent::TabHandshake { tab_id } => {
                    // Nothing registers for handshakes: connect notifies
                    // optimistically before the child ever says hello.
                    debug!(%tab_id, "Unhandled tab handshake");
                }

                ParsedHubEvent::Unknown { method, .. } => {
                    warn!(%method, "Unknown hub event");
                }
            }
        }

        debug!("Hub event pump terminated");
    }

    /// Hands a child's reply to its registered one-shot handler.
    fn dispatch_child_result(
        inner: &BridgeInner,
        id: Option<EventId>,
        result: Value,
        error: Value,
    ) {
        match id.and_then(|id| inner.registry.take(id)) {
            Some(handler) => handler(result, error),
            None => debug!(?id, "Child result for unknown correlation id"),
        }
    }

    /// One poll tick: sweep expired replies, then re-check liveness of
    /// every monitored tab with a single live-tab query.
    async fn handle_poll_tick(inner: &Arc<BridgeInner>) {
        inner.registry.sweep();

        if inner.monitor.monitored_count() == 0 {
            return;
        }

        match Self::fetch_tabs(inner).await {
            Ok(tabs) => {
                let live: Vec<TabId> = tabs.into_iter().map(|tab| tab.id).collect();
                inner.monitor.observe(&live);
            }
            Err(e) => debug!(error = %e, "Liveness query failed"),
        }
    }

    /// Queries the hub's live-tab list.
    async fn fetch_tabs(inner: &BridgeInner) -> Result<Vec<TabInfo>> {
        let response = inner
            .connection
            .send(
                Request::new(HubCommand::GetAllTabs),
                inner.config.command_timeout,
            )
            .await?;

        let outcome = response.into_result()?;
        match outcome.get("tabs") {
            Some(tabs) => Ok(serde_json::from_value(tabs.clone())?),
            None => Ok(Vec::new()),
        }
    }
}

// ============================================================================
// TabBridge - Accessors
// ============================================================================

impl TabBridge {
    /// Returns the identifier the hub chose for itself.
    #[inline]
    #[must_use]
    pub fn hub_id(&self) -> &str {
        &self.inner.hub_id
    }

    /// Returns the port the WebSocket server is bound to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.port
    }

    /// Returns the hub's liveness poll interval.
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.inner.poll_interval_ms)
    }

    /// Returns the number of broadcast events still awaiting a reply.
    #[inline]
    #[must_use]
    pub fn pending_replies(&self) -> usize {
        self.inner.registry.len()
    }

    /// Returns the number of tabs with a connection listener installed.
    #[inline]
    #[must_use]
    pub fn monitored_tabs(&self) -> usize {
        self.inner.monitor.monitored_count()
    }

    /// Returns `true` once [`dispose`](Self::dispose) has run.
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// TabBridge - Tab Lifecycle
// ============================================================================

impl TabBridge {
    /// Opens one child tab at the configured target URL.
    ///
    /// Both callbacks are invoked with the new tab's id immediately,
    /// *before* any handshake confirmation from the child — optimistic
    /// notification, kept from the original protocol. Each call opens
    /// exactly one tab and returns a distinct id.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub reports the tab could not be opened
    /// (e.g. blocked by the browser), or after [`dispose`](Self::dispose).
    pub async fn connect(
        &self,
        on_connect: impl FnOnce(&TabId),
        on_webpack_ready: impl FnOnce(&TabId),
    ) -> Result<TabId> {
        self.ensure_live()?;

        let command = HubCommand::OpenTab {
            url: self.inner.config.target_url.clone(),
            window_name: self.inner.config.window_name.clone(),
        };

        let outcome = self.send_command(command).await?.into_result()?;
        let tab_id = outcome
            .get("tabId")
            .and_then(|v| v.as_str())
            .map(TabId::new)
            .ok_or_else(|| Error::protocol("Expected tabId in openTab response"))?;

        debug!(%tab_id, "Child tab opened");

        on_connect(&tab_id);
        on_webpack_ready(&tab_id);

        Ok(tab_id)
    }

    /// Lists the hub's currently live child tabs.
    pub async fn tabs(&self) -> Result<Vec<TabInfo>> {
        self.ensure_live()?;
        Self::fetch_tabs(&self.inner).await
    }

    /// Reports whether `tab_id` is in the hub's live-tab list.
    pub async fn is_connected(&self, tab_id: &TabId) -> Result<bool> {
        let tabs = self.tabs().await?;
        Ok(tabs.iter().any(|tab| &tab.id == tab_id))
    }

    /// Closes every tracked child tab and tears the bridge down.
    ///
    /// Terminal: all subsequent operations fail with
    /// [`Error::Disposed`]. Teardown proceeds even if the close command
    /// itself fails; that failure is then returned.
    pub async fn dispose(&self) -> Result<()> {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return Err(Error::Disposed);
        }

        info!(hub_id = %self.inner.hub_id, "Disposing bridge");

        let result = self
            .inner
            .connection
            .send(
                Request::new(HubCommand::CloseAllTabs),
                self.inner.config.command_timeout,
            )
            .await;

        self.inner.monitor.clear();
        self.inner.registry.clear();
        self.inner.connection.shutdown();

        result.map(|_| ())
    }
}

// ============================================================================
// TabBridge - Broadcast Channels
// ============================================================================

impl TabBridge {
    /// Evaluates `code` in every open child tab.
    ///
    /// This is a one-to-many broadcast, not an RPC: the payload carries
    /// no correlation id, so overlapping calls cannot be told apart —
    /// callers must serialize calls to this method.
    ///
    /// With `try_promise` set, the code is wrapped so the child
    /// evaluates it inside an async function and awaits its result.
    ///
    /// On success the child's actual result value is discarded and
    /// `Ok(())` is returned (kept from the original protocol). A child
    /// error fails the call with [`Error::ScriptFailed`], which carries
    /// no detail; the hub's error payload is only logged.
    pub async fn evaluate_js(&self, code: &str, try_promise: bool) -> Result<()> {
        self.ensure_live()?;

        let code_text = if try_promise {
            wrap_async(code)
        } else {
            code.to_string()
        };

        let command = HubCommand::BroadcastAll {
            payload: Broadcast::code(code_text),
            expect_reply: true,
        };

        let outcome = self.send_command(command).await?.into_result()?;

        let error = outcome.get("error").cloned().unwrap_or(Value::Null);
        if is_truthy(&error) {
            warn!(%error, "Child tab reported script error");
            return Err(Error::ScriptFailed);
        }

        trace!(result = ?outcome.get("result"), "Broadcast succeeded; result discarded");
        Ok(())
    }

    /// Broadcasts an event subscription and registers a one-shot reply
    /// handler under a fresh correlation id.
    ///
    /// When a child replies, its result is JSON-encoded before being
    /// handed to `callback` (`{a:1}` arrives as `'{"a":1}'`); an error
    /// reply is not distinguished from success. A child that never
    /// replies does not leak the handler — it is evicted after the
    /// configured reply TTL. Returns the correlation id, which
    /// [`cancel_event`](Self::cancel_event) accepts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistryFull`] when the registry has no free
    /// slot, or the underlying send error (in which case the handler is
    /// unregistered again).
    pub async fn set_event(
        &self,
        event_name: &str,
        callback: impl FnOnce(String) + Send + 'static,
    ) -> Result<EventId> {
        self.ensure_live()?;

        let id = EventId::next();
        self.inner.registry.insert(
            id,
            Box::new(move |result, _error| {
                let encoded =
                    serde_json::to_string(&result).unwrap_or_else(|_| "null".to_string());
                callback(encoded);
            }),
        )?;

        let command = HubCommand::BroadcastAll {
            payload: Broadcast::event(id, event_name),
            expect_reply: false,
        };

        match self.send_command(command).await {
            Ok(_) => {
                debug!(%id, event = %event_name, "Event subscription broadcast");
                Ok(id)
            }
            Err(e) => {
                self.inner.registry.remove(id);
                Err(e)
            }
        }
    }

    /// Drops the pending reply handler for `id` without invoking it.
    ///
    /// Returns `true` if a handler was still registered.
    pub fn cancel_event(&self, id: EventId) -> bool {
        self.inner.registry.remove(id)
    }
}

// ============================================================================
// TabBridge - Liveness Listeners
// ============================================================================

impl TabBridge {
    /// Installs a connection listener for `tab_id`.
    ///
    /// On each hub poll tick the monitor re-checks the tab's liveness
    /// and invokes `callback` with the new state exactly once per
    /// transition; repeated polls with unchanged state do not fire. The
    /// first observation always fires (there is no prior state to
    /// match). Listeners are per-tab: installing one for another tab
    /// does not disturb this one, and re-installing for the same tab
    /// replaces only that tab's callback, keeping its recorded state.
    pub fn set_tab_connection_listener(
        &self,
        tab_id: TabId,
        callback: impl Fn(bool) + Send + Sync + 'static,
    ) -> Result<()> {
        self.ensure_live()?;
        self.inner.monitor.set_listener(tab_id, Box::new(callback));
        Ok(())
    }

    /// Uninstalls the connection listener for `tab_id`, forgetting its
    /// recorded state.
    ///
    /// Returns `true` if a listener was installed.
    pub fn remove_tab_connection_listener(&self, tab_id: &TabId) -> bool {
        self.inner.monitor.remove_listener(tab_id)
    }
}

// ============================================================================
// TabBridge - Internal
// ============================================================================

impl TabBridge {
    /// Sends a command to the hub and waits for the response.
    async fn send_command(&self, command: HubCommand) -> Result<Response> {
        self.inner
            .connection
            .send(Request::new(command), self.inner.config.command_timeout)
            .await
    }

    /// Fails fast after dispose.
    fn ensure_live(&self) -> Result<()> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Wraps code so the child awaits it inside an async function.
fn wrap_async(code: &str) -> String {
    format!("(async function() {{\n  const result = await {code};\n  return result;\n}})()")
}

/// JavaScript truthiness for JSON values.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ============================================================================
// Tests
// ============================================================================
