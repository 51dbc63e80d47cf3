//! Tab Bridge - cross-tab messaging bridge for driving a web client.
//!
//! This library drives a browser-side cross-tab hub from a host
//! process: it opens child tabs pointed at a web messaging client,
//! broadcasts code and event subscriptions to them, and watches their
//! liveness.
//!
//! # Architecture
//!
//! The bridge follows a local/remote split:
//!
//! - **Local End (Rust)**: binds a WebSocket server, sends commands,
//!   receives responses and hub events
//! - **Remote End (Hub)**: the browser-side cross-tab controller page;
//!   it dials in, opens/closes tabs, and relays broadcasts to children
//!
//! Key design principles:
//!
//! - One [`TabBridge`] owns: connection + reply registry + liveness monitor
//! - Protocol uses `module.methodName` format over JSON
//! - Initialization is explicit and awaitable (bind, then READY handshake)
//! - Reply handlers are bounded and TTL-evicted, never leaked
//! - Correlation ids are monotonic, never random
//!
//! # Quick Start
//!
//! ```no_run
//! use tab_bridge::{Result, TabBridge};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Bind the server and hand the URL to the hub page
//!     let pending = TabBridge::builder().bind().await?;
//!     println!("hub url: {}", pending.hub_url());
//!
//!     // Completes when the hub connects and handshakes
//!     let bridge = pending.initialize().await?;
//!
//!     // Open a child tab and run code in it
//!     let tab = bridge.connect(|_| {}, |_| {}).await?;
//!     bridge.evaluate_js("window.Store !== undefined", false).await?;
//!
//!     bridge.set_tab_connection_listener(tab, |connected| {
//!         println!("tab connected: {connected}");
//!     })?;
//!
//!     bridge.dispose().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | The [`TabBridge`], its builder, registry and monitor |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire message types (internal) |
//! | [`transport`] | WebSocket transport layer (internal) |

// ============================================================================
// Modules
// ============================================================================

/// The bridge core: tab lifecycle, broadcasts, liveness listeners.
///
/// Use [`TabBridge::builder()`] to configure and initialize a bridge.
pub mod bridge;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for bridge entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire protocol message types.
///
/// Internal module defining command/response/event structures.
pub mod protocol;

/// WebSocket transport layer.
///
/// Internal module handling the server and connection event loop.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Bridge types
pub use bridge::{BridgeBuilder, PendingBridge, TabBridge};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{EventId, RequestId, TabId};

// Protocol types
pub use protocol::{Broadcast, TabInfo};
