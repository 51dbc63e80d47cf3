//! WebSocket transport layer.
//!
//! The bridge is the local end; the browser-side hub is the remote end
//! and dials in. This module provides:
//!
//! - [`PendingServer`] - bound server awaiting the hub's connection
//! - [`Connection`] - established connection with its event loop

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// WebSocket server the hub connects to.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, HubEventHandler, ReadyData};
pub use server::PendingServer;
