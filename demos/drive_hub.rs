//! End-to-end bridge walkthrough.
//!
//! Demonstrates:
//! - Binding the bridge and waiting for the hub to connect
//! - Opening a child tab with optimistic notification
//! - Broadcasting code to child tabs
//! - Subscribing to an event with a one-shot reply handler
//! - Watching a tab's connection state
//!
//! The hub side is the browser page hosting the cross-tab controller;
//! point it at the URL this demo prints.
//!
//! Usage:
//!   cargo run --example drive_hub

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tab_bridge::{Result, TabBridge};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tab_bridge=debug")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    println!("=== drive_hub ===\n");

    // ========================================================================
    // Setup
    // ========================================================================

    println!("[Setup] Binding bridge...");

    let pending = TabBridge::builder()
        .registry_capacity(32)
        .reply_ttl(Duration::from_secs(60))
        .bind()
        .await?;

    println!("        ✓ Bound on port {}", pending.port());
    println!("        → Load the hub page pointed at {}\n", pending.hub_url());

    println!("[Setup] Waiting for hub handshake...");
    let bridge = pending.initialize().await?;
    println!("        ✓ Hub connected (id={})\n", bridge.hub_id());

    // ========================================================================
    // Open a child tab
    // ========================================================================

    println!("[1] Opening child tab");
    let tab = bridge
        .connect(
            |id| println!("    onConnect fired for {id}"),
            |id| println!("    onWebpackReady fired for {id}"),
        )
        .await?;
    println!("    Tab id: {tab}");
    println!("    ✓ Opened\n");

    // ========================================================================
    // Broadcast code
    // ========================================================================

    println!("[2] Broadcasting code to all child tabs");
    bridge.evaluate_js("document.title", false).await?;
    println!("    ✓ Evaluated (result discarded by protocol)\n");

    println!("[3] Broadcasting awaited code");
    bridge
        .evaluate_js("new Promise(r => setTimeout(() => r('done'), 100))", true)
        .await?;
    println!("    ✓ Awaited\n");

    // ========================================================================
    // Event subscription
    // ========================================================================

    println!("[4] Subscribing to an event");
    let event_id = bridge
        .set_event("client.ready", |encoded| {
            println!("    Event reply (JSON): {encoded}");
        })
        .await?;
    println!("    Subscribed with correlation id {event_id}");
    println!("    ✓ Pending replies: {}\n", bridge.pending_replies());

    // ========================================================================
    // Connection listener
    // ========================================================================

    println!("[5] Watching tab connection state");
    bridge.set_tab_connection_listener(tab.clone(), |connected| {
        println!("    Tab connection changed: {connected}");
    })?;
    println!("    ✓ Listener installed for {tab}");

    println!("\n    (driving for 30s; close the child tab to see a transition)");
    tokio::time::sleep(Duration::from_secs(30)).await;

    // ========================================================================
    // Done
    // ========================================================================

    println!("\n[Cleanup] Disposing bridge...");
    bridge.dispose().await?;
    println!("          ✓ Done");

    Ok(())
}
