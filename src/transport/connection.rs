//! WebSocket connection and event loop.
//!
//! This module handles the WebSocket connection to the hub, including
//! request/response correlation and hub event routing.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming messages from the hub (responses, events)
//! - Outgoing requests from the bridge API
//! - Request/response correlation by UUID
//! - Hub event handler callbacks

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{from_str, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{HubEvent, Request, Response};

// ============================================================================
// Constants
// ============================================================================

/// Maximum pending wire requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 64;

// ============================================================================
// Types
// ============================================================================

/// Map of request IDs to response channels.
type CorrelationMap = FxHashMap<RequestId, oneshot::Sender<Result<Response>>>;

/// Hub event handler callback type.
///
/// Called for each event received from the hub. Hub events never expect
/// a reply, so the handler returns nothing.
pub type HubEventHandler = Box<dyn Fn(HubEvent) + Send + Sync>;

// ============================================================================
// ReadyData
// ============================================================================

/// Data received in the READY handshake message.
///
/// The hub sends this immediately after connecting, as a response with
/// the reserved nil request id.
#[derive(Debug, Clone)]
pub struct ReadyData {
    /// Identifier the hub chose for itself.
    pub hub_id: String,
    /// Interval of the hub's liveness poll timer, in milliseconds.
    pub poll_interval_ms: u64,
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a request and wait for response.
    Send {
        request: Request,
        response_tx: oneshot::Sender<Result<Response>>,
    },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(RequestId),
    /// Shutdown the connection.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to the hub.
///
/// Handles request/response correlation and hub event routing. The
/// connection spawns an internal event loop task.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks.
/// All operations are non-blocking.
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Hub event handler (shared with event loop).
    event_handler: Arc<Mutex<Option<HubEventHandler>>>,
    /// Receiver for the READY handshake, consumed by `wait_ready`.
    ready_rx: Arc<Mutex<Option<oneshot::Receiver<Result<Response>>>>>,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            correlation: Arc::clone(&self.correlation),
            event_handler: Arc::clone(&self.event_handler),
            ready_rx: Arc::clone(&self.ready_rx),
        }
    }
}

impl Connection {
    /// Creates a new connection from a WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    pub(crate) fn new(ws_stream: WebSocketStream<TcpStream>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let event_handler: Arc<Mutex<Option<HubEventHandler>>> = Arc::new(Mutex::new(None));

        // Register the READY correlation before the event loop can read
        // anything, so a hub that greets immediately is never dropped.
        let (ready_tx, ready_rx) = oneshot::channel();
        correlation.lock().insert(RequestId::ready(), ready_tx);

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            Arc::clone(&event_handler),
        ));

        Self {
            command_tx,
            correlation,
            event_handler,
            ready_rx: Arc::new(Mutex::new(Some(ready_rx))),
        }
    }

    /// Waits for the READY handshake message.
    ///
    /// Must be called after the connection is established. The hub sends
    /// READY with the nil request id immediately after connecting.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if READY is not received in time
    /// - [`Error::ConnectionClosed`] if connection closes before READY
    /// - [`Error::Protocol`] if READY was already consumed
    pub async fn wait_ready(&self, ready_timeout: Duration) -> Result<ReadyData> {
        let rx = self
            .ready_rx
            .lock()
            .take()
            .ok_or_else(|| Error::protocol("READY handshake already consumed"))?;

        let response = timeout(ready_timeout, rx)
            .await
            .map_err(|_| Error::connection_timeout(ready_timeout.as_millis() as u64))??;

        let response = response?;

        let hub_id = response.get_string("hubId");
        let poll_interval_ms = response.get_u64("pollIntervalMs");

        debug!(%hub_id, poll_interval_ms, "READY handshake completed");

        Ok(ReadyData {
            hub_id,
            poll_interval_ms,
        })
    }

    /// Sets the hub event handler callback.
    ///
    /// The handler is called for each event received from the hub.
    pub fn set_event_handler(&self, handler: HubEventHandler) {
        let mut guard = self.event_handler.lock();
        *guard = Some(handler);
    }

    /// Clears the hub event handler.
    pub fn clear_event_handler(&self) {
        let mut guard = self.event_handler.lock();
        *guard = None;
    }

    /// Sends a request and waits for the response.
    ///
    /// # Arguments
    ///
    /// * `request` - The request to send
    /// * `request_timeout` - Maximum time to wait for the response
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::RequestTimeout`] if no response arrives within timeout
    /// - [`Error::Protocol`] if too many requests are pending
    pub async fn send(&self, request: Request, request_timeout: Duration) -> Result<Response> {
        let request_id = request.id;

        {
            let correlation = self.correlation.lock();
            if correlation.len() >= MAX_PENDING_REQUESTS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_REQUESTS,
                    "Too many pending requests"
                );
                return Err(Error::protocol(format!(
                    "Too many pending requests: {}/{}",
                    correlation.len(),
                    MAX_PENDING_REQUESTS
                )));
            }
        }

        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Send {
                request,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(request_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // Timeout - clean up correlation entry
                let _ = self
                    .command_tx
                    .send(ConnectionCommand::RemoveCorrelation(request_id));

                Err(Error::request_timeout(
                    request_id,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Returns the number of pending wire requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Shuts down the connection gracefully.
    ///
    /// Pending requests are failed with [`Error::ConnectionClosed`].
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: WebSocketStream<TcpStream>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        event_handler: Arc<Mutex<Option<HubEventHandler>>>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming messages from the hub
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, &correlation, &event_handler);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by hub");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the bridge API
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { request, response_tx }) => {
                            Self::handle_send_command(
                                request,
                                response_tx,
                                &mut ws_write,
                                &correlation,
                            ).await;
                        }

                        Some(ConnectionCommand::RemoveCorrelation(request_id)) => {
                            correlation.lock().remove(&request_id);
                            debug!(?request_id, "Removed timed-out correlation");
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        // Fail all pending requests on shutdown
        Self::fail_pending_requests(&correlation);

        // Drop the handler so anything pumping hub events observes the end
        event_handler.lock().take();

        debug!("Event loop terminated");
    }

    /// Handles an incoming text message from the hub.
    fn handle_incoming_message(
        text: &str,
        correlation: &Arc<Mutex<CorrelationMap>>,
        event_handler: &Arc<Mutex<Option<HubEventHandler>>>,
    ) {
        // Try to parse as Response first
        if let Ok(response) = from_str::<Response>(text) {
            let tx = correlation.lock().remove(&response.id);

            if let Some(tx) = tx {
                let _ = tx.send(Ok(response));
            } else {
                warn!(id = %response.id, "Response for unknown request");
            }

            return;
        }

        // Try to parse as HubEvent
        if let Ok(event) = from_str::<HubEvent>(text) {
            let handler = event_handler.lock();
            if let Some(ref handler) = *handler {
                handler(event);
            } else {
                trace!(method = %event.method, "Hub event with no handler installed");
            }
            return;
        }

        warn!(text = %text, "Failed to parse incoming message");
    }

    /// Handles a send command from the bridge API.
    async fn handle_send_command(
        request: Request,
        response_tx: oneshot::Sender<Result<Response>>,
        ws_write: &mut futures_util::stream::SplitSink<WebSocketStream<TcpStream>, Message>,
        correlation: &Arc<Mutex<CorrelationMap>>,
    ) {
        let request_id = request.id;

        let json = match to_string(&request) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        // Store correlation before sending
        correlation.lock().insert(request_id, response_tx);

        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
            // Remove correlation and notify caller
            if let Some(tx) = correlation.lock().remove(&request_id) {
                let _ = tx.send(Err(Error::connection(e.to_string())));
            }
        }

        trace!(?request_id, "Request sent");
    }

    /// Fails all pending requests with ConnectionClosed error.
    fn fail_pending_requests(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on shutdown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr};

    use futures_util::StreamExt;
    use tokio_tungstenite::connect_async;

    use crate::protocol::HubCommand;
    use crate::transport::PendingServer;

    /// Binds a server, connects a raw client, completes READY, and
    /// returns both ends.
    async fn connected_pair() -> (
        Connection,
        ReadyData,
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) {
        let server = PendingServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
            .await
            .expect("bind");
        let url = server.hub_url();

        let client = tokio::spawn(async move {
            let (mut ws, _) = connect_async(&url).await.expect("client connect");
            let ready = r#"{
                "id": "00000000-0000-0000-0000-000000000000",
                "type": "success",
                "result": {"hubId": "hub-test", "pollIntervalMs": 500}
            }"#;
            ws.send(Message::Text(ready.to_string().into()))
                .await
                .expect("send ready");
            ws
        });

        let (connection, ready) = server
            .accept(Duration::from_secs(5))
            .await
            .expect("accept");
        let ws = client.await.expect("client task");

        (connection, ready, ws)
    }

    #[tokio::test]
    async fn test_ready_handshake() {
        let (_connection, ready, _ws) = connected_pair().await;
        assert_eq!(ready.hub_id, "hub-test");
        assert_eq!(ready.poll_interval_ms, 500);
    }

    #[tokio::test]
    async fn test_request_response_correlation() {
        let (connection, _ready, mut ws) = connected_pair().await;

        let echo = tokio::spawn(async move {
            let msg = ws.next().await.expect("message").expect("text");
            let request: serde_json::Value =
                serde_json::from_str(msg.to_text().expect("text")).expect("json");
            assert_eq!(request["method"], "hub.getAllTabs");

            let response = serde_json::json!({
                "id": request["id"],
                "type": "success",
                "result": {"tabs": []}
            });
            ws.send(Message::Text(response.to_string().into()))
                .await
                .expect("send response");
        });

        let response = connection
            .send(Request::new(HubCommand::GetAllTabs), Duration::from_secs(5))
            .await
            .expect("response");

        assert!(response.is_success());
        assert_eq!(connection.pending_count(), 0);
        echo.await.expect("echo task");
    }

    #[tokio::test]
    async fn test_shutdown_fails_pending_requests() {
        let (connection, _ready, _ws) = connected_pair().await;

        let pending = {
            let connection = connection.clone();
            tokio::spawn(async move {
                connection
                    .send(Request::new(HubCommand::GetAllTabs), Duration::from_secs(30))
                    .await
            })
        };

        // Let the request reach the event loop before shutting down.
        tokio::time::sleep(Duration::from_millis(50)).await;
        connection.shutdown();

        let result = pending.await.expect("task");
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_send_timeout_cleans_correlation() {
        let (connection, _ready, _ws) = connected_pair().await;

        let result = connection
            .send(
                Request::new(HubCommand::GetAllTabs),
                Duration::from_millis(50),
            )
            .await;

        assert!(matches!(result, Err(Error::RequestTimeout { .. })));

        // The cleanup command races the assertion; give the loop a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(connection.pending_count(), 0);
    }
}
