//! Websocket connection lifecycle.
//!
//! One manager owns at most one live socket. Connect attempts run the
//! REST handshake first, then upgrade to `/ws/{token}`. The manager
//! never reconnects on its own; the host schedules retry attempts
//! while the state reads DISCONNECTED.

use crate::auth::{Authenticator, Credentials};
use crate::connection_state::{AtomicConnectionState, ConnectionState};
use crossbeam_channel::{unbounded, Receiver, Sender};
use escrow_wire::{Envelope, Inbound, Outbound};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::{connect_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, info, warn};

/// What the socket layer reports up to the session runtime.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Handshake and upgrade succeeded.
    Open { generated_username: String },
    /// The socket closed or errored; the state is DISCONNECTED again.
    Closed,
    /// A decoded server message.
    Inbound(Inbound),
    /// An envelope carrying an error field.
    ServerError(String),
    /// The REST handshake or the upgrade failed.
    AuthFailed(String),
}

#[derive(Debug)]
enum SocketCommand {
    Send(String),
    Shutdown,
}

pub struct ConnectionManager {
    authenticator: Authenticator,
    ws_base_url: String,
    state: Arc<AtomicConnectionState>,
    /// Bumped on every connect/disconnect so callbacks from an
    /// abandoned attempt can tell they are stale.
    generation: Arc<AtomicU64>,
    command_tx: Arc<Mutex<Option<UnboundedSender<SocketCommand>>>>,
    event_tx: Sender<ConnectionEvent>,
}

impl ConnectionManager {
    pub fn new(
        authenticator: Authenticator,
        ws_base_url: impl Into<String>,
    ) -> (Self, Receiver<ConnectionEvent>) {
        let (event_tx, event_rx) = unbounded();
        (
            Self {
                authenticator,
                ws_base_url: ws_base_url.into(),
                state: Arc::new(AtomicConnectionState::default()),
                generation: Arc::new(AtomicU64::new(0)),
                command_tx: Arc::new(Mutex::new(None)),
                event_tx,
            },
            event_rx,
        )
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Run the handshake and open the socket. A no-op unless the state
    /// is DISCONNECTED, so overlapping attempts collapse into one.
    pub async fn connect(&self) {
        if !self.state.transition(
            ConnectionState::Disconnected,
            ConnectionState::Authenticating,
        ) {
            debug!("Connect requested while not disconnected, ignoring");
            return;
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let credentials = match self.authenticator.authenticate().await {
            Ok(credentials) => credentials,
            Err(e) => {
                self.fail_attempt(generation, e.to_string());
                return;
            }
        };
        if self.is_stale(generation) {
            debug!("Connection attempt {} superseded during handshake", generation);
            return;
        }

        self.open_socket(generation, credentials).await;
    }

    async fn open_socket(&self, generation: u64, credentials: Credentials) {
        let url = format!("{}/ws/{}", self.ws_base_url, credentials.access_token);
        let ws_stream = match connect_async(&url).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                self.fail_attempt(generation, e.to_string());
                return;
            }
        };
        if self.is_stale(generation) {
            debug!("Connection attempt {} superseded during upgrade", generation);
            return;
        }

        let (command_tx, command_rx) = unbounded_channel();
        *self.command_tx.lock() = Some(command_tx);
        if !self.state.transition(
            ConnectionState::Authenticating,
            ConnectionState::Connected,
        ) {
            *self.command_tx.lock() = None;
            return;
        }

        info!("Connected as {}", credentials.generated_username);
        let _ = self.event_tx.send(ConnectionEvent::Open {
            generated_username: credentials.generated_username,
        });

        let state = Arc::clone(&self.state);
        let generations = Arc::clone(&self.generation);
        let command_slot = Arc::clone(&self.command_tx);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            run_socket(ws_stream, command_rx, &event_tx).await;
            // Only the generation that opened the socket tears it down;
            // an explicit disconnect has already moved the state on.
            if generations.load(Ordering::Acquire) == generation {
                state.set(ConnectionState::Disconnected);
                *command_slot.lock() = None;
                let _ = event_tx.send(ConnectionEvent::Closed);
            }
        });
    }

    fn fail_attempt(&self, generation: u64, reason: String) {
        if self.is_stale(generation) {
            debug!("Stale connection attempt {} failed: {}", generation, reason);
            return;
        }
        warn!("Connection attempt failed: {}", reason);
        self.state.set(ConnectionState::Disconnected);
        let _ = self.event_tx.send(ConnectionEvent::AuthFailed(reason));
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) != generation
            || self.state.get() != ConnectionState::Authenticating
    }

    /// Tear down the socket if one is up and abandon any in-flight
    /// attempt.
    pub fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.state.set(ConnectionState::Disconnected);
        if let Some(tx) = self.command_tx.lock().take() {
            let _ = tx.send(SocketCommand::Shutdown);
        }
    }

    /// Hand a message to the socket task. Dropped with a log line when
    /// not connected; nothing is queued for later.
    pub fn send(&self, message: &Outbound) {
        if !self.state.is_connected() {
            debug!(
                "Dropping outbound {} while not connected",
                message.kind()
            );
            return;
        }
        let sender = self.command_tx.lock().clone();
        match sender {
            Some(tx) => {
                if tx.send(SocketCommand::Send(message.to_frame())).is_err() {
                    warn!("Socket task gone, dropping outbound {}", message.kind());
                }
            }
            None => debug!("No live socket, dropping outbound {}", message.kind()),
        }
    }
}

async fn run_socket<S>(
    ws_stream: WebSocketStream<S>,
    mut command_rx: UnboundedReceiver<SocketCommand>,
    event_tx: &Sender<ConnectionEvent>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = decode_frame(&text) {
                            let _ = event_tx.send(event);
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        info!("Server closed the connection");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        warn!("WebSocket stream ended");
                        break;
                    }
                }
            }

            // `recv` is cancellation safe: a command only leaves the
            // queue when this branch wins the select.
            cmd = command_rx.recv() => {
                match cmd {
                    Some(SocketCommand::Send(frame)) => {
                        if let Err(e) = write.send(Message::Text(frame)).await {
                            warn!("Failed to send frame: {}", e);
                            break;
                        }
                    }
                    Some(SocketCommand::Shutdown) => {
                        debug!("Socket task shutting down");
                        let _ = write.close().await;
                        return;
                    }
                    None => {
                        let _ = write.close().await;
                        return;
                    }
                }
            }
        }
    }
}

/// One text frame to at most one event. Malformed frames and unknown
/// kinds are logged and skipped so a bad message never kills the
/// connection.
fn decode_frame(text: &str) -> Option<ConnectionEvent> {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Discarding malformed frame: {}", e);
            return None;
        }
    };
    if let Some(error) = envelope.error {
        return Some(ConnectionEvent::ServerError(error));
    }
    match Inbound::from_envelope(envelope) {
        Ok(message) => Some(ConnectionEvent::Inbound(message)),
        Err(e) => {
            warn!("Discarding frame: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthApi, AuthError, Result as AuthResult};
    use crate::store::MemoryIdentityStore;
    use async_trait::async_trait;

    struct RefusingApi;

    #[async_trait]
    impl AuthApi for RefusingApi {
        async fn register(&self, _public_key: &str) -> AuthResult<String> {
            Err(AuthError::Rejected {
                stage: "registration",
                status: reqwest::StatusCode::FORBIDDEN,
            })
        }
        async fn challenge(&self, _generated_username: &str) -> AuthResult<String> {
            unreachable!()
        }
        async fn token(
            &self,
            _generated_username: &str,
            _challenge: &str,
            _signature: &str,
        ) -> AuthResult<String> {
            unreachable!()
        }
    }

    fn manager() -> (ConnectionManager, Receiver<ConnectionEvent>) {
        let authenticator = Authenticator::new(
            Arc::new(RefusingApi),
            Arc::new(MemoryIdentityStore::new()),
        );
        ConnectionManager::new(authenticator, "ws://localhost:9")
    }

    #[tokio::test]
    async fn failed_handshake_returns_to_disconnected() {
        let (manager, events) = manager();
        manager.connect().await;

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(matches!(
            events.try_recv(),
            Ok(ConnectionEvent::AuthFailed(_))
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn connect_while_not_disconnected_has_no_effect() {
        let (manager, events) = manager();

        manager.state.set(ConnectionState::Authenticating);
        manager.connect().await;
        assert_eq!(manager.state(), ConnectionState::Authenticating);
        assert!(events.try_recv().is_err());

        manager.state.set(ConnectionState::Connected);
        manager.connect().await;
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(events.try_recv().is_err());
    }

    // A burst of queued writes must all reach the wire even while the
    // server keeps the read side busy; commands are never dropped on a
    // live socket.
    #[tokio::test]
    async fn queued_commands_survive_inbound_traffic() {
        use std::time::Duration;
        use tokio_tungstenite::tungstenite::protocol::Role;

        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;

        let (event_tx, _event_rx) = unbounded();
        let (command_tx, command_rx) = unbounded_channel();
        let socket = tokio::spawn(async move {
            run_socket(client, command_rx, &event_tx).await;
        });

        let (mut server_write, mut server_read) = server.split();
        let flood = tokio::spawn(async move {
            let frame = r#"{"type":"ORDER_DELETED","payload":{"order_id":"o-1"}}"#;
            for _ in 0..2000 {
                if server_write
                    .send(Message::Text(frame.to_string()))
                    .await
                    .is_err()
                {
                    break;
                }
                tokio::task::yield_now().await;
            }
        });
        // The read half is handed back so the duplex stays open until
        // after the shutdown below; dropping it early would end the
        // client's stream and tear the socket task down on its own.
        let received = tokio::spawn(async move {
            let mut count = 0usize;
            while let Some(Ok(frame)) = server_read.next().await {
                if matches!(frame, Message::Text(_)) {
                    count += 1;
                }
                if count == 200 {
                    break;
                }
            }
            (count, server_read)
        });

        for n in 0..200 {
            command_tx
                .send(SocketCommand::Send(format!("{{\"n\":{n}}}")))
                .unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let (count, server_read) = tokio::time::timeout(Duration::from_secs(10), received)
            .await
            .expect("server should receive every queued frame")
            .unwrap();
        assert_eq!(count, 200);

        command_tx.send(SocketCommand::Shutdown).unwrap();
        tokio::time::timeout(Duration::from_secs(5), socket)
            .await
            .expect("socket task should exit on shutdown")
            .unwrap();
        flood.abort();
        drop(server_read);
    }

    #[tokio::test]
    async fn sends_while_disconnected_are_dropped() {
        let (manager, events) = manager();
        manager.send(&Outbound::CancelOrder {
            order_id: "o-1".into(),
        });
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_while_idle_is_harmless() {
        let (manager, _events) = manager();
        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn server_error_envelope_becomes_event() {
        let event = decode_frame(r#"{"type":"ORDER_DELETED","error":"nope"}"#);
        assert!(matches!(event, Some(ConnectionEvent::ServerError(e)) if e == "nope"));
    }

    #[test]
    fn unknown_kind_is_skipped() {
        assert!(decode_frame(r#"{"type":"MYSTERY","payload":{}}"#).is_none());
        assert!(decode_frame("not json at all").is_none());
    }

    #[test]
    fn known_frame_decodes_to_inbound() {
        let event = decode_frame(
            r#"{"type":"ORDER_DELETED","payload":{"order_id":"o-9"}}"#,
        );
        assert!(matches!(
            event,
            Some(ConnectionEvent::Inbound(Inbound::OrderDeleted(d))) if d.order_id == "o-9"
        ));
    }
}
