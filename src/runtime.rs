//! Wires the session, the connection and the host together.
//!
//! All mutation funnels through one consumer thread draining the
//! connection event channel; timers and user calls never touch the
//! session without going through its lock. Two tokio tasks drive the
//! periodic work: reconnection attempts while disconnected and
//! location reports while a trade is active.

use crossbeam_channel::Receiver;
use escrow_client::{
    AuthClient, Authenticator, ConnectionEvent, ConnectionManager, IdentityStore,
};
use escrow_core::session::{ActiveTrade, OutboundSink};
use escrow_core::verifier::OfferSnapshot;
use escrow_core::{CommandError, Session, SessionConfig, TradeStatus};
use escrow_wire::{Coordinate, Notification, NotificationDirection, Outbound, TradeOrder};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the embedding environment supplies: who the local player is
/// and where they are standing.
pub trait HostAdapter: Send + Sync {
    fn local_name(&self) -> Option<String>;
    fn current_location(&self) -> Option<Coordinate>;
}

/// [`OutboundSink`] backed by the live connection.
struct ConnectionSink {
    connection: Arc<ConnectionManager>,
}

impl OutboundSink for ConnectionSink {
    fn send(&self, message: Outbound) {
        self.connection.send(&message);
    }
}

pub struct Runtime {
    config: SessionConfig,
    connection: Arc<ConnectionManager>,
    session: Arc<RwLock<Session>>,
    shutdown: Arc<AtomicBool>,
    consumer: Option<std::thread::JoinHandle<()>>,
}

impl Runtime {
    /// Build the whole stack and start the event pump and timers.
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: SessionConfig,
        host: Arc<dyn HostAdapter>,
        store: Arc<dyn IdentityStore>,
    ) -> Self {
        let api = Arc::new(AuthClient::new(config.server.base_url.clone()));
        let authenticator = Authenticator::new(api, store);
        let (connection, event_rx) =
            ConnectionManager::new(authenticator, config.server.ws_base_url.clone());
        let connection = Arc::new(connection);

        let session = Arc::new(RwLock::new(Session::new(
            &config,
            Arc::new(ConnectionSink {
                connection: Arc::clone(&connection),
            }),
        )));

        let shutdown = Arc::new(AtomicBool::new(false));
        let consumer = spawn_consumer(
            event_rx,
            Arc::clone(&session),
            Arc::clone(&connection),
            Arc::clone(&host),
            Arc::clone(&shutdown),
        );
        spawn_reconnect_timer(
            Arc::clone(&connection),
            Arc::clone(&shutdown),
            Duration::from_secs(config.timers.reconnect_secs),
        );
        spawn_location_timer(
            Arc::clone(&connection),
            Arc::clone(&session),
            host,
            Arc::clone(&shutdown),
            Duration::from_secs(config.timers.location_secs),
        );

        Self {
            config,
            connection,
            session,
            shutdown,
            consumer: Some(consumer),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Stop the timers, drop the socket and join the consumer thread.
    pub fn shutdown(&mut self) {
        info!("Shutting down session runtime");
        self.shutdown.store(true, Ordering::Release);
        self.connection.disconnect();
        self.session.write().reset();
        if let Some(handle) = self.consumer.take() {
            let _ = handle.join();
        }
    }

    // ------------------------------------------------------------------
    // User intents
    // ------------------------------------------------------------------

    fn require_connected(&self) -> Result<(), CommandError> {
        if self.connection.is_connected() {
            Ok(())
        } else {
            Err(CommandError::NotConnected)
        }
    }

    pub fn submit_order(
        &self,
        item_id: i32,
        item_name: String,
        quantity: i32,
        price_per_item: i64,
        order_type: escrow_wire::OrderType,
    ) -> Result<(), CommandError> {
        self.require_connected()?;
        self.session
            .write()
            .submit_order(item_id, item_name, quantity, price_per_item, order_type)
    }

    pub fn modify_order(
        &self,
        order_id: &str,
        quantity: i32,
        price_per_item: i64,
    ) -> Result<(), CommandError> {
        self.require_connected()?;
        self.session
            .write()
            .modify_order(order_id, quantity, price_per_item)
    }

    pub fn cancel_order(&self, order_id: &str) -> Result<(), CommandError> {
        self.require_connected()?;
        self.session.write().cancel_order(order_id)
    }

    pub fn initiate_trade(&self, order_id: &str) -> Result<Notification, CommandError> {
        self.require_connected()?;
        self.session
            .write()
            .initiate_trade(order_id, std::time::Instant::now())
    }

    pub fn accept_trade(&self, notification_id: &str) -> Result<(), CommandError> {
        self.require_connected()?;
        self.session.write().accept_trade(notification_id)
    }

    pub fn cancel_accepted_trade(&self, notification_id: &str) -> Result<(), CommandError> {
        self.require_connected()?;
        self.session.write().cancel_accepted_trade(notification_id)
    }

    pub fn force_complete_trade(&self, notification_id: &str) -> Result<(), CommandError> {
        self.require_connected()?;
        self.session.write().force_complete_trade(notification_id)
    }

    pub fn clear_notifications(&self, direction: Option<NotificationDirection>) {
        self.session.write().clear_notifications(direction);
    }

    pub fn add_to_ignore_list(&self, handle: &str) -> Result<(), CommandError> {
        self.require_connected()?;
        self.session.write().add_to_ignore_list(handle)
    }

    pub fn remove_from_ignore_list(&self, handle: &str) -> Result<(), CommandError> {
        self.require_connected()?;
        self.session.write().remove_from_ignore_list(handle);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Host observations
    // ------------------------------------------------------------------

    pub fn observe_offers(&self, my_offer: OfferSnapshot, their_offer: OfferSnapshot) {
        self.session.write().observe_offers(my_offer, their_offer);
    }

    pub fn observe_confirmation(&self) {
        self.session.write().observe_confirmation();
    }

    pub fn window_unobservable(&self) {
        self.session.write().window_unobservable();
    }

    /// The in-game trade finished in the host environment.
    pub fn trade_completed(&self, order_id: &str) {
        self.session.write().complete_trade(order_id);
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn orders(&self) -> Vec<TradeOrder> {
        self.session.read().orders()
    }

    pub fn my_orders(&self) -> Vec<TradeOrder> {
        self.session.read().my_orders()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.session.read().notifications()
    }

    /// Item ids the local party currently has listed, for external
    /// highlighting.
    pub fn listed_item_ids(&self) -> std::collections::HashSet<i32> {
        self.session.read().listed_item_ids()
    }

    pub fn trade_status(&self) -> TradeStatus {
        self.session.read().trade_status()
    }

    pub fn active_trade(&self) -> Option<ActiveTrade> {
        self.session.read().active_trade().cloned()
    }

    pub fn is_online(&self, handle: &str) -> bool {
        self.session.read().is_online(handle)
    }

    pub fn counterpart_location(&self) -> Option<Coordinate> {
        self.session.read().counterpart_location()
    }

    pub fn take_notices(&self) -> Vec<String> {
        self.session.write().take_notices()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if self.consumer.is_some() {
            self.shutdown();
        }
    }
}

/// Apply one connection event to the session. Split out of the
/// consumer loop so it can be exercised directly.
fn apply_event(
    event: ConnectionEvent,
    session: &RwLock<Session>,
    connection: &ConnectionManager,
    host: &dyn HostAdapter,
) {
    match event {
        ConnectionEvent::Open { generated_username } => {
            let local_name = host
                .local_name()
                .unwrap_or_else(|| generated_username.clone());
            connection.send(&Outbound::SetRsn {
                rsn: local_name.clone(),
            });
            session.write().on_connected(generated_username, local_name);
        }
        ConnectionEvent::Closed => session.write().on_disconnected(),
        ConnectionEvent::Inbound(message) => session.write().handle_inbound(message),
        ConnectionEvent::ServerError(error) => session.write().on_server_error(error),
        ConnectionEvent::AuthFailed(reason) => {
            warn!("Authentication failed, will retry: {}", reason);
        }
    }
}

fn spawn_consumer(
    event_rx: Receiver<ConnectionEvent>,
    session: Arc<RwLock<Session>>,
    connection: Arc<ConnectionManager>,
    host: Arc<dyn HostAdapter>,
    shutdown: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while !shutdown.load(Ordering::Acquire) {
            match event_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(event) => apply_event(event, &session, &connection, host.as_ref()),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    debug!("Event channel closed, consumer exiting");
                    break;
                }
            }
        }
    })
}

fn spawn_reconnect_timer(
    connection: Arc<ConnectionManager>,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
) {
    tokio::spawn(async move {
        // First attempt right away, then on the interval.
        loop {
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            if connection.state() == escrow_client::ConnectionState::Disconnected {
                connection.connect().await;
            }
            tokio::time::sleep(interval).await;
        }
    });
}

fn spawn_location_timer(
    connection: Arc<ConnectionManager>,
    session: Arc<RwLock<Session>>,
    host: Arc<dyn HostAdapter>,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
) {
    tokio::spawn(async move {
        loop {
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            // Only reported while a trade is active.
            if connection.is_connected() && session.read().active_trade().is_some() {
                if let Some(position) = host.current_location() {
                    connection.send(&Outbound::UpdateMyLocation(position));
                }
            }
            tokio::time::sleep(interval).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_client::MemoryIdentityStore;
    use escrow_wire::{Inbound, OrderDeleted, OrderType};

    struct StaticHost;

    impl HostAdapter for StaticHost {
        fn local_name(&self) -> Option<String> {
            Some("Alice".into())
        }
        fn current_location(&self) -> Option<Coordinate> {
            Some(Coordinate { x: 1, y: 2, plane: 0 })
        }
    }

    fn stack() -> (Arc<RwLock<Session>>, Arc<ConnectionManager>) {
        let authenticator = Authenticator::new(
            Arc::new(AuthClient::new("http://localhost:9")),
            Arc::new(MemoryIdentityStore::new()),
        );
        let (connection, _event_rx) = ConnectionManager::new(authenticator, "ws://localhost:9");
        let connection = Arc::new(connection);
        let session = Arc::new(RwLock::new(Session::new(
            &SessionConfig::default(),
            Arc::new(ConnectionSink {
                connection: Arc::clone(&connection),
            }),
        )));
        (session, connection)
    }

    #[test]
    fn open_event_attaches_identity() {
        let (session, connection) = stack();
        apply_event(
            ConnectionEvent::Open {
                generated_username: "Quiet-Falcon-42".into(),
            },
            &session,
            &connection,
            &StaticHost,
        );
        assert_eq!(session.read().my_handle(), Some("Quiet-Falcon-42"));
    }

    #[test]
    fn inbound_events_reach_the_session() {
        let (session, connection) = stack();
        apply_event(
            ConnectionEvent::Open {
                generated_username: "Quiet-Falcon-42".into(),
            },
            &session,
            &connection,
            &StaticHost,
        );
        apply_event(
            ConnectionEvent::Inbound(Inbound::OrderCreated(TradeOrder {
                order_id: "o-1".into(),
                owner_handle: "bob".into(),
                order_type: OrderType::Sell,
                item_id: 1513,
                item_name: "Magic logs".into(),
                quantity: 5,
                price_per_item: 100,
            })),
            &session,
            &connection,
            &StaticHost,
        );
        assert_eq!(session.read().orders().len(), 1);

        apply_event(
            ConnectionEvent::Inbound(Inbound::OrderDeleted(OrderDeleted {
                order_id: "o-1".into(),
            })),
            &session,
            &connection,
            &StaticHost,
        );
        assert!(session.read().orders().is_empty());
    }

    #[test]
    fn server_errors_become_notices() {
        let (session, connection) = stack();
        apply_event(
            ConnectionEvent::ServerError("too many requests".into()),
            &session,
            &connection,
            &StaticHost,
        );
        assert!(session
            .write()
            .take_notices()
            .iter()
            .any(|n| n.contains("too many requests")));
    }
}
