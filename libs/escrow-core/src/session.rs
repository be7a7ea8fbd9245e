//! The session controller.
//!
//! One `Session` owns every piece of mutable client state and is the
//! single dispatch point for inbound messages and user intents. It is
//! deliberately single-threaded; the runtime marshals all producers
//! onto one consumer before calling in. Outbound traffic goes through
//! the injected [`OutboundSink`] so the session never owns a socket.

use crate::config::SessionConfig;
use crate::error::CommandError;
use crate::ledger::{NotificationLedger, SendBlocked};
use crate::orderbook::OrderBook;
use crate::presence::PresenceTracker;
use crate::verifier::{OfferPolicy, OfferSnapshot, TradeStatus, TradeVerifier};
use escrow_wire::{
    Inbound, Notification, NotificationDirection, NotificationStatus, OrderType, TradeOrder,
    TradeStatusUpdate,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where validated outbound messages go. The connection layer drops
/// and logs sends while disconnected; nothing is queued.
pub trait OutboundSink: Send + Sync {
    fn send(&self, message: escrow_wire::Outbound);
}

/// The single in-progress trade being verified and tracked.
#[derive(Debug, Clone)]
pub struct ActiveTrade {
    pub notification_id: String,
    pub order_id: String,
    pub counterpart_handle: String,
    /// Display name of the counterpart, resolved from the ACCEPTED
    /// status update.
    pub counterpart_name: Option<String>,
}

pub struct Session {
    sink: Arc<dyn OutboundSink>,

    orderbook: OrderBook,
    ledger: NotificationLedger,
    verifier: TradeVerifier,
    presence: PresenceTracker,
    ignore_set: HashSet<String>,
    active_trade: Option<ActiveTrade>,

    my_handle: Option<String>,
    my_name: Option<String>,

    max_price_per_item: i64,
    notices: Vec<String>,
}

impl Session {
    pub fn new(config: &SessionConfig, sink: Arc<dyn OutboundSink>) -> Self {
        Self {
            sink,
            orderbook: OrderBook::new(),
            ledger: NotificationLedger::new(
                Duration::from_secs(config.cooldowns.notification_secs),
                Duration::from_secs(config.cooldowns.trade_button_secs),
            ),
            verifier: TradeVerifier::new(OfferPolicy {
                currency_item_id: config.verification.currency_item_id,
                allow_combined_offer: config.verification.allow_combined_offer,
            }),
            presence: PresenceTracker::new(),
            ignore_set: HashSet::new(),
            active_trade: None,
            my_handle: None,
            my_name: None,
            max_price_per_item: config.limits.max_price_per_item,
            notices: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Called once the connection is open and the identity is known.
    pub fn on_connected(&mut self, my_handle: String, my_name: String) {
        info!("Session attached to handle {}", my_handle);
        self.my_handle = Some(my_handle);
        self.my_name = Some(my_name);
    }

    pub fn on_disconnected(&mut self) {
        info!("Connection lost; awaiting automatic reconnection");
    }

    /// Full reset on account switch or shutdown.
    pub fn reset(&mut self) {
        self.orderbook.clear();
        self.ledger.reset();
        self.presence.reset();
        self.ignore_set.clear();
        self.clear_active_trade("session reset");
        self.my_handle = None;
        self.my_name = None;
        self.notices.clear();
    }

    // ------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------

    /// Route one decoded server message into the owning component.
    pub fn handle_inbound(&mut self, message: Inbound) {
        let Some(my_handle) = self.my_handle.clone() else {
            debug!("Dropping inbound message before identity is attached");
            return;
        };

        match message {
            Inbound::InitialState(state) => {
                self.orderbook.apply_snapshot(state.all_orders);
                self.presence.set_all(state.online_users);
                self.orderbook.recompute_ownership(&my_handle);
            }
            Inbound::UserStatusUpdate(update) => {
                self.presence.set_online(&update.user_id, update.is_online);
            }
            Inbound::TradeNotification(payload) => {
                let recorded =
                    self.ledger
                        .record_received(payload, &my_handle, &self.ignore_set);
                if let Some(notification) = recorded {
                    let message = notification.message.clone();
                    self.notices.push(message);
                }
            }
            Inbound::TradeStatusUpdate(update) => self.handle_status_update(update),
            Inbound::PlayerLocationUpdate(update) => {
                let counterpart = self
                    .active_trade
                    .as_ref()
                    .and_then(|trade| trade.counterpart_name.as_deref())
                    .map(str::to_owned);
                self.presence
                    .update_location(&update.rsn, counterpart.as_deref(), update.position);
            }
            Inbound::OrderCreated(order) => {
                self.orderbook.apply_create(order);
                self.orderbook.recompute_ownership(&my_handle);
            }
            Inbound::OrderUpdated(order) => {
                self.orderbook.apply_update(order);
                self.orderbook.recompute_ownership(&my_handle);
            }
            Inbound::OrderDeleted(deleted) => {
                self.orderbook.apply_delete(&deleted.order_id);
                self.ledger.close_for_order(&deleted.order_id);
                if self.active_order_is(&deleted.order_id) {
                    self.clear_active_trade("order was deleted");
                }
                self.orderbook.recompute_ownership(&my_handle);
            }
            Inbound::IgnoreListState(state) => {
                self.ignore_set = state.ignored_ids;
            }
        }
    }

    /// An error field on the envelope: surface it, change nothing.
    pub fn on_server_error(&mut self, error: String) {
        warn!("Received error from server: {}", error);
        self.notices.push(format!("Server error: {error}"));
    }

    fn handle_status_update(&mut self, update: TradeStatusUpdate) {
        if update.status == NotificationStatus::Accepted {
            let counterpart_name = self.resolve_counterpart_name(
                update.initiator_rsn.as_deref(),
                update.recipient_rsn.as_deref(),
            );
            if let Some(elected) = self
                .ledger
                .apply_status_update(&update.order_id, NotificationStatus::Accepted)
            {
                let counterpart_handle = match elected.direction {
                    NotificationDirection::Sent => elected.to_handle.clone(),
                    NotificationDirection::Received => elected.from_handle.clone(),
                };
                info!(
                    "Trade accepted for order {}; counterpart {}",
                    update.order_id, counterpart_handle
                );
                self.verifier.reset();
                self.presence.clear_location();
                if let Some(name) = &counterpart_name {
                    self.notices.push(format!(
                        "{name} accepted the trade request. Meet up to complete the trade."
                    ));
                }
                self.active_trade = Some(ActiveTrade {
                    notification_id: elected.notification_id,
                    order_id: elected.order_id,
                    counterpart_handle,
                    counterpart_name,
                });
            }
            return;
        }

        self.ledger
            .apply_status_update(&update.order_id, update.status);
        if update.status == NotificationStatus::Cancelled && self.active_order_is(&update.order_id)
        {
            self.clear_active_trade("trade was cancelled");
        }
    }

    fn resolve_counterpart_name(
        &self,
        initiator: Option<&str>,
        recipient: Option<&str>,
    ) -> Option<String> {
        let my_name = self.my_name.as_deref()?;
        match (initiator, recipient) {
            (Some(initiator), Some(recipient)) => {
                if my_name.eq_ignore_ascii_case(initiator) {
                    Some(recipient.to_string())
                } else {
                    Some(initiator.to_string())
                }
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // User intents (validated and rate-limited before sending)
    // ------------------------------------------------------------------

    /// Create a new standing order.
    pub fn submit_order(
        &mut self,
        item_id: i32,
        item_name: String,
        quantity: i32,
        price_per_item: i64,
        order_type: OrderType,
    ) -> Result<(), CommandError> {
        self.validate_terms(quantity, price_per_item)?;
        self.sink.send(escrow_wire::Outbound::CreateOrder {
            item_id,
            item_name,
            quantity,
            price_per_item,
            order_type,
        });
        Ok(())
    }

    /// Change quantity/price on an existing order.
    pub fn modify_order(
        &mut self,
        order_id: &str,
        quantity: i32,
        price_per_item: i64,
    ) -> Result<(), CommandError> {
        if self.orderbook.get(order_id).is_none() {
            return Err(CommandError::UnknownOrder(order_id.to_string()));
        }
        self.validate_terms(quantity, price_per_item)?;
        self.sink.send(escrow_wire::Outbound::ModifyOrder {
            order_id: order_id.to_string(),
            quantity,
            price_per_item,
        });
        Ok(())
    }

    pub fn cancel_order(&mut self, order_id: &str) -> Result<(), CommandError> {
        if self.orderbook.get(order_id).is_none() {
            return Err(CommandError::UnknownOrder(order_id.to_string()));
        }
        self.sink.send(escrow_wire::Outbound::CancelOrder {
            order_id: order_id.to_string(),
        });
        Ok(())
    }

    /// Ask the owner of `order_id` for a trade.
    pub fn initiate_trade(
        &mut self,
        order_id: &str,
        now: Instant,
    ) -> Result<Notification, CommandError> {
        let (Some(my_handle), Some(my_name)) = (self.my_handle.clone(), self.my_name.clone())
        else {
            return Err(CommandError::NotConnected);
        };
        let order = self
            .orderbook
            .get(order_id)
            .cloned()
            .ok_or_else(|| CommandError::UnknownOrder(order_id.to_string()))?;

        let notification = self
            .ledger
            .record_sent(&order, &my_handle, &my_name, now)
            .map_err(|blocked| match blocked {
                SendBlocked::TargetCooldown { remaining } => {
                    CommandError::TargetCooldown { remaining }
                }
                SendBlocked::OrderCooldown { remaining } => {
                    CommandError::OrderCooldown { remaining }
                }
                SendBlocked::SelfTarget => CommandError::SelfTarget,
            })?;

        self.sink.send(escrow_wire::Outbound::InitiateTrade {
            order_id: order_id.to_string(),
        });
        Ok(notification)
    }

    /// Accept a received trade request. The trade becomes active once
    /// the server echoes the ACCEPTED status update.
    pub fn accept_trade(&mut self, notification_id: &str) -> Result<(), CommandError> {
        let notification = self
            .ledger
            .get(notification_id)
            .ok_or_else(|| CommandError::UnknownNotification(notification_id.to_string()))?;
        if notification.status != NotificationStatus::Pending {
            return Err(CommandError::InvalidTradeState);
        }
        self.verifier.reset();
        self.sink.send(escrow_wire::Outbound::AcceptTrade {
            notification_id: notification_id.to_string(),
        });
        Ok(())
    }

    /// Walk away from an already accepted trade.
    pub fn cancel_accepted_trade(&mut self, notification_id: &str) -> Result<(), CommandError> {
        let notification = self
            .ledger
            .get(notification_id)
            .ok_or_else(|| CommandError::UnknownNotification(notification_id.to_string()))?;
        if notification.status != NotificationStatus::Accepted {
            return Err(CommandError::InvalidTradeState);
        }
        self.ledger
            .set_status(notification_id, NotificationStatus::Cancelled);
        self.sink.send(escrow_wire::Outbound::CancelTrade {
            notification_id: notification_id.to_string(),
        });
        if self
            .active_trade
            .as_ref()
            .is_some_and(|trade| trade.notification_id == notification_id)
        {
            self.clear_active_trade("user cancelled accepted trade");
        }
        Ok(())
    }

    /// Manual completion fallback for a pending or accepted request.
    pub fn force_complete_trade(&mut self, notification_id: &str) -> Result<(), CommandError> {
        let notification = self
            .ledger
            .get(notification_id)
            .ok_or_else(|| CommandError::UnknownNotification(notification_id.to_string()))?;
        if notification.status.is_terminal() {
            return Err(CommandError::InvalidTradeState);
        }
        let order_id = notification.order_id.clone();
        self.complete_trade(&order_id);
        Ok(())
    }

    /// Mark every notification for `order_id` completed and tell the
    /// server. Also driven by the host's accepted-trade detection.
    pub fn complete_trade(&mut self, order_id: &str) {
        info!("Trade completed for order {}", order_id);
        self.ledger
            .apply_status_update(order_id, NotificationStatus::Completed);
        self.sink.send(escrow_wire::Outbound::CompleteTrade {
            order_id: order_id.to_string(),
        });
        if self.active_order_is(order_id) {
            self.clear_active_trade("trade completed");
        }
    }

    pub fn clear_notifications(&mut self, direction: Option<NotificationDirection>) {
        self.ledger.clear(direction);
    }

    pub fn add_to_ignore_list(&mut self, handle: &str) -> Result<(), CommandError> {
        let handle = handle.trim();
        if handle.is_empty() {
            return Ok(());
        }
        if self
            .my_handle
            .as_deref()
            .is_some_and(|mine| mine.eq_ignore_ascii_case(handle))
        {
            return Err(CommandError::SelfIgnore);
        }
        self.sink.send(escrow_wire::Outbound::AddToIgnoreList {
            user_id: handle.to_string(),
        });
        Ok(())
    }

    pub fn remove_from_ignore_list(&mut self, handle: &str) {
        let handle = handle.trim();
        if handle.is_empty() {
            return;
        }
        self.sink.send(escrow_wire::Outbound::RemoveFromIgnoreList {
            user_id: handle.to_string(),
        });
    }

    fn validate_terms(&self, quantity: i32, price_per_item: i64) -> Result<(), CommandError> {
        if quantity <= 0 {
            return Err(CommandError::InvalidQuantity);
        }
        if price_per_item < 0 || price_per_item > self.max_price_per_item {
            return Err(CommandError::InvalidPrice {
                max: self.max_price_per_item,
            });
        }
        if (quantity as i64).checked_mul(price_per_item).is_none() {
            return Err(CommandError::PriceOverflow);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Offer snapshots (opaque provider feeds these in)
    // ------------------------------------------------------------------

    /// Re-verify against fresh offer snapshots for both parties.
    pub fn observe_offers(&mut self, my_offer: OfferSnapshot, their_offer: OfferSnapshot) {
        let Some(order_id) = self.active_trade.as_ref().map(|t| t.order_id.clone()) else {
            return;
        };
        let Some(order) = self.orderbook.get(&order_id).cloned() else {
            self.clear_active_trade("original order not found");
            return;
        };
        let my_handle = self.my_handle.clone().unwrap_or_default();
        let am_seller = order.is_owned_by(&my_handle);
        let (seller_offer, buyer_offer) = if am_seller {
            (&my_offer, &their_offer)
        } else {
            (&their_offer, &my_offer)
        };
        self.verifier.evaluate(&order, seller_offer, buyer_offer);
    }

    /// Confirmation-stage snapshot: the host guarantees parity here.
    pub fn observe_confirmation(&mut self) {
        if self.active_trade.is_some() {
            self.verifier.confirm();
        }
    }

    /// The trade window can no longer be observed. If offers had been
    /// seen for the active trade, treat it as an implicit cancellation.
    pub fn window_unobservable(&mut self) {
        if self.active_trade.is_some() && self.verifier.window_seen() {
            self.clear_active_trade("trade window closed");
        }
    }

    // ------------------------------------------------------------------
    // Active trade
    // ------------------------------------------------------------------

    pub fn clear_active_trade(&mut self, reason: &str) {
        if let Some(trade) = self.active_trade.take() {
            info!(
                "Clearing active trade {} due to: {}",
                trade.notification_id, reason
            );
            self.verifier.reset();
            self.presence.clear_location();
        }
    }

    fn active_order_is(&self, order_id: &str) -> bool {
        self.active_trade
            .as_ref()
            .is_some_and(|trade| trade.order_id == order_id)
    }

    // ------------------------------------------------------------------
    // Reads (safe from the UI layer; mutation is marshaled elsewhere)
    // ------------------------------------------------------------------

    pub fn active_trade(&self) -> Option<&ActiveTrade> {
        self.active_trade.as_ref()
    }

    pub fn trade_status(&self) -> TradeStatus {
        self.verifier.status()
    }

    pub fn orders(&self) -> Vec<TradeOrder> {
        self.orderbook.orders().cloned().collect()
    }

    pub fn my_orders(&self) -> Vec<TradeOrder> {
        self.orderbook.my_orders().cloned().collect()
    }

    pub fn listed_item_ids(&self) -> HashSet<i32> {
        self.orderbook.listed_item_ids().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.ledger.notifications().to_vec()
    }

    pub fn is_online(&self, handle: &str) -> bool {
        self.presence.is_online(handle)
    }

    pub fn counterpart_location(&self) -> Option<escrow_wire::Coordinate> {
        self.presence.counterpart_location()
    }

    pub fn ignore_set(&self) -> &HashSet<String> {
        &self.ignore_set
    }

    pub fn my_handle(&self) -> Option<&str> {
        self.my_handle.as_deref()
    }

    /// Drain user-facing messages produced since the last call.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }
}
