//! Trade-notification history and send policy.
//!
//! The ledger is append-only: status changes mutate entries in place,
//! but history is only removed by explicit user action or a session
//! reset. Outgoing requests are rate-limited per target handle and per
//! order before anything reaches the network.

use crate::cooldown::Cooldowns;
use chrono::Utc;
use escrow_wire::{
    Notification, NotificationDirection, NotificationStatus, TradeNotificationPayload, TradeOrder,
};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Why an outgoing trade request was blocked. Nothing is sent over the
/// wire for any of these; the caller informs the user.
#[derive(Debug, Clone, PartialEq)]
pub enum SendBlocked {
    /// The target handle was contacted too recently.
    TargetCooldown { remaining: Duration },
    /// The trade button for this order has not re-armed yet.
    OrderCooldown { remaining: Duration },
    /// The order belongs to the local party.
    SelfTarget,
}

#[derive(Debug)]
pub struct NotificationLedger {
    notifications: Vec<Notification>,
    target_cooldowns: Cooldowns,
    order_cooldowns: Cooldowns,
    target_window: Duration,
    order_window: Duration,
}

impl NotificationLedger {
    pub fn new(target_window: Duration, order_window: Duration) -> Self {
        Self {
            notifications: Vec::new(),
            target_cooldowns: Cooldowns::new(),
            order_cooldowns: Cooldowns::new(),
            target_window,
            order_window,
        }
    }

    /// Record an outgoing trade request for `order`.
    ///
    /// On success the PENDING/SENT entry is appended and both cooldowns
    /// are armed; the caller is responsible for the actual send.
    pub fn record_sent(
        &mut self,
        order: &TradeOrder,
        my_handle: &str,
        my_name: &str,
        now: Instant,
    ) -> Result<Notification, SendBlocked> {
        if order.is_owned_by(my_handle) {
            return Err(SendBlocked::SelfTarget);
        }
        if let Some(remaining) = self.order_cooldowns.remaining(&order.order_id, now) {
            return Err(SendBlocked::OrderCooldown { remaining });
        }
        if let Some(remaining) = self.target_cooldowns.remaining(&order.owner_handle, now) {
            return Err(SendBlocked::TargetCooldown { remaining });
        }

        let notification = Notification {
            notification_id: Uuid::new_v4().to_string(),
            order_id: order.order_id.clone(),
            message: request_message(order),
            from_handle: my_handle.to_string(),
            from_name: my_name.to_string(),
            to_handle: order.owner_handle.clone(),
            timestamp: Utc::now(),
            direction: NotificationDirection::Sent,
            status: NotificationStatus::Pending,
        };
        self.notifications.push(notification.clone());

        self.order_cooldowns
            .arm(order.order_id.clone(), self.order_window, now);
        self.target_cooldowns
            .arm(order.owner_handle.clone(), self.target_window, now);
        Ok(notification)
    }

    /// Record an incoming trade request, unless the sender is ignored.
    pub fn record_received(
        &mut self,
        payload: TradeNotificationPayload,
        my_handle: &str,
        ignore_set: &HashSet<String>,
    ) -> Option<&Notification> {
        if ignore_set.contains(&payload.from_handle) {
            debug!("Dropping notification from ignored sender {}", payload.from_handle);
            return None;
        }
        self.notifications.push(Notification {
            notification_id: payload.notification_id,
            order_id: payload.order_id,
            message: payload.message,
            from_handle: payload.from_handle,
            from_name: payload.from_name,
            to_handle: my_handle.to_string(),
            timestamp: Utc::now(),
            direction: NotificationDirection::Received,
            status: NotificationStatus::Pending,
        });
        self.notifications.last()
    }

    /// Apply a status change to every notification referencing
    /// `order_id`, honoring monotonic transitions.
    ///
    /// When `status` is ACCEPTED, the first still-PENDING entry for the
    /// order is elected and returned; the caller promotes it to the
    /// active trade. ACCEPTED with no PENDING entry elects nothing.
    pub fn apply_status_update(
        &mut self,
        order_id: &str,
        status: NotificationStatus,
    ) -> Option<Notification> {
        let elected = if status == NotificationStatus::Accepted {
            self.notifications
                .iter()
                .find(|n| n.order_id == order_id && n.status == NotificationStatus::Pending)
                .cloned()
        } else {
            None
        };

        for notification in self
            .notifications
            .iter_mut()
            .filter(|n| n.order_id == order_id)
        {
            if advances(notification.status, status) {
                notification.status = status;
            }
        }
        elected
    }

    /// Force every non-terminal entry for a vanished order into the
    /// terminal CLOSED state.
    pub fn close_for_order(&mut self, order_id: &str) {
        for notification in self
            .notifications
            .iter_mut()
            .filter(|n| n.order_id == order_id && !n.status.is_terminal())
        {
            notification.status = NotificationStatus::Closed;
        }
    }

    /// Set the status of a single entry, honoring monotonicity.
    pub fn set_status(&mut self, notification_id: &str, status: NotificationStatus) -> bool {
        match self
            .notifications
            .iter_mut()
            .find(|n| n.notification_id == notification_id)
        {
            Some(notification) if advances(notification.status, status) => {
                notification.status = status;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, notification_id: &str) -> Option<&Notification> {
        self.notifications
            .iter()
            .find(|n| n.notification_id == notification_id)
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Remove all entries, or only those with the given direction.
    pub fn clear(&mut self, direction: Option<NotificationDirection>) {
        match direction {
            None => self.notifications.clear(),
            Some(direction) => self.notifications.retain(|n| n.direction != direction),
        }
    }

    /// Full reset, including cooldown state (account/session switch).
    pub fn reset(&mut self) {
        self.notifications.clear();
        self.target_cooldowns.clear();
        self.order_cooldowns.clear();
    }
}

fn rank(status: NotificationStatus) -> u8 {
    match status {
        NotificationStatus::Pending => 0,
        NotificationStatus::Accepted => 1,
        NotificationStatus::Completed
        | NotificationStatus::Cancelled
        | NotificationStatus::Closed => 2,
    }
}

/// Terminal states never change; otherwise the lifecycle only moves
/// forward.
fn advances(current: NotificationStatus, next: NotificationStatus) -> bool {
    !current.is_terminal() && rank(next) > rank(current)
}

fn request_message(order: &TradeOrder) -> String {
    use escrow_wire::OrderType;
    // The counterparty listed the order, so our action is the opposite
    // side.
    let (action, preposition) = match order.order_type {
        OrderType::Sell => ("buy", "from"),
        OrderType::Buy => ("sell", "to"),
    };
    format!(
        "You requested to {} {} x {} {} {} @ {} ea.",
        action, order.quantity, order.item_name, preposition, order.owner_handle, order.price_per_item
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_wire::OrderType;

    fn order(id: &str, owner: &str) -> TradeOrder {
        TradeOrder {
            order_id: id.into(),
            owner_handle: owner.into(),
            order_type: OrderType::Sell,
            item_id: 1513,
            item_name: "Magic logs".into(),
            quantity: 5,
            price_per_item: 100,
        }
    }

    fn ledger() -> NotificationLedger {
        NotificationLedger::new(Duration::from_secs(60), Duration::from_secs(5))
    }

    #[test]
    fn sending_to_own_order_is_blocked() {
        let mut ledger = ledger();
        let result = ledger.record_sent(&order("o-1", "me"), "ME", "Alice", Instant::now());
        assert_eq!(result.unwrap_err(), SendBlocked::SelfTarget);
        assert!(ledger.notifications().is_empty());
    }

    #[test]
    fn target_cooldown_blocks_until_elapsed() {
        let mut ledger = ledger();
        let now = Instant::now();
        ledger
            .record_sent(&order("o-1", "bob"), "me", "Alice", now)
            .unwrap();

        // Different order, same target, inside the window.
        let blocked = ledger.record_sent(
            &order("o-2", "bob"),
            "me",
            "Alice",
            now + Duration::from_secs(30),
        );
        assert!(matches!(
            blocked.unwrap_err(),
            SendBlocked::TargetCooldown { .. }
        ));

        // After the window an identical request succeeds.
        ledger
            .record_sent(&order("o-2", "bob"), "me", "Alice", now + Duration::from_secs(61))
            .unwrap();
        assert_eq!(ledger.notifications().len(), 2);
    }

    #[test]
    fn order_cooldown_blocks_rapid_reclicks() {
        let mut ledger = ledger();
        let now = Instant::now();
        ledger
            .record_sent(&order("o-1", "bob"), "me", "Alice", now)
            .unwrap();

        let blocked = ledger.record_sent(
            &order("o-1", "bob"),
            "me",
            "Alice",
            now + Duration::from_secs(2),
        );
        assert!(matches!(
            blocked.unwrap_err(),
            SendBlocked::OrderCooldown { .. }
        ));
    }

    #[test]
    fn sent_message_wording_follows_order_side() {
        let mut ledger = ledger();
        let sell = ledger
            .record_sent(&order("o-1", "bob"), "me", "Alice", Instant::now())
            .unwrap();
        assert_eq!(
            sell.message,
            "You requested to buy 5 x Magic logs from bob @ 100 ea."
        );
    }

    #[test]
    fn received_from_ignored_sender_is_dropped() {
        let mut ledger = ledger();
        let ignored: HashSet<String> = ["creep".to_string()].into();
        let payload = TradeNotificationPayload {
            notification_id: "n-1".into(),
            order_id: "o-1".into(),
            from_handle: "creep".into(),
            from_name: "Creep".into(),
            message: "hello".into(),
        };
        assert!(ledger.record_received(payload, "me", &ignored).is_none());
        assert!(ledger.notifications().is_empty());
    }

    #[test]
    fn accepted_elects_first_pending() {
        let mut ledger = ledger();
        let now = Instant::now();
        ledger
            .record_sent(&order("o-1", "bob"), "me", "Alice", now)
            .unwrap();

        let elected = ledger.apply_status_update("o-1", NotificationStatus::Accepted);
        let elected = elected.expect("pending entry should be elected");
        assert_eq!(elected.order_id, "o-1");
        assert_eq!(
            ledger.notifications()[0].status,
            NotificationStatus::Accepted
        );
    }

    #[test]
    fn accepted_without_pending_is_a_noop() {
        let mut ledger = ledger();
        assert!(ledger
            .apply_status_update("ghost", NotificationStatus::Accepted)
            .is_none());

        // Terminal entries are not resurrected either.
        ledger
            .record_sent(&order("o-1", "bob"), "me", "Alice", Instant::now())
            .unwrap();
        ledger.apply_status_update("o-1", NotificationStatus::Cancelled);
        assert!(ledger
            .apply_status_update("o-1", NotificationStatus::Accepted)
            .is_none());
        assert_eq!(
            ledger.notifications()[0].status,
            NotificationStatus::Cancelled
        );
    }

    #[test]
    fn terminal_status_never_regresses() {
        let mut ledger = ledger();
        ledger
            .record_sent(&order("o-1", "bob"), "me", "Alice", Instant::now())
            .unwrap();
        ledger.apply_status_update("o-1", NotificationStatus::Completed);
        ledger.apply_status_update("o-1", NotificationStatus::Cancelled);
        assert_eq!(
            ledger.notifications()[0].status,
            NotificationStatus::Completed
        );
    }

    #[test]
    fn close_for_order_spares_terminal_entries() {
        let mut ledger = ledger();
        let now = Instant::now();
        ledger
            .record_sent(&order("o-1", "bob"), "me", "Alice", now)
            .unwrap();
        ledger
            .record_sent(&order("o-2", "carol"), "me", "Alice", now)
            .unwrap();
        ledger.apply_status_update("o-2", NotificationStatus::Completed);

        ledger.close_for_order("o-1");
        ledger.close_for_order("o-2");

        assert_eq!(ledger.notifications()[0].status, NotificationStatus::Closed);
        assert_eq!(
            ledger.notifications()[1].status,
            NotificationStatus::Completed
        );
    }

    #[test]
    fn clear_by_direction() {
        let mut ledger = ledger();
        let now = Instant::now();
        ledger
            .record_sent(&order("o-1", "bob"), "me", "Alice", now)
            .unwrap();
        ledger.record_received(
            TradeNotificationPayload {
                notification_id: "n-2".into(),
                order_id: "o-9".into(),
                from_handle: "carol".into(),
                from_name: "Carol".into(),
                message: "hi".into(),
            },
            "me",
            &HashSet::new(),
        );

        ledger.clear(Some(NotificationDirection::Sent));
        assert_eq!(ledger.notifications().len(), 1);
        assert_eq!(
            ledger.notifications()[0].direction,
            NotificationDirection::Received
        );

        ledger.clear(None);
        assert!(ledger.notifications().is_empty());
    }
}
