//! Integration test: full reconciliation flow
//!
//! Feeds raw server frames through the wire layer into a session and
//! checks that the client-side state converges the way a live
//! connection would drive it.

use escrow_core::session::{OutboundSink, Session};
use escrow_core::verifier::TradeStatus;
use escrow_core::SessionConfig;
use escrow_wire::{Envelope, Inbound, NotificationStatus, Outbound};
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Default)]
struct CapturedSink {
    frames: Mutex<Vec<String>>,
}

impl OutboundSink for CapturedSink {
    fn send(&self, message: Outbound) {
        self.frames.lock().unwrap().push(message.to_frame());
    }
}

fn inbound(raw: &str) -> Inbound {
    let envelope: Envelope = serde_json::from_str(raw).expect("frame should parse");
    Inbound::from_envelope(envelope).expect("frame should be a known kind")
}

#[test]
fn buy_side_flow_from_raw_frames() {
    let sink = Arc::new(CapturedSink::default());
    let mut session = Session::new(&SessionConfig::default(), sink.clone());
    session.on_connected("Quiet-Falcon-42".into(), "Alice".into());

    session.handle_inbound(inbound(
        r#"{
            "type": "INITIAL_STATE",
            "payload": {
                "all_orders": [{
                    "id": "o-1",
                    "owner_rsn": "Brave-Otter-7",
                    "order_type": "SELL",
                    "item_id": 1513,
                    "item_name": "Magic logs",
                    "quantity": 5,
                    "price_per_item": 100
                }],
                "online_users": ["Brave-Otter-7"]
            }
        }"#,
    ));
    assert_eq!(session.orders().len(), 1);
    assert!(session.is_online("Brave-Otter-7"));

    // Ask for the trade; the request goes out as INITIATE_TRADE.
    let notification = session.initiate_trade("o-1", Instant::now()).unwrap();
    assert_eq!(notification.status, NotificationStatus::Pending);
    {
        let frames = sink.frames.lock().unwrap();
        assert!(frames.iter().any(|f| f.contains("\"INITIATE_TRADE\"")));
        assert!(frames.iter().any(|f| f.contains("\"o-1\"")));
    }

    // The owner accepts; the trade becomes active.
    session.handle_inbound(inbound(
        r#"{
            "type": "TRADE_STATUS_UPDATE",
            "payload": {
                "order_id": "o-1",
                "status": "ACCEPTED",
                "initiator_rsn": "Alice",
                "recipient_rsn": "Bob"
            }
        }"#,
    ));
    let trade = session.active_trade().expect("trade should be active");
    assert_eq!(trade.counterpart_handle, "Brave-Otter-7");
    assert_eq!(trade.counterpart_name.as_deref(), Some("Bob"));

    // Their position streams in while the trade is live.
    session.handle_inbound(inbound(
        r#"{
            "type": "PLAYER_LOCATION_UPDATE",
            "payload": {"rsn": "Bob", "x": 3200, "y": 3200, "plane": 0}
        }"#,
    ));
    assert!(session.counterpart_location().is_some());

    // We are buying, so our side carries the coins.
    session.observe_offers(
        [(995, 500)].into_iter().collect(),
        [(1513, 5)].into_iter().collect(),
    );
    assert_eq!(session.trade_status(), TradeStatus::Correct);

    session.complete_trade("o-1");
    assert!(session.active_trade().is_none());
    assert_eq!(
        session.notifications()[0].status,
        NotificationStatus::Completed
    );
    assert!(sink
        .frames
        .lock()
        .unwrap()
        .iter()
        .any(|f| f.contains("\"COMPLETE_TRADE\"")));
}

#[test]
fn order_deletion_mid_trade_closes_everything() {
    let sink = Arc::new(CapturedSink::default());
    let mut session = Session::new(&SessionConfig::default(), sink);
    session.on_connected("Quiet-Falcon-42".into(), "Alice".into());

    session.handle_inbound(inbound(
        r#"{
            "type": "ORDER_CREATED",
            "payload": {
                "id": "o-1",
                "owner_rsn": "Brave-Otter-7",
                "order_type": "BUY",
                "item_id": 2,
                "item_name": "Cannonball",
                "quantity": 1000,
                "price_per_item": 5
            }
        }"#,
    ));
    session.initiate_trade("o-1", Instant::now()).unwrap();
    session.handle_inbound(inbound(
        r#"{
            "type": "TRADE_STATUS_UPDATE",
            "payload": {
                "order_id": "o-1",
                "status": "ACCEPTED",
                "initiator_rsn": "Alice",
                "recipient_rsn": "Bob"
            }
        }"#,
    ));
    assert!(session.active_trade().is_some());

    session.handle_inbound(inbound(
        r#"{"type": "ORDER_DELETED", "payload": {"order_id": "o-1"}}"#,
    ));
    assert!(session.active_trade().is_none());
    assert!(session.orders().is_empty());
    assert_eq!(session.notifications()[0].status, NotificationStatus::Closed);
}
