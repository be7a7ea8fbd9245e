//! Typed inbound/outbound message sums.
//!
//! The server tags frames with a string kind and a free-form payload.
//! Each kind is decoded exactly once, here, into a strongly-typed
//! variant; dispatch everywhere else is a `match` on the sum.

use crate::envelope::{Envelope, OutboundEnvelope};
use crate::notification::NotificationStatus;
use crate::order::{OrderType, TradeOrder};
use crate::{Result, WireError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;

/// A world position reported by either party during an active trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
    pub plane: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitialState {
    pub all_orders: Vec<TradeOrder>,
    pub online_users: HashSet<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserStatusUpdate {
    pub user_id: String,
    pub is_online: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeNotificationPayload {
    pub notification_id: String,
    pub order_id: String,
    #[serde(rename = "from_player_id")]
    pub from_handle: String,
    #[serde(rename = "from_rsn")]
    pub from_name: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeStatusUpdate {
    pub order_id: String,
    pub status: NotificationStatus,
    /// Display names of the two endpoints; only present on ACCEPTED.
    #[serde(default)]
    pub initiator_rsn: Option<String>,
    #[serde(default)]
    pub recipient_rsn: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationUpdate {
    pub rsn: String,
    #[serde(flatten)]
    pub position: Coordinate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderDeleted {
    pub order_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IgnoreListState {
    pub ignored_ids: HashSet<String>,
}

/// Every message kind the server can push.
#[derive(Debug, Clone)]
pub enum Inbound {
    InitialState(InitialState),
    UserStatusUpdate(UserStatusUpdate),
    TradeNotification(TradeNotificationPayload),
    TradeStatusUpdate(TradeStatusUpdate),
    PlayerLocationUpdate(LocationUpdate),
    OrderCreated(TradeOrder),
    OrderUpdated(TradeOrder),
    OrderDeleted(OrderDeleted),
    IgnoreListState(IgnoreListState),
}

impl Inbound {
    /// Decode a typed message from an envelope whose kind is non-null.
    ///
    /// Unknown kinds and malformed payloads are errors; the caller drops
    /// the frame and logs.
    pub fn from_envelope(env: Envelope) -> Result<Self> {
        let kind = env.kind.ok_or(WireError::MissingType)?;
        let payload = env.payload;
        let msg = match kind.as_str() {
            "INITIAL_STATE" => Inbound::InitialState(serde_json::from_value(payload)?),
            "USER_STATUS_UPDATE" => Inbound::UserStatusUpdate(serde_json::from_value(payload)?),
            "TRADE_NOTIFICATION" => Inbound::TradeNotification(serde_json::from_value(payload)?),
            "TRADE_STATUS_UPDATE" => Inbound::TradeStatusUpdate(serde_json::from_value(payload)?),
            "PLAYER_LOCATION_UPDATE" => {
                Inbound::PlayerLocationUpdate(serde_json::from_value(payload)?)
            }
            "ORDER_CREATED" => Inbound::OrderCreated(serde_json::from_value(payload)?),
            "ORDER_UPDATED" => Inbound::OrderUpdated(serde_json::from_value(payload)?),
            "ORDER_DELETED" => Inbound::OrderDeleted(serde_json::from_value(payload)?),
            "IGNORE_LIST_STATE" => Inbound::IgnoreListState(serde_json::from_value(payload)?),
            other => return Err(WireError::UnknownKind(other.to_string())),
        };
        Ok(msg)
    }
}

/// Every message kind the client can send.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    SetRsn {
        rsn: String,
    },
    UpdateMyLocation(Coordinate),
    CreateOrder {
        item_id: i32,
        item_name: String,
        quantity: i32,
        price_per_item: i64,
        order_type: OrderType,
    },
    ModifyOrder {
        order_id: String,
        quantity: i32,
        price_per_item: i64,
    },
    CancelOrder {
        order_id: String,
    },
    InitiateTrade {
        order_id: String,
    },
    AcceptTrade {
        notification_id: String,
    },
    CancelTrade {
        notification_id: String,
    },
    CompleteTrade {
        order_id: String,
    },
    AddToIgnoreList {
        user_id: String,
    },
    RemoveFromIgnoreList {
        user_id: String,
    },
}

impl Outbound {
    /// Wire kind string for this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::SetRsn { .. } => "SET_RSN",
            Outbound::UpdateMyLocation(_) => "UPDATE_MY_LOCATION",
            Outbound::CreateOrder { .. } => "CREATE_ORDER",
            Outbound::ModifyOrder { .. } => "MODIFY_ORDER",
            Outbound::CancelOrder { .. } => "CANCEL_ORDER",
            Outbound::InitiateTrade { .. } => "INITIATE_TRADE",
            Outbound::AcceptTrade { .. } => "ACCEPT_TRADE",
            Outbound::CancelTrade { .. } => "CANCEL_TRADE",
            Outbound::CompleteTrade { .. } => "COMPLETE_TRADE",
            Outbound::AddToIgnoreList { .. } => "ADD_TO_IGNORE_LIST",
            // The server registers the removal kind under this spelling.
            Outbound::RemoveFromIgnoreList { .. } => "REMOVE_TO_IGNORE_LIST",
        }
    }

    /// Build the `{type, payload}` envelope for this message.
    pub fn to_envelope(&self) -> OutboundEnvelope {
        let payload = match self {
            Outbound::SetRsn { rsn } => json!({ "rsn": rsn }),
            Outbound::UpdateMyLocation(pos) => {
                json!({ "x": pos.x, "y": pos.y, "plane": pos.plane })
            }
            Outbound::CreateOrder {
                item_id,
                item_name,
                quantity,
                price_per_item,
                order_type,
            } => json!({
                "item_id": item_id,
                "item_name": item_name,
                "quantity": quantity,
                "price_per_item": price_per_item,
                "order_type": order_type,
            }),
            Outbound::ModifyOrder {
                order_id,
                quantity,
                price_per_item,
            } => json!({
                "order_id": order_id,
                "quantity": quantity,
                "price_per_item": price_per_item,
            }),
            Outbound::CancelOrder { order_id }
            | Outbound::InitiateTrade { order_id }
            | Outbound::CompleteTrade { order_id } => json!({ "order_id": order_id }),
            Outbound::AcceptTrade { notification_id }
            | Outbound::CancelTrade { notification_id } => {
                json!({ "notification_id": notification_id })
            }
            Outbound::AddToIgnoreList { user_id } | Outbound::RemoveFromIgnoreList { user_id } => {
                json!({ "user_id": user_id })
            }
        };
        OutboundEnvelope {
            kind: self.kind(),
            payload,
        }
    }

    /// Serialize to the text frame sent over the socket.
    pub fn to_frame(&self) -> String {
        // OutboundEnvelope has no non-serializable fields, so this
        // cannot fail.
        serde_json::to_string(&self.to_envelope()).unwrap_or_default()
    }
}
