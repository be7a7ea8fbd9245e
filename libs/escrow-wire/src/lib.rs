//! Wire-level data model for the escrow service.
//!
//! Everything that crosses the network lives here: the trade order and
//! notification records, the `{type, payload, error}` websocket envelope,
//! the typed inbound/outbound message sums, and the REST handshake bodies.
//! Messages are decoded once at the connection boundary into these types;
//! the rest of the system never touches raw JSON.

pub mod auth;
pub mod envelope;
pub mod messages;
pub mod notification;
pub mod order;

pub use auth::{
    ChallengeRequest, ChallengeResponse, RegisterRequest, RegisterResponse, TokenRequest,
    TokenResponse,
};
pub use envelope::{Envelope, OutboundEnvelope};
pub use messages::{
    Coordinate, IgnoreListState, InitialState, Inbound, LocationUpdate, OrderDeleted, Outbound,
    TradeNotificationPayload, TradeStatusUpdate, UserStatusUpdate,
};
pub use notification::{Notification, NotificationDirection, NotificationStatus};
pub use order::{OrderType, TradeOrder};

use thiserror::Error;

/// Decode failures at the protocol boundary.
///
/// These never propagate past the read loop: the offending frame is
/// dropped and logged, existing state is untouched.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no type")]
    MissingType,

    #[error("unknown message kind: {0}")]
    UnknownKind(String),
}

pub type Result<T> = std::result::Result<T, WireError>;
