//! Single-threaded domain state for the escrow companion.
//!
//! The [`Session`] controller owns every mutable piece: the order book,
//! the notification ledger, the trade verifier, presence, the ignore
//! set and the single active trade. It is not designed for concurrent
//! mutation; callers marshal all events onto one consumer before
//! touching it (see the runtime crate).

pub mod config;
pub mod cooldown;
pub mod error;
pub mod ledger;
pub mod orderbook;
pub mod presence;
pub mod session;
pub mod verifier;

pub use config::{ConfigError, SessionConfig};
pub use cooldown::Cooldowns;
pub use error::CommandError;
pub use ledger::{NotificationLedger, SendBlocked};
pub use orderbook::OrderBook;
pub use presence::PresenceTracker;
pub use session::{ActiveTrade, OutboundSink, Session};
pub use verifier::{OfferPolicy, OfferSnapshot, TradeStatus, TradeVerifier};
