//! Escrowmate - peer-to-peer trade escrow companion
//!
//! Top-level crate tying the workspace together:
//!
//! - **escrow-wire**: message and payload types for the server protocol
//! - **escrow-core**: session state (orders, notifications, verification)
//! - **escrow-client**: identity, REST handshake and the websocket
//! - **runtime**: the event pump and timers binding them together

pub use escrow_client;
pub use escrow_core;
pub use escrow_wire;

pub mod logging;
pub mod runtime;

pub use runtime::{HostAdapter, Runtime};
