//! Network side of the escrow companion: identity, REST handshake and
//! the websocket connection.

pub mod auth;
pub mod connection;
pub mod connection_state;
pub mod identity;
pub mod store;

pub use auth::{AuthApi, AuthClient, AuthError, Authenticator, Credentials};
pub use connection::{ConnectionEvent, ConnectionManager};
pub use connection_state::{AtomicConnectionState, ConnectionState};
pub use identity::CryptoIdentity;
pub use store::{FileIdentityStore, IdentityStore, MemoryIdentityStore, StoredCredentials};
