use std::sync::atomic::{AtomicU8, Ordering};

/// Connection lifecycle. AUTHENTICATING covers the whole REST
/// handshake plus the websocket upgrade; commands sent in that window
/// are dropped, not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Authenticating = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Authenticating,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Lock-free state cell shared between the manager, the socket task
/// and the handshake future.
#[derive(Debug)]
pub struct AtomicConnectionState {
    state: AtomicU8,
}

impl AtomicConnectionState {
    pub fn new(initial: ConnectionState) -> Self {
        Self {
            state: AtomicU8::new(initial as u8),
        }
    }

    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Atomically move from `current` to `next`. Returns whether the
    /// transition happened; exactly one caller wins a race.
    pub fn transition(&self, current: ConnectionState, next: ConnectionState) -> bool {
        self.state
            .compare_exchange(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.get() == ConnectionState::Connected
    }
}

impl Default for AtomicConnectionState {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_exclusive() {
        let state = AtomicConnectionState::default();
        assert!(state.transition(
            ConnectionState::Disconnected,
            ConnectionState::Authenticating
        ));
        // A second connect attempt loses the race.
        assert!(!state.transition(
            ConnectionState::Disconnected,
            ConnectionState::Authenticating
        ));
        assert_eq!(state.get(), ConnectionState::Authenticating);

        assert!(state.transition(ConnectionState::Authenticating, ConnectionState::Connected));
        assert!(state.is_connected());
    }
}
