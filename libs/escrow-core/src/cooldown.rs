use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Expiry-instant map used for notification and trade-button cooldowns.
///
/// Entries are evicted lazily on lookup; the caller supplies `now` so
/// the clock can be controlled in tests.
#[derive(Debug, Default)]
pub struct Cooldowns {
    entries: HashMap<String, Instant>,
}

impl Cooldowns {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `key` is still cooling down at `now`.
    pub fn is_active(&mut self, key: &str, now: Instant) -> bool {
        match self.entries.get(key) {
            Some(expiry) if *expiry > now => true,
            Some(_) => {
                self.entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Arm (or re-arm) the cooldown for `key`.
    pub fn arm(&mut self, key: impl Into<String>, window: Duration, now: Instant) {
        self.entries.insert(key.into(), now + window);
    }

    /// Remaining window for `key`, if any.
    pub fn remaining(&mut self, key: &str, now: Instant) -> Option<Duration> {
        if self.is_active(key, now) {
            self.entries.get(key).map(|expiry| *expiry - now)
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_until_armed() {
        let mut cooldowns = Cooldowns::new();
        let now = Instant::now();
        assert!(!cooldowns.is_active("alice", now));
    }

    #[test]
    fn active_within_window_then_expires() {
        let mut cooldowns = Cooldowns::new();
        let now = Instant::now();
        cooldowns.arm("alice", Duration::from_secs(60), now);

        assert!(cooldowns.is_active("alice", now + Duration::from_secs(59)));
        assert!(!cooldowns.is_active("alice", now + Duration::from_secs(61)));
        // Lazy eviction removed the entry.
        assert!(cooldowns.remaining("alice", now + Duration::from_secs(62)).is_none());
    }

    #[test]
    fn rearming_extends_the_window() {
        let mut cooldowns = Cooldowns::new();
        let now = Instant::now();
        cooldowns.arm("o-1", Duration::from_secs(5), now);
        cooldowns.arm("o-1", Duration::from_secs(5), now + Duration::from_secs(4));
        assert!(cooldowns.is_active("o-1", now + Duration::from_secs(8)));
    }
}
