use escrow_wire::Coordinate;
use std::collections::HashSet;

/// Online/offline set plus the counterpart's last reported position
/// during an active trade.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    online: HashSet<String>,
    counterpart_location: Option<Coordinate>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole online set (INITIAL_STATE).
    pub fn set_all(&mut self, handles: HashSet<String>) {
        self.online = handles;
    }

    pub fn set_online(&mut self, handle: &str, online: bool) {
        if online {
            self.online.insert(handle.to_string());
        } else {
            self.online.remove(handle);
        }
    }

    pub fn is_online(&self, handle: &str) -> bool {
        self.online.contains(handle)
    }

    /// Store a reported position, but only if it comes from the active
    /// counterpart (case-insensitive). Reports from anyone else are
    /// discarded.
    pub fn update_location(
        &mut self,
        reporter: &str,
        counterpart: Option<&str>,
        position: Coordinate,
    ) -> bool {
        match counterpart {
            Some(name) if name.eq_ignore_ascii_case(reporter) => {
                self.counterpart_location = Some(position);
                true
            }
            _ => false,
        }
    }

    pub fn counterpart_location(&self) -> Option<Coordinate> {
        self.counterpart_location
    }

    /// Forget the counterpart position (trade cleared).
    pub fn clear_location(&mut self) {
        self.counterpart_location = None;
    }

    pub fn reset(&mut self) {
        self.online.clear();
        self.counterpart_location = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: i32, y: i32) -> Coordinate {
        Coordinate { x, y, plane: 0 }
    }

    #[test]
    fn online_set_updates() {
        let mut presence = PresenceTracker::new();
        presence.set_online("alice", true);
        assert!(presence.is_online("alice"));
        presence.set_online("alice", false);
        assert!(!presence.is_online("alice"));
    }

    #[test]
    fn location_only_accepted_from_counterpart() {
        let mut presence = PresenceTracker::new();

        assert!(!presence.update_location("Bob", None, at(1, 1)));
        assert!(!presence.update_location("Mallory", Some("Bob"), at(2, 2)));
        assert!(presence.counterpart_location().is_none());

        assert!(presence.update_location("BOB", Some("bob"), at(3, 3)));
        assert_eq!(presence.counterpart_location(), Some(at(3, 3)));

        presence.clear_location();
        assert!(presence.counterpart_location().is_none());
    }
}
