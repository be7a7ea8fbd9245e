use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether the local party sent or received the trade request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationDirection {
    Sent,
    Received,
}

/// Lifecycle of a trade-initiation notification.
///
/// `Pending -> Accepted -> Completed`, with `Cancelled` reachable from
/// the first two. `Closed` is local-only: it marks notifications whose
/// order disappeared from the book. `Completed`, `Cancelled` and
/// `Closed` are terminal and never regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationStatus {
    Pending,
    Accepted,
    Completed,
    Cancelled,
    Closed,
}

impl NotificationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Closed)
    }
}

/// One entry in the trade-request history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: String,

    pub order_id: String,

    pub message: String,

    #[serde(rename = "from_player_id")]
    pub from_handle: String,

    #[serde(rename = "from_rsn")]
    pub from_name: String,

    /// Handle of the recipient. Filled in locally; the server omits it
    /// on received notifications.
    #[serde(default)]
    pub to_handle: String,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    pub direction: NotificationDirection,
    pub status: NotificationStatus,
}
