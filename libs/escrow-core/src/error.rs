use std::time::Duration;
use thiserror::Error;

/// Failures of user-initiated commands.
///
/// Validation errors (bad input, nothing sent) and policy rejections
/// (cooldowns, self-targeting) are distinct variants so the UI can
/// present different messages for each.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    // Validation.
    #[error("quantity must be positive")]
    InvalidQuantity,

    #[error("price per item must be between 0 and {max}")]
    InvalidPrice { max: i64 },

    #[error("total price overflows the supported range")]
    PriceOverflow,

    #[error("unknown order: {0}")]
    UnknownOrder(String),

    #[error("unknown notification: {0}")]
    UnknownNotification(String),

    // Policy.
    #[error("you must wait before contacting this player again")]
    TargetCooldown { remaining: Duration },

    #[error("this order was requested moments ago, wait a few seconds")]
    OrderCooldown { remaining: Duration },

    #[error("you cannot trade with yourself")]
    SelfTarget,

    #[error("you cannot ignore yourself")]
    SelfIgnore,

    #[error("the trade is not in a state that allows this action")]
    InvalidTradeState,

    #[error("not connected")]
    NotConnected,
}

impl CommandError {
    /// Policy rejections are expected outcomes; validation errors are
    /// caller mistakes.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(
            self,
            CommandError::TargetCooldown { .. }
                | CommandError::OrderCooldown { .. }
                | CommandError::SelfTarget
                | CommandError::SelfIgnore
                | CommandError::InvalidTradeState
                | CommandError::NotConnected
        )
    }
}
