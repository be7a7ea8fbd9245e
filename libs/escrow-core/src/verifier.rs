//! Offer-vs-terms verification.
//!
//! While a trade is active, every change to the externally observed
//! offer snapshots re-runs the comparison between what both parties
//! have placed in the exchange and what the originating order says
//! they agreed to.

use escrow_wire::TradeOrder;
use std::collections::HashMap;

/// Point-in-time view of one party's side of the exchange: item id to
/// quantity.
pub type OfferSnapshot = HashMap<i32, i64>;

/// Outcome of the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    /// No snapshot evaluated yet for the current trade.
    Pending,
    Correct,
    IncorrectItems,
    IncorrectPrice,
}

/// Verification policy knobs.
///
/// `allow_combined_offer` settles the observed disagreement on whether
/// a seller handing over {item, currency} (giving change) still counts
/// as correct; both stances exist in the wild, so it is configuration,
/// not a guess.
#[derive(Debug, Clone, Copy)]
pub struct OfferPolicy {
    pub currency_item_id: i32,
    pub allow_combined_offer: bool,
}

impl Default for OfferPolicy {
    fn default() -> Self {
        Self {
            currency_item_id: 995,
            allow_combined_offer: false,
        }
    }
}

#[derive(Debug)]
pub struct TradeVerifier {
    policy: OfferPolicy,
    status: TradeStatus,
    window_seen: bool,
}

impl TradeVerifier {
    pub fn new(policy: OfferPolicy) -> Self {
        Self {
            policy,
            status: TradeStatus::Pending,
            window_seen: false,
        }
    }

    pub fn status(&self) -> TradeStatus {
        self.status
    }

    /// Whether an offer snapshot has been observed for the current
    /// trade. Once true, a vanished trade window means the exchange was
    /// closed underneath us.
    pub fn window_seen(&self) -> bool {
        self.window_seen
    }

    /// Back to PENDING for a newly activated trade.
    pub fn reset(&mut self) {
        self.status = TradeStatus::Pending;
        self.window_seen = false;
    }

    /// Re-evaluate against a fresh pair of snapshots.
    pub fn evaluate(
        &mut self,
        order: &TradeOrder,
        seller_offer: &OfferSnapshot,
        buyer_offer: &OfferSnapshot,
    ) -> TradeStatus {
        self.window_seen = true;
        self.status = if !self.items_match(order, seller_offer) {
            TradeStatus::IncorrectItems
        } else if !self.price_matches(order, buyer_offer) {
            TradeStatus::IncorrectPrice
        } else {
            TradeStatus::Correct
        };
        self.status
    }

    /// Confirmation-stage snapshot: the host environment guarantees
    /// item parity at this stage, so it short-circuits to CORRECT.
    pub fn confirm(&mut self) -> TradeStatus {
        self.window_seen = true;
        self.status = TradeStatus::Correct;
        self.status
    }

    fn items_match(&self, order: &TradeOrder, offer: &OfferSnapshot) -> bool {
        let expected = order.quantity as i64;
        if expected == 0 {
            return true;
        }
        if offer.get(&order.item_id).copied().unwrap_or(0) != expected {
            return false;
        }
        match offer.len() {
            1 => true,
            2 if self.policy.allow_combined_offer => {
                offer.contains_key(&self.policy.currency_item_id)
            }
            _ => false,
        }
    }

    fn price_matches(&self, order: &TradeOrder, offer: &OfferSnapshot) -> bool {
        let expected = order.total_price().unwrap_or(i64::MAX);
        if expected == 0 {
            return true;
        }
        if offer.get(&self.policy.currency_item_id).copied().unwrap_or(0) != expected {
            return false;
        }
        match offer.len() {
            1 => true,
            2 if self.policy.allow_combined_offer => true,
            _ => false,
        }
    }
}
