//! Order set reconciliation.
//!
//! The server may redeliver events or deliver them out of order; every
//! operation here is an idempotent upsert/remove keyed by the
//! server-assigned order id, so replays converge to the same state.

use escrow_wire::TradeOrder;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct OrderBook {
    orders: HashMap<String, TradeOrder>,
    my_order_ids: HashSet<String>,
    listed_item_ids: HashSet<i32>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the full order set (INITIAL_STATE).
    pub fn apply_snapshot(&mut self, orders: Vec<TradeOrder>) {
        self.orders = orders
            .into_iter()
            .map(|order| (order.order_id.clone(), order))
            .collect();
    }

    /// Insert a newly created order; redelivery overwrites in place.
    pub fn apply_create(&mut self, order: TradeOrder) {
        self.orders.insert(order.order_id.clone(), order);
    }

    /// Upsert by order id. An update for an unknown id is treated as an
    /// insertion, not an error.
    pub fn apply_update(&mut self, order: TradeOrder) {
        self.orders.insert(order.order_id.clone(), order);
    }

    /// Remove by id. Returns whether anything was removed so the caller
    /// can run delete side effects exactly once.
    pub fn apply_delete(&mut self, order_id: &str) -> bool {
        self.orders.remove(order_id).is_some()
    }

    /// Re-partition the set into mine/others and derive the item ids
    /// the local party currently has listed.
    pub fn recompute_ownership(&mut self, my_handle: &str) {
        self.my_order_ids.clear();
        self.listed_item_ids.clear();
        for order in self.orders.values() {
            if order.is_owned_by(my_handle) {
                self.my_order_ids.insert(order.order_id.clone());
                self.listed_item_ids.insert(order.item_id);
            }
        }
    }

    pub fn get(&self, order_id: &str) -> Option<&TradeOrder> {
        self.orders.get(order_id)
    }

    pub fn orders(&self) -> impl Iterator<Item = &TradeOrder> {
        self.orders.values()
    }

    pub fn my_orders(&self) -> impl Iterator<Item = &TradeOrder> {
        self.orders
            .values()
            .filter(|order| self.my_order_ids.contains(&order.order_id))
    }

    /// Item ids currently listed by the local party, for external
    /// highlighting.
    pub fn listed_item_ids(&self) -> &HashSet<i32> {
        &self.listed_item_ids
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn clear(&mut self) {
        self.orders.clear();
        self.my_order_ids.clear();
        self.listed_item_ids.clear();
    }
}
