use serde::{Deserialize, Serialize};

/// Side of a standing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Buy,
    Sell,
}

/// A standing buy/sell order as the server publishes it.
///
/// `order_id` is server-assigned and unique; `owner_handle` is the
/// anonymous account handle of the party that placed the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOrder {
    #[serde(rename = "id")]
    pub order_id: String,

    #[serde(rename = "owner_rsn")]
    pub owner_handle: String,

    pub order_type: OrderType,

    pub item_id: i32,

    pub item_name: String,

    pub quantity: i32,

    pub price_per_item: i64,
}

impl TradeOrder {
    /// Total price of the order, or `None` on 64-bit overflow.
    ///
    /// Orders are validated before submission so a stored order should
    /// always have a representable total, but snapshot data is not
    /// trusted either.
    pub fn total_price(&self) -> Option<i64> {
        (self.quantity as i64).checked_mul(self.price_per_item)
    }

    /// Case-insensitive ownership test against the local handle.
    pub fn is_owned_by(&self, handle: &str) -> bool {
        self.owner_handle.eq_ignore_ascii_case(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(quantity: i32, price: i64) -> TradeOrder {
        TradeOrder {
            order_id: "o-1".into(),
            owner_handle: "Quiet-Falcon-42".into(),
            order_type: OrderType::Sell,
            item_id: 1513,
            item_name: "Magic logs".into(),
            quantity,
            price_per_item: price,
        }
    }

    #[test]
    fn total_price_multiplies() {
        assert_eq!(order(5, 100).total_price(), Some(500));
        assert_eq!(order(0, 100).total_price(), Some(0));
    }

    #[test]
    fn total_price_overflow_is_none() {
        assert_eq!(order(i32::MAX, i64::MAX).total_price(), None);
    }

    #[test]
    fn ownership_is_case_insensitive() {
        assert!(order(1, 1).is_owned_by("quiet-falcon-42"));
        assert!(!order(1, 1).is_owned_by("someone-else"));
    }

    #[test]
    fn deserializes_server_field_names() {
        let json = r#"{
            "id": "ord-7",
            "owner_rsn": "Brave-Otter-9",
            "order_type": "BUY",
            "item_id": 560,
            "item_name": "Death rune",
            "quantity": 200,
            "price_per_item": 150
        }"#;
        let order: TradeOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.order_id, "ord-7");
        assert_eq!(order.order_type, OrderType::Buy);
        assert_eq!(order.total_price(), Some(30_000));
    }
}
