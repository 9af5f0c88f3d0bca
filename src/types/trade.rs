//! Public trade prints.

use crate::types::order::OrderSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single executed trade reported by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Trading symbol.
    pub symbol: String,
    /// Venue-assigned trade id, unique per symbol.
    pub id: String,
    /// Execution price.
    pub price: Decimal,
    /// Executed size.
    pub size: Decimal,
    /// Taker side of the trade.
    pub side: OrderSide,
    /// Venue timestamp in milliseconds.
    pub timestamp: i64,
}

impl Trade {
    /// Notional value of the trade (price × size).
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_notional() {
        let trade = Trade {
            symbol: "ETH-USDT".to_string(),
            id: "t-1".to_string(),
            price: dec!(3000),
            size: dec!(0.5),
            side: OrderSide::Buy,
            timestamp: 1704110400000,
        };
        assert_eq!(trade.notional(), dec!(1500));
    }
}
