//! Own-trade executions (fills).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single execution against one of our orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Trading symbol.
    pub symbol: String,
    /// Venue order id the fill belongs to.
    pub order_id: String,
    /// Venue-assigned execution id, unique per symbol.
    pub trade_id: String,
    /// Execution price.
    pub price: Decimal,
    /// Executed size.
    pub size: Decimal,
    /// Fee charged for this execution.
    pub fee: Decimal,
    /// Asset the fee is denominated in.
    pub fee_asset: String,
    /// Venue timestamp in milliseconds.
    pub timestamp: i64,
}

impl Fill {
    /// Notional value of the fill (price × size).
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}
