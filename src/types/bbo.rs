//! Best bid/offer quote.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-of-book quote for a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bbo {
    /// Trading symbol, e.g. "BTC-USDT".
    pub symbol: String,
    /// Best bid price.
    pub bid: Decimal,
    /// Size available at the best bid.
    pub bid_size: Decimal,
    /// Best ask price.
    pub ask: Decimal,
    /// Size available at the best ask.
    pub ask_size: Decimal,
    /// Venue timestamp in milliseconds.
    pub timestamp: i64,
}

impl Bbo {
    /// Midpoint of the bid and ask prices.
    #[must_use]
    pub fn mid_price(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Ask minus bid.
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }
}
