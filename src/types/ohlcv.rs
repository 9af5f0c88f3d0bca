//! Candlestick (OHLCV) buckets.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single candlestick interval.
///
/// Buckets are keyed by `interval_start`; an in-progress bucket may be
/// delivered repeatedly with growing volume until `is_final` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    /// Trading symbol.
    pub symbol: String,
    /// Start of the interval in milliseconds, aligned to the interval width.
    pub interval_start: i64,
    /// Opening price.
    pub open: Decimal,
    /// Highest price in the interval.
    pub high: Decimal,
    /// Lowest price in the interval.
    pub low: Decimal,
    /// Closing (or latest) price.
    pub close: Decimal,
    /// Base volume traded in the interval.
    pub volume: Decimal,
    /// Whether the interval has closed.
    pub is_final: bool,
}

impl Ohlcv {
    /// Returns `true` if price data is internally consistent
    /// (`low <= open, close <= high`).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.low <= self.high
            && self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
            && self.volume >= Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle() -> Ohlcv {
        Ohlcv {
            symbol: "BTC-USDT".to_string(),
            interval_start: 1704110400000,
            open: dec!(50000),
            high: dec!(50500),
            low: dec!(49800),
            close: dec!(50200),
            volume: dec!(12.5),
            is_final: true,
        }
    }

    #[test]
    fn test_is_valid() {
        assert!(candle().is_valid());
    }

    #[test]
    fn test_invalid_when_low_above_high() {
        let mut c = candle();
        c.low = dec!(60000);
        assert!(!c.is_valid());
    }
}
