//! Instrument definitions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Static definition of a tradable instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// Trading symbol, e.g. "BTC-USDT".
    pub symbol: String,
    /// Base asset.
    pub base: String,
    /// Quote asset.
    pub quote: String,
    /// Minimum price step.
    pub price_increment: Decimal,
    /// Minimum size step.
    pub size_increment: Decimal,
    /// Smallest order size the venue accepts.
    pub min_size: Decimal,
    /// Whether the instrument is currently open for trading.
    pub active: bool,
}
