//! Domain data types.
//!
//! All timestamps are `i64` milliseconds since the Unix epoch (UTC); all
//! prices, sizes and fees use `rust_decimal::Decimal` for exact arithmetic.

pub mod balance;
pub mod bbo;
pub mod fill;
pub mod instrument;
pub mod ohlcv;
pub mod order;
pub mod position;
pub mod trade;

pub use balance::Balance;
pub use bbo::Bbo;
pub use fill::Fill;
pub use instrument::Instrument;
pub use ohlcv::Ohlcv;
pub use order::{Order, OrderSide, OrderStatus, OrderType, TimeInForce};
pub use position::Position;
pub use trade::Trade;

use serde::{Deserialize, Serialize};

/// Kinds of mirrored data, used to address tables, gates and retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    /// Best bid/offer quotes (latest-value).
    Bbo,
    /// Public trade prints (sequence).
    Trade,
    /// Candlestick buckets (interval sequence).
    Ohlcv,
    /// Own orders (keyed lifecycle records).
    Order,
    /// Own fills (sequence).
    Fill,
    /// Positions (latest-value).
    Position,
    /// Balances (latest-value).
    Balance,
}

impl DataKind {
    /// Every kind, in table order.
    pub const ALL: [Self; 7] = [
        Self::Bbo,
        Self::Trade,
        Self::Ohlcv,
        Self::Order,
        Self::Fill,
        Self::Position,
        Self::Balance,
    ];

    /// Returns `true` for append-style kinds that support backfill and
    /// retention pruning.
    #[must_use]
    pub fn is_sequence(self) -> bool {
        matches!(self, Self::Trade | Self::Fill | Self::Ohlcv | Self::Order)
    }
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Bbo => "bbo",
            Self::Trade => "trade",
            Self::Ohlcv => "ohlcv",
            Self::Order => "order",
            Self::Fill => "fill",
            Self::Position => "position",
            Self::Balance => "balance",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_kind_partition() {
        let sequence: Vec<DataKind> = DataKind::ALL
            .into_iter()
            .filter(|kind| kind.is_sequence())
            .collect();
        assert_eq!(
            sequence,
            vec![DataKind::Trade, DataKind::Ohlcv, DataKind::Order, DataKind::Fill]
        );
        // Latest-value kinds carry no history to backfill or prune.
        assert!(!DataKind::Bbo.is_sequence());
        assert!(!DataKind::Position.is_sequence());
        assert!(!DataKind::Balance.is_sequence());
    }
}
