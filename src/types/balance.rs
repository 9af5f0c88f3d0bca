//! Asset balance snapshots.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Balance of a single asset.
///
/// A zero-total update removes the mirrored entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Asset code, e.g. "USDT".
    pub asset: String,
    /// Amount available for new orders.
    pub free: Decimal,
    /// Amount locked by resting orders.
    pub locked: Decimal,
    /// Venue timestamp in milliseconds.
    pub timestamp: i64,
}

impl Balance {
    /// Total balance (free + locked).
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}
