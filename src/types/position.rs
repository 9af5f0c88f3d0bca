//! Position snapshots.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A derivative position for a single symbol.
///
/// `size` is signed: positive for long, negative for short. A zero-size
/// update removes the mirrored entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Trading symbol.
    pub symbol: String,
    /// Signed position size.
    pub size: Decimal,
    /// Average entry price.
    pub entry_price: Decimal,
    /// Unrealized profit and loss.
    pub unrealized_pnl: Decimal,
    /// Venue timestamp in milliseconds.
    pub timestamp: i64,
}

impl Position {
    /// Returns `true` when the position is flat.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.size.is_zero()
    }
}
