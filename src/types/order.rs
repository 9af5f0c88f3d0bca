//! Order types and the order lifecycle state machine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Limit order with an explicit price.
    Limit,
    /// Market order executed at the best available price.
    Market,
}

/// Time-in-force policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Good till canceled.
    Gtc,
    /// Immediate or cancel.
    Ioc,
    /// Fill or kill.
    Fok,
}

/// Order lifecycle state.
///
/// The machine only moves forward:
///
/// ```text
/// Submitted -> InFlight -> { Open, Rejected }
/// Open -> { PartiallyFilled, Filled, Canceled }
/// PartiallyFilled -> { Filled, Canceled }
/// ```
///
/// `Filled`, `Canceled` and `Rejected` are terminal and never re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Recorded locally, not yet dispatched to the venue.
    Submitted,
    /// Dispatched; no venue acknowledgment yet.
    InFlight,
    /// Acknowledged by the venue and resting.
    Open,
    /// Resting with partial execution.
    PartiallyFilled,
    /// Fully executed.
    Filled,
    /// Canceled before full execution.
    Canceled,
    /// Refused by the venue.
    Rejected,
}

impl OrderStatus {
    /// Returns `true` for states that can never change again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected)
    }

    /// Returns `true` for states resting on the venue book.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open | Self::PartiallyFilled)
    }

    /// Returns `true` for states awaiting a venue acknowledgment.
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Submitted | Self::InFlight)
    }

    /// Returns `true` if the machine permits moving from `self` to `next`.
    ///
    /// A self-transition is always allowed for non-terminal states so that
    /// repeated venue updates (e.g. growing partial fills) can merge.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return !self.is_terminal();
        }
        match self {
            Self::Submitted => matches!(
                next,
                Self::InFlight
                    | Self::Open
                    | Self::PartiallyFilled
                    | Self::Filled
                    | Self::Canceled
                    | Self::Rejected
            ),
            Self::InFlight => matches!(
                next,
                Self::Open | Self::PartiallyFilled | Self::Filled | Self::Canceled | Self::Rejected
            ),
            Self::Open => matches!(next, Self::PartiallyFilled | Self::Filled | Self::Canceled),
            Self::PartiallyFilled => matches!(next, Self::Filled | Self::Canceled),
            Self::Filled | Self::Canceled | Self::Rejected => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::InFlight => "in_flight",
            Self::Open => "open",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::Canceled => "canceled",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// An order as tracked by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Venue-assigned order id; absent until acknowledged.
    pub id: Option<String>,
    /// Locally generated client order id; present from submission on.
    pub client_id: String,
    /// Trading symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Limit or market.
    pub order_type: OrderType,
    /// Limit price; `None` for market orders.
    pub price: Option<Decimal>,
    /// Requested size.
    pub size: Decimal,
    /// Cumulative executed size, monotonically non-decreasing.
    pub filled_size: Decimal,
    /// Current lifecycle state.
    pub status: OrderStatus,
    /// Post-only flag (maker-only).
    pub post_only: bool,
    /// Reduce-only flag for derivative venues.
    pub reduce_only: bool,
    /// Time-in-force policy.
    pub time_in_force: TimeInForce,
    /// Local creation time in milliseconds.
    pub created_at: i64,
    /// Timestamp of the most recent accepted update in milliseconds.
    pub updated_at: i64,
}

impl Order {
    /// Creates a limit order ready for submission.
    #[must_use]
    pub fn limit(
        client_id: String,
        symbol: String,
        side: OrderSide,
        price: Decimal,
        size: Decimal,
        now: i64,
    ) -> Self {
        Self {
            id: None,
            client_id,
            symbol,
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            size,
            filled_size: Decimal::ZERO,
            status: OrderStatus::Submitted,
            post_only: false,
            reduce_only: false,
            time_in_force: TimeInForce::Gtc,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a market order ready for submission.
    #[must_use]
    pub fn market(
        client_id: String,
        symbol: String,
        side: OrderSide,
        size: Decimal,
        now: i64,
    ) -> Self {
        Self {
            id: None,
            client_id,
            symbol,
            side,
            order_type: OrderType::Market,
            price: None,
            size,
            filled_size: Decimal::ZERO,
            status: OrderStatus::Submitted,
            post_only: false,
            reduce_only: false,
            time_in_force: TimeInForce::Ioc,
            created_at: now,
            updated_at: now,
        }
    }

    /// Remaining unexecuted size.
    #[must_use]
    pub fn remaining_size(&self) -> Decimal {
        (self.size - self.filled_size).max(Decimal::ZERO)
    }
}
