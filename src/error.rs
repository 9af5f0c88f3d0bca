//! Error types for the synchronization engine.
//!
//! Failures are grouped by how callers should react to them rather than by
//! where they originate:
//!
//! - **Retryable**: [`Error::Transport`], [`Error::Timeout`] and
//!   [`Error::RateLimit`] — safe to retry for idempotent requests.
//! - **Terminal**: [`Error::VenueRejection`], [`Error::OrderNotFound`] and
//!   [`Error::InvalidRequest`] — the venue gave a definitive answer.
//! - **Ambiguous**: [`Error::Ambiguous`] — the outcome of a state-changing
//!   request is unknown; reconciliation resolves it, never a retry.
//! - **Fatal**: [`Error::Config`] — refused at engine construction.

use std::borrow::Cow;
use std::time::Duration;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all engine operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transient transport failure (connection refused, reset, DNS, ...).
    #[error("Transport error: {0}")]
    Transport(Cow<'static, str>),

    /// A request did not complete within the configured timeout.
    #[error("Timeout: {0}")]
    Timeout(Cow<'static, str>),

    /// The venue signalled that the request rate was exceeded.
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        /// Human-readable description from the venue.
        message: Cow<'static, str>,
        /// Venue-suggested wait before retrying, when provided.
        retry_after: Option<Duration>,
    },

    /// The venue explicitly rejected a request.
    #[error("Venue rejection ({code}): {message}")]
    VenueRejection {
        /// Venue-specific rejection code.
        code: Cow<'static, str>,
        /// Human-readable rejection reason.
        message: Cow<'static, str>,
    },

    /// A state-changing request may or may not have taken effect.
    #[error("Ambiguous outcome: {0}")]
    Ambiguous(Cow<'static, str>),

    /// A venue message could not be parsed or violated the expected shape.
    #[error("Protocol error: {0}")]
    Protocol(Cow<'static, str>),

    /// The referenced order is unknown to the venue.
    #[error("Order not found: {0}")]
    OrderNotFound(Cow<'static, str>),

    /// The request was malformed before it ever reached the venue.
    #[error("Invalid request: {0}")]
    InvalidRequest(Cow<'static, str>),

    /// Engine configuration is invalid; construction is refused.
    #[error("Configuration error: {0}")]
    Config(Cow<'static, str>),

    /// The operation was cancelled by shutdown.
    #[error("Operation cancelled: {0}")]
    Cancelled(Cow<'static, str>),

    /// JSON serialization/deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Creates a transport error.
    pub fn transport(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a timeout error.
    pub fn timeout(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates a rate-limit error with an optional venue-suggested delay.
    pub fn rate_limit(msg: impl Into<Cow<'static, str>>, retry_after: Option<Duration>) -> Self {
        Self::RateLimit {
            message: msg.into(),
            retry_after,
        }
    }

    /// Creates a venue-rejection error.
    pub fn venue_rejection(
        code: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::VenueRejection {
            code: code.into(),
            message: msg.into(),
        }
    }

    /// Creates an ambiguous-outcome error.
    pub fn ambiguous(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Ambiguous(msg.into())
    }

    /// Creates a protocol error.
    pub fn protocol(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Creates an order-not-found error.
    pub fn order_not_found(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::OrderNotFound(msg.into())
    }

    /// Creates an invalid-request error.
    pub fn invalid_request(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Creates a configuration error.
    pub fn config(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a cancellation error.
    pub fn cancelled(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Returns `true` if retrying the same request may succeed.
    ///
    /// Only idempotent requests should be retried automatically; order
    /// submission and cancellation are resolved through reconciliation
    /// instead.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::RateLimit { .. }
        )
    }

    /// Returns `true` if the venue gave a definitive negative answer.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::VenueRejection { .. } | Self::OrderNotFound(_) | Self::InvalidRequest(_)
        )
    }

    /// Returns the venue-suggested retry delay, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns `true` if this error was caused by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
