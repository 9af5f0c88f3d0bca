//! Venue capability adapter.
//!
//! The engine is venue-agnostic: everything wire-specific (endpoints,
//! authentication, message framing, pagination tokens) lives behind the
//! [`VenueAdapter`] trait. The engine drives the adapter; the adapter never
//! calls back into the engine.

use crate::error::{Error, Result};
use crate::types::{Balance, Bbo, Fill, Instrument, Ohlcv, Order, Position, Trade};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transport preference for order submission and cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMethod {
    /// Request/response endpoint.
    Rest,
    /// Streaming channel.
    Websocket,
}

/// Logical stream grouping.
///
/// Market data and account data are carried on separate venue connections so
/// that a public-feed disruption never stalls private updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelGroup {
    /// Public market data (quotes, trades, candles).
    MarketData,
    /// Private account data (orders, fills, positions, balances).
    Account,
}

impl std::fmt::Display for ChannelGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarketData => f.write_str("market_data"),
            Self::Account => f.write_str("account"),
        }
    }
}

/// Stream channel kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Best bid/offer updates.
    Bbo,
    /// Public trade prints.
    Trade,
    /// Candlestick updates.
    Ohlcv,
    /// Own-order lifecycle updates.
    Order,
    /// Own-fill notifications.
    Fill,
    /// Position updates.
    Position,
    /// Balance updates.
    Balance,
}

impl ChannelKind {
    /// The stream group this channel is carried on.
    #[must_use]
    pub fn group(self) -> ChannelGroup {
        match self {
            Self::Bbo | Self::Trade | Self::Ohlcv => ChannelGroup::MarketData,
            Self::Order | Self::Fill | Self::Position | Self::Balance => ChannelGroup::Account,
        }
    }
}

/// A single channel subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Channel kind.
    pub channel: ChannelKind,
    /// Symbol for per-symbol channels; `None` for account-wide channels.
    pub symbol: Option<String>,
    /// Candle bucket interval; set only for [`ChannelKind::Ohlcv`].
    pub interval: Option<Duration>,
}

impl ChannelSpec {
    /// Creates a per-symbol channel spec.
    #[must_use]
    pub fn symbol(channel: ChannelKind, symbol: impl Into<String>) -> Self {
        Self {
            channel,
            symbol: Some(symbol.into()),
            interval: None,
        }
    }

    /// Creates a candle channel spec for one symbol and bucket interval.
    #[must_use]
    pub fn ohlcv(symbol: impl Into<String>, interval: Duration) -> Self {
        Self {
            channel: ChannelKind::Ohlcv,
            symbol: Some(symbol.into()),
            interval: Some(interval),
        }
    }

    /// Creates an account-wide channel spec.
    #[must_use]
    pub fn global(channel: ChannelKind) -> Self {
        Self {
            channel,
            symbol: None,
            interval: None,
        }
    }
}

/// A parsed domain event delivered by a stream or a poll.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    /// Top-of-book quote update.
    Bbo(Bbo),
    /// One or more public trade prints.
    Trades(Vec<Trade>),
    /// Candlestick update (in-progress or final).
    Candle(Ohlcv),
    /// Own-order lifecycle update.
    Order(Order),
    /// One or more own-fill executions.
    Fills(Vec<Fill>),
    /// Position update.
    Position(Position),
    /// Balance update.
    Balance(Balance),
    /// Instrument definitions refresh.
    Instruments(Vec<Instrument>),
}

/// Result of parsing one raw stream message.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPayload {
    /// Domain events carried by the message.
    Events(Vec<MarketEvent>),
    /// A liveness acknowledgment from the venue.
    Heartbeat,
    /// A message with no engine-relevant content (subscribe acks etc.).
    Ignore,
}

/// One page of a paginated history response, newest entries first.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Entries in this page, newest first.
    pub items: Vec<T>,
    /// Cursor for the next (older) page; `None` when exhausted.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// An empty terminal page.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }
}

/// Venue acknowledgment of an accepted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    /// Venue-assigned order id.
    pub order_id: String,
    /// Venue acknowledgment timestamp in milliseconds.
    pub timestamp: i64,
}

/// An open stream connection to the venue.
///
/// Implementations own the underlying socket; the engine's connection
/// manager owns the instance and is the only caller.
#[async_trait]
pub trait VenueStream: Send {
    /// Subscribes to the given channels in a single venue request.
    async fn subscribe(&mut self, channels: &[ChannelSpec]) -> Result<()>;

    /// Waits for the next raw message.
    ///
    /// Returns `Ok(None)` when the venue closed the stream cleanly.
    async fn next_message(&mut self) -> Result<Option<String>>;

    /// Sends a protocol-level heartbeat (ping).
    async fn send_heartbeat(&mut self) -> Result<()>;

    /// Closes the stream.
    async fn close(&mut self) -> Result<()>;
}

/// The full venue capability surface the engine drives.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Selects the live or sandbox/paper endpoint set.
    ///
    /// The engine calls this once at start, before any other adapter call.
    /// The default rejects sandbox mode for venues with no alternate
    /// endpoints.
    async fn set_sandbox_mode(&self, enabled: bool) -> Result<()> {
        if enabled {
            return Err(Error::config("venue has no sandbox endpoints"));
        }
        Ok(())
    }

    /// Opens a stream connection for the given group.
    async fn open_stream(&self, group: ChannelGroup) -> Result<Box<dyn VenueStream>>;

    /// Parses one raw stream message into domain events.
    fn parse_message(&self, raw: &str) -> Result<StreamPayload>;

    /// Fetches a page of historical public trades for `[start, end)`.
    async fn fetch_trades(
        &self,
        symbol: &str,
        start: i64,
        end: i64,
        cursor: Option<&str>,
    ) -> Result<Page<Trade>>;

    /// Fetches a page of historical candles for `[start, end)` at the
    /// given bucket interval.
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Duration,
        start: i64,
        end: i64,
        cursor: Option<&str>,
    ) -> Result<Page<Ohlcv>>;

    /// Fetches a page of historical own orders for `[start, end)`.
    async fn fetch_orders(
        &self,
        symbol: &str,
        start: i64,
        end: i64,
        cursor: Option<&str>,
    ) -> Result<Page<Order>>;

    /// Fetches a page of historical own fills for `[start, end)`.
    async fn fetch_fills(
        &self,
        symbol: &str,
        start: i64,
        end: i64,
        cursor: Option<&str>,
    ) -> Result<Page<Fill>>;

    /// Fetches currently open orders, optionally restricted to one symbol.
    async fn fetch_open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>>;

    /// Fetches the authoritative state of a single order.
    ///
    /// At least one of `order_id` / `client_order_id` must be provided.
    async fn fetch_order_status(
        &self,
        symbol: &str,
        order_id: Option<&str>,
        client_order_id: Option<&str>,
    ) -> Result<Order>;

    /// Submits an order.
    async fn submit_order(&self, order: &Order, method: ApiMethod) -> Result<OrderAck>;

    /// Cancels an order.
    async fn cancel_order(
        &self,
        symbol: &str,
        order_id: Option<&str>,
        client_order_id: Option<&str>,
        method: ApiMethod,
    ) -> Result<()>;

    /// Fetches instrument definitions.
    async fn fetch_instruments(&self) -> Result<Vec<Instrument>>;

    /// Fetches current top-of-book quotes for the given symbols.
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Bbo>>;

    /// Fetches current positions.
    async fn fetch_positions(&self) -> Result<Vec<Position>>;

    /// Fetches current balances.
    async fn fetch_balances(&self) -> Result<Vec<Balance>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_groups() {
        assert_eq!(ChannelKind::Bbo.group(), ChannelGroup::MarketData);
        assert_eq!(ChannelKind::Trade.group(), ChannelGroup::MarketData);
        assert_eq!(ChannelKind::Ohlcv.group(), ChannelGroup::MarketData);
        assert_eq!(ChannelKind::Order.group(), ChannelGroup::Account);
        assert_eq!(ChannelKind::Balance.group(), ChannelGroup::Account);
    }

    #[test]
    fn test_channel_spec_constructors() {
        let per_symbol = ChannelSpec::symbol(ChannelKind::Bbo, "BTC-USDT");
        assert_eq!(per_symbol.symbol.as_deref(), Some("BTC-USDT"));
        assert!(per_symbol.interval.is_none());

        let candles = ChannelSpec::ohlcv("BTC-USDT", Duration::from_secs(300));
        assert_eq!(candles.channel, ChannelKind::Ohlcv);
        assert_eq!(candles.interval, Some(Duration::from_secs(300)));

        let global = ChannelSpec::global(ChannelKind::Balance);
        assert!(global.symbol.is_none());
    }
}
