//! Engine configuration.
//!
//! Configuration is immutable once the engine is constructed; invalid
//! combinations are refused at construction with [`Error::Config`].

use crate::adapter::ApiMethod;
use crate::error::{Error, Result};
use crate::types::DataKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which symbols the engine tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolSelection {
    /// Every instrument the venue reports as open for trading.
    All,
    /// An explicit symbol list.
    List(Vec<String>),
}

impl SymbolSelection {
    /// Returns `true` when the selection resolves against the instrument
    /// table at start.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::All)
    }
}

/// Historical backfill window for one sequence kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// Oldest timestamp to reach back to, in milliseconds.
    pub start: i64,
    /// Newest boundary; `None` means "now" at engine start.
    pub end: Option<i64>,
}

/// Retention policy for one sequence kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Entries older than `now - horizon` are pruned.
    pub horizon: Duration,
    /// How often the sweep runs.
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            horizon: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Which stream channels to subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubscribeFlags {
    /// Best bid/offer quotes.
    pub bbo: bool,
    /// Public trades.
    pub trade: bool,
    /// Candlesticks.
    pub ohlcv: bool,
    /// Own orders.
    pub order: bool,
    /// Own fills.
    pub fill: bool,
    /// Positions.
    pub position: bool,
    /// Balances.
    pub balance: bool,
}

impl SubscribeFlags {
    /// Returns `true` if any market-data channel is enabled.
    #[must_use]
    pub fn any_market_data(&self) -> bool {
        self.bbo || self.trade || self.ohlcv
    }

    /// Returns `true` if any account channel is enabled.
    #[must_use]
    pub fn any_account(&self) -> bool {
        self.order || self.fill || self.position || self.balance
    }
}

/// Periodic REST polling intervals. `None` disables the poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Top-of-book quote refresh.
    pub quotes: Option<Duration>,
    /// Position refresh.
    pub positions: Option<Duration>,
    /// Balance refresh.
    pub balances: Option<Duration>,
    /// Instrument table refresh.
    pub instruments: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            quotes: Some(Duration::from_secs(300)),
            positions: Some(Duration::from_secs(60)),
            balances: Some(Duration::from_secs(60)),
            instruments: Some(Duration::from_secs(300)),
        }
    }
}

/// Order reconciliation timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Period of the open-order cross-check.
    pub open_order_check_period: Duration,
    /// Open orders untouched for longer than this are individually verified.
    pub open_order_staleness: Duration,
    /// Period of the in-flight order check.
    pub in_flight_check_period: Duration,
    /// In-flight orders older than this are individually verified.
    pub in_flight_threshold: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            open_order_check_period: Duration::from_secs(60),
            open_order_staleness: Duration::from_secs(60),
            in_flight_check_period: Duration::from_secs(10),
            in_flight_threshold: Duration::from_secs(10),
        }
    }
}

/// Stream heartbeat timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// How often a protocol-level ping is sent.
    pub protocol_period: Duration,
    /// Connection is declared dead if nothing arrives for this long.
    pub liveness_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            protocol_period: Duration::from_secs(10),
            liveness_timeout: Duration::from_secs(20),
        }
    }
}

/// Per-category minimum delay between consecutive requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Market-data requests (quotes, candles, trades).
    pub market_data: Duration,
    /// Account requests (orders, fills, positions, balances).
    pub account: Duration,
    /// Trading requests (submit, cancel).
    pub trading: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            market_data: Duration::from_millis(50),
            account: Duration::from_millis(50),
            trading: Duration::ZERO,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Symbols to track; `All` resolves against active instruments at start.
    pub symbols: SymbolSelection,
    /// Stream channels to subscribe to.
    pub subscribe: SubscribeFlags,
    /// Candle interval in milliseconds.
    pub ohlcv_interval: Duration,
    /// Backfill windows per sequence kind. Absent kinds are not backfilled.
    pub backfill_trades: Option<BackfillConfig>,
    /// Candle backfill window.
    pub backfill_ohlcv: Option<BackfillConfig>,
    /// Own-order backfill window.
    pub backfill_orders: Option<BackfillConfig>,
    /// Own-fill backfill window.
    pub backfill_fills: Option<BackfillConfig>,
    /// Retention per sequence kind. Absent kinds are kept forever.
    pub retention_trades: Option<RetentionConfig>,
    /// Candle retention.
    pub retention_ohlcv: Option<RetentionConfig>,
    /// Terminal-order retention.
    pub retention_orders: Option<RetentionConfig>,
    /// Fill retention.
    pub retention_fills: Option<RetentionConfig>,
    /// REST polling intervals.
    pub poll: PollConfig,
    /// Reconciliation timing.
    pub reconcile: ReconcileConfig,
    /// Heartbeat timing.
    pub heartbeat: HeartbeatConfig,
    /// Whether streams reconnect automatically.
    pub auto_reconnect: bool,
    /// Maximum channel-symbol pairs per subscribe request.
    pub max_symbols_per_request: usize,
    /// Delay between consecutive subscribe requests.
    pub subscribe_request_delay: Duration,
    /// Request pacing per category.
    pub pacing: PacingConfig,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Preferred transport for order submission/cancellation.
    pub order_method: ApiMethod,
    /// Cancel all venue-reported open orders before synchronization starts.
    pub cancel_open_orders_at_start: bool,
    /// Seed the order table from the venue's open-order listing at start.
    pub fetch_open_orders_at_start: bool,
    /// Use the venue's sandbox environment (consumed by the adapter).
    pub sandbox: bool,
    /// Grace period granted to in-flight work at shutdown.
    pub stop_grace: Duration,
    /// Consecutive unparseable messages before the stream is recycled.
    pub protocol_error_threshold: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: SymbolSelection::All,
            subscribe: SubscribeFlags::default(),
            ohlcv_interval: Duration::from_secs(60),
            backfill_trades: None,
            backfill_ohlcv: None,
            backfill_orders: None,
            backfill_fills: None,
            retention_trades: None,
            retention_ohlcv: None,
            retention_orders: None,
            retention_fills: None,
            poll: PollConfig::default(),
            reconcile: ReconcileConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            auto_reconnect: true,
            max_symbols_per_request: 50,
            subscribe_request_delay: Duration::from_millis(50),
            pacing: PacingConfig::default(),
            request_timeout: Duration::from_secs(10),
            order_method: ApiMethod::Rest,
            cancel_open_orders_at_start: false,
            fetch_open_orders_at_start: true,
            sandbox: false,
            stop_grace: Duration::from_secs(1),
            protocol_error_threshold: 5,
        }
    }
}

impl EngineConfig {
    /// Creates a builder with defaults.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Returns the backfill window configured for a sequence kind.
    #[must_use]
    pub fn backfill_for(&self, kind: DataKind) -> Option<BackfillConfig> {
        match kind {
            DataKind::Trade => self.backfill_trades,
            DataKind::Ohlcv => self.backfill_ohlcv,
            DataKind::Order => self.backfill_orders,
            DataKind::Fill => self.backfill_fills,
            _ => None,
        }
    }

    /// Returns the retention policy configured for a sequence kind.
    #[must_use]
    pub fn retention_for(&self, kind: DataKind) -> Option<RetentionConfig> {
        match kind {
            DataKind::Trade => self.retention_trades,
            DataKind::Ohlcv => self.retention_ohlcv,
            DataKind::Order => self.retention_orders,
            DataKind::Fill => self.retention_fills,
            _ => None,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if let SymbolSelection::List(symbols) = &self.symbols {
            if symbols.is_empty() {
                return Err(Error::config("symbol list must not be empty"));
            }
        }
        for (name, window) in [
            ("trades", self.backfill_trades),
            ("ohlcv", self.backfill_ohlcv),
            ("orders", self.backfill_orders),
            ("fills", self.backfill_fills),
        ] {
            if let Some(window) = window {
                if window.start < 0 {
                    return Err(Error::config(format!(
                        "backfill {name}: start must be non-negative"
                    )));
                }
                if let Some(end) = window.end {
                    if end < window.start {
                        return Err(Error::config(format!(
                            "backfill {name}: end {} precedes start {}",
                            end, window.start
                        )));
                    }
                }
            }
        }
        for (name, retention) in [
            ("trades", self.retention_trades),
            ("ohlcv", self.retention_ohlcv),
            ("orders", self.retention_orders),
            ("fills", self.retention_fills),
        ] {
            if let Some(retention) = retention {
                if retention.horizon.is_zero() || retention.sweep_interval.is_zero() {
                    return Err(Error::config(format!(
                        "retention {name}: horizon and sweep interval must be positive"
                    )));
                }
            }
        }
        if self.ohlcv_interval.is_zero() {
            return Err(Error::config("ohlcv interval must be positive"));
        }
        if self.heartbeat.liveness_timeout.is_zero() {
            return Err(Error::config("liveness timeout must be positive"));
        }
        if self.max_symbols_per_request == 0 {
            return Err(Error::config("max symbols per request must be positive"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config("request timeout must be positive"));
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Sets the tracked symbols.
    #[must_use]
    pub fn symbols(mut self, symbols: SymbolSelection) -> Self {
        self.config.symbols = symbols;
        self
    }

    /// Sets the stream subscription flags.
    #[must_use]
    pub fn subscribe(mut self, flags: SubscribeFlags) -> Self {
        self.config.subscribe = flags;
        self
    }

    /// Sets the candle interval.
    #[must_use]
    pub fn ohlcv_interval(mut self, interval: Duration) -> Self {
        self.config.ohlcv_interval = interval;
        self
    }

    /// Sets the backfill window for a sequence kind.
    #[must_use]
    pub fn backfill(mut self, kind: DataKind, window: BackfillConfig) -> Self {
        match kind {
            DataKind::Trade => self.config.backfill_trades = Some(window),
            DataKind::Ohlcv => self.config.backfill_ohlcv = Some(window),
            DataKind::Order => self.config.backfill_orders = Some(window),
            DataKind::Fill => self.config.backfill_fills = Some(window),
            _ => {}
        }
        self
    }

    /// Sets the retention policy for a sequence kind.
    #[must_use]
    pub fn retention(mut self, kind: DataKind, retention: RetentionConfig) -> Self {
        match kind {
            DataKind::Trade => self.config.retention_trades = Some(retention),
            DataKind::Ohlcv => self.config.retention_ohlcv = Some(retention),
            DataKind::Order => self.config.retention_orders = Some(retention),
            DataKind::Fill => self.config.retention_fills = Some(retention),
            _ => {}
        }
        self
    }

    /// Sets the REST polling intervals.
    #[must_use]
    pub fn poll(mut self, poll: PollConfig) -> Self {
        self.config.poll = poll;
        self
    }

    /// Sets the reconciliation timing.
    #[must_use]
    pub fn reconcile(mut self, reconcile: ReconcileConfig) -> Self {
        self.config.reconcile = reconcile;
        self
    }

    /// Sets the heartbeat timing.
    #[must_use]
    pub fn heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.config.heartbeat = heartbeat;
        self
    }

    /// Enables or disables automatic reconnection.
    #[must_use]
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.auto_reconnect = enabled;
        self
    }

    /// Sets the request pacing.
    #[must_use]
    pub fn pacing(mut self, pacing: PacingConfig) -> Self {
        self.config.pacing = pacing;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Sets the preferred transport for order operations.
    #[must_use]
    pub fn order_method(mut self, method: ApiMethod) -> Self {
        self.config.order_method = method;
        self
    }

    /// Enables cancellation of resting orders at engine start.
    #[must_use]
    pub fn cancel_open_orders_at_start(mut self, enabled: bool) -> Self {
        self.config.cancel_open_orders_at_start = enabled;
        self
    }

    /// Enables the sandbox environment.
    #[must_use]
    pub fn sandbox(mut self, enabled: bool) -> Self {
        self.config.sandbox = enabled;
        self
    }

    /// Validates and returns the finished configuration.
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
