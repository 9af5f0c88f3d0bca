//! In-memory mirror of venue state.
//!
//! The mirror holds every table the engine synchronizes: latest-value tables
//! (quotes, positions, balances), ordered sequence tables (trades, fills),
//! candle buckets and the order lifecycle table. All merges are idempotent:
//! replaying any event stream leaves the tables unchanged.
//!
//! Writes are performed exclusively by the engine's apply task; the public
//! mutation methods exist for that task alone. Readers take snapshots
//! through the shared read lock and never observe a half-applied merge.

use crate::types::{
    Balance, Bbo, DataKind, Fill, Instrument, Ohlcv, Order, OrderStatus, Position, Trade,
};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// An entry of an ordered sequence table.
pub trait SequenceEntry: Clone {
    /// Venue-unique id within the table.
    fn entry_id(&self) -> &str;
    /// Venue timestamp in milliseconds.
    fn entry_timestamp(&self) -> i64;
}

impl SequenceEntry for Trade {
    fn entry_id(&self) -> &str {
        &self.id
    }
    fn entry_timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl SequenceEntry for Fill {
    fn entry_id(&self) -> &str {
        &self.trade_id
    }
    fn entry_timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// A per-symbol sequence table: entries sorted by `(timestamp, id)` with
/// duplicate-id suppression.
#[derive(Debug, Clone)]
pub struct SequenceTable<T: SequenceEntry> {
    entries: Vec<T>,
    ids: HashSet<String>,
}

impl<T: SequenceEntry> Default for SequenceTable<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            ids: HashSet::new(),
        }
    }
}

impl<T: SequenceEntry> SequenceTable<T> {
    /// Inserts an entry in sorted position.
    ///
    /// A duplicate id is ignored unless `replace` is set, in which case the
    /// stored copy is overwritten in place. Returns `true` if the table
    /// changed.
    pub fn insert(&mut self, entry: T, replace: bool) -> bool {
        if self.ids.contains(entry.entry_id()) {
            if !replace {
                return false;
            }
            if let Some(existing) = self
                .entries
                .iter_mut()
                .find(|e| e.entry_id() == entry.entry_id())
            {
                *existing = entry;
                return true;
            }
            return false;
        }
        let key = (entry.entry_timestamp(), entry.entry_id().to_string());
        let pos = self
            .entries
            .partition_point(|e| (e.entry_timestamp(), e.entry_id().to_string()) <= key);
        self.ids.insert(entry.entry_id().to_string());
        self.entries.insert(pos, entry);
        true
    }

    /// Removes entries older than `cutoff`. Returns the number removed.
    pub fn prune(&mut self, cutoff: i64) -> usize {
        let keep_from = self.entries.partition_point(|e| e.entry_timestamp() < cutoff);
        for entry in &self.entries[..keep_from] {
            self.ids.remove(entry.entry_id());
        }
        self.entries.drain(..keep_from);
        keep_from
    }

    /// Entries in timestamp order, oldest first.
    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Buffered live events held back while a backfill is in progress.
#[derive(Debug, Default)]
struct GateBuffers {
    trades: Vec<Trade>,
    fills: Vec<Fill>,
    candles: Vec<Ohlcv>,
}

#[derive(Default)]
struct Tables {
    quotes: HashMap<String, Bbo>,
    positions: HashMap<String, Position>,
    balances: HashMap<String, Balance>,
    instruments: HashMap<String, Instrument>,
    trades: HashMap<String, SequenceTable<Trade>>,
    fills: HashMap<String, SequenceTable<Fill>>,
    candles: HashMap<String, Vec<Ohlcv>>,
    orders: HashMap<String, Order>,
    venue_id_index: HashMap<String, String>,
    gates: HashSet<DataKind>,
    buffers: GateBuffers,
}

/// The outcome of an order merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderMergeOutcome {
    /// The update was applied (status and/or fill progress advanced).
    Applied,
    /// Only fill progress was merged; the status update was stale.
    FillProgressOnly,
    /// Nothing in the update was newer than the stored record.
    Ignored,
    /// The order was unknown and has been inserted.
    Inserted,
}

/// Synchronized mirror of venue state.
pub struct StateMirror {
    inner: RwLock<Tables>,
}

impl Default for StateMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMirror {
    /// Creates an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Tables::default()),
        }
    }

    // ---------------------------------------------------------------
    // Latest-value tables
    // ---------------------------------------------------------------

    /// Merges a quote; older-than-stored updates are dropped.
    pub async fn apply_bbo(&self, bbo: Bbo) {
        let mut tables = self.inner.write().await;
        match tables.quotes.get(&bbo.symbol) {
            Some(existing) if bbo.timestamp < existing.timestamp => {
                trace!(symbol = %bbo.symbol, "stale quote dropped");
            }
            _ => {
                tables.quotes.insert(bbo.symbol.clone(), bbo);
            }
        }
    }

    /// Merges a position. A flat (zero-size) position removes the entry.
    pub async fn apply_position(&self, position: Position) {
        let mut tables = self.inner.write().await;
        if let Some(existing) = tables.positions.get(&position.symbol) {
            if position.timestamp < existing.timestamp {
                return;
            }
        }
        if position.is_flat() {
            tables.positions.remove(&position.symbol);
        } else {
            tables.positions.insert(position.symbol.clone(), position);
        }
    }

    /// Merges a balance. A zero-total balance removes the entry.
    pub async fn apply_balance(&self, balance: Balance) {
        let mut tables = self.inner.write().await;
        if let Some(existing) = tables.balances.get(&balance.asset) {
            if balance.timestamp < existing.timestamp {
                return;
            }
        }
        if balance.total().is_zero() {
            tables.balances.remove(&balance.asset);
        } else {
            tables.balances.insert(balance.asset.clone(), balance);
        }
    }

    /// Replaces the instrument table.
    pub async fn apply_instruments(&self, instruments: Vec<Instrument>) {
        let mut tables = self.inner.write().await;
        tables.instruments = instruments
            .into_iter()
            .map(|i| (i.symbol.clone(), i))
            .collect();
    }

    // ---------------------------------------------------------------
    // Sequence tables
    // ---------------------------------------------------------------

    /// Merges live trade prints. Buffered while the trade gate is closed.
    pub async fn apply_trades(&self, trades: Vec<Trade>) {
        let mut tables = self.inner.write().await;
        if tables.gates.contains(&DataKind::Trade) {
            tables.buffers.trades.extend(trades);
            return;
        }
        for trade in trades {
            let table = tables.trades.entry(trade.symbol.clone()).or_default();
            table.insert(trade, false);
        }
    }

    /// Merges backfilled trades; duplicates of live entries are ignored.
    pub async fn apply_trades_history(&self, trades: Vec<Trade>) {
        let mut tables = self.inner.write().await;
        for trade in trades {
            let table = tables.trades.entry(trade.symbol.clone()).or_default();
            table.insert(trade, false);
        }
    }

    /// Merges live fills. Buffered while the fill gate is closed.
    pub async fn apply_fills(&self, fills: Vec<Fill>) {
        let mut tables = self.inner.write().await;
        if tables.gates.contains(&DataKind::Fill) {
            tables.buffers.fills.extend(fills);
            return;
        }
        for fill in fills {
            let table = tables.fills.entry(fill.symbol.clone()).or_default();
            table.insert(fill, false);
        }
    }

    /// Merges backfilled fills.
    pub async fn apply_fills_history(&self, fills: Vec<Fill>) {
        let mut tables = self.inner.write().await;
        for fill in fills {
            let table = tables.fills.entry(fill.symbol.clone()).or_default();
            table.insert(fill, false);
        }
    }

    /// Merges a candle bucket, replacing an existing bucket with the same
    /// interval start. Buffered while the candle gate is closed.
    pub async fn apply_candle(&self, candle: Ohlcv) {
        let mut tables = self.inner.write().await;
        if tables.gates.contains(&DataKind::Ohlcv) {
            tables.buffers.candles.push(candle);
            return;
        }
        Self::merge_candle(&mut tables, candle);
    }

    /// Merges backfilled candles.
    pub async fn apply_candles_history(&self, candles: Vec<Ohlcv>) {
        let mut tables = self.inner.write().await;
        for candle in candles {
            Self::merge_candle(&mut tables, candle);
        }
    }

    fn merge_candle(tables: &mut Tables, candle: Ohlcv) {
        let buckets = tables.candles.entry(candle.symbol.clone()).or_default();
        match buckets.binary_search_by_key(&candle.interval_start, |c| c.interval_start) {
            Ok(pos) => {
                // A closed bucket is settled; only another final copy may
                // replace it.
                if candle.is_final || !buckets[pos].is_final {
                    buckets[pos] = candle;
                }
            }
            Err(pos) => buckets.insert(pos, candle),
        }
    }

    // ---------------------------------------------------------------
    // Orders
    // ---------------------------------------------------------------

    /// Records a locally created order before dispatch.
    pub async fn record_order(&self, order: Order) {
        let mut tables = self.inner.write().await;
        if let Some(id) = &order.id {
            tables.venue_id_index.insert(id.clone(), order.client_id.clone());
        }
        tables.orders.insert(order.client_id.clone(), order);
    }

    /// Merges an order update through the lifecycle state machine.
    ///
    /// Status moves only along permitted transitions; fill progress is
    /// monotone regardless. An update carrying a stale status but a larger
    /// cumulative fill merges the fill alone.
    pub async fn apply_order(&self, update: Order) -> OrderMergeOutcome {
        let mut tables = self.inner.write().await;

        // Updates keyed by venue id alone are routed via the index.
        let client_id = if tables.orders.contains_key(&update.client_id) {
            update.client_id.clone()
        } else if let Some(mapped) = update
            .id
            .as_ref()
            .and_then(|id| tables.venue_id_index.get(id))
        {
            mapped.clone()
        } else {
            update.client_id.clone()
        };

        if let Some(id) = &update.id {
            tables.venue_id_index.insert(id.clone(), client_id.clone());
        }

        let Some(existing) = tables.orders.get_mut(&client_id) else {
            let mut inserted = update;
            inserted.client_id = client_id.clone();
            tables.orders.insert(client_id, inserted);
            return OrderMergeOutcome::Inserted;
        };

        if existing.id.is_none() && update.id.is_some() {
            existing.id = update.id.clone();
        }

        let status_advances = existing.status != update.status
            && existing.status.can_transition_to(update.status);
        let newer = update.updated_at >= existing.updated_at;
        let fill_advances = update.filled_size > existing.filled_size;

        if status_advances && (newer || fill_advances) {
            existing.status = update.status;
            existing.filled_size = existing.filled_size.max(update.filled_size);
            existing.updated_at = existing.updated_at.max(update.updated_at);
            if update.price.is_some() {
                existing.price = update.price;
            }
            debug!(client_id = %existing.client_id, status = %existing.status, "order advanced");
            OrderMergeOutcome::Applied
        } else if fill_advances && !existing.status.is_terminal() {
            existing.filled_size = update.filled_size;
            existing.updated_at = existing.updated_at.max(update.updated_at);
            OrderMergeOutcome::FillProgressOnly
        } else {
            OrderMergeOutcome::Ignored
        }
    }

    /// Merges a page of historical orders.
    pub async fn apply_orders_history(&self, orders: Vec<Order>) {
        for order in orders {
            self.apply_order(order).await;
        }
    }

    // ---------------------------------------------------------------
    // Gates
    // ---------------------------------------------------------------

    /// Closes the gate for a sequence kind: live events buffer invisibly and
    /// reads return empty until [`release`](Self::release) is called.
    pub async fn gate(&self, kind: DataKind) {
        let mut tables = self.inner.write().await;
        tables.gates.insert(kind);
    }

    /// Opens the gate for a kind, merging buffered live events.
    ///
    /// Buffered live copies replace backfilled duplicates, so an id present
    /// in both ends up with the live-stream version.
    pub async fn release(&self, kind: DataKind) {
        let mut tables = self.inner.write().await;
        if !tables.gates.remove(&kind) {
            return;
        }
        match kind {
            DataKind::Trade => {
                let buffered = std::mem::take(&mut tables.buffers.trades);
                debug!(kind = %kind, buffered = buffered.len(), "gate released");
                for trade in buffered {
                    let table = tables.trades.entry(trade.symbol.clone()).or_default();
                    table.insert(trade, true);
                }
            }
            DataKind::Fill => {
                let buffered = std::mem::take(&mut tables.buffers.fills);
                debug!(kind = %kind, buffered = buffered.len(), "gate released");
                for fill in buffered {
                    let table = tables.fills.entry(fill.symbol.clone()).or_default();
                    table.insert(fill, true);
                }
            }
            DataKind::Ohlcv => {
                let buffered = std::mem::take(&mut tables.buffers.candles);
                debug!(kind = %kind, buffered = buffered.len(), "gate released");
                for candle in buffered {
                    Self::merge_candle(&mut tables, candle);
                }
            }
            _ => {}
        }
    }

    /// Oldest buffered live timestamp for a gated kind, if any.
    ///
    /// The backfill orchestrator uses this as its pagination stop boundary.
    pub async fn gated_oldest_timestamp(&self, kind: DataKind) -> Option<i64> {
        let tables = self.inner.read().await;
        match kind {
            DataKind::Trade => tables.buffers.trades.iter().map(|t| t.timestamp).min(),
            DataKind::Fill => tables.buffers.fills.iter().map(|f| f.timestamp).min(),
            DataKind::Ohlcv => tables.buffers.candles.iter().map(|c| c.interval_start).min(),
            _ => None,
        }
    }

    // ---------------------------------------------------------------
    // Pruning
    // ---------------------------------------------------------------

    /// Removes sequence entries older than `cutoff`.
    ///
    /// Orders are only removed once terminal; open and in-flight orders
    /// survive regardless of age.
    pub async fn prune(&self, kind: DataKind, cutoff: i64) -> usize {
        let mut tables = self.inner.write().await;
        let removed = match kind {
            DataKind::Trade => tables.trades.values_mut().map(|t| t.prune(cutoff)).sum(),
            DataKind::Fill => tables.fills.values_mut().map(|t| t.prune(cutoff)).sum(),
            DataKind::Ohlcv => {
                let mut removed = 0;
                for buckets in tables.candles.values_mut() {
                    let keep_from = buckets.partition_point(|c| c.interval_start < cutoff);
                    buckets.drain(..keep_from);
                    removed += keep_from;
                }
                removed
            }
            DataKind::Order => {
                let stale: Vec<String> = tables
                    .orders
                    .values()
                    .filter(|o| o.status.is_terminal() && o.updated_at < cutoff)
                    .map(|o| o.client_id.clone())
                    .collect();
                for client_id in &stale {
                    if let Some(order) = tables.orders.remove(client_id) {
                        if let Some(id) = &order.id {
                            tables.venue_id_index.remove(id);
                        }
                    }
                }
                stale.len()
            }
            _ => 0,
        };
        if removed > 0 {
            debug!(kind = %kind, removed, cutoff, "pruned");
        }
        removed
    }

    // ---------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------

    /// Latest quote for a symbol.
    pub async fn bbo(&self, symbol: &str) -> Option<Bbo> {
        self.inner.read().await.quotes.get(symbol).cloned()
    }

    /// Trade prints for a symbol, oldest first. Empty while gated.
    pub async fn trades(&self, symbol: &str) -> Vec<Trade> {
        let tables = self.inner.read().await;
        if tables.gates.contains(&DataKind::Trade) {
            return Vec::new();
        }
        tables
            .trades
            .get(symbol)
            .map(|t| t.entries().to_vec())
            .unwrap_or_default()
    }

    /// Candle buckets for a symbol, oldest first. Empty while gated.
    pub async fn candles(&self, symbol: &str) -> Vec<Ohlcv> {
        let tables = self.inner.read().await;
        if tables.gates.contains(&DataKind::Ohlcv) {
            return Vec::new();
        }
        tables.candles.get(symbol).cloned().unwrap_or_default()
    }

    /// Fills for a symbol, oldest first. Empty while gated.
    pub async fn fills(&self, symbol: &str) -> Vec<Fill> {
        let tables = self.inner.read().await;
        if tables.gates.contains(&DataKind::Fill) {
            return Vec::new();
        }
        tables
            .fills
            .get(symbol)
            .map(|t| t.entries().to_vec())
            .unwrap_or_default()
    }

    /// A single order by client id.
    pub async fn order(&self, client_id: &str) -> Option<Order> {
        self.inner.read().await.orders.get(client_id).cloned()
    }

    /// All orders for a symbol.
    pub async fn orders(&self, symbol: &str) -> Vec<Order> {
        self.inner
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect()
    }

    /// Orders resting on the venue book (Open or PartiallyFilled).
    pub async fn open_orders(&self) -> Vec<Order> {
        self.inner
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.status.is_open())
            .cloned()
            .collect()
    }

    /// Orders awaiting acknowledgment (Submitted or InFlight).
    pub async fn in_flight_orders(&self) -> Vec<Order> {
        self.inner
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.status.is_in_flight())
            .cloned()
            .collect()
    }

    /// Position for a symbol.
    pub async fn position(&self, symbol: &str) -> Option<Position> {
        self.inner.read().await.positions.get(symbol).cloned()
    }

    /// All positions.
    pub async fn positions(&self) -> Vec<Position> {
        self.inner.read().await.positions.values().cloned().collect()
    }

    /// Balance for an asset.
    pub async fn balance(&self, asset: &str) -> Option<Balance> {
        self.inner.read().await.balances.get(asset).cloned()
    }

    /// All balances.
    pub async fn balances(&self) -> Vec<Balance> {
        self.inner.read().await.balances.values().cloned().collect()
    }

    /// Instrument definition for a symbol.
    pub async fn instrument(&self, symbol: &str) -> Option<Instrument> {
        self.inner.read().await.instruments.get(symbol).cloned()
    }

    /// All instrument definitions.
    pub async fn instruments(&self) -> Vec<Instrument> {
        self.inner
            .read()
            .await
            .instruments
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderSide, OrderType, TimeInForce};
    use rust_decimal_macros::dec;

    fn trade(id: &str, ts: i64) -> Trade {
        Trade {
            symbol: "BTC-USDT".to_string(),
            id: id.to_string(),
            price: dec!(50000),
            size: dec!(0.1),
            side: OrderSide::Buy,
            timestamp: ts,
        }
    }

    fn bbo(ts: i64, bid: rust_decimal::Decimal) -> Bbo {
        Bbo {
            symbol: "BTC-USDT".to_string(),
            bid,
            bid_size: dec!(1),
            ask: bid + dec!(10),
            ask_size: dec!(1),
            timestamp: ts,
        }
    }

    fn order(client_id: &str, status: OrderStatus, ts: i64) -> Order {
        Order {
            id: None,
            client_id: client_id.to_string(),
            symbol: "BTC-USDT".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            price: Some(dec!(50000)),
            size: dec!(1),
            filled_size: dec!(0),
            status,
            post_only: false,
            reduce_only: false,
            time_in_force: TimeInForce::Gtc,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[tokio::test]
    async fn test_stale_quote_dropped() {
        let mirror = StateMirror::new();
        mirror.apply_bbo(bbo(2000, dec!(50000))).await;
        mirror.apply_bbo(bbo(1000, dec!(49000))).await;
        let stored = mirror.bbo("BTC-USDT").await.unwrap();
        assert_eq!(stored.bid, dec!(50000));
    }

    #[tokio::test]
    async fn test_equal_timestamp_quote_replaces() {
        let mirror = StateMirror::new();
        mirror.apply_bbo(bbo(1000, dec!(50000))).await;
        mirror.apply_bbo(bbo(1000, dec!(50100))).await;
        let stored = mirror.bbo("BTC-USDT").await.unwrap();
        assert_eq!(stored.bid, dec!(50100));
    }

    #[tokio::test]
    async fn test_flat_position_removed() {
        let mirror = StateMirror::new();
        let mut position = Position {
            symbol: "BTC-USDT".to_string(),
            size: dec!(1),
            entry_price: dec!(50000),
            unrealized_pnl: dec!(0),
            timestamp: 1000,
        };
        mirror.apply_position(position.clone()).await;
        assert!(mirror.position("BTC-USDT").await.is_some());

        position.size = dec!(0);
        position.timestamp = 2000;
        mirror.apply_position(position).await;
        assert!(mirror.position("BTC-USDT").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_trade_ignored() {
        let mirror = StateMirror::new();
        mirror.apply_trades(vec![trade("a", 1000)]).await;
        mirror.apply_trades(vec![trade("a", 1000)]).await;
        assert_eq!(mirror.trades("BTC-USDT").await.len(), 1);
    }

    #[tokio::test]
    async fn test_trades_sorted_regardless_of_arrival() {
        let mirror = StateMirror::new();
        mirror
            .apply_trades(vec![trade("c", 3000), trade("a", 1000), trade("b", 2000)])
            .await;
        let stored = mirror.trades("BTC-USDT").await;
        let timestamps: Vec<i64> = stored.iter().map(|t| t.timestamp).collect();
        assert_eq!(timestamps, vec![1000, 2000, 3000]);
    }

    #[tokio::test]
    async fn test_gated_reads_empty_until_release() {
        let mirror = StateMirror::new();
        mirror.gate(DataKind::Trade).await;
        mirror.apply_trades(vec![trade("live-1", 5000)]).await;
        assert!(mirror.trades("BTC-USDT").await.is_empty());

        mirror.apply_trades_history(vec![trade("old-1", 1000)]).await;
        mirror.release(DataKind::Trade).await;

        let stored = mirror.trades("BTC-USDT").await;
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].id, "old-1");
        assert_eq!(stored[1].id, "live-1");
    }

    #[tokio::test]
    async fn test_release_prefers_live_copy_on_id_tie() {
        let mirror = StateMirror::new();
        mirror.gate(DataKind::Trade).await;

        let mut live = trade("dup", 1000);
        live.price = dec!(50500);
        mirror.apply_trades(vec![live]).await;

        mirror.apply_trades_history(vec![trade("dup", 1000)]).await;
        mirror.release(DataKind::Trade).await;

        let stored = mirror.trades("BTC-USDT").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].price, dec!(50500));
    }

    #[tokio::test]
    async fn test_candle_bucket_replaced_in_place() {
        let mirror = StateMirror::new();
        let mut candle = Ohlcv {
            symbol: "BTC-USDT".to_string(),
            interval_start: 60_000,
            open: dec!(100),
            high: dec!(110),
            low: dec!(95),
            close: dec!(105),
            volume: dec!(10),
            is_final: false,
        };
        mirror.apply_candle(candle.clone()).await;

        candle.close = dec!(108);
        candle.volume = dec!(15);
        candle.is_final = true;
        mirror.apply_candle(candle).await;

        let stored = mirror.candles("BTC-USDT").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].close, dec!(108));
        assert!(stored[0].is_final);
    }

    #[tokio::test]
    async fn test_final_candle_survives_late_partial_update() {
        let mirror = StateMirror::new();
        let mut candle = Ohlcv {
            symbol: "BTC-USDT".to_string(),
            interval_start: 60_000,
            open: dec!(100),
            high: dec!(110),
            low: dec!(95),
            close: dec!(108),
            volume: dec!(15),
            is_final: true,
        };
        mirror.apply_candle(candle.clone()).await;

        // A stale in-progress update for the same bucket arrives late.
        candle.close = dec!(101);
        candle.volume = dec!(7);
        candle.is_final = false;
        mirror.apply_candle(candle).await;

        let stored = mirror.candles("BTC-USDT").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].close, dec!(108));
        assert!(stored[0].is_final);
    }

    #[tokio::test]
    async fn test_order_status_never_regresses() {
        let mirror = StateMirror::new();
        mirror.record_order(order("c1", OrderStatus::Open, 1000)).await;

        let outcome = mirror
            .apply_order(order("c1", OrderStatus::InFlight, 2000))
            .await;
        assert_eq!(outcome, OrderMergeOutcome::Ignored);
        assert_eq!(
            mirror.order("c1").await.unwrap().status,
            OrderStatus::Open
        );
    }

    #[tokio::test]
    async fn test_terminal_order_never_reopened() {
        let mirror = StateMirror::new();
        mirror
            .record_order(order("c1", OrderStatus::Filled, 1000))
            .await;

        mirror.apply_order(order("c1", OrderStatus::Open, 5000)).await;
        assert_eq!(
            mirror.order("c1").await.unwrap().status,
            OrderStatus::Filled
        );
    }

    #[tokio::test]
    async fn test_stale_status_still_merges_fill_progress() {
        let mirror = StateMirror::new();
        mirror
            .record_order(order("c1", OrderStatus::PartiallyFilled, 2000))
            .await;

        let mut update = order("c1", OrderStatus::Open, 1000);
        update.filled_size = dec!(0.4);
        let outcome = mirror.apply_order(update).await;
        assert_eq!(outcome, OrderMergeOutcome::FillProgressOnly);

        let stored = mirror.order("c1").await.unwrap();
        assert_eq!(stored.status, OrderStatus::PartiallyFilled);
        assert_eq!(stored.filled_size, dec!(0.4));
    }

    #[tokio::test]
    async fn test_venue_id_routes_to_client_record() {
        let mirror = StateMirror::new();
        let mut submitted = order("c1", OrderStatus::InFlight, 1000);
        submitted.id = Some("v-9".to_string());
        mirror.record_order(submitted).await;

        // Venue update knows only its own id.
        let mut update = order("unknown", OrderStatus::Filled, 2000);
        update.id = Some("v-9".to_string());
        update.filled_size = dec!(1);
        mirror.apply_order(update).await;

        let stored = mirror.order("c1").await.unwrap();
        assert_eq!(stored.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_prune_trades() {
        let mirror = StateMirror::new();
        mirror
            .apply_trades(vec![trade("a", 1000), trade("b", 2000), trade("c", 3000)])
            .await;
        let removed = mirror.prune(DataKind::Trade, 2500).await;
        assert_eq!(removed, 2);
        let stored = mirror.trades("BTC-USDT").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "c");

        // A pruned id may legitimately reappear from a late backfill page.
        mirror.apply_trades_history(vec![trade("a", 1000)]).await;
        assert_eq!(mirror.trades("BTC-USDT").await.len(), 2);
    }

    #[tokio::test]
    async fn test_prune_keeps_open_orders() {
        let mirror = StateMirror::new();
        mirror.record_order(order("open", OrderStatus::Open, 1000)).await;
        mirror
            .record_order(order("done", OrderStatus::Filled, 1000))
            .await;

        mirror.prune(DataKind::Order, 5000).await;
        assert!(mirror.order("open").await.is_some());
        assert!(mirror.order("done").await.is_none());
    }
}
