//! The engine facade.
//!
//! [`Engine`] wires the components together: it resolves the tracked symbol
//! set, opens stream connections, runs backfills, schedules polls,
//! reconciliation and retention sweeps, and owns the apply task — the single
//! consumer of the event queue through which every state mutation flows.
//! Readers take point-in-time snapshots from the mirror; they never block
//! the apply task for longer than one table clone.

use crate::adapter::{
    ApiMethod, ChannelGroup, ChannelKind, ChannelSpec, MarketEvent, VenueAdapter,
};
use crate::backfill::BackfillOrchestrator;
use crate::config::EngineConfig;
use crate::config::SymbolSelection;
use crate::connection::ConnectionManager;
use crate::error::{Error, Result};
use crate::mirror::StateMirror;
use crate::reconcile::Reconciler;
use crate::scheduler::{RequestCategory, RequestScheduler};
use crate::time;
use crate::types::{
    Balance, Bbo, DataKind, Fill, Instrument, Ohlcv, Order, OrderSide, OrderStatus, OrderType,
    Position, TimeInForce, Trade,
};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Events consumed by the apply task.
///
/// Everything that mutates the mirror travels through this queue, so merges,
/// reconciliation results and prune sweeps are totally ordered and can never
/// interleave.
#[derive(Debug)]
pub enum EngineEvent {
    /// A parsed live-stream or polled domain event.
    Market(MarketEvent),
    /// An order record produced by submission, reconciliation or listing.
    OrderResolved(Order),
    /// A retention sweep request for one kind.
    Prune(DataKind),
    /// A stream was lost and will not reconnect.
    ConnectionLost(ChannelGroup),
}

/// Parameters for a new order.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Trading symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Limit or market.
    pub order_type: OrderType,
    /// Limit price; required for limit orders.
    pub price: Option<Decimal>,
    /// Order size.
    pub size: Decimal,
    /// Maker-only flag.
    pub post_only: bool,
    /// Reduce-only flag.
    pub reduce_only: bool,
    /// Time-in-force policy.
    pub time_in_force: TimeInForce,
    /// Transport override; falls back to the configured default.
    pub method: Option<ApiMethod>,
}

impl OrderRequest {
    /// A GTC limit order request.
    #[must_use]
    pub fn limit(symbol: impl Into<String>, side: OrderSide, price: Decimal, size: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            size,
            post_only: false,
            reduce_only: false,
            time_in_force: TimeInForce::Gtc,
            method: None,
        }
    }

    /// A market order request.
    #[must_use]
    pub fn market(symbol: impl Into<String>, side: OrderSide, size: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            price: None,
            size,
            post_only: false,
            reduce_only: false,
            time_in_force: TimeInForce::Ioc,
            method: None,
        }
    }
}

/// Selects orders for bulk cancellation. Empty filters match everything.
#[derive(Debug, Clone, Default)]
pub struct CancelFilter {
    /// Restrict to one symbol.
    pub symbol: Option<String>,
    /// Restrict to these client order ids.
    pub client_ids: Option<HashSet<String>>,
    /// Restrict to these venue order ids.
    pub venue_ids: Option<HashSet<String>>,
}

impl CancelFilter {
    fn matches(&self, order: &Order) -> bool {
        if let Some(symbol) = &self.symbol {
            if &order.symbol != symbol {
                return false;
            }
        }
        if let Some(client_ids) = &self.client_ids {
            if !client_ids.contains(&order.client_id) {
                return false;
            }
        }
        if let Some(venue_ids) = &self.venue_ids {
            match &order.id {
                Some(id) if venue_ids.contains(id) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Exchange connectivity and state-synchronization engine.
pub struct Engine {
    config: EngineConfig,
    adapter: Arc<dyn VenueAdapter>,
    scheduler: Arc<RequestScheduler>,
    mirror: Arc<StateMirror>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<EngineEvent>>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    symbols: Mutex<Vec<String>>,
    client_id_state: std::sync::Mutex<(i64, u32)>,
    started: AtomicBool,
}

impl Engine {
    /// Creates an engine.
    ///
    /// Fails with [`Error::Config`] if the configuration is invalid; an
    /// engine never starts on a broken configuration.
    pub fn new(config: EngineConfig, adapter: Arc<dyn VenueAdapter>) -> Result<Self> {
        config.validate()?;
        let scheduler = Arc::new(RequestScheduler::new(config.pacing, config.request_timeout));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            adapter,
            scheduler,
            mirror: Arc::new(StateMirror::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            symbols: Mutex::new(Vec::new()),
            client_id_state: std::sync::Mutex::new((0, 0)),
            started: AtomicBool::new(false),
        })
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The symbols the engine resolved at start.
    pub async fn symbols(&self) -> Vec<String> {
        self.symbols.lock().await.clone()
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Starts the engine.
    ///
    /// Resolves symbols, takes initial snapshots, opens streams, and runs
    /// configured backfills to completion before returning. After `start`
    /// returns, every mirrored table is visible and live.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::invalid_request("engine already started"));
        }
        info!("engine starting");

        // Endpoint selection must land before the first venue call.
        self.adapter.set_sandbox_mode(self.config.sandbox).await?;

        self.spawn_apply_task().await?;

        let symbols = self.resolve_symbols().await?;
        info!(symbols = symbols.len(), "symbols resolved");
        *self.symbols.lock().await = symbols.clone();

        if self.config.cancel_open_orders_at_start {
            self.cancel_resting_orders_at_start().await;
        }
        self.initial_snapshots(&symbols).await?;

        // Gates close before any stream opens so no live event can slip
        // into a table ahead of its history.
        let mut backfills = Vec::new();
        for kind in DataKind::ALL.into_iter().filter(|kind| kind.is_sequence()) {
            if let Some(window) = self.config.backfill_for(kind) {
                self.mirror.gate(kind).await;
                backfills.push((kind, window));
            }
        }

        self.spawn_connections(&symbols).await;
        self.spawn_pollers(symbols.clone()).await;
        self.spawn_reconciler().await;
        self.spawn_pruners().await;

        for (kind, window) in backfills {
            let orchestrator = BackfillOrchestrator::new(
                kind,
                window,
                symbols.clone(),
                Arc::clone(&self.adapter),
                Arc::clone(&self.scheduler),
                Arc::clone(&self.mirror),
                self.config.ohlcv_interval,
                self.cancel.clone(),
            );
            if let Err(err) = orchestrator.run().await {
                warn!(kind = %kind, error = %err, "backfill finished with errors");
            }
        }

        info!("engine started");
        Ok(())
    }

    /// Stops the engine: signals cancellation, grants in-flight work the
    /// configured grace period, then aborts whatever remains.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        info!("engine stopping");
        self.cancel.cancel();

        let mut tasks = self.tasks.lock().await;
        let grace = self.config.stop_grace;
        let drain = futures_util::future::join_all(tasks.iter_mut());
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!("grace period elapsed, aborting remaining tasks");
            for task in tasks.iter() {
                task.abort();
            }
        }
        tasks.clear();
        info!("engine stopped");
    }

    async fn spawn_task(&self, handle: JoinHandle<()>) {
        self.tasks.lock().await.push(handle);
    }

    async fn spawn_apply_task(&self) -> Result<()> {
        let mut rx = self
            .events_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::invalid_request("apply task already running"))?;
        let mirror = Arc::clone(&self.mirror);
        let config = self.config.clone();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    event = rx.recv() => event,
                };
                let Some(event) = event else { break };
                Self::apply_event(&mirror, &config, event).await;
            }
            debug!("apply task stopped");
        });
        self.spawn_task(handle).await;
        Ok(())
    }

    async fn apply_event(mirror: &StateMirror, config: &EngineConfig, event: EngineEvent) {
        match event {
            EngineEvent::Market(market) => match market {
                MarketEvent::Bbo(bbo) => mirror.apply_bbo(bbo).await,
                MarketEvent::Trades(trades) => mirror.apply_trades(trades).await,
                MarketEvent::Candle(candle) => mirror.apply_candle(candle).await,
                MarketEvent::Order(order) => {
                    mirror.apply_order(order).await;
                }
                MarketEvent::Fills(fills) => mirror.apply_fills(fills).await,
                MarketEvent::Position(position) => mirror.apply_position(position).await,
                MarketEvent::Balance(balance) => mirror.apply_balance(balance).await,
                MarketEvent::Instruments(instruments) => {
                    mirror.apply_instruments(instruments).await;
                }
            },
            EngineEvent::OrderResolved(order) => {
                mirror.apply_order(order).await;
            }
            EngineEvent::Prune(kind) => {
                if let Some(retention) = config.retention_for(kind) {
                    let cutoff = time::milliseconds() - retention.horizon.as_millis() as i64;
                    mirror.prune(kind, cutoff).await;
                }
            }
            EngineEvent::ConnectionLost(group) => {
                error!(group = %group, "stream lost and not reconnecting");
            }
        }
    }

    // ---------------------------------------------------------------
    // Startup steps
    // ---------------------------------------------------------------

    async fn resolve_symbols(&self) -> Result<Vec<String>> {
        let instruments = self
            .scheduler
            .run_idempotent(RequestCategory::MarketData, || {
                self.adapter.fetch_instruments()
            })
            .await?;
        let symbols = match &self.config.symbols {
            SymbolSelection::All => instruments
                .iter()
                .filter(|i| i.active)
                .map(|i| i.symbol.clone())
                .collect(),
            SymbolSelection::List(list) => list.clone(),
        };
        self.mirror.apply_instruments(instruments).await;
        if symbols.is_empty() {
            return Err(Error::config("no active symbols to track"));
        }
        Ok(symbols)
    }

    /// Cancels every order the venue reports open. Individual failures are
    /// logged and skipped so one stuck order cannot block startup.
    async fn cancel_resting_orders_at_start(&self) {
        let open = match self
            .scheduler
            .run_idempotent(RequestCategory::Account, || {
                self.adapter.fetch_open_orders(None)
            })
            .await
        {
            Ok(open) => open,
            Err(err) => {
                warn!(error = %err, "could not list open orders for start-of-day cancel");
                return;
            }
        };
        info!(count = open.len(), "cancelling resting orders at start");
        for order in open {
            let result = self
                .scheduler
                .run(RequestCategory::Trading, async {
                    self.adapter
                        .cancel_order(
                            &order.symbol,
                            order.id.as_deref(),
                            Some(&order.client_id),
                            self.config.order_method,
                        )
                        .await
                })
                .await;
            if let Err(err) = result {
                warn!(client_id = %order.client_id, error = %err, "start-of-day cancel failed");
            }
        }
    }

    async fn initial_snapshots(&self, symbols: &[String]) -> Result<()> {
        if self.config.poll.quotes.is_some() || self.config.subscribe.bbo {
            let quotes = self
                .scheduler
                .run_idempotent(RequestCategory::MarketData, || {
                    self.adapter.fetch_quotes(symbols)
                })
                .await?;
            for bbo in quotes {
                let _ = self.events_tx.send(EngineEvent::Market(MarketEvent::Bbo(bbo)));
            }
        }
        if self.config.fetch_open_orders_at_start {
            let open = self
                .scheduler
                .run_idempotent(RequestCategory::Account, || {
                    self.adapter.fetch_open_orders(None)
                })
                .await?;
            for order in open {
                let _ = self.events_tx.send(EngineEvent::OrderResolved(order));
            }
        }
        if self.config.poll.positions.is_some() || self.config.subscribe.position {
            let positions = self
                .scheduler
                .run_idempotent(RequestCategory::Account, || {
                    self.adapter.fetch_positions()
                })
                .await?;
            for position in positions {
                let _ = self
                    .events_tx
                    .send(EngineEvent::Market(MarketEvent::Position(position)));
            }
        }
        if self.config.poll.balances.is_some() || self.config.subscribe.balance {
            let balances = self
                .scheduler
                .run_idempotent(RequestCategory::Account, || self.adapter.fetch_balances())
                .await?;
            for balance in balances {
                let _ = self
                    .events_tx
                    .send(EngineEvent::Market(MarketEvent::Balance(balance)));
            }
        }
        Ok(())
    }

    fn market_data_channels(&self, symbols: &[String]) -> Vec<ChannelSpec> {
        let mut channels = Vec::new();
        for symbol in symbols {
            if self.config.subscribe.bbo {
                channels.push(ChannelSpec::symbol(ChannelKind::Bbo, symbol.clone()));
            }
            if self.config.subscribe.trade {
                channels.push(ChannelSpec::symbol(ChannelKind::Trade, symbol.clone()));
            }
            if self.config.subscribe.ohlcv {
                channels.push(ChannelSpec::ohlcv(symbol.clone(), self.config.ohlcv_interval));
            }
        }
        channels
    }

    fn account_channels(&self) -> Vec<ChannelSpec> {
        let mut channels = Vec::new();
        if self.config.subscribe.order {
            channels.push(ChannelSpec::global(ChannelKind::Order));
        }
        if self.config.subscribe.fill {
            channels.push(ChannelSpec::global(ChannelKind::Fill));
        }
        if self.config.subscribe.position {
            channels.push(ChannelSpec::global(ChannelKind::Position));
        }
        if self.config.subscribe.balance {
            channels.push(ChannelSpec::global(ChannelKind::Balance));
        }
        channels
    }

    async fn spawn_connections(&self, symbols: &[String]) {
        let mut groups = Vec::new();
        if self.config.subscribe.any_market_data() {
            groups.push((ChannelGroup::MarketData, self.market_data_channels(symbols)));
        }
        if self.config.subscribe.any_account() {
            groups.push((ChannelGroup::Account, self.account_channels()));
        }
        for (group, channels) in groups {
            let manager = ConnectionManager::new(
                group,
                Arc::clone(&self.adapter),
                channels,
                self.config.heartbeat,
                self.config.auto_reconnect,
                self.config.max_symbols_per_request,
                self.config.subscribe_request_delay,
                self.config.protocol_error_threshold,
                self.events_tx.clone(),
                self.cancel.clone(),
            );
            self.spawn_task(tokio::spawn(manager.run())).await;
        }
    }

    async fn spawn_pollers(&self, symbols: Vec<String>) {
        let mut handles = Vec::new();

        if let Some(period) = self.config.poll.quotes {
            let adapter = Arc::clone(&self.adapter);
            let scheduler = Arc::clone(&self.scheduler);
            let tx = self.events_tx.clone();
            let cancel = self.cancel.clone();
            let symbols = symbols.clone();
            handles.push(tokio::spawn(async move {
                poll_loop(period, cancel, move || {
                    let adapter = Arc::clone(&adapter);
                    let scheduler = Arc::clone(&scheduler);
                    let tx = tx.clone();
                    let symbols = symbols.clone();
                    async move {
                        let quotes = scheduler
                            .run_idempotent(RequestCategory::MarketData, || {
                                adapter.fetch_quotes(&symbols)
                            })
                            .await?;
                        for bbo in quotes {
                            let _ = tx.send(EngineEvent::Market(MarketEvent::Bbo(bbo)));
                        }
                        Ok(())
                    }
                })
                .await;
            }));
        }

        if let Some(period) = self.config.poll.positions {
            let adapter = Arc::clone(&self.adapter);
            let scheduler = Arc::clone(&self.scheduler);
            let tx = self.events_tx.clone();
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(async move {
                poll_loop(period, cancel, move || {
                    let adapter = Arc::clone(&adapter);
                    let scheduler = Arc::clone(&scheduler);
                    let tx = tx.clone();
                    async move {
                        let positions = scheduler
                            .run_idempotent(RequestCategory::Account, || adapter.fetch_positions())
                            .await?;
                        for position in positions {
                            let _ = tx.send(EngineEvent::Market(MarketEvent::Position(position)));
                        }
                        Ok(())
                    }
                })
                .await;
            }));
        }

        if let Some(period) = self.config.poll.balances {
            let adapter = Arc::clone(&self.adapter);
            let scheduler = Arc::clone(&self.scheduler);
            let tx = self.events_tx.clone();
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(async move {
                poll_loop(period, cancel, move || {
                    let adapter = Arc::clone(&adapter);
                    let scheduler = Arc::clone(&scheduler);
                    let tx = tx.clone();
                    async move {
                        let balances = scheduler
                            .run_idempotent(RequestCategory::Account, || adapter.fetch_balances())
                            .await?;
                        for balance in balances {
                            let _ = tx.send(EngineEvent::Market(MarketEvent::Balance(balance)));
                        }
                        Ok(())
                    }
                })
                .await;
            }));
        }

        if let Some(period) = self.config.poll.instruments {
            let adapter = Arc::clone(&self.adapter);
            let scheduler = Arc::clone(&self.scheduler);
            let tx = self.events_tx.clone();
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(async move {
                poll_loop(period, cancel, move || {
                    let adapter = Arc::clone(&adapter);
                    let scheduler = Arc::clone(&scheduler);
                    let tx = tx.clone();
                    async move {
                        let instruments = scheduler
                            .run_idempotent(RequestCategory::MarketData, || {
                                adapter.fetch_instruments()
                            })
                            .await?;
                        let _ =
                            tx.send(EngineEvent::Market(MarketEvent::Instruments(instruments)));
                        Ok(())
                    }
                })
                .await;
            }));
        }

        let mut tasks = self.tasks.lock().await;
        tasks.extend(handles);
    }

    async fn spawn_reconciler(&self) {
        let reconciler = Arc::new(Reconciler::new(
            self.config.reconcile,
            Arc::clone(&self.adapter),
            Arc::clone(&self.scheduler),
            Arc::clone(&self.mirror),
            self.events_tx.clone(),
        ));
        let cancel = self.cancel.clone();
        self.spawn_task(tokio::spawn(reconciler.run(cancel))).await;
    }

    async fn spawn_pruners(&self) {
        for kind in DataKind::ALL.into_iter().filter(|kind| kind.is_sequence()) {
            let Some(retention) = self.config.retention_for(kind) else {
                continue;
            };
            let tx = self.events_tx.clone();
            let cancel = self.cancel.clone();
            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(retention.sweep_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            let _ = tx.send(EngineEvent::Prune(kind));
                        }
                    }
                }
            });
            self.spawn_task(handle).await;
        }
    }

    // ---------------------------------------------------------------
    // Orders
    // ---------------------------------------------------------------

    /// Generates a client order id: unix seconds plus a three-digit
    /// sequence, unique within the process.
    fn next_client_id(&self) -> String {
        let mut state = self
            .client_id_state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = time::seconds();
        if state.0 == now {
            state.1 += 1;
        } else {
            *state = (now, 0);
        }
        format!("{}{:03}", state.0, state.1)
    }

    /// Submits an order.
    ///
    /// The order is recorded locally as Submitted before dispatch and
    /// marked InFlight at dispatch, so a crash or timeout always leaves a
    /// record for reconciliation. Returns the acknowledged order on
    /// success; on timeout the order stays InFlight and the error is
    /// [`Error::Ambiguous`].
    #[instrument(skip(self, request), fields(symbol = %request.symbol))]
    pub async fn create_order(&self, request: OrderRequest) -> Result<Order> {
        if request.size <= Decimal::ZERO {
            return Err(Error::invalid_request("order size must be positive"));
        }
        if request.order_type == OrderType::Limit && request.price.is_none() {
            return Err(Error::invalid_request("limit order requires a price"));
        }

        let now = time::milliseconds();
        let mut order = Order {
            id: None,
            client_id: self.next_client_id(),
            symbol: request.symbol,
            side: request.side,
            order_type: request.order_type,
            price: request.price,
            size: request.size,
            filled_size: Decimal::ZERO,
            status: OrderStatus::Submitted,
            post_only: request.post_only,
            reduce_only: request.reduce_only,
            time_in_force: request.time_in_force,
            created_at: now,
            updated_at: now,
        };
        let _ = self.events_tx.send(EngineEvent::OrderResolved(order.clone()));

        order.status = OrderStatus::InFlight;
        order.updated_at = time::milliseconds();
        let _ = self.events_tx.send(EngineEvent::OrderResolved(order.clone()));

        let method = request.method.unwrap_or(self.config.order_method);
        let result = self
            .scheduler
            .run(RequestCategory::Trading, self.adapter.submit_order(&order, method))
            .await;

        match result {
            Ok(ack) => {
                order.id = Some(ack.order_id);
                order.status = OrderStatus::Open;
                order.updated_at = ack.timestamp;
                let _ = self.events_tx.send(EngineEvent::OrderResolved(order.clone()));
                info!(client_id = %order.client_id, id = ?order.id, "order accepted");
                Ok(order)
            }
            Err(err) if err.is_terminal() => {
                order.status = OrderStatus::Rejected;
                order.updated_at = time::milliseconds();
                let _ = self.events_tx.send(EngineEvent::OrderResolved(order.clone()));
                info!(client_id = %order.client_id, error = %err, "order rejected");
                Err(err)
            }
            Err(err) => {
                // Outcome unknown: the record stays InFlight for the
                // reconciler to resolve.
                warn!(client_id = %order.client_id, error = %err, "order outcome unknown");
                Err(Error::ambiguous(format!(
                    "submit outcome unknown for {}: {err}",
                    order.client_id
                )))
            }
        }
    }

    /// Cancels one order by venue id and/or client id.
    ///
    /// Success means the venue accepted the cancel request; the terminal
    /// Canceled update arrives through the stream or reconciliation.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        symbol: &str,
        order_id: Option<&str>,
        client_order_id: Option<&str>,
        method: Option<ApiMethod>,
    ) -> Result<()> {
        if order_id.is_none() && client_order_id.is_none() {
            return Err(Error::invalid_request(
                "cancel requires an order id or client order id",
            ));
        }
        let method = method.unwrap_or(self.config.order_method);
        self.scheduler
            .run(RequestCategory::Trading, async {
                self.adapter
                    .cancel_order(symbol, order_id, client_order_id, method)
                    .await
            })
            .await
    }

    /// Cancels every live order matching the filter. Returns the number of
    /// accepted cancel requests; individual failures are logged.
    #[instrument(skip(self, filter))]
    pub async fn cancel_orders(&self, filter: &CancelFilter) -> Result<usize> {
        let mut cancelled = 0;
        for order in self.mirror.open_orders().await {
            if !filter.matches(&order) {
                continue;
            }
            match self
                .cancel_order(
                    &order.symbol,
                    order.id.as_deref(),
                    Some(&order.client_id),
                    None,
                )
                .await
            {
                Ok(()) => cancelled += 1,
                Err(err) => {
                    warn!(client_id = %order.client_id, error = %err, "cancel failed");
                }
            }
        }
        Ok(cancelled)
    }

    // ---------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------

    /// Latest quote for a symbol.
    pub async fn bbo(&self, symbol: &str) -> Option<Bbo> {
        self.mirror.bbo(symbol).await
    }

    /// Trade prints for a symbol, oldest first.
    pub async fn trades(&self, symbol: &str) -> Vec<Trade> {
        self.mirror.trades(symbol).await
    }

    /// Candle buckets for a symbol, oldest first.
    pub async fn candles(&self, symbol: &str) -> Vec<Ohlcv> {
        self.mirror.candles(symbol).await
    }

    /// All orders for a symbol.
    pub async fn orders(&self, symbol: &str) -> Vec<Order> {
        self.mirror.orders(symbol).await
    }

    /// A single order by client id.
    pub async fn order(&self, client_id: &str) -> Option<Order> {
        self.mirror.order(client_id).await
    }

    /// Orders resting on the venue book.
    pub async fn open_orders(&self) -> Vec<Order> {
        self.mirror.open_orders().await
    }

    /// Orders awaiting acknowledgment.
    pub async fn in_flight_orders(&self) -> Vec<Order> {
        self.mirror.in_flight_orders().await
    }

    /// Fills for a symbol, oldest first.
    pub async fn fills(&self, symbol: &str) -> Vec<Fill> {
        self.mirror.fills(symbol).await
    }

    /// Position for a symbol.
    pub async fn position(&self, symbol: &str) -> Option<Position> {
        self.mirror.position(symbol).await
    }

    /// All positions.
    pub async fn positions(&self) -> Vec<Position> {
        self.mirror.positions().await
    }

    /// Balance for an asset.
    pub async fn balance(&self, asset: &str) -> Option<Balance> {
        self.mirror.balance(asset).await
    }

    /// All balances.
    pub async fn balances(&self) -> Vec<Balance> {
        self.mirror.balances().await
    }

    /// Instrument definition for a symbol.
    pub async fn instrument(&self, symbol: &str) -> Option<Instrument> {
        self.mirror.instrument(symbol).await
    }

    /// All instrument definitions.
    pub async fn instruments(&self) -> Vec<Instrument> {
        self.mirror.instruments().await
    }
}

/// Runs `f` on a fixed period until cancelled. Failures are logged and the
/// loop continues; a poller never takes the engine down.
async fn poll_loop<F, Fut>(period: std::time::Duration, cancel: CancellationToken, mut f: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = f().await {
                    warn!(error = %err, "poll failed");
                }
            }
        }
    }
}
