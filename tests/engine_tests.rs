//! Integration tests driving the engine against a scripted mock venue.

use async_trait::async_trait;
use marketsync::CancellationToken;
use marketsync::adapter::{
    ApiMethod, ChannelGroup, ChannelKind, ChannelSpec, MarketEvent, OrderAck, Page, StreamPayload,
    VenueAdapter, VenueStream,
};
use marketsync::backfill::BackfillOrchestrator;
use marketsync::config::{
    BackfillConfig, EngineConfig, ReconcileConfig, SubscribeFlags, SymbolSelection,
};
use marketsync::engine::{CancelFilter, Engine, EngineEvent, OrderRequest};
use marketsync::error::{Error, Result};
use marketsync::mirror::StateMirror;
use marketsync::reconcile::Reconciler;
use marketsync::scheduler::RequestScheduler;
use marketsync::time;
use marketsync::types::{DataKind, Instrument, Order, OrderSide, OrderStatus, Trade};
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

fn instrument(symbol: &str) -> Instrument {
    Instrument {
        symbol: symbol.to_string(),
        base: "BTC".to_string(),
        quote: "USDT".to_string(),
        price_increment: dec!(0.1),
        size_increment: dec!(0.001),
        min_size: dec!(0.001),
        active: true,
    }
}

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

/// What the mock returns from `submit_order`.
#[derive(Clone, Copy)]
enum SubmitBehavior {
    Accept,
    Reject,
    Hang,
}

/// A stream fed from a channel; stays open until the sender drops.
struct MockStream {
    rx: mpsc::UnboundedReceiver<String>,
    subscriptions: Arc<Mutex<Vec<ChannelSpec>>>,
}

#[async_trait]
impl VenueStream for MockStream {
    async fn subscribe(&mut self, channels: &[ChannelSpec]) -> Result<()> {
        self.subscriptions.lock().await.extend_from_slice(channels);
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<String>> {
        Ok(self.rx.recv().await)
    }

    async fn send_heartbeat(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct MockVenue {
    instruments: Vec<Instrument>,
    trade_pages: Mutex<VecDeque<Page<Trade>>>,
    open_orders: Mutex<Vec<Order>>,
    submit_behavior: SubmitBehavior,
    submit_count: AtomicU32,
    cancel_count: AtomicU32,
    sandbox: AtomicBool,
    // Window bounds of every history fetch, in call order.
    fetch_ranges: Mutex<Vec<(i64, i64)>>,
    // Applied to the mirror on the next history fetch, simulating a live
    // print that lands mid-pagination.
    live_during_fetch: Mutex<Option<(Arc<StateMirror>, Trade)>>,
    // Channels subscribed across all opened streams.
    subscriptions: Arc<Mutex<Vec<ChannelSpec>>>,
    // Senders handed out so tests can inject live messages; one per
    // opened stream, market data first.
    stream_txs: Mutex<Vec<mpsc::UnboundedSender<String>>>,
}

impl MockVenue {
    fn new() -> Self {
        Self {
            instruments: vec![instrument("BTC-USDT")],
            trade_pages: Mutex::new(VecDeque::new()),
            open_orders: Mutex::new(Vec::new()),
            submit_behavior: SubmitBehavior::Accept,
            submit_count: AtomicU32::new(0),
            cancel_count: AtomicU32::new(0),
            sandbox: AtomicBool::new(false),
            fetch_ranges: Mutex::new(Vec::new()),
            live_during_fetch: Mutex::new(None),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            stream_txs: Mutex::new(Vec::new()),
        }
    }

    fn with_submit(mut self, behavior: SubmitBehavior) -> Self {
        self.submit_behavior = behavior;
        self
    }

    async fn push_trade_page(&self, page: Page<Trade>) {
        self.trade_pages.lock().await.push_back(page);
    }

    async fn live_sender(&self) -> Option<mpsc::UnboundedSender<String>> {
        self.stream_txs.lock().await.first().cloned()
    }
}

#[async_trait]
impl VenueAdapter for MockVenue {
    async fn set_sandbox_mode(&self, enabled: bool) -> Result<()> {
        self.sandbox.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    async fn open_stream(&self, _group: ChannelGroup) -> Result<Box<dyn VenueStream>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.stream_txs.lock().await.push(tx);
        Ok(Box::new(MockStream {
            rx,
            subscriptions: Arc::clone(&self.subscriptions),
        }))
    }

    fn parse_message(&self, raw: &str) -> Result<StreamPayload> {
        let trade: Trade = serde_json::from_str(raw)?;
        Ok(StreamPayload::Events(vec![MarketEvent::Trades(vec![trade])]))
    }

    async fn fetch_trades(
        &self,
        _symbol: &str,
        start: i64,
        end: i64,
        _cursor: Option<&str>,
    ) -> Result<Page<Trade>> {
        if let Some((mirror, live)) = self.live_during_fetch.lock().await.take() {
            mirror.apply_trades(vec![live]).await;
        }
        self.fetch_ranges.lock().await.push((start, end));
        Ok(self
            .trade_pages
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(Page::empty))
    }

    async fn fetch_candles(
        &self,
        _symbol: &str,
        _interval: Duration,
        _start: i64,
        _end: i64,
        _cursor: Option<&str>,
    ) -> Result<Page<marketsync::types::Ohlcv>> {
        Ok(Page::empty())
    }

    async fn fetch_orders(
        &self,
        _symbol: &str,
        _start: i64,
        _end: i64,
        _cursor: Option<&str>,
    ) -> Result<Page<Order>> {
        Ok(Page::empty())
    }

    async fn fetch_fills(
        &self,
        _symbol: &str,
        _start: i64,
        _end: i64,
        _cursor: Option<&str>,
    ) -> Result<Page<marketsync::types::Fill>> {
        Ok(Page::empty())
    }

    async fn fetch_open_orders(&self, _symbol: Option<&str>) -> Result<Vec<Order>> {
        Ok(self.open_orders.lock().await.clone())
    }

    async fn fetch_order_status(
        &self,
        _symbol: &str,
        _order_id: Option<&str>,
        client_order_id: Option<&str>,
    ) -> Result<Order> {
        Err(Error::order_not_found(
            client_order_id.unwrap_or("?").to_string(),
        ))
    }

    async fn submit_order(&self, order: &Order, _method: ApiMethod) -> Result<OrderAck> {
        self.submit_count.fetch_add(1, Ordering::SeqCst);
        match self.submit_behavior {
            SubmitBehavior::Accept => Ok(OrderAck {
                order_id: format!("v-{}", order.client_id),
                timestamp: order.created_at + 5,
            }),
            SubmitBehavior::Reject => Err(Error::venue_rejection("-2010", "insufficient balance")),
            SubmitBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!()
            }
        }
    }

    async fn cancel_order(
        &self,
        _symbol: &str,
        _order_id: Option<&str>,
        _client_order_id: Option<&str>,
        _method: ApiMethod,
    ) -> Result<()> {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_instruments(&self) -> Result<Vec<Instrument>> {
        Ok(self.instruments.clone())
    }

    async fn fetch_quotes(&self, _symbols: &[String]) -> Result<Vec<marketsync::types::Bbo>> {
        Ok(Vec::new())
    }

    async fn fetch_positions(&self) -> Result<Vec<marketsync::types::Position>> {
        Ok(Vec::new())
    }

    async fn fetch_balances(&self) -> Result<Vec<marketsync::types::Balance>> {
        Ok(Vec::new())
    }
}

fn quiet_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.symbols = SymbolSelection::List(vec!["BTC-USDT".to_string()]);
    config.poll.quotes = None;
    config.poll.positions = None;
    config.poll.balances = None;
    config.poll.instruments = None;
    config.fetch_open_orders_at_start = false;
    config.pacing.market_data = Duration::ZERO;
    config.pacing.account = Duration::ZERO;
    config
}

#[tokio::test]
async fn test_start_resolves_wildcard_symbols() {
    let venue = Arc::new(MockVenue::new());
    let mut config = quiet_config();
    config.symbols = SymbolSelection::All;
    let engine = Engine::new(config, venue).unwrap();
    engine.start().await.unwrap();
    assert_eq!(engine.symbols().await, vec!["BTC-USDT".to_string()]);
    assert!(engine.instrument("BTC-USDT").await.is_some());
    engine.stop().await;
}

#[tokio::test]
async fn test_backfill_stitches_history_under_live() {
    let venue = Arc::new(MockVenue::new());
    venue
        .push_trade_page(Page {
            items: vec![trade("h3", 3_000), trade("h2", 2_000), trade("h1", 1_000)],
            next_cursor: None,
        })
        .await;

    let mut config = quiet_config();
    config.subscribe = SubscribeFlags {
        trade: true,
        ..SubscribeFlags::default()
    };
    config.backfill_trades = Some(BackfillConfig {
        start: 0,
        end: None,
    });

    let engine = Engine::new(config, Arc::clone(&venue) as Arc<dyn VenueAdapter>).unwrap();
    engine.start().await.unwrap();

    // Inject live trades after start; the table is already released. The
    // connection task opens the stream asynchronously, so wait for it.
    let tx = loop {
        if let Some(tx) = venue.live_sender().await {
            break tx;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    tx.send(serde_json::to_string(&trade("l1", 4_000)).unwrap())
        .unwrap();
    tx.send(serde_json::to_string(&trade("l2", 5_000)).unwrap())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let trades = engine.trades("BTC-USDT").await;
    let ids: Vec<&str> = trades.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["h1", "h2", "h3", "l1", "l2"]);
    let timestamps: Vec<i64> = trades.iter().map(|t| t.timestamp).collect();
    assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));

    engine.stop().await;
}

#[tokio::test]
async fn test_backfill_duplicate_ids_absorbed() {
    let venue = Arc::new(MockVenue::new());
    // Overlapping pages: h2 appears twice.
    venue
        .push_trade_page(Page {
            items: vec![trade("h3", 3_000), trade("h2", 2_000)],
            next_cursor: Some("next".to_string()),
        })
        .await;
    venue
        .push_trade_page(Page {
            items: vec![trade("h2", 2_000), trade("h1", 1_000)],
            next_cursor: None,
        })
        .await;

    let mut config = quiet_config();
    config.subscribe = SubscribeFlags {
        trade: true,
        ..SubscribeFlags::default()
    };
    config.backfill_trades = Some(BackfillConfig {
        start: 0,
        end: None,
    });

    let engine = Engine::new(config, Arc::clone(&venue) as Arc<dyn VenueAdapter>).unwrap();
    engine.start().await.unwrap();

    let trades = engine.trades("BTC-USDT").await;
    let ids: Vec<&str> = trades.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["h1", "h2", "h3"]);

    engine.stop().await;
}

#[tokio::test]
async fn test_backfill_window_shrinks_as_live_buffer_grows() {
    let venue = Arc::new(MockVenue::new());
    venue
        .push_trade_page(Page {
            items: vec![trade("h6", 6_000), trade("h5", 5_000)],
            next_cursor: Some("older".to_string()),
        })
        .await;
    venue
        .push_trade_page(Page {
            items: vec![trade("h4", 4_000), trade("h3", 3_000)],
            next_cursor: None,
        })
        .await;

    let mirror = Arc::new(StateMirror::new());
    mirror.gate(DataKind::Trade).await;
    // A live print buffers while the first page is in flight.
    *venue.live_during_fetch.lock().await =
        Some((Arc::clone(&mirror), trade("l1", 4_500)));

    let config = quiet_config();
    let scheduler = Arc::new(RequestScheduler::new(config.pacing, config.request_timeout));
    let orchestrator = BackfillOrchestrator::new(
        DataKind::Trade,
        BackfillConfig {
            start: 0,
            end: None,
        },
        vec!["BTC-USDT".to_string()],
        Arc::clone(&venue) as Arc<dyn VenueAdapter>,
        scheduler,
        Arc::clone(&mirror),
        Duration::from_secs(60),
        CancellationToken::new(),
    );
    orchestrator.run().await.unwrap();

    // The second page must be requested with the window capped at the
    // buffered live print, not the wall clock captured before pagination.
    let ranges = venue.fetch_ranges.lock().await.clone();
    assert_eq!(ranges.len(), 2);
    assert_eq!(ranges[1].1, 4_500);

    let ids: Vec<String> = mirror
        .trades("BTC-USDT")
        .await
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ids, vec!["h3", "h4", "l1", "h5", "h6"]);
}

#[tokio::test]
async fn test_candle_subscription_carries_configured_interval() {
    let venue = Arc::new(MockVenue::new());
    let mut config = quiet_config();
    config.subscribe = SubscribeFlags {
        ohlcv: true,
        ..SubscribeFlags::default()
    };
    config.ohlcv_interval = Duration::from_secs(300);

    let engine = Engine::new(config, Arc::clone(&venue) as Arc<dyn VenueAdapter>).unwrap();
    engine.start().await.unwrap();

    // The connection task subscribes asynchronously after start.
    let spec = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let subs = venue.subscriptions.lock().await;
            if let Some(spec) = subs.iter().find(|s| s.channel == ChannelKind::Ohlcv) {
                break spec.clone();
            }
            drop(subs);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(spec.symbol.as_deref(), Some("BTC-USDT"));
    assert_eq!(spec.interval, Some(Duration::from_secs(300)));
    engine.stop().await;
}

#[tokio::test]
async fn test_sandbox_flag_reaches_adapter_at_start() {
    let venue = Arc::new(MockVenue::new());
    let mut config = quiet_config();
    config.sandbox = true;

    let engine = Engine::new(config, Arc::clone(&venue) as Arc<dyn VenueAdapter>).unwrap();
    engine.start().await.unwrap();

    assert!(venue.sandbox.load(Ordering::SeqCst));
    engine.stop().await;
}

#[tokio::test]
async fn test_create_order_happy_path() {
    let venue = Arc::new(MockVenue::new());
    let engine = Engine::new(quiet_config(), Arc::clone(&venue) as Arc<dyn VenueAdapter>).unwrap();
    engine.start().await.unwrap();

    let order = engine
        .create_order(OrderRequest::limit(
            "BTC-USDT",
            OrderSide::Buy,
            dec!(50000),
            dec!(0.5),
        ))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Open);
    assert!(order.id.as_deref().unwrap().starts_with("v-"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let mirrored = engine.order(&order.client_id).await.unwrap();
    assert_eq!(mirrored.status, OrderStatus::Open);
    assert_eq!(mirrored.id, order.id);

    engine.stop().await;
}

#[tokio::test]
async fn test_create_order_rejection_is_terminal() {
    let venue = Arc::new(MockVenue::new().with_submit(SubmitBehavior::Reject));
    let engine = Engine::new(quiet_config(), Arc::clone(&venue) as Arc<dyn VenueAdapter>).unwrap();
    engine.start().await.unwrap();

    let result = engine
        .create_order(OrderRequest::limit(
            "BTC-USDT",
            OrderSide::Buy,
            dec!(50000),
            dec!(0.5),
        ))
        .await;
    assert!(matches!(result, Err(Error::VenueRejection { .. })));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let rejected: Vec<_> = engine
        .orders("BTC-USDT")
        .await
        .into_iter()
        .filter(|o| o.status == OrderStatus::Rejected)
        .collect();
    assert_eq!(rejected.len(), 1);

    engine.stop().await;
}

#[tokio::test]
async fn test_create_order_timeout_leaves_in_flight() {
    let venue = Arc::new(MockVenue::new().with_submit(SubmitBehavior::Hang));
    let mut config = quiet_config();
    config.request_timeout = Duration::from_millis(50);
    let engine = Engine::new(config, Arc::clone(&venue) as Arc<dyn VenueAdapter>).unwrap();
    engine.start().await.unwrap();

    let result = engine
        .create_order(OrderRequest::limit(
            "BTC-USDT",
            OrderSide::Buy,
            dec!(50000),
            dec!(0.5),
        ))
        .await;
    assert!(matches!(result, Err(Error::Ambiguous(_))));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let in_flight = engine.in_flight_orders().await;
    assert_eq!(in_flight.len(), 1);
    assert_eq!(in_flight[0].status, OrderStatus::InFlight);

    engine.stop().await;
}

#[tokio::test]
async fn test_invalid_order_requests_refused() {
    let venue = Arc::new(MockVenue::new());
    let engine = Engine::new(quiet_config(), Arc::clone(&venue) as Arc<dyn VenueAdapter>).unwrap();
    engine.start().await.unwrap();

    let mut request = OrderRequest::limit("BTC-USDT", OrderSide::Buy, dec!(50000), dec!(0.5));
    request.price = None;
    assert!(matches!(
        engine.create_order(request).await,
        Err(Error::InvalidRequest(_))
    ));

    let request = OrderRequest::market("BTC-USDT", OrderSide::Sell, dec!(0));
    assert!(matches!(
        engine.create_order(request).await,
        Err(Error::InvalidRequest(_))
    ));
    assert_eq!(venue.submit_count.load(Ordering::SeqCst), 0);

    engine.stop().await;
}

#[tokio::test]
async fn test_cancel_orders_filter() {
    let venue = Arc::new(MockVenue::new());
    let engine = Engine::new(quiet_config(), Arc::clone(&venue) as Arc<dyn VenueAdapter>).unwrap();
    engine.start().await.unwrap();

    let a = engine
        .create_order(OrderRequest::limit(
            "BTC-USDT",
            OrderSide::Buy,
            dec!(50000),
            dec!(0.5),
        ))
        .await
        .unwrap();
    let _b = engine
        .create_order(OrderRequest::limit(
            "BTC-USDT",
            OrderSide::Sell,
            dec!(51000),
            dec!(0.5),
        ))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let filter = CancelFilter {
        client_ids: Some([a.client_id.clone()].into_iter().collect()),
        ..CancelFilter::default()
    };
    let cancelled = engine.cancel_orders(&filter).await.unwrap();
    assert_eq!(cancelled, 1);
    assert_eq!(venue.cancel_count.load(Ordering::SeqCst), 1);

    engine.stop().await;
}

#[tokio::test]
async fn test_cancel_open_orders_at_start() {
    let venue = Arc::new(MockVenue::new());
    {
        let mut resting = Order::limit(
            "stale-1".to_string(),
            "BTC-USDT".to_string(),
            OrderSide::Buy,
            dec!(40000),
            dec!(1),
            1_000,
        );
        resting.id = Some("v-stale-1".to_string());
        resting.status = OrderStatus::Open;
        venue.open_orders.lock().await.push(resting);
    }

    let mut config = quiet_config();
    config.cancel_open_orders_at_start = true;
    let engine = Engine::new(config, Arc::clone(&venue) as Arc<dyn VenueAdapter>).unwrap();
    engine.start().await.unwrap();

    assert_eq!(venue.cancel_count.load(Ordering::SeqCst), 1);
    engine.stop().await;
}

fn reconciler_fixture(
    venue: Arc<dyn VenueAdapter>,
) -> (
    Arc<Reconciler>,
    Arc<StateMirror>,
    mpsc::UnboundedReceiver<EngineEvent>,
) {
    let config = quiet_config();
    let scheduler = Arc::new(RequestScheduler::new(config.pacing, config.request_timeout));
    let mirror = Arc::new(StateMirror::new());
    let (tx, rx) = mpsc::unbounded_channel();
    let reconciler = Arc::new(Reconciler::new(
        ReconcileConfig::default(),
        venue,
        scheduler,
        mirror.clone(),
        tx,
    ));
    (reconciler, mirror, rx)
}

#[tokio::test]
async fn test_reconciler_resolves_stale_in_flight_order() {
    let venue = Arc::new(MockVenue::new());
    let (reconciler, mirror, mut rx) = reconciler_fixture(Arc::clone(&venue) as Arc<dyn VenueAdapter>);

    // An order stuck awaiting acknowledgment well past the threshold; the
    // venue has never heard of it.
    let mut stuck = Order::limit(
        "1700000000000".to_string(),
        "BTC-USDT".to_string(),
        OrderSide::Buy,
        dec!(50000),
        dec!(1),
        time::milliseconds() - 60_000,
    );
    stuck.status = OrderStatus::InFlight;
    mirror.record_order(stuck).await;

    reconciler.check_in_flight_orders().await.unwrap();

    let event = rx.recv().await.unwrap();
    let EngineEvent::OrderResolved(resolved) = event else {
        panic!("expected an order resolution");
    };
    assert_eq!(resolved.client_id, "1700000000000");
    assert_eq!(resolved.status, OrderStatus::Rejected);
}

#[tokio::test]
async fn test_reconciler_resolves_unlisted_resting_order() {
    let venue = Arc::new(MockVenue::new());
    let (reconciler, mirror, mut rx) = reconciler_fixture(Arc::clone(&venue) as Arc<dyn VenueAdapter>);

    // Resting locally, absent from the venue's (empty) open listing, stale
    // beyond the staleness window, and unknown to a per-order fetch.
    let mut ghost = Order::limit(
        "1700000000001".to_string(),
        "BTC-USDT".to_string(),
        OrderSide::Sell,
        dec!(51000),
        dec!(1),
        time::milliseconds() - 120_000,
    );
    ghost.id = Some("v-ghost".to_string());
    ghost.status = OrderStatus::Open;
    mirror.record_order(ghost).await;

    reconciler.check_open_orders().await.unwrap();

    let event = rx.recv().await.unwrap();
    let EngineEvent::OrderResolved(resolved) = event else {
        panic!("expected an order resolution");
    };
    assert_eq!(resolved.client_id, "1700000000001");
    assert_eq!(resolved.status, OrderStatus::Canceled);
}

#[tokio::test]
async fn test_reconciler_keeps_fresh_orders_untouched() {
    let venue = Arc::new(MockVenue::new());
    let (reconciler, mirror, mut rx) = reconciler_fixture(Arc::clone(&venue) as Arc<dyn VenueAdapter>);

    let mut fresh = Order::limit(
        "1700000000002".to_string(),
        "BTC-USDT".to_string(),
        OrderSide::Buy,
        dec!(50000),
        dec!(1),
        time::milliseconds(),
    );
    fresh.status = OrderStatus::InFlight;
    mirror.record_order(fresh).await;

    reconciler.check_in_flight_orders().await.unwrap();
    reconciler.check_open_orders().await.unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_double_start_refused() {
    let venue = Arc::new(MockVenue::new());
    let engine = Engine::new(quiet_config(), venue).unwrap();
    engine.start().await.unwrap();
    assert!(engine.start().await.is_err());
    engine.stop().await;
}
