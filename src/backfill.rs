//! Historical backfill with live-stream stitching.
//!
//! For each backfilled kind the engine closes the mirror's gate before the
//! stream opens, so live events buffer invisibly while history is paged in
//! reverse-chronological order. Once pagination reaches the configured start
//! (or the venue runs out of history) the gate is released: buffered live
//! events merge on top of the history, live copies winning id ties, and the
//! table becomes visible with no gap at the join point.

use crate::adapter::VenueAdapter;
use crate::config::BackfillConfig;
use crate::error::Result;
use crate::mirror::StateMirror;
use crate::scheduler::{RequestCategory, RequestScheduler};
use crate::time;
use crate::types::DataKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Backfill progress for one kind.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillPhase {
    /// Gate closed; live events buffering, pagination not started.
    Buffering = 0,
    /// Paging history backward.
    Paginating = 1,
    /// Merging the buffered live events.
    Stitching = 2,
    /// Gate open; table fully visible.
    Live = 3,
}

impl BackfillPhase {
    /// Converts a raw `u8` to a phase.
    #[inline]
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Paginating,
            2 => Self::Stitching,
            3 => Self::Live,
            _ => Self::Buffering,
        }
    }

    /// Converts the phase to its `u8` representation.
    #[inline]
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Pages history for one sequence kind and stitches it under the live feed.
pub struct BackfillOrchestrator {
    kind: DataKind,
    window: BackfillConfig,
    symbols: Vec<String>,
    adapter: Arc<dyn VenueAdapter>,
    scheduler: Arc<RequestScheduler>,
    mirror: Arc<StateMirror>,
    ohlcv_interval: Duration,
    phase: Arc<AtomicU8>,
    cancel: CancellationToken,
}

impl BackfillOrchestrator {
    /// Creates an orchestrator for one kind. The mirror's gate for `kind`
    /// must already be closed.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        kind: DataKind,
        window: BackfillConfig,
        symbols: Vec<String>,
        adapter: Arc<dyn VenueAdapter>,
        scheduler: Arc<RequestScheduler>,
        mirror: Arc<StateMirror>,
        ohlcv_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            kind,
            window,
            symbols,
            adapter,
            scheduler,
            mirror,
            ohlcv_interval,
            phase: Arc::new(AtomicU8::new(BackfillPhase::Buffering.as_u8())),
            cancel,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> BackfillPhase {
        BackfillPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Shared handle to the phase cell, for observers.
    #[must_use]
    pub fn phase_handle(&self) -> Arc<AtomicU8> {
        Arc::clone(&self.phase)
    }

    fn set_phase(&self, phase: BackfillPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }

    /// Runs the backfill to completion and releases the gate.
    ///
    /// The gate is released even when a symbol's pagination fails: a partial
    /// history with live data on top beats an empty table held gated
    /// forever. Failures are reported in the result after release.
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub async fn run(&self) -> Result<()> {
        self.set_phase(BackfillPhase::Paginating);
        let mut first_error = None;

        for symbol in &self.symbols {
            if self.cancel.is_cancelled() {
                break;
            }
            if let Err(err) = self.backfill_symbol(symbol).await {
                warn!(symbol = %symbol, error = %err, "backfill failed for symbol");
                first_error.get_or_insert(err);
            }
        }

        self.set_phase(BackfillPhase::Stitching);
        self.mirror.release(self.kind).await;
        self.set_phase(BackfillPhase::Live);
        info!("backfill complete");

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn backfill_symbol(&self, symbol: &str) -> Result<()> {
        let start = self.window.start;
        let mut end = self.window.end.unwrap_or_else(time::milliseconds);
        let mut cursor: Option<String> = None;
        let mut total = 0usize;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            // The live buffer covers everything from stream open onward
            // and keeps growing while pages arrive, so re-read its oldest
            // entry before every page: pagination only needs to reach it.
            if let Some(live_oldest) = self.mirror.gated_oldest_timestamp(self.kind).await {
                end = end.min(live_oldest);
            }
            if end <= start {
                break;
            }
            let (inserted, oldest, next_cursor) =
                self.fetch_page(symbol, start, end, cursor.as_deref()).await?;
            total += inserted;

            let exhausted = next_cursor.is_none() || inserted == 0;
            let reached_start = oldest.is_some_and(|ts| ts <= start);
            if exhausted || reached_start {
                break;
            }
            cursor = next_cursor;
        }
        debug!(symbol = %symbol, total, "symbol backfill done");
        Ok(())
    }

    /// Fetches and merges one page. Returns the number of in-window entries
    /// inserted, the oldest timestamp seen and the next cursor.
    async fn fetch_page(
        &self,
        symbol: &str,
        start: i64,
        end: i64,
        cursor: Option<&str>,
    ) -> Result<(usize, Option<i64>, Option<String>)> {
        match self.kind {
            DataKind::Trade => {
                let page = self
                    .scheduler
                    .run_idempotent(RequestCategory::MarketData, || {
                        self.adapter.fetch_trades(symbol, start, end, cursor)
                    })
                    .await?;
                let oldest = page.items.iter().map(|t| t.timestamp).min();
                let items: Vec<_> = page
                    .items
                    .into_iter()
                    .filter(|t| t.timestamp >= start && t.timestamp < end)
                    .collect();
                let count = items.len();
                self.mirror.apply_trades_history(items).await;
                Ok((count, oldest, page.next_cursor))
            }
            DataKind::Ohlcv => {
                let page = self
                    .scheduler
                    .run_idempotent(RequestCategory::MarketData, || {
                        self.adapter
                            .fetch_candles(symbol, self.ohlcv_interval, start, end, cursor)
                    })
                    .await?;
                let oldest = page.items.iter().map(|c| c.interval_start).min();
                let items: Vec<_> = page
                    .items
                    .into_iter()
                    .filter(|c| c.interval_start >= start && c.interval_start < end)
                    .collect();
                let count = items.len();
                self.mirror.apply_candles_history(items).await;
                Ok((count, oldest, page.next_cursor))
            }
            DataKind::Order => {
                let page = self
                    .scheduler
                    .run_idempotent(RequestCategory::Account, || {
                        self.adapter.fetch_orders(symbol, start, end, cursor)
                    })
                    .await?;
                let oldest = page.items.iter().map(|o| o.updated_at).min();
                let items: Vec<_> = page
                    .items
                    .into_iter()
                    .filter(|o| o.updated_at >= start && o.updated_at < end)
                    .collect();
                let count = items.len();
                self.mirror.apply_orders_history(items).await;
                Ok((count, oldest, page.next_cursor))
            }
            DataKind::Fill => {
                let page = self
                    .scheduler
                    .run_idempotent(RequestCategory::Account, || {
                        self.adapter.fetch_fills(symbol, start, end, cursor)
                    })
                    .await?;
                let oldest = page.items.iter().map(|f| f.timestamp).min();
                let items: Vec<_> = page
                    .items
                    .into_iter()
                    .filter(|f| f.timestamp >= start && f.timestamp < end)
                    .collect();
                let count = items.len();
                self.mirror.apply_fills_history(items).await;
                Ok((count, oldest, page.next_cursor))
            }
            other => {
                debug!(kind = %other, "kind does not support backfill");
                Ok((0, None, None))
            }
        }
    }
}
