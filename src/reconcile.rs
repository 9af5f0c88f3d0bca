//! Order reconciliation.
//!
//! Stream delivery is best-effort: an acknowledgment or terminal update can
//! be lost while the engine believes an order is still live. Two periodic
//! checks close that gap:
//!
//! - the **open-order check** cross-references local resting orders against
//!   the venue's open-order listing;
//! - the **in-flight check** chases orders stuck awaiting acknowledgment.
//!
//! Neither check ever guesses: an order's fate changes only on an explicit
//! per-order status fetch. Absence from a listing alone proves nothing (the
//! listing and the local table race), so absence merely triggers the fetch.

use crate::adapter::VenueAdapter;
use crate::config::ReconcileConfig;
use crate::engine::EngineEvent;
use crate::error::{Error, Result};
use crate::mirror::StateMirror;
use crate::scheduler::{RequestCategory, RequestScheduler};
use crate::time;
use crate::types::{Order, OrderStatus};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Runs the periodic order reconciliation checks.
pub struct Reconciler {
    config: ReconcileConfig,
    adapter: Arc<dyn VenueAdapter>,
    scheduler: Arc<RequestScheduler>,
    mirror: Arc<StateMirror>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl Reconciler {
    /// Creates a reconciler.
    #[must_use]
    pub fn new(
        config: ReconcileConfig,
        adapter: Arc<dyn VenueAdapter>,
        scheduler: Arc<RequestScheduler>,
        mirror: Arc<StateMirror>,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        Self {
            config,
            adapter,
            scheduler,
            mirror,
            events,
        }
    }

    /// Runs both checks on their configured periods until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let open_loop = {
            let this = Arc::clone(&self);
            let cancel = cancel.clone();
            async move {
                let mut ticker = tokio::time::interval(this.config.open_order_check_period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            if let Err(err) = this.check_open_orders().await {
                                warn!(error = %err, "open-order check failed");
                            }
                        }
                    }
                }
            }
        };
        let in_flight_loop = {
            let this = Arc::clone(&self);
            async move {
                let mut ticker = tokio::time::interval(this.config.in_flight_check_period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            if let Err(err) = this.check_in_flight_orders().await {
                                warn!(error = %err, "in-flight check failed");
                            }
                        }
                    }
                }
            }
        };
        tokio::join!(open_loop, in_flight_loop);
        debug!("reconciler stopped");
    }

    /// Cross-checks local resting orders against the venue's open listing.
    ///
    /// Orders the venue still reports are merged as ordinary updates. Local
    /// resting orders missing from the listing and stale beyond
    /// `open_order_staleness` are individually verified.
    #[instrument(skip(self))]
    pub async fn check_open_orders(&self) -> Result<()> {
        let venue_open = self
            .scheduler
            .run_idempotent(RequestCategory::Account, || {
                self.adapter.fetch_open_orders(None)
            })
            .await?;

        let mut venue_keys: HashSet<String> = HashSet::new();
        for order in &venue_open {
            venue_keys.insert(order.client_id.clone());
            if let Some(id) = &order.id {
                venue_keys.insert(id.clone());
            }
        }
        for order in venue_open {
            let _ = self.events.send(EngineEvent::OrderResolved(order));
        }

        let staleness_ms = self.config.open_order_staleness.as_millis() as i64;
        let now = time::milliseconds();
        for local in self.mirror.open_orders().await {
            let listed = venue_keys.contains(&local.client_id)
                || local.id.as_ref().is_some_and(|id| venue_keys.contains(id));
            if listed || now - local.updated_at < staleness_ms {
                continue;
            }
            debug!(client_id = %local.client_id, "resting order missing from listing, verifying");
            self.verify_order(&local, OrderStatus::Canceled).await;
        }
        Ok(())
    }

    /// Chases orders stuck in Submitted/InFlight past the threshold.
    #[instrument(skip(self))]
    pub async fn check_in_flight_orders(&self) -> Result<()> {
        let threshold_ms = self.config.in_flight_threshold.as_millis() as i64;
        let now = time::milliseconds();
        for local in self.mirror.in_flight_orders().await {
            if now - local.updated_at < threshold_ms {
                continue;
            }
            debug!(client_id = %local.client_id, "order awaiting ack past threshold, verifying");
            self.verify_order(&local, OrderStatus::Rejected).await;
        }
        Ok(())
    }

    /// Fetches the authoritative state of one order and queues the result.
    ///
    /// A definitive not-found resolves the order to `fallback` (Canceled
    /// for previously resting orders, Rejected for unacknowledged ones).
    /// Transient failures leave the order untouched for the next cycle.
    async fn verify_order(&self, local: &Order, fallback: OrderStatus) {
        let result = self
            .scheduler
            .run_idempotent(RequestCategory::Account, || {
                self.adapter.fetch_order_status(
                    &local.symbol,
                    local.id.as_deref(),
                    Some(&local.client_id),
                )
            })
            .await;

        match result {
            Ok(order) => {
                let _ = self.events.send(EngineEvent::OrderResolved(order));
            }
            Err(Error::OrderNotFound(_)) | Err(Error::VenueRejection { .. }) => {
                info!(client_id = %local.client_id, status = %fallback, "order resolved by venue answer");
                let mut resolved = local.clone();
                resolved.status = fallback;
                resolved.updated_at = time::milliseconds();
                let _ = self.events.send(EngineEvent::OrderResolved(resolved));
            }
            Err(err) => {
                // Unknown outcome: try again next cycle.
                warn!(client_id = %local.client_id, error = %err, "verification inconclusive");
            }
        }
    }
}
