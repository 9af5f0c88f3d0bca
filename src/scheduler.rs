//! Rate-limited request scheduling.
//!
//! Every venue request the engine makes goes through a [`RequestScheduler`],
//! which enforces a minimum delay between consecutive requests of the same
//! category and wraps each request in a timeout. Categories are paced
//! independently so a burst of market-data polling never delays an order
//! cancellation.

use crate::config::PacingConfig;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Request categories with independent pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestCategory {
    /// Public market data: quotes, trades, candles, instruments.
    MarketData,
    /// Private account reads: orders, fills, positions, balances.
    Account,
    /// State-changing requests: submit and cancel.
    Trading,
}

impl std::fmt::Display for RequestCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarketData => f.write_str("market_data"),
            Self::Account => f.write_str("account"),
            Self::Trading => f.write_str("trading"),
        }
    }
}

/// Maximum automatic retries for idempotent requests.
const MAX_IDEMPOTENT_RETRIES: u32 = 3;

struct PacingState {
    last_dispatch: HashMap<RequestCategory, Instant>,
}

/// Paces, times out and (for idempotent requests) retries venue requests.
pub struct RequestScheduler {
    pacing: PacingConfig,
    request_timeout: Duration,
    state: Mutex<PacingState>,
}

impl RequestScheduler {
    /// Creates a scheduler with the given pacing and timeout settings.
    #[must_use]
    pub fn new(pacing: PacingConfig, request_timeout: Duration) -> Self {
        Self {
            pacing,
            request_timeout,
            state: Mutex::new(PacingState {
                last_dispatch: HashMap::new(),
            }),
        }
    }

    fn delay_for(&self, category: RequestCategory) -> Duration {
        match category {
            RequestCategory::MarketData => self.pacing.market_data,
            RequestCategory::Account => self.pacing.account,
            RequestCategory::Trading => self.pacing.trading,
        }
    }

    /// Waits until the category's pacing window has elapsed, then marks the
    /// dispatch slot.
    async fn pace(&self, category: RequestCategory) {
        let min_delay = self.delay_for(category);
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                match state.last_dispatch.get(&category) {
                    Some(last) if now.duration_since(*last) < min_delay => {
                        min_delay - now.duration_since(*last)
                    }
                    _ => {
                        state.last_dispatch.insert(category, now);
                        return;
                    }
                }
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Runs one request with pacing and a timeout.
    ///
    /// Never retries; use this for state-changing requests whose outcome on
    /// timeout is ambiguous.
    pub async fn run<T, F>(&self, category: RequestCategory, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.pace(category).await;
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!(
                "{category} request exceeded {:?}",
                self.request_timeout
            ))),
        }
    }

    /// Runs an idempotent request, retrying on retryable failures.
    ///
    /// Rate-limit responses are honored: a venue-suggested delay replaces
    /// the default inter-attempt sleep.
    pub async fn run_idempotent<T, F, Fut>(&self, category: RequestCategory, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match self.run(category, f()).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < MAX_IDEMPOTENT_RETRIES => {
                    attempt += 1;
                    let wait = err
                        .retry_after()
                        .unwrap_or_else(|| Duration::from_millis(200 * u64::from(attempt)));
                    warn!(
                        category = %category,
                        attempt,
                        error = %err,
                        wait_ms = wait.as_millis() as u64,
                        "retrying request"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(err) => {
                    debug!(category = %category, error = %err, "request failed");
                    return Err(err);
                }
            }
        }
    }
}
