//! Stream connection lifecycle.
//!
//! A [`ConnectionManager`] owns one venue stream (market data or account),
//! drives its subscribe handshake, monitors liveness at both the protocol
//! and application level, and reconnects with exponential backoff when the
//! stream dies. Parsed events are forwarded to the engine's apply queue;
//! the manager itself never touches the mirror.

use crate::adapter::{ChannelGroup, ChannelSpec, StreamPayload, VenueAdapter, VenueStream};
use crate::config::HeartbeatConfig;
use crate::engine::EngineEvent;
use crate::error::{Error, Result};
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Connection lifecycle state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// No stream open.
    Disconnected = 0,
    /// Opening the stream.
    Connecting = 1,
    /// Stream open, subscribe requests in progress.
    Subscribing = 2,
    /// Fully subscribed and receiving.
    Streaming = 3,
}

impl ConnState {
    /// Converts a raw `u8` to a `ConnState`.
    #[inline]
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Subscribing,
            3 => Self::Streaming,
            _ => Self::Disconnected,
        }
    }

    /// Converts the state to its `u8` representation.
    #[inline]
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Jitter factor (0.0 - 1.0).
    pub jitter_factor: f64,
    /// Exponential growth multiplier.
    pub multiplier: f64,
    /// A connection healthy for this long resets the attempt counter.
    pub healthy_reset: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.25,
            multiplier: 2.0,
            healthy_reset: Duration::from_secs(60),
        }
    }
}

/// Computes retry delays with exponential growth and jitter.
#[derive(Debug, Clone)]
pub struct BackoffStrategy {
    config: BackoffConfig,
}

impl BackoffStrategy {
    /// Creates a strategy with the given configuration.
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Creates a strategy with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BackoffConfig::default())
    }

    /// The underlying configuration.
    #[must_use]
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Delay for the given attempt number (0-indexed).
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.config.base_delay.as_millis() as f64;
        let capped_ms = (base_ms * self.config.multiplier.powi(attempt as i32))
            .min(self.config.max_delay.as_millis() as f64);
        let jitter_ms = if self.config.jitter_factor > 0.0 {
            rand::rng().random::<f64>() * capped_ms * self.config.jitter_factor
        } else {
            0.0
        };
        Duration::from_millis((capped_ms + jitter_ms) as u64)
    }
}

/// Why the pump loop returned.
enum PumpExit {
    /// Stream ended or became unusable; reconnect if allowed.
    Recycle,
    /// Shutdown was requested.
    Cancelled,
}

/// Manages one stream connection for its lifetime.
pub struct ConnectionManager {
    group: ChannelGroup,
    adapter: Arc<dyn VenueAdapter>,
    channels: Vec<ChannelSpec>,
    heartbeat: HeartbeatConfig,
    auto_reconnect: bool,
    max_symbols_per_request: usize,
    subscribe_request_delay: Duration,
    protocol_error_threshold: u32,
    state: Arc<AtomicU8>,
    backoff: BackoffStrategy,
    events: mpsc::UnboundedSender<EngineEvent>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Creates a manager for one channel group.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        group: ChannelGroup,
        adapter: Arc<dyn VenueAdapter>,
        channels: Vec<ChannelSpec>,
        heartbeat: HeartbeatConfig,
        auto_reconnect: bool,
        max_symbols_per_request: usize,
        subscribe_request_delay: Duration,
        protocol_error_threshold: u32,
        events: mpsc::UnboundedSender<EngineEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            group,
            adapter,
            channels,
            heartbeat,
            auto_reconnect,
            max_symbols_per_request,
            subscribe_request_delay,
            protocol_error_threshold,
            state: Arc::new(AtomicU8::new(ConnState::Disconnected.as_u8())),
            backoff: BackoffStrategy::with_defaults(),
            events,
            cancel,
        }
    }

    /// Replaces the reconnect backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Shared handle to the state cell, for observers.
    #[must_use]
    pub fn state_handle(&self) -> Arc<AtomicU8> {
        Arc::clone(&self.state)
    }

    fn set_state(&self, state: ConnState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Runs the connection until shutdown.
    ///
    /// Reconnects with exponential backoff after failures while
    /// `auto_reconnect` is set; otherwise emits
    /// [`EngineEvent::ConnectionLost`] and returns.
    #[instrument(skip(self), fields(group = %self.group))]
    pub async fn run(self) {
        let mut attempt: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let connected_at = Instant::now();
            match self.connect_and_pump().await {
                Ok(PumpExit::Cancelled) => break,
                Ok(PumpExit::Recycle) | Err(_) => {}
            }
            self.set_state(ConnState::Disconnected);
            if self.cancel.is_cancelled() {
                break;
            }
            if !self.auto_reconnect {
                warn!("stream lost, auto-reconnect disabled");
                let _ = self.events.send(EngineEvent::ConnectionLost(self.group));
                break;
            }
            // A connection that stayed up long enough restarts the backoff
            // schedule from the base delay.
            if connected_at.elapsed() >= self.backoff.config().healthy_reset {
                attempt = 0;
            }
            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
        self.set_state(ConnState::Disconnected);
        debug!("connection manager stopped");
    }

    async fn connect_and_pump(&self) -> Result<PumpExit> {
        self.set_state(ConnState::Connecting);
        let mut stream = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(PumpExit::Cancelled),
            stream = self.adapter.open_stream(self.group) => stream?,
        };
        info!("stream connected");

        self.set_state(ConnState::Subscribing);
        if let Err(err) = self.subscribe_all(stream.as_mut()).await {
            warn!(error = %err, "subscribe failed");
            let _ = stream.close().await;
            return if err.is_cancelled() {
                Ok(PumpExit::Cancelled)
            } else {
                Err(err)
            };
        }
        self.set_state(ConnState::Streaming);

        let exit = self.pump(stream.as_mut()).await;
        let _ = stream.close().await;
        Ok(exit)
    }

    /// Issues subscribe requests in batches, pausing between requests so
    /// large symbol sets do not trip venue request limits.
    async fn subscribe_all(&self, stream: &mut dyn VenueStream) -> Result<()> {
        let mut first = true;
        for batch in self.channels.chunks(self.max_symbols_per_request) {
            if self.cancel.is_cancelled() {
                return Err(Error::cancelled("shutdown during subscribe"));
            }
            if !first && !self.subscribe_request_delay.is_zero() {
                tokio::time::sleep(self.subscribe_request_delay).await;
            }
            first = false;
            stream.subscribe(batch).await?;
            debug!(batch_len = batch.len(), "subscribed batch");
        }
        Ok(())
    }

    async fn pump(&self, stream: &mut dyn VenueStream) -> PumpExit {
        let mut last_seen = Instant::now();
        let mut next_heartbeat = Instant::now() + self.heartbeat.protocol_period;
        let mut consecutive_parse_errors: u32 = 0;

        loop {
            let now = Instant::now();
            if now >= last_seen + self.heartbeat.liveness_timeout {
                warn!(
                    timeout_ms = self.heartbeat.liveness_timeout.as_millis() as u64,
                    "liveness timeout, forcing reconnect"
                );
                return PumpExit::Recycle;
            }
            if now >= next_heartbeat {
                if let Err(err) = stream.send_heartbeat().await {
                    warn!(error = %err, "heartbeat send failed");
                    return PumpExit::Recycle;
                }
                next_heartbeat = Instant::now() + self.heartbeat.protocol_period;
            }

            let deadline = next_heartbeat.min(last_seen + self.heartbeat.liveness_timeout);
            let message = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!("pump cancelled");
                    return PumpExit::Cancelled;
                }
                result = tokio::time::timeout_at(deadline, stream.next_message()) => result,
            };

            let message = match message {
                // Deadline reached: loop around to send the heartbeat or
                // declare the connection dead.
                Err(_) => continue,
                Ok(message) => message,
            };

            match message {
                Ok(Some(raw)) => {
                    last_seen = Instant::now();
                    match self.adapter.parse_message(&raw) {
                        Ok(StreamPayload::Events(events)) => {
                            consecutive_parse_errors = 0;
                            for event in events {
                                let _ = self.events.send(EngineEvent::Market(event));
                            }
                        }
                        Ok(StreamPayload::Heartbeat | StreamPayload::Ignore) => {
                            consecutive_parse_errors = 0;
                        }
                        Err(err) => {
                            consecutive_parse_errors += 1;
                            warn!(
                                error = %err,
                                consecutive = consecutive_parse_errors,
                                "unparseable message dropped"
                            );
                            if consecutive_parse_errors >= self.protocol_error_threshold {
                                warn!("parse error threshold reached, recycling stream");
                                return PumpExit::Recycle;
                            }
                        }
                    }
                }
                Ok(None) => {
                    info!("stream closed by venue");
                    return PumpExit::Recycle;
                }
                Err(err) => {
                    warn!(error = %err, "stream read failed");
                    return PumpExit::Recycle;
                }
            }
        }
    }
}
