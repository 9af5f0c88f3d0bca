//! Exchange connectivity and state-synchronization engine.
//!
//! marketsync keeps a faithful in-memory mirror of a cryptocurrency venue:
//! live streams, REST polls and historical backfill all merge into one set
//! of tables with idempotent, ordered semantics, while order submission and
//! reconciliation keep the local order lifecycle consistent with the venue
//! even when acknowledgments go missing.
//!
//! # Features
//!
//! - **Venue-agnostic**: all wire specifics live behind the
//!   [`VenueAdapter`](adapter::VenueAdapter) trait
//! - **Dual-channel sync**: live stream + polling + backfill stitched into
//!   gap-free tables
//! - **Order lifecycle**: a forward-only state machine with periodic
//!   reconciliation against the venue
//! - **Precision**: `rust_decimal::Decimal` for all prices and sizes
//!
//! # Example
//!
//! ```rust,no_run
//! use marketsync::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example(adapter: Arc<dyn marketsync::adapter::VenueAdapter>) -> Result<()> {
//! let config = EngineConfig::builder()
//!     .symbols(SymbolSelection::List(vec!["BTC-USDT".to_string()]))
//!     .subscribe(SubscribeFlags {
//!         bbo: true,
//!         trade: true,
//!         order: true,
//!         fill: true,
//!         ..SubscribeFlags::default()
//!     })
//!     .build()?;
//!
//! let engine = Engine::new(config, adapter)?;
//! engine.start().await?;
//!
//! let quote = engine.bbo("BTC-USDT").await;
//! println!("mid: {:?}", quote.map(|q| q.mid_price()));
//!
//! engine.stop().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Global lint policy: these pedantic lints apply broadly across the codebase
// and would require excessive local annotations.
//
// - module_name_repetitions: common library pattern (OrderType in order module)
// - missing_errors_doc / missing_panics_doc: too verbose at this scale
// - must_use_candidate: not every return value needs #[must_use]
// - doc_markdown: technical terms (OHLCV, BBO) don't need backticks
// - similar_names: trading terminology is inherently similar (bid/ask)
// - cast_sign_loss / cast_possible_wrap: routine in timestamp arithmetic
// - struct_excessive_bools: config structs legitimately carry many flags
// - return_self_not_must_use: builder methods return Self
// - unreadable_literal: timestamps read better without separators
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::unreadable_literal)]

// Re-exports of external dependencies
pub use rust_decimal;
pub use serde;
pub use serde_json;

pub mod adapter;
pub mod backfill;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod logging;
pub mod mirror;
pub mod reconcile;
pub mod scheduler;
pub mod time;
pub mod types;

// Re-exports of core types for convenience
pub use adapter::{
    ApiMethod, ChannelGroup, ChannelKind, ChannelSpec, MarketEvent, OrderAck, Page, StreamPayload,
    VenueAdapter, VenueStream,
};
pub use backfill::{BackfillOrchestrator, BackfillPhase};
pub use config::{
    BackfillConfig, EngineConfig, EngineConfigBuilder, HeartbeatConfig, PacingConfig, PollConfig,
    ReconcileConfig, RetentionConfig, SubscribeFlags, SymbolSelection,
};
pub use connection::{BackoffConfig, BackoffStrategy, ConnState, ConnectionManager};
pub use engine::{CancelFilter, Engine, EngineEvent, OrderRequest};
pub use error::{Error, Result};
pub use mirror::{OrderMergeOutcome, SequenceEntry, SequenceTable, StateMirror};
pub use reconcile::Reconciler;
pub use scheduler::{RequestCategory, RequestScheduler};
pub use types::{
    Balance, Bbo, DataKind, Fill, Instrument, Ohlcv, Order, OrderSide, OrderStatus, OrderType,
    Position, TimeInForce, Trade,
};
// Re-export CancellationToken for convenient access
pub use tokio_util::sync::CancellationToken;

/// Prelude module for convenient imports
///
/// Import everything you need with:
/// ```rust
/// use marketsync::prelude::*;
/// ```
pub mod prelude {
    pub use crate::adapter::{
        ApiMethod, ChannelGroup, ChannelKind, ChannelSpec, MarketEvent, OrderAck, Page,
        StreamPayload, VenueAdapter, VenueStream,
    };
    pub use crate::config::{
        BackfillConfig, EngineConfig, EngineConfigBuilder, HeartbeatConfig, PacingConfig,
        PollConfig, ReconcileConfig, RetentionConfig, SubscribeFlags, SymbolSelection,
    };
    pub use crate::engine::{CancelFilter, Engine, EngineEvent, OrderRequest};
    pub use crate::error::{Error, Result};
    pub use crate::logging::{LogConfig, LogFormat, LogLevel, init_logging, try_init_logging};
    pub use crate::time::{iso8601, milliseconds, seconds};
    pub use crate::types::{
        Balance, Bbo, DataKind, Fill, Instrument, Ohlcv, Order, OrderSide, OrderStatus, OrderType,
        Position, TimeInForce, Trade,
    };
    pub use rust_decimal::Decimal;
    pub use serde::{Deserialize, Serialize};
    pub use tokio_util::sync::CancellationToken;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
