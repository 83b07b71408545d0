//! Conditional Booking-Order Monitor
//!
//! Watches pending booking orders (buy, sell or notify instructions gated by
//! price, time and market conditions) and fires each one exactly when its
//! combined AND/OR logic becomes true, or expires it when its deadline passes.
//!
//! # Features
//!
//! - **Indexed lookups**: a price tick only touches orders on its instrument whose
//!   threshold it crosses; a wall-clock sweep only touches orders whose time target
//!   has been reached
//! - **Single evaluation timeline**: one task owns all working memory; trade calls
//!   run concurrently per order without re-entrancy on the same order
//! - **Cold start**: working memory is rebuilt entirely from the durable store
//! - **Pluggable boundaries**: order store, price feed and trade endpoint are traits
//! - **Monitoring**: counters, gauges and latency histograms via `metrics`
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use booking_order_monitor::config::MonitorConfig;
//! use booking_order_monitor::gateway::{DryRunTradeExecutor, InMemoryOrderStore};
//! use booking_order_monitor::monitor::{Condition, Instrument, MonitorEngine, NewBookingOrder, OrderAction};
//! use booking_order_monitor::testing::ManualPriceFeed;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = MonitorEngine::new(
//!     Arc::new(InMemoryOrderStore::new()),
//!     Arc::new(ManualPriceFeed::new()),
//!     Arc::new(DryRunTradeExecutor),
//!     MonitorConfig::default(),
//! );
//! let (handle, _task) = engine.start();
//!
//! let sol = Instrument::new("So11111111111111111111111111111111111111112", "SOL");
//! let order = handle
//!     .create_order(
//!         NewBookingOrder::new("user-1", "wallet-1", sol, OrderAction::Notify, None)
//!             .with_condition(Condition::above(200.0)),
//!     )
//!     .await?;
//! println!("Tracking order {}", order.id);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! 1. **Price feed** (`feed`): polls external sources per subscribed instrument and
//!    broadcasts a tick only when the price changes
//! 2. **Condition index** (`monitor::index`): maps a tick or an instant to candidate orders
//! 3. **Order groups** (`monitor::registry`): per-instrument order lists that own the
//!    feed subscriptions
//! 4. **Engine** (`monitor::engine`): evaluates every condition of each candidate and
//!    drives the status machine through the store and the trade endpoint

pub mod config;
pub mod feed;
pub mod gateway;
pub mod metrics;
pub mod monitor;
pub mod testing;
pub mod utils;

// Re-export commonly used types
pub use monitor::{
    error::{MonitorError, MonitorResult},
    types::{BookingOrder, Condition, Instrument, NewBookingOrder, OrderId, OrderStatus, PriceTick},
    MonitorEngine, MonitorEvent, MonitorHandle,
};

pub use self::metrics::MonitorMetrics;
