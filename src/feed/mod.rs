//! Price feed adapter: polls external price sources per subscribed instrument,
//! caches the last known tick and broadcasts a tick only when the price changes.

pub mod sources;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::monitor::types::{Instrument, PriceTick};
use crate::utils::time::periodic;
use sources::{PriceQuote, PriceSource};

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum FeedError {
    /// Request never completed (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Source answered with a non-success status
    #[error("Unexpected status {0}")]
    Status(u16),

    /// Payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Source has no price for this token
    #[error("Token not listed: {0}")]
    NotListed(String),

    /// No sources configured
    #[error("No price sources configured")]
    NoSources,
}

/// Result type for price feed operations
pub type FeedResult<T> = Result<T, FeedError>;

/// What the monitor consumes from a price feed.
///
/// Instruments are keyed by address; the symbol travels along for display.
pub trait PriceFeed: Send + Sync {
    /// Begin tracking an instrument. Subscribing twice is a no-op.
    fn subscribe(&self, instrument: &Instrument);

    /// Stop tracking an instrument and release its cached state.
    fn unsubscribe(&self, instrument: &Instrument);

    /// Last cached tick, if any.
    fn current_price(&self, address: &str) -> Option<PriceTick>;

    /// Receiver of price-changed events.
    fn price_updates(&self) -> broadcast::Receiver<PriceTick>;
}

struct FeedInner {
    sources: Vec<Arc<dyn PriceSource>>,
    config: FeedConfig,
    cache: DashMap<String, PriceTick>,
    subscriptions: DashMap<String, JoinHandle<()>>,
    last_fetch: DashMap<String, Instant>,
    tx: broadcast::Sender<PriceTick>,
}

/// Polling price feed over an ordered list of sources.
#[derive(Clone)]
pub struct PriceFeedAdapter {
    inner: Arc<FeedInner>,
}

impl PriceFeedAdapter {
    /// `sources` are tried in order; the first successful answer wins.
    pub fn new(sources: Vec<Arc<dyn PriceSource>>, config: FeedConfig) -> Self {
        let (tx, _) = broadcast::channel(config.channel_capacity.max(1));
        info!(
            "Price feed created with {} source(s), poll every {:?}",
            sources.len(),
            config.poll_interval
        );

        Self {
            inner: Arc::new(FeedInner {
                sources,
                config,
                cache: DashMap::new(),
                subscriptions: DashMap::new(),
                last_fetch: DashMap::new(),
                tx,
            }),
        }
    }

    /// Fetch now unless the instrument was fetched within the minimum interval.
    /// Returns the cached tick after the attempt.
    pub async fn refresh(&self, instrument: &Instrument) -> Option<PriceTick> {
        self.inner.refresh(instrument).await
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    pub fn is_subscribed(&self, address: &str) -> bool {
        self.inner.subscriptions.contains_key(address)
    }

    /// Stop every polling task.
    pub fn shutdown(&self) {
        let keys: Vec<String> = self
            .inner
            .subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            if let Some((_, handle)) = self.inner.subscriptions.remove(&key) {
                handle.abort();
            }
        }
        info!("Price feed stopped");
    }
}

impl PriceFeed for PriceFeedAdapter {
    fn subscribe(&self, instrument: &Instrument) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Cannot subscribe to {} outside a tokio runtime", instrument);
            return;
        };

        match self.inner.subscriptions.entry(instrument.address.clone()) {
            Entry::Occupied(_) => {
                debug!("Already subscribed to {}", instrument);
            }
            Entry::Vacant(slot) => {
                let inner = Arc::clone(&self.inner);
                let instrument = instrument.clone();
                info!("Subscribing to {}", instrument);

                let handle = runtime.spawn(async move {
                    let mut ticker = periodic(inner.config.poll_interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        ticker.tick().await;
                        inner.refresh(&instrument).await;
                    }
                });
                slot.insert(handle);
            }
        }
    }

    fn unsubscribe(&self, instrument: &Instrument) {
        if let Some((_, handle)) = self.inner.subscriptions.remove(&instrument.address) {
            handle.abort();
            info!("Unsubscribed from {}", instrument);
        }
        self.inner.cache.remove(&instrument.address);
        self.inner.last_fetch.remove(&instrument.address);
    }

    fn current_price(&self, address: &str) -> Option<PriceTick> {
        self.inner.cache.get(address).map(|entry| entry.value().clone())
    }

    fn price_updates(&self) -> broadcast::Receiver<PriceTick> {
        self.inner.tx.subscribe()
    }
}

impl FeedInner {
    async fn refresh(&self, instrument: &Instrument) -> Option<PriceTick> {
        let key = &instrument.address;

        if let Some(last) = self.last_fetch.get(key) {
            if last.elapsed() < self.config.min_fetch_interval {
                debug!("Skipping fetch for {}: rate limited", instrument);
                return self.cache.get(key).map(|entry| entry.value().clone());
            }
        }
        self.last_fetch.insert(key.clone(), Instant::now());

        if let Some((source, quote)) = self.fetch_with_retry(instrument).await {
            self.publish(instrument, source, quote);
        }

        self.cache.get(key).map(|entry| entry.value().clone())
    }

    async fn fetch_with_retry(&self, instrument: &Instrument) -> Option<(String, PriceQuote)> {
        let attempts = self.config.max_retries.max(1);

        for attempt in 1..=attempts {
            match self.fetch_once(instrument).await {
                Ok(found) => return Some(found),
                Err(e) => {
                    debug!(
                        "Price fetch for {} failed (attempt {}/{}): {}",
                        instrument, attempt, attempts, e
                    );
                    if attempt < attempts {
                        sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        warn!(
            "Giving up on {} for this cycle after {} attempts",
            instrument, attempts
        );
        None
    }

    async fn fetch_once(&self, instrument: &Instrument) -> FeedResult<(String, PriceQuote)> {
        let mut last_error = FeedError::NoSources;

        for source in &self.sources {
            match source.fetch(instrument).await {
                Ok(quote) => return Ok((source.name().to_string(), quote)),
                Err(e) => {
                    debug!("Source {} failed for {}: {}", source.name(), instrument, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    /// Cache every successful fetch so market data stays fresh; broadcast only
    /// when the price moved.
    fn publish(&self, instrument: &Instrument, source: String, quote: PriceQuote) {
        let changed = self
            .cache
            .get(&instrument.address)
            .map_or(true, |cached| cached.price != quote.price);

        let tick = PriceTick {
            symbol: instrument.symbol.clone(),
            address: instrument.address.clone(),
            price: quote.price,
            change_24h: quote.change_24h,
            volume_24h: quote.volume_24h,
            market_cap: quote.market_cap,
            timestamp: chrono::Utc::now(),
            source,
        };

        self.cache.insert(instrument.address.clone(), tick.clone());
        if changed {
            debug!("Price changed for {}: {}", instrument, tick.price);
            // No receivers is fine; the cache still serves current_price
            let _ = self.tx.send(tick);
        }
    }
}
