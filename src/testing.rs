//! In-process doubles for the monitor's external collaborators.
//!
//! Shared by unit tests, the integration suite and the benches; nothing here
//! touches the network.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::feed::PriceFeed;
use crate::gateway::{GatewayResult, TradeExecutor, TradeRequest, TradeResponse};
use crate::monitor::types::{Instrument, PriceTick};

/// Price feed driven entirely by the test. Every subscribe/unsubscribe call is
/// counted, so subscription lifecycles can be asserted exactly.
pub struct ManualPriceFeed {
    prices: Mutex<HashMap<String, PriceTick>>,
    active: Mutex<HashSet<String>>,
    subscribe_calls: Mutex<HashMap<String, usize>>,
    unsubscribe_calls: Mutex<HashMap<String, usize>>,
    tx: broadcast::Sender<PriceTick>,
}

impl ManualPriceFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            prices: Mutex::new(HashMap::new()),
            active: Mutex::new(HashSet::new()),
            subscribe_calls: Mutex::new(HashMap::new()),
            unsubscribe_calls: Mutex::new(HashMap::new()),
            tx,
        }
    }

    /// Update the cached price without broadcasting it.
    pub fn set_price(&self, tick: PriceTick) {
        self.prices.lock().insert(tick.address.clone(), tick);
    }

    /// Cache and broadcast a tick, as a real feed does on a price change.
    pub fn publish(&self, tick: PriceTick) {
        self.set_price(tick.clone());
        let _ = self.tx.send(tick);
    }

    pub fn subscribe_calls(&self, address: &str) -> usize {
        self.subscribe_calls.lock().get(address).copied().unwrap_or(0)
    }

    pub fn unsubscribe_calls(&self, address: &str) -> usize {
        self.unsubscribe_calls.lock().get(address).copied().unwrap_or(0)
    }

    pub fn is_subscribed(&self, address: &str) -> bool {
        self.active.lock().contains(address)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.active.lock().len()
    }
}

impl Default for ManualPriceFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceFeed for ManualPriceFeed {
    fn subscribe(&self, instrument: &Instrument) {
        *self
            .subscribe_calls
            .lock()
            .entry(instrument.address.clone())
            .or_default() += 1;
        self.active.lock().insert(instrument.address.clone());
    }

    fn unsubscribe(&self, instrument: &Instrument) {
        *self
            .unsubscribe_calls
            .lock()
            .entry(instrument.address.clone())
            .or_default() += 1;
        self.active.lock().remove(&instrument.address);
    }

    fn current_price(&self, address: &str) -> Option<PriceTick> {
        self.prices.lock().get(address).cloned()
    }

    fn price_updates(&self) -> broadcast::Receiver<PriceTick> {
        self.tx.subscribe()
    }
}

/// Trade endpoint that replays queued answers and records every request.
/// Once the script runs out it reports a fill with a generated tx hash.
pub struct ScriptedTradeExecutor {
    script: Mutex<VecDeque<GatewayResult<TradeResponse>>>,
    requests: Mutex<Vec<TradeRequest>>,
    delay: Option<Duration>,
}

impl ScriptedTradeExecutor {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Hold every call for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_response(&self, response: TradeResponse) {
        self.script.lock().push_back(Ok(response));
    }

    pub fn push_error(&self, error: crate::gateway::GatewayError) {
        self.script.lock().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<TradeRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Default for ScriptedTradeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradeExecutor for ScriptedTradeExecutor {
    async fn execute(&self, request: TradeRequest) -> GatewayResult<TradeResponse> {
        let call = {
            let mut requests = self.requests.lock();
            requests.push(request);
            requests.len()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(TradeResponse {
                success: true,
                tx_hash: Some(format!("tx-{}", call)),
                executed_price: None,
                error: None,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, PriceDirective};
    use crate::monitor::types::OrderAction;
    use rust_decimal::Decimal;

    fn request() -> TradeRequest {
        TradeRequest {
            wallet: "w".to_string(),
            side: OrderAction::Buy,
            token_address: "mint".to_string(),
            token_symbol: "TKN".to_string(),
            amount: Decimal::ONE,
            price_directive: PriceDirective::Market,
        }
    }

    #[tokio::test]
    async fn test_scripted_executor_replays_then_fills() {
        let executor = ScriptedTradeExecutor::new();
        executor.push_response(TradeResponse::rejected("slippage"));
        executor.push_error(GatewayError::Transport("reset".to_string()));

        assert!(!executor.execute(request()).await.unwrap().success);
        assert!(executor.execute(request()).await.is_err());
        let third = executor.execute(request()).await.unwrap();
        assert!(third.success);
        assert_eq!(third.tx_hash.as_deref(), Some("tx-3"));
        assert_eq!(executor.call_count(), 3);
    }

    #[tokio::test]
    async fn test_manual_feed_counts_calls() {
        let feed = ManualPriceFeed::new();
        let instrument = Instrument::new("mint", "TKN");
        let mut updates = feed.price_updates();

        feed.subscribe(&instrument);
        feed.publish(PriceTick::new(&instrument, 2.0, chrono::Utc::now()));

        assert_eq!(feed.subscribe_calls("mint"), 1);
        assert!(feed.is_subscribed("mint"));
        assert_eq!(updates.recv().await.unwrap().price, 2.0);
        assert_eq!(feed.current_price("mint").unwrap().price, 2.0);

        feed.unsubscribe(&instrument);
        assert_eq!(feed.active_subscriptions(), 0);
    }
}
