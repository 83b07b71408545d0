//! Evaluation and execution engine.
//!
//! One task owns the registry and the condition index and is the only place
//! they are mutated. Price ticks, sweep timers, caller commands and finished
//! executions all arrive on that task through `tokio::select!`. Trade calls run
//! as spawned tasks so unrelated orders proceed concurrently; an order with an
//! execution in flight is held as `executing` in memory and is not admitted
//! again until its outcome comes back.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::feed::PriceFeed;
use crate::gateway::{
    GatewayError, OrderStore, PriceDirective, TradeExecutor, TradeRequest, TradeResponse,
};
use crate::metrics::MonitorMetrics;
use crate::monitor::conditions::{evaluate_order, EvaluationContext, OrderEvaluation};
use crate::monitor::error::{MonitorError, MonitorResult};
use crate::monitor::events::{MonitorEvent, PriceUpdate, RemovalReason};
use crate::monitor::index::IndexStats;
use crate::monitor::registry::OrderGroupRegistry;
use crate::monitor::types::{
    BookingOrder, Condition, ExecutionRecord, Instrument, NewBookingOrder, OrderAction, OrderId,
    OrderStatus, PriceTick,
};
use crate::utils::time::{periodic, Clock, LatencyTimer, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    pub pending_orders: usize,
    pub tracked_instruments: usize,
    pub executions_in_flight: usize,
    pub index: IndexStats,
}

enum ExecutionOutcome {
    /// Status left `pending` for good; `result.success` tells executed from failed
    Completed {
        order: BookingOrder,
        evaluation: OrderEvaluation,
        result: TradeResponse,
    },
    /// Store no longer had the order as pending
    Skipped {
        order_id: OrderId,
        status: Option<OrderStatus>,
    },
    /// Store unreachable before the point of no return; order stays pending
    Abandoned { order_id: OrderId, reason: String },
}

/// Everything a spawned execution needs, detached from the engine.
#[derive(Clone)]
struct Dispatcher {
    store: Arc<dyn OrderStore>,
    executor: Arc<dyn TradeExecutor>,
    clock: Arc<dyn Clock>,
    metrics: Arc<MonitorMetrics>,
    timeout: Duration,
}

impl Dispatcher {
    async fn run(self, order: BookingOrder, evaluation: OrderEvaluation) -> ExecutionOutcome {
        let order_id = order.id;

        match self.store.get(order_id).await {
            Ok(Some(stored)) if stored.is_pending() => {}
            Ok(stored) => {
                return ExecutionOutcome::Skipped {
                    order_id,
                    status: stored.map(|o| o.status),
                }
            }
            Err(e) => {
                return ExecutionOutcome::Abandoned {
                    order_id,
                    reason: e.to_string(),
                }
            }
        }

        // Durable flip to executing is the point of no return
        match self
            .store
            .update_status(order_id, OrderStatus::Executing, self.clock.now())
            .await
        {
            Ok(()) => {}
            Err(GatewayError::InvalidTransition { from, .. }) => {
                return ExecutionOutcome::Skipped {
                    order_id,
                    status: Some(from),
                }
            }
            Err(GatewayError::NotFound(_)) => {
                return ExecutionOutcome::Skipped {
                    order_id,
                    status: None,
                }
            }
            Err(e) => {
                return ExecutionOutcome::Abandoned {
                    order_id,
                    reason: e.to_string(),
                }
            }
        }

        info!(order_id = %order_id, "Executing {} order on {}", order.action, order.instrument);

        let timer = LatencyTimer::start();
        let result = self.dispatch(&order, &evaluation).await;
        self.metrics.record_execution_latency(timer.stop());

        self.finish(order, evaluation, result).await
    }

    async fn dispatch(&self, order: &BookingOrder, evaluation: &OrderEvaluation) -> TradeResponse {
        if order.action == OrderAction::Notify {
            return TradeResponse {
                success: true,
                tx_hash: None,
                executed_price: evaluation.price,
                error: None,
            };
        }

        let Some(amount) = order.amount else {
            return TradeResponse::rejected(format!("{} order has no amount", order.action));
        };

        let request = TradeRequest {
            wallet: order.wallet_address.clone(),
            side: order.action,
            token_address: order.instrument.address.clone(),
            token_symbol: order.instrument.symbol.clone(),
            amount,
            price_directive: PriceDirective::Market,
        };

        match timeout(self.timeout, self.executor.execute(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => TradeResponse::rejected(e.to_string()),
            Err(_) => {
                TradeResponse::rejected(GatewayError::Timeout(self.timeout.as_secs()).to_string())
            }
        }
    }

    async fn finish(
        &self,
        mut order: BookingOrder,
        evaluation: OrderEvaluation,
        result: TradeResponse,
    ) -> ExecutionOutcome {
        let now = self.clock.now();
        let details = json!({ "evaluation": evaluation, "result": result });

        if result.success {
            let price = result.executed_price.or(evaluation.price);
            if let Err(e) = self
                .store
                .mark_executed(order.id, price, result.tx_hash.clone(), details.clone(), now)
                .await
            {
                error!(order_id = %order.id, "Order executed but status not persisted: {}", e);
            }
            order.status = OrderStatus::Executed;
            order.executed_at = Some(now);
            order.execution = Some(ExecutionRecord {
                price,
                tx_hash: result.tx_hash.clone(),
                details,
            });
        } else {
            if let Err(e) = self.store.mark_failed(order.id, details.clone(), now).await {
                error!(order_id = %order.id, "Order failed but status not persisted: {}", e);
            }
            order.status = OrderStatus::Failed;
            order.execution = Some(ExecutionRecord {
                price: None,
                tx_hash: None,
                details,
            });
        }
        order.updated_at = now;

        ExecutionOutcome::Completed {
            order,
            evaluation,
            result,
        }
    }
}

/// Requests funneled into the engine task.
pub enum Command {
    Add {
        order: Box<BookingOrder>,
        reply: oneshot::Sender<MonitorResult<bool>>,
    },
    Create {
        draft: Box<NewBookingOrder>,
        reply: oneshot::Sender<MonitorResult<BookingOrder>>,
    },
    Remove {
        order_id: OrderId,
        reply: oneshot::Sender<bool>,
    },
    Cancel {
        order_id: OrderId,
        owner_id: String,
        reply: oneshot::Sender<MonitorResult<bool>>,
    },
    Evaluate {
        order_id: OrderId,
        reply: oneshot::Sender<MonitorResult<OrderEvaluation>>,
    },
    Stats {
        reply: oneshot::Sender<MonitorStats>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub struct MonitorEngine {
    registry: OrderGroupRegistry,
    store: Arc<dyn OrderStore>,
    feed: Arc<dyn PriceFeed>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
    metrics: Arc<MonitorMetrics>,
    events: broadcast::Sender<MonitorEvent>,
    in_flight: JoinSet<ExecutionOutcome>,
    dirty_checks: HashSet<OrderId>,
}

impl MonitorEngine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        feed: Arc<dyn PriceFeed>,
        executor: Arc<dyn TradeExecutor>,
        config: MonitorConfig,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let metrics = Arc::new(MonitorMetrics::new());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            registry: OrderGroupRegistry::new(feed.clone()),
            dispatcher: Dispatcher {
                store: store.clone(),
                executor,
                clock: clock.clone(),
                metrics: metrics.clone(),
                timeout: config.execution_timeout,
            },
            store,
            feed,
            clock,
            config,
            metrics,
            events,
            in_flight: JoinSet::new(),
            dirty_checks: HashSet::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.dispatcher.clock = clock.clone();
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MonitorMetrics>) -> Self {
        self.dispatcher.metrics = metrics.clone();
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<MonitorMetrics> {
        self.metrics.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Rebuild working memory from every pending, unexpired order in the store.
    /// Returns the number of orders now tracked.
    pub async fn bootstrap(&mut self) -> MonitorResult<usize> {
        let now = self.clock.now();
        let pending = self.store.list_pending(now).await?;
        let total = pending.len();

        let mut loaded = 0;
        for order in pending {
            let order_id = order.id;
            match self.add_order(order).await {
                Ok(true) => loaded += 1,
                Ok(false) => {}
                Err(e) => warn!(order_id = %order_id, "Skipping stored order: {}", e),
            }
        }

        info!(
            "Loaded {} of {} pending orders across {} instruments",
            loaded,
            total,
            self.registry.instrument_count()
        );
        Ok(loaded)
    }

    /// Persist a new order, then start tracking it.
    pub async fn create_order(&mut self, draft: NewBookingOrder) -> MonitorResult<BookingOrder> {
        validate(&draft.instrument, draft.action, draft.amount, &draft.conditions)?;
        let order = self.store.insert(draft).await?;
        self.add_order(order.clone()).await?;
        Ok(order)
    }

    /// Start tracking an already-persisted order.
    ///
    /// Returns `Ok(false)` when the id is already tracked, or when the order has
    /// expired (it is then marked expired instead of being indexed).
    pub async fn add_order(&mut self, order: BookingOrder) -> MonitorResult<bool> {
        if !order.is_pending() {
            return Err(MonitorError::NotPending(order.id));
        }
        validate(&order.instrument, order.action, order.amount, &order.conditions)?;

        if self.registry.contains(&order.id) {
            debug!(order_id = %order.id, "Order already tracked");
            return Ok(false);
        }

        let now = self.clock.now();
        if order.is_expired_at(now) {
            match self.store.mark_expired(order.id, now).await {
                Ok(()) => {
                    info!(order_id = %order.id, "Order expired before it could be tracked");
                    self.metrics.increment_orders_expired();
                    self.emit(MonitorEvent::OrderRemoved {
                        order_id: order.id,
                        reason: RemovalReason::Expired,
                    });
                }
                Err(GatewayError::InvalidTransition { .. }) | Err(GatewayError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(false);
        }

        let order_id = order.id;
        let address = order.instrument.address.clone();
        info!(
            order_id = %order_id,
            "Tracking {} order on {} ({} conditions, {})",
            order.action,
            order.instrument,
            order.conditions.len(),
            order.logic
        );

        self.registry.add_order(order.clone(), now);
        self.metrics.increment_orders_added();
        self.refresh_gauges();
        self.emit(MonitorEvent::OrderAdded { order });

        // Unchanged prices are never re-broadcast, so check against the cache now
        if let Some(tick) = self.feed.current_price(&address) {
            self.process_candidate(order_id, Some(tick), now).await;
        }

        Ok(true)
    }

    /// Drop an order from working memory without touching the store.
    pub fn remove_order(&mut self, order_id: &OrderId) -> bool {
        self.drop_order(*order_id, RemovalReason::Removed).is_some()
    }

    /// Cancel in the store (only while pending and owned by `owner_id`), then stop tracking.
    pub async fn cancel(&mut self, order_id: OrderId, owner_id: &str) -> MonitorResult<bool> {
        let cancelled = self
            .store
            .cancel(order_id, owner_id, self.clock.now())
            .await?;

        if cancelled {
            info!(order_id = %order_id, "Order cancelled by {}", owner_id);
            self.drop_order(order_id, RemovalReason::Cancelled);
        } else {
            debug!(order_id = %order_id, "Cancel refused: not pending or not owned by {}", owner_id);
        }
        Ok(cancelled)
    }

    /// Evaluate a tracked order against cached data without executing it.
    pub fn evaluate(&self, order_id: &OrderId) -> MonitorResult<OrderEvaluation> {
        let order = self
            .registry
            .get(order_id)
            .ok_or(MonitorError::OrderNotFound(*order_id))?;
        let tick = self.feed.current_price(&order.instrument.address);
        Ok(evaluate_order(
            order,
            &EvaluationContext::new(tick, self.clock.now()),
        ))
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            pending_orders: self.registry.len(),
            tracked_instruments: self.registry.instrument_count(),
            executions_in_flight: self.in_flight.len(),
            index: self.registry.index_stats(),
        }
    }

    /// Reactive path: re-evaluate every order the index nominates for this tick.
    pub async fn on_price_tick(&mut self, tick: PriceTick) {
        let timer = LatencyTimer::start();
        self.metrics.increment_ticks_processed();
        self.emit(MonitorEvent::PriceUpdate(PriceUpdate::from(&tick)));

        let candidates = self.registry.price_candidates(&tick.address, tick.price);
        if !candidates.is_empty() {
            debug!(
                "{} candidate order(s) for {} at {}",
                candidates.len(),
                tick.symbol,
                tick.price
            );
        }

        let now = self.clock.now();
        for order_id in candidates {
            self.process_candidate(order_id, Some(tick.clone()), now).await;
        }

        self.metrics.record_tick_latency(timer.stop());
    }

    /// Time-driven path: expire first, then evaluate orders whose time target
    /// has been reached, then persist check counters.
    pub async fn sweep(&mut self) {
        let timer = LatencyTimer::start();
        let now = self.clock.now();

        for order_id in self.registry.expired_orders(now) {
            self.expire_order(order_id, now).await;
        }

        for order_id in self.registry.due_time_orders(now) {
            let tick = self
                .registry
                .get(&order_id)
                .and_then(|order| self.feed.current_price(&order.instrument.address));
            self.process_candidate(order_id, tick, now).await;
        }

        self.flush_checks(now).await;
        self.metrics.record_sweep_latency(timer.stop());
    }

    /// Re-check every tracked instrument against the feed's cached price.
    ///
    /// Dropped ticks are never re-broadcast while the price holds, so after a
    /// lag this is the only way an already-crossed threshold gets noticed.
    /// Returns the number of instruments that had a cached price.
    pub async fn resync(&mut self) -> usize {
        let now = self.clock.now();
        let mut refreshed = 0;

        for instrument in self.registry.instruments() {
            let Some(tick) = self.feed.current_price(&instrument.address) else {
                continue;
            };
            refreshed += 1;
            for order_id in self.registry.price_candidates(&tick.address, tick.price) {
                self.process_candidate(order_id, Some(tick.clone()), now).await;
            }
        }

        debug!("Resynced {} instruments from cached prices", refreshed);
        refreshed
    }

    /// Drop empty index groups. Returns the number released.
    pub fn compact(&mut self) -> usize {
        let released = self.registry.compact();
        if released > 0 {
            debug!("Compaction released {} empty groups", released);
        }
        released
    }

    /// Wait for every in-flight execution and apply its outcome.
    pub async fn settle(&mut self) {
        while let Some(joined) = self.in_flight.join_next().await {
            self.handle_joined(joined);
        }
    }

    /// Spawn the engine loop and return a handle for talking to it.
    pub fn start(self) -> (MonitorHandle, JoinHandle<()>) {
        let (commands, rx) = mpsc::channel(self.config.command_capacity.max(1));
        let handle = MonitorHandle {
            commands,
            events: self.events.clone(),
        };
        (handle, tokio::spawn(self.run(rx)))
    }

    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut ticks = self.feed.price_updates();
        let mut feed_open = true;

        let mut sweep = periodic(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut compaction = periodic(self.config.compaction_interval);
        compaction.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Monitor engine running with {} orders, sweep every {:?}",
            self.registry.len(),
            self.config.sweep_interval
        );

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        self.settle().await;
                        break;
                    }
                },
                tick = ticks.recv(), if feed_open => match tick {
                    Ok(tick) => self.on_price_tick(tick).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Engine lagged behind the price feed, {} ticks skipped", skipped);
                        self.resync().await;
                    }
                    Err(RecvError::Closed) => {
                        warn!("Price feed closed, continuing with sweeps only");
                        feed_open = false;
                    }
                },
                _ = sweep.tick() => self.sweep().await,
                _ = compaction.tick() => {
                    self.compact();
                }
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.handle_joined(joined);
                }
            }
        }

        info!("Monitor engine stopped");
    }

    /// Apply one command. Returns `false` once the engine should stop.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Add { order, reply } => {
                let _ = reply.send(self.add_order(*order).await);
            }
            Command::Create { draft, reply } => {
                let _ = reply.send(self.create_order(*draft).await);
            }
            Command::Remove { order_id, reply } => {
                let _ = reply.send(self.remove_order(&order_id));
            }
            Command::Cancel {
                order_id,
                owner_id,
                reply,
            } => {
                let _ = reply.send(self.cancel(order_id, &owner_id).await);
            }
            Command::Evaluate { order_id, reply } => {
                let _ = reply.send(self.evaluate(&order_id));
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Command::Shutdown { reply } => {
                self.settle().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn process_candidate(
        &mut self,
        order_id: OrderId,
        tick: Option<PriceTick>,
        now: DateTime<Utc>,
    ) {
        let Some(order) = self.registry.get(&order_id) else {
            return;
        };
        if !order.is_pending() {
            debug!(order_id = %order_id, "Execution in flight, not re-evaluated");
            return;
        }
        if order.is_expired_at(now) {
            self.expire_order(order_id, now).await;
            return;
        }

        let evaluation = evaluate_order(order, &EvaluationContext::new(tick, now));
        self.metrics.increment_evaluations();
        debug!(
            order_id = %order_id,
            should_execute = evaluation.should_execute,
            "Evaluated {} conditions ({})",
            evaluation.results.len(),
            evaluation.logic
        );

        if let Some(order) = self.registry.get_mut(&order_id) {
            order.check_count += 1;
            order.last_checked_at = Some(now);
        }
        self.dirty_checks.insert(order_id);

        if evaluation.should_execute {
            self.begin_execution(order_id, evaluation);
        }
    }

    fn begin_execution(&mut self, order_id: OrderId, evaluation: OrderEvaluation) {
        let Some(order) = self.registry.get_mut(&order_id) else {
            return;
        };
        order.status = OrderStatus::Executing;
        let order = order.clone();

        self.in_flight
            .spawn(self.dispatcher.clone().run(order, evaluation));
    }

    async fn expire_order(&mut self, order_id: OrderId, now: DateTime<Utc>) {
        match self.store.mark_expired(order_id, now).await {
            Ok(()) => {
                info!(order_id = %order_id, "Order expired");
                self.metrics.increment_orders_expired();
                self.drop_order(order_id, RemovalReason::Expired);
            }
            Err(GatewayError::InvalidTransition { from, .. }) => {
                debug!(order_id = %order_id, "Not expiring, store has it {}", from);
                self.drop_order(order_id, RemovalReason::NotPending);
            }
            Err(GatewayError::NotFound(_)) => {
                self.drop_order(order_id, RemovalReason::NotPending);
            }
            Err(e) => {
                warn!(order_id = %order_id, "Could not expire order, retrying next sweep: {}", e);
            }
        }
    }

    fn handle_joined(&mut self, joined: Result<ExecutionOutcome, JoinError>) {
        match joined {
            Ok(outcome) => self.handle_outcome(outcome),
            Err(e) => error!("Execution task did not complete: {}", e),
        }
    }

    fn handle_outcome(&mut self, outcome: ExecutionOutcome) {
        match outcome {
            ExecutionOutcome::Completed {
                order,
                evaluation,
                result,
            } => {
                let order_id = order.id;
                if result.success {
                    info!(
                        order_id = %order_id,
                        "Order executed{}",
                        result
                            .tx_hash
                            .as_deref()
                            .map(|tx| format!(" (tx {})", tx))
                            .unwrap_or_default()
                    );
                    self.metrics.increment_executions_succeeded();
                    self.emit(MonitorEvent::OrderExecuted {
                        order,
                        evaluation,
                        result,
                    });
                    self.drop_order(order_id, RemovalReason::Executed);
                } else {
                    warn!(
                        order_id = %order_id,
                        "Order execution failed: {}",
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                    self.metrics.increment_executions_failed();
                    self.drop_order(order_id, RemovalReason::Failed);
                }
            }
            ExecutionOutcome::Skipped { order_id, status } => {
                debug!(order_id = %order_id, ?status, "Order no longer pending, skipped");
                self.drop_order(order_id, RemovalReason::NotPending);
            }
            ExecutionOutcome::Abandoned { order_id, reason } => {
                warn!(order_id = %order_id, "Execution abandoned, order stays pending: {}", reason);
                self.registry.set_status(&order_id, OrderStatus::Pending);
            }
        }
    }

    fn drop_order(&mut self, order_id: OrderId, reason: RemovalReason) -> Option<BookingOrder> {
        let removed = self.registry.remove_order(&order_id)?;
        self.dirty_checks.remove(&order_id);
        self.metrics.increment_orders_removed();
        self.refresh_gauges();
        debug!(order_id = %order_id, "Order removed ({})", reason);
        self.emit(MonitorEvent::OrderRemoved { order_id, reason });
        Some(removed)
    }

    async fn flush_checks(&mut self, now: DateTime<Utc>) {
        let dirty: Vec<OrderId> = self.dirty_checks.drain().collect();
        for order_id in dirty {
            let Some(order) = self.registry.get(&order_id) else {
                continue;
            };
            let count = order.check_count;
            let at = order.last_checked_at.unwrap_or(now);

            if let Err(e) = self.store.record_check(order_id, count, at).await {
                warn!(order_id = %order_id, "Could not persist check count: {}", e);
                self.dirty_checks.insert(order_id);
            }
        }
    }

    fn refresh_gauges(&self) {
        self.metrics.set_pending_orders(self.registry.len() as u64);
        self.metrics
            .set_tracked_instruments(self.registry.instrument_count() as u64);
    }

    fn emit(&self, event: MonitorEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }
}

fn validate(
    instrument: &Instrument,
    action: OrderAction,
    amount: Option<Decimal>,
    conditions: &[Condition],
) -> MonitorResult<()> {
    if instrument.address.trim().is_empty() {
        return Err(MonitorError::InvalidOrder(
            "instrument address is empty".to_string(),
        ));
    }
    if conditions.is_empty() {
        return Err(MonitorError::InvalidOrder(
            "order has no conditions".to_string(),
        ));
    }
    if matches!(action, OrderAction::Buy | OrderAction::Sell)
        && !amount.map_or(false, |amount| amount > Decimal::ZERO)
    {
        return Err(MonitorError::InvalidOrder(format!(
            "{} order needs a positive amount",
            action
        )));
    }
    Ok(())
}

/// Cloneable front door to a running engine.
#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<MonitorEvent>,
}

impl MonitorHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> MonitorResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| MonitorError::EngineStopped)?;
        rx.await.map_err(|_| MonitorError::EngineStopped)
    }

    pub async fn add_order(&self, order: BookingOrder) -> MonitorResult<bool> {
        self.request(|reply| Command::Add {
            order: Box::new(order),
            reply,
        })
        .await?
    }

    pub async fn create_order(&self, draft: NewBookingOrder) -> MonitorResult<BookingOrder> {
        self.request(|reply| Command::Create {
            draft: Box::new(draft),
            reply,
        })
        .await?
    }

    pub async fn remove_order(&self, order_id: OrderId) -> MonitorResult<bool> {
        self.request(|reply| Command::Remove { order_id, reply })
            .await
    }

    pub async fn cancel(&self, order_id: OrderId, owner_id: impl Into<String>) -> MonitorResult<bool> {
        let owner_id = owner_id.into();
        self.request(|reply| Command::Cancel {
            order_id,
            owner_id,
            reply,
        })
        .await?
    }

    pub async fn evaluate(&self, order_id: OrderId) -> MonitorResult<OrderEvaluation> {
        self.request(|reply| Command::Evaluate { order_id, reply })
            .await?
    }

    pub async fn stats(&self) -> MonitorResult<MonitorStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Stop the engine after in-flight executions finish.
    pub async fn shutdown(&self) -> MonitorResult<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}
