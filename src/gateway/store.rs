use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::gateway::{GatewayError, GatewayResult};
use crate::monitor::types::{
    BookingOrder, ExecutionRecord, NewBookingOrder, OrderId, OrderStatus, Price,
};
use crate::utils::time::{Clock, SystemClock};

/// Read/write contract the monitor needs from a durable order store.
///
/// Every write refreshes `updated_at` with the supplied timestamp.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order and assign its id.
    async fn insert(&self, draft: NewBookingOrder) -> GatewayResult<BookingOrder>;

    async fn get(&self, id: OrderId) -> GatewayResult<Option<BookingOrder>>;

    /// All pending orders with no expiry or `expires_at > not_expired_as_of`.
    async fn list_pending(
        &self,
        not_expired_as_of: DateTime<Utc>,
    ) -> GatewayResult<Vec<BookingOrder>>;

    async fn list_by_owner(&self, owner_id: &str) -> GatewayResult<Vec<BookingOrder>>;

    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> GatewayResult<()>;

    /// Persist the diagnostic evaluation counter.
    async fn record_check(
        &self,
        id: OrderId,
        check_count: u64,
        at: DateTime<Utc>,
    ) -> GatewayResult<()>;

    async fn mark_executed(
        &self,
        id: OrderId,
        execution_price: Option<Price>,
        tx_hash: Option<String>,
        details: serde_json::Value,
        at: DateTime<Utc>,
    ) -> GatewayResult<()>;

    async fn mark_failed(
        &self,
        id: OrderId,
        details: serde_json::Value,
        at: DateTime<Utc>,
    ) -> GatewayResult<()>;

    async fn mark_expired(&self, id: OrderId, at: DateTime<Utc>) -> GatewayResult<()>;

    /// Cancel only if the order is still pending and belongs to `owner_id`.
    /// Returns `false` when either check fails.
    async fn cancel(&self, id: OrderId, owner_id: &str, at: DateTime<Utc>)
        -> GatewayResult<bool>;
}

/// Process-local store. Suitable for tests, demos and single-node deployments
/// that can afford to lose history on restart.
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, BookingOrder>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }

    /// Current stored copy of an order, bypassing the async interface.
    pub fn peek(&self, id: &OrderId) -> Option<BookingOrder> {
        self.orders.read().get(id).cloned()
    }

    fn transition(
        &self,
        id: OrderId,
        next: OrderStatus,
        at: DateTime<Utc>,
        apply: impl FnOnce(&mut BookingOrder),
    ) -> GatewayResult<()> {
        let mut orders = self.orders.write();
        let order = orders.get_mut(&id).ok_or(GatewayError::NotFound(id))?;

        if !order.status.can_transition_to(next) {
            return Err(GatewayError::InvalidTransition {
                id,
                from: order.status,
                to: next,
            });
        }

        debug!(order_id = %id, from = %order.status, to = %next, "Status transition");
        order.status = next;
        order.updated_at = at;
        apply(order);
        Ok(())
    }
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, draft: NewBookingOrder) -> GatewayResult<BookingOrder> {
        let order = draft.into_order(Uuid::new_v4(), self.clock.now());
        self.orders.write().insert(order.id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> GatewayResult<Option<BookingOrder>> {
        Ok(self.peek(&id))
    }

    async fn list_pending(
        &self,
        not_expired_as_of: DateTime<Utc>,
    ) -> GatewayResult<Vec<BookingOrder>> {
        let mut pending: Vec<_> = self
            .orders
            .read()
            .values()
            .filter(|order| order.is_pending() && !order.is_expired_at(not_expired_as_of))
            .cloned()
            .collect();
        pending.sort_by_key(|order| order.created_at);
        Ok(pending)
    }

    async fn list_by_owner(&self, owner_id: &str) -> GatewayResult<Vec<BookingOrder>> {
        let mut owned: Vec<_> = self
            .orders
            .read()
            .values()
            .filter(|order| order.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> GatewayResult<()> {
        self.transition(id, status, at, |_| {})
    }

    async fn record_check(
        &self,
        id: OrderId,
        check_count: u64,
        at: DateTime<Utc>,
    ) -> GatewayResult<()> {
        let mut orders = self.orders.write();
        let order = orders.get_mut(&id).ok_or(GatewayError::NotFound(id))?;
        order.check_count = order.check_count.max(check_count);
        order.last_checked_at = Some(at);
        order.updated_at = at;
        Ok(())
    }

    async fn mark_executed(
        &self,
        id: OrderId,
        execution_price: Option<Price>,
        tx_hash: Option<String>,
        details: serde_json::Value,
        at: DateTime<Utc>,
    ) -> GatewayResult<()> {
        self.transition(id, OrderStatus::Executed, at, |order| {
            order.executed_at = Some(at);
            order.execution = Some(ExecutionRecord {
                price: execution_price,
                tx_hash,
                details,
            });
        })
    }

    async fn mark_failed(
        &self,
        id: OrderId,
        details: serde_json::Value,
        at: DateTime<Utc>,
    ) -> GatewayResult<()> {
        self.transition(id, OrderStatus::Failed, at, |order| {
            order.execution = Some(ExecutionRecord {
                price: None,
                tx_hash: None,
                details,
            });
        })
    }

    async fn mark_expired(&self, id: OrderId, at: DateTime<Utc>) -> GatewayResult<()> {
        self.transition(id, OrderStatus::Expired, at, |_| {})
    }

    async fn cancel(
        &self,
        id: OrderId,
        owner_id: &str,
        at: DateTime<Utc>,
    ) -> GatewayResult<bool> {
        let mut orders = self.orders.write();
        let order = orders.get_mut(&id).ok_or(GatewayError::NotFound(id))?;

        if order.owner_id != owner_id || !order.is_pending() {
            return Ok(false);
        }

        order.status = OrderStatus::Cancelled;
        order.updated_at = at;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::{Condition, Instrument, OrderAction};
    use crate::utils::time::ManualClock;
    use chrono::Duration;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn draft(owner: &str) -> NewBookingOrder {
        NewBookingOrder::new(
            owner,
            "wallet",
            Instrument::new("mint-1", "BONK"),
            OrderAction::Notify,
            None,
        )
        .with_condition(Condition::above(1.0))
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_timestamps() {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryOrderStore::with_clock(clock.clone());

        let order = store.insert(draft("alice")).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.created_at, clock.now());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(order.id).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn test_list_pending_excludes_expired_and_terminal() {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryOrderStore::with_clock(clock.clone());
        let now = clock.now();

        let live = store.insert(draft("a")).await.unwrap();
        let stale = store
            .insert(draft("a").expiring_at(now - Duration::seconds(1)))
            .await
            .unwrap();
        let future = store
            .insert(draft("a").expiring_at(now + Duration::hours(1)))
            .await
            .unwrap();
        let done = store.insert(draft("a")).await.unwrap();
        store.mark_expired(done.id, now).await.unwrap();

        let ids: Vec<_> = store
            .list_pending(now)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert!(ids.contains(&live.id));
        assert!(ids.contains(&future.id));
        assert!(!ids.contains(&stale.id));
        assert!(!ids.contains(&done.id));
    }

    #[tokio::test]
    async fn test_execution_path_records_result() {
        let store = InMemoryOrderStore::new();
        let order = store.insert(draft("a")).await.unwrap();
        let at = Utc::now();

        assert_ok!(store.update_status(order.id, OrderStatus::Executing, at).await);
        assert_ok!(
            store
                .mark_executed(order.id, Some(1.5), Some("0xabc".into()), json!({"ok": true}), at)
                .await
        );

        let stored = store.peek(&order.id).unwrap();
        assert_eq!(stored.status, OrderStatus::Executed);
        assert_eq!(stored.executed_at, Some(at));
        let execution = stored.execution.unwrap();
        assert_eq!(execution.price, Some(1.5));
        assert_eq!(execution.tx_hash.as_deref(), Some("0xabc"));
    }

    #[tokio::test]
    async fn test_terminal_states_are_final() {
        let store = InMemoryOrderStore::new();
        let order = store.insert(draft("a")).await.unwrap();
        let at = Utc::now();

        store.mark_expired(order.id, at).await.unwrap();
        assert_err!(store.update_status(order.id, OrderStatus::Executing, at).await);
        assert_err!(store.mark_executed(order.id, None, None, json!({}), at).await);
        assert_eq!(store.peek(&order.id).unwrap().status, OrderStatus::Expired);
    }

    #[tokio::test]
    async fn test_cancel_requires_owner_and_pending() {
        let store = InMemoryOrderStore::new();
        let order = store.insert(draft("alice")).await.unwrap();
        let at = Utc::now();

        assert_eq!(store.cancel(order.id, "mallory", at).await, Ok(false));
        assert_eq!(store.cancel(order.id, "alice", at).await, Ok(true));
        assert_eq!(store.cancel(order.id, "alice", at).await, Ok(false));
        assert_eq!(
            store.cancel(Uuid::nil(), "alice", at).await,
            Err(GatewayError::NotFound(Uuid::nil()))
        );
    }

    #[tokio::test]
    async fn test_record_check_never_decreases() {
        let store = InMemoryOrderStore::new();
        let order = store.insert(draft("a")).await.unwrap();
        let at = Utc::now();

        store.record_check(order.id, 5, at).await.unwrap();
        store.record_check(order.id, 3, at).await.unwrap();
        let stored = store.peek(&order.id).unwrap();
        assert_eq!(stored.check_count, 5);
        assert_eq!(stored.last_checked_at, Some(at));
    }
}
