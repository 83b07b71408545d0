use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::feed::PriceFeed;
use crate::monitor::index::{ConditionIndex, IndexStats};
use crate::monitor::types::{BookingOrder, Instrument, OrderId, OrderStatus, Price};

/// Pending orders sharing one instrument, and therefore one feed subscription.
#[derive(Debug)]
pub struct OrderGroup {
    pub instrument: Instrument,
    pub orders: Vec<BookingOrder>,
}

/// Working memory of the engine: pending orders grouped per instrument, the
/// condition index over them, and the feed subscriptions they require.
///
/// A group exists exactly while it holds at least one order, and a subscription
/// is held exactly while its group exists.
pub struct OrderGroupRegistry {
    groups: HashMap<String, OrderGroup>,
    order_locations: HashMap<OrderId, String>,
    index: ConditionIndex,
    feed: Arc<dyn PriceFeed>,
}

impl OrderGroupRegistry {
    pub fn new(feed: Arc<dyn PriceFeed>) -> Self {
        Self {
            groups: HashMap::new(),
            order_locations: HashMap::new(),
            index: ConditionIndex::new(),
            feed,
        }
    }

    /// Track `order`, subscribing to its instrument if this is the first order on it.
    /// Returns `false` without side effects if the id is already tracked.
    pub fn add_order(&mut self, order: BookingOrder, now: DateTime<Utc>) -> bool {
        if self.order_locations.contains_key(&order.id) {
            debug!(order_id = %order.id, "Order already tracked");
            return false;
        }

        let key = order.instrument.address.clone();
        if !self.groups.contains_key(&key) {
            info!("Tracking new instrument {}", order.instrument);
            self.feed.subscribe(&order.instrument);
            self.groups.insert(
                key.clone(),
                OrderGroup {
                    instrument: order.instrument.clone(),
                    orders: Vec::new(),
                },
            );
        }

        self.index.add(&order, now);
        self.order_locations.insert(order.id, key.clone());
        if let Some(group) = self.groups.get_mut(&key) {
            group.orders.push(order);
        }
        true
    }

    /// Stop tracking `order_id`, unsubscribing when its group empties.
    /// Unknown ids, including orders whose group is already gone, are a no-op.
    pub fn remove_order(&mut self, order_id: &OrderId) -> Option<BookingOrder> {
        let key = self.order_locations.remove(order_id)?;
        self.index.remove(order_id);

        let group = self.groups.get_mut(&key)?;
        let position = group.orders.iter().position(|order| &order.id == order_id)?;
        let removed = group.orders.swap_remove(position);

        if group.orders.is_empty() {
            if let Some(group) = self.groups.remove(&key) {
                info!("No orders left on {}, releasing subscription", group.instrument);
                self.feed.unsubscribe(&group.instrument);
            }
        }

        Some(removed)
    }

    pub fn get(&self, order_id: &OrderId) -> Option<&BookingOrder> {
        let key = self.order_locations.get(order_id)?;
        self.groups
            .get(key)?
            .orders
            .iter()
            .find(|order| &order.id == order_id)
    }

    pub fn get_mut(&mut self, order_id: &OrderId) -> Option<&mut BookingOrder> {
        let key = self.order_locations.get(order_id)?;
        self.groups
            .get_mut(key)?
            .orders
            .iter_mut()
            .find(|order| &order.id == order_id)
    }

    /// Working-memory status only; the store stays authoritative.
    pub fn set_status(&mut self, order_id: &OrderId, status: OrderStatus) -> bool {
        match self.get_mut(order_id) {
            Some(order) => {
                order.status = status;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.order_locations.contains_key(order_id)
    }

    pub fn price_candidates(&self, address: &str, price: Price) -> Vec<OrderId> {
        self.index.price_candidates(address, price)
    }

    pub fn due_time_orders(&self, now: DateTime<Utc>) -> Vec<OrderId> {
        self.index.due_time_orders(now)
    }

    /// Pending orders whose expiry has been reached.
    pub fn expired_orders(&self, now: DateTime<Utc>) -> Vec<OrderId> {
        self.orders()
            .filter(|order| order.is_pending() && order.is_expired_at(now))
            .map(|order| order.id)
            .collect()
    }

    pub fn orders(&self) -> impl Iterator<Item = &BookingOrder> {
        self.groups.values().flat_map(|group| group.orders.iter())
    }

    pub fn group(&self, address: &str) -> Option<&OrderGroup> {
        self.groups.get(address)
    }

    pub fn instruments(&self) -> Vec<Instrument> {
        self.groups
            .values()
            .map(|group| group.instrument.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order_locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order_locations.is_empty()
    }

    pub fn instrument_count(&self) -> usize {
        self.groups.len()
    }

    pub fn compact(&mut self) -> usize {
        self.index.compact()
    }

    pub fn index_stats(&self) -> IndexStats {
        self.index.stats()
    }
}
