use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

use crate::monitor::conditions::resolve_time_window;
use crate::monitor::types::{BookingOrder, Condition, OrderId, Price, PriceTrigger};

#[derive(Debug, Clone, Copy)]
struct ThresholdEntry {
    order_id: OrderId,
    threshold: Price,
}

#[derive(Debug, Clone, Copy)]
struct RangeEntry {
    order_id: OrderId,
    lower: Price,
    upper: Option<Price>,
}

/// Lookup structures mapping a live signal to the pending orders it could affect.
///
/// Price groups are keyed by instrument address and store each order with its own
/// threshold, so a tick only touches orders on its instrument whose threshold it
/// crosses. Market-metric orders on the instrument are always candidates. Time
/// entries carry a target instant derived once when the order is indexed.
///
/// A hit only nominates an order; callers re-evaluate all of its conditions.
#[derive(Debug, Default)]
pub struct ConditionIndex {
    above: HashMap<String, Vec<ThresholdEntry>>,
    below: HashMap<String, Vec<ThresholdEntry>>,
    between: HashMap<String, Vec<RangeEntry>>,
    market: HashMap<String, Vec<OrderId>>,

    time_targets: HashMap<OrderId, DateTime<Utc>>,
    time_queue: BTreeSet<(DateTime<Utc>, OrderId)>,

    // Order -> instrument key, for removal independent of the triggering condition
    placements: HashMap<OrderId, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub orders: usize,
    pub above_groups: usize,
    pub below_groups: usize,
    pub between_groups: usize,
    pub market_groups: usize,
    pub time_entries: usize,
}

impl ConditionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every condition of `order`. Returns `false` if the order is already
    /// indexed, leaving existing entries untouched.
    pub fn add(&mut self, order: &BookingOrder, now: DateTime<Utc>) -> bool {
        if self.placements.contains_key(&order.id) {
            debug!(order_id = %order.id, "Order already indexed");
            return false;
        }

        let key = order.instrument.address.clone();
        let mut time_target: Option<DateTime<Utc>> = None;

        for condition in &order.conditions {
            match condition {
                Condition::Price(price) => match price.trigger_type {
                    PriceTrigger::Above => self.above.entry(key.clone()).or_default().push(
                        ThresholdEntry {
                            order_id: order.id,
                            threshold: price.price,
                        },
                    ),
                    PriceTrigger::Below => self.below.entry(key.clone()).or_default().push(
                        ThresholdEntry {
                            order_id: order.id,
                            threshold: price.price,
                        },
                    ),
                    PriceTrigger::Between => {
                        self.between
                            .entry(key.clone())
                            .or_default()
                            .push(RangeEntry {
                                order_id: order.id,
                                lower: price.price,
                                upper: price.upper_price,
                            })
                    }
                },
                Condition::Time(time) => match resolve_time_window(time) {
                    Ok(window) => {
                        let target = window.start.unwrap_or(now);
                        time_target = Some(time_target.map_or(target, |t| t.min(target)));
                    }
                    Err(reason) => {
                        warn!(order_id = %order.id, "Time condition not indexed: {}", reason);
                    }
                },
                Condition::Market(_) => {
                    self.market.entry(key.clone()).or_default().push(order.id)
                }
            }
        }

        if let Some(target) = time_target {
            self.time_targets.insert(order.id, target);
            self.time_queue.insert((target, order.id));
        }

        self.placements.insert(order.id, key);
        true
    }

    /// Remove `order_id` from every structure it was placed in. Unknown ids are a no-op.
    /// Emptied groups are left for [`compact`](Self::compact).
    pub fn remove(&mut self, order_id: &OrderId) -> bool {
        let Some(key) = self.placements.remove(order_id) else {
            return false;
        };

        if let Some(group) = self.above.get_mut(&key) {
            group.retain(|entry| &entry.order_id != order_id);
        }
        if let Some(group) = self.below.get_mut(&key) {
            group.retain(|entry| &entry.order_id != order_id);
        }
        if let Some(group) = self.between.get_mut(&key) {
            group.retain(|entry| &entry.order_id != order_id);
        }
        if let Some(group) = self.market.get_mut(&key) {
            group.retain(|id| id != order_id);
        }
        if let Some(target) = self.time_targets.remove(order_id) {
            self.time_queue.remove(&(target, *order_id));
        }

        true
    }

    /// Orders on `address` that a tick at `price` could affect.
    pub fn price_candidates(&self, address: &str, price: Price) -> Vec<OrderId> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut push = |id: OrderId| {
            if seen.insert(id) {
                candidates.push(id);
            }
        };

        if let Some(group) = self.above.get(address) {
            group
                .iter()
                .filter(|entry| price > entry.threshold)
                .for_each(|entry| push(entry.order_id));
        }
        if let Some(group) = self.below.get(address) {
            group
                .iter()
                .filter(|entry| price < entry.threshold)
                .for_each(|entry| push(entry.order_id));
        }
        if let Some(group) = self.between.get(address) {
            group
                .iter()
                .filter(|entry| {
                    entry
                        .upper
                        .map_or(false, |upper| entry.lower <= price && price <= upper)
                })
                .for_each(|entry| push(entry.order_id));
        }
        if let Some(group) = self.market.get(address) {
            group.iter().for_each(|id| push(*id));
        }

        candidates
    }

    /// Orders whose time target has been reached at `now`.
    pub fn due_time_orders(&self, now: DateTime<Utc>) -> Vec<OrderId> {
        self.time_queue
            .iter()
            .take_while(|(target, _)| *target <= now)
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn time_target(&self, order_id: &OrderId) -> Option<DateTime<Utc>> {
        self.time_targets.get(order_id).copied()
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.placements.contains_key(order_id)
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Drop empty groups. Returns the number of groups released.
    pub fn compact(&mut self) -> usize {
        let before = self.group_count();
        self.above.retain(|_, group| !group.is_empty());
        self.below.retain(|_, group| !group.is_empty());
        self.between.retain(|_, group| !group.is_empty());
        self.market.retain(|_, group| !group.is_empty());
        before - self.group_count()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            orders: self.placements.len(),
            above_groups: self.above.len(),
            below_groups: self.below.len(),
            between_groups: self.between.len(),
            market_groups: self.market.len(),
            time_entries: self.time_targets.len(),
        }
    }

    fn group_count(&self) -> usize {
        self.above.len() + self.below.len() + self.between.len() + self.market.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::{
        Instrument, MarketCondition, NewBookingOrder, OrderAction, TimeCondition,
    };
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn order(address: &str, conditions: Vec<Condition>) -> BookingOrder {
        let mut draft = NewBookingOrder::new(
            "u",
            "w",
            Instrument::new(address, "TKN"),
            OrderAction::Notify,
            None,
        );
        draft.conditions = conditions;
        draft.into_order(Uuid::new_v4(), now())
    }

    #[test]
    fn test_price_groups_filter_by_threshold() {
        let mut index = ConditionIndex::new();
        let above = order("a", vec![Condition::above(10.0)]);
        let below = order("a", vec![Condition::below(5.0)]);
        let range = order("a", vec![Condition::between(6.0, 8.0)]);
        let other = order("b", vec![Condition::above(1.0)]);

        for o in [&above, &below, &range, &other] {
            assert!(index.add(o, now()));
        }

        assert_eq!(index.price_candidates("a", 11.0), vec![above.id]);
        assert_eq!(index.price_candidates("a", 4.0), vec![below.id]);
        assert_eq!(index.price_candidates("a", 6.0), vec![range.id]);
        assert!(index.price_candidates("a", 9.0).is_empty());
        assert!(index.price_candidates("c", 100.0).is_empty());
    }

    #[test]
    fn test_duplicate_add_is_noop() {
        let mut index = ConditionIndex::new();
        let o = order("a", vec![Condition::above(1.0)]);

        assert!(index.add(&o, now()));
        assert!(!index.add(&o, now()));
        assert_eq!(index.price_candidates("a", 2.0), vec![o.id]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_multi_condition_order_listed_once() {
        let mut index = ConditionIndex::new();
        let o = order(
            "a",
            vec![
                Condition::above(1.0),
                Condition::between(0.5, 3.0),
                Condition::Market(MarketCondition::volume_above(10.0)),
            ],
        );
        index.add(&o, now());

        assert_eq!(index.price_candidates("a", 2.0), vec![o.id]);
        // Market members are nominated regardless of price
        assert_eq!(index.price_candidates("a", 0.1), vec![o.id]);
    }

    #[test]
    fn test_time_targets_and_due_orders() {
        let mut index = ConditionIndex::new();
        let later = order(
            "a",
            vec![Condition::Time(TimeCondition::direct(
                Some(now() + Duration::minutes(10)),
                None,
            ))],
        );
        let relative = order(
            "a",
            vec![Condition::Time(TimeCondition::relative(Some(now()), Some(30), None))],
        );
        let open_ended = order(
            "a",
            vec![Condition::Time(TimeCondition::direct(None, Some(now() + Duration::days(1))))],
        );
        let invalid = order(
            "a",
            vec![Condition::Time(TimeCondition::relative(None, Some(5), None))],
        );

        for o in [&later, &relative, &open_ended, &invalid] {
            index.add(o, now());
        }

        assert_eq!(index.time_target(&relative.id), Some(now() + Duration::minutes(30)));
        assert_eq!(index.time_target(&open_ended.id), Some(now()));
        assert_eq!(index.time_target(&invalid.id), None);

        assert_eq!(index.due_time_orders(now()), vec![open_ended.id]);
        assert_eq!(
            index.due_time_orders(now() + Duration::minutes(10)),
            vec![open_ended.id, later.id]
        );
        assert_eq!(index.due_time_orders(now() + Duration::hours(1)).len(), 3);
    }

    #[test]
    fn test_remove_clears_every_structure() {
        let mut index = ConditionIndex::new();
        let o = order(
            "a",
            vec![
                Condition::above(1.0),
                Condition::below(10.0),
                Condition::Time(TimeCondition::direct(None, None)),
            ],
        );
        index.add(&o, now());

        assert!(index.remove(&o.id));
        assert!(index.price_candidates("a", 5.0).is_empty());
        assert!(index.due_time_orders(now()).is_empty());
        assert!(!index.contains(&o.id));

        // Unknown id is a no-op
        assert!(!index.remove(&o.id));
        assert!(!index.remove(&Uuid::new_v4()));
    }

    #[test]
    fn test_compaction_drops_empty_groups() {
        let mut index = ConditionIndex::new();
        let keep = order("a", vec![Condition::above(1.0)]);
        let drop = order("b", vec![Condition::above(1.0), Condition::below(3.0)]);
        index.add(&keep, now());
        index.add(&drop, now());
        index.remove(&drop.id);

        assert_eq!(index.stats().above_groups, 2);
        assert_eq!(index.compact(), 2);
        let stats = index.stats();
        assert_eq!(stats.above_groups, 1);
        assert_eq!(stats.below_groups, 0);
        assert_eq!(stats.orders, 1);
        assert_eq!(index.compact(), 0);
    }
}
