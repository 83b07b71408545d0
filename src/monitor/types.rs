use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type OrderId = Uuid;
pub type Price = f64;

/// A tradable token. The address is the canonical key; the symbol is for display
/// and is not guaranteed unique across sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub address: String,
    pub symbol: String,
}

impl Instrument {
    pub fn new(address: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, self.address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Buy,
    Sell,
    Notify,
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderAction::Buy => write!(f, "BUY"),
            OrderAction::Sell => write!(f, "SELL"),
            OrderAction::Notify => write!(f, "NOTIFY"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicType {
    #[default]
    And,
    Or,
}

impl fmt::Display for LogicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicType::And => write!(f, "AND"),
            LogicType::Or => write!(f, "OR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Executing,
    Executed,
    Failed,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Executed | OrderStatus::Failed | OrderStatus::Cancelled | OrderStatus::Expired
        )
    }

    /// Transitions only move forward:
    /// pending -> executing -> executed | failed, pending -> cancelled | expired.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Executing)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Pending, OrderStatus::Expired)
                | (OrderStatus::Executing, OrderStatus::Executed)
                | (OrderStatus::Executing, OrderStatus::Failed)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Executing => "executing",
            OrderStatus::Executed => "executed",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceTrigger {
    Above,
    Below,
    Between,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCondition {
    pub trigger_type: PriceTrigger,
    /// Threshold, or the lower bound for `between`.
    pub price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_price: Option<Price>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeMode {
    Direct,
    Relative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeCondition {
    pub time_mode: TimeMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_time: Option<DateTime<Utc>>,
    /// Minutes relative to `base_time`; negative values fall before it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_offset_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_offset_minutes: Option<i64>,
}

impl TimeCondition {
    pub fn direct(start_time: Option<DateTime<Utc>>, end_time: Option<DateTime<Utc>>) -> Self {
        Self {
            time_mode: TimeMode::Direct,
            start_time,
            end_time,
            base_time: None,
            start_offset_minutes: None,
            end_offset_minutes: None,
        }
    }

    pub fn relative(
        base_time: Option<DateTime<Utc>>,
        start_offset_minutes: Option<i64>,
        end_offset_minutes: Option<i64>,
    ) -> Self {
        Self {
            time_mode: TimeMode::Relative,
            start_time: None,
            end_time: None,
            base_time,
            start_offset_minutes,
            end_offset_minutes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Above,
    Below,
    Equals,
}

/// Either the volume-trigger shape or the generic `{metric, value, comparison}` shape.
/// Fields are optional so malformed payloads still load and evaluate as not met.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_trigger: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Comparison>,
}

impl MarketCondition {
    pub fn volume_above(threshold: f64) -> Self {
        Self {
            volume_trigger: Some(true),
            volume_threshold: Some(threshold),
            ..Self::default()
        }
    }

    pub fn metric(metric: impl Into<String>, comparison: Comparison, value: f64) -> Self {
        Self {
            metric: Some(metric.into()),
            value: Some(value),
            comparison: Some(comparison),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "condition_type",
    content = "condition_details",
    rename_all = "snake_case"
)]
pub enum Condition {
    Price(PriceCondition),
    Time(TimeCondition),
    Market(MarketCondition),
}

impl Condition {
    pub fn above(price: Price) -> Self {
        Condition::Price(PriceCondition {
            trigger_type: PriceTrigger::Above,
            price,
            upper_price: None,
        })
    }

    pub fn below(price: Price) -> Self {
        Condition::Price(PriceCondition {
            trigger_type: PriceTrigger::Below,
            price,
            upper_price: None,
        })
    }

    pub fn between(lower: Price, upper: Price) -> Self {
        Condition::Price(PriceCondition {
            trigger_type: PriceTrigger::Between,
            price: lower,
            upper_price: Some(upper),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Condition::Price(_) => "price",
            Condition::Time(_) => "time",
            Condition::Market(_) => "market",
        }
    }
}

/// Outcome captured once an order has been dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub price: Option<Price>,
    pub tx_hash: Option<String>,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingOrder {
    pub id: OrderId,
    pub owner_id: String,
    pub wallet_address: String,
    pub instrument: Instrument,
    pub action: OrderAction,
    pub amount: Option<Decimal>,
    pub conditions: Vec<Condition>,
    pub logic: LogicType,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub check_count: u64,
    pub execution: Option<ExecutionRecord>,
}

impl BookingOrder {
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expires_at| expires_at <= now)
    }
}

/// An order as submitted by the API layer, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBookingOrder {
    pub owner_id: String,
    pub wallet_address: String,
    pub instrument: Instrument,
    pub action: OrderAction,
    #[serde(default)]
    pub amount: Option<Decimal>,
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub logic: LogicType,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewBookingOrder {
    pub fn new(
        owner_id: impl Into<String>,
        wallet_address: impl Into<String>,
        instrument: Instrument,
        action: OrderAction,
        amount: Option<Decimal>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            wallet_address: wallet_address.into(),
            instrument,
            action,
            amount,
            conditions: Vec::new(),
            logic: LogicType::And,
            expires_at: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_logic(mut self, logic: LogicType) -> Self {
        self.logic = logic;
        self
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Materialize a pending order with the given id and creation time.
    pub fn into_order(self, id: OrderId, now: DateTime<Utc>) -> BookingOrder {
        BookingOrder {
            id,
            owner_id: self.owner_id,
            wallet_address: self.wallet_address,
            instrument: self.instrument,
            action: self.action,
            amount: self.amount,
            conditions: self.conditions,
            logic: self.logic,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            last_checked_at: None,
            executed_at: None,
            expires_at: self.expires_at,
            check_count: 0,
            execution: None,
        }
    }
}

/// One ephemeral price observation. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: String,
    pub address: String,
    pub price: Price,
    pub change_24h: Option<f64>,
    pub volume_24h: Option<f64>,
    pub market_cap: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl PriceTick {
    pub fn new(instrument: &Instrument, price: Price, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: instrument.symbol.clone(),
            address: instrument.address.clone(),
            price,
            change_24h: None,
            volume_24h: None,
            market_cap: None,
            timestamp,
            source: "manual".to_string(),
        }
    }

    pub fn with_volume(mut self, volume_24h: f64) -> Self {
        self.volume_24h = Some(volume_24h);
        self
    }

    pub fn with_market_cap(mut self, market_cap: f64) -> Self {
        self.market_cap = Some(market_cap);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn sol() -> Instrument {
        Instrument::new("So11111111111111111111111111111111111111112", "SOL")
    }

    #[test]
    fn test_order_creation() {
        let now = Utc::now();
        let order = NewBookingOrder::new("user-1", "wallet-1", sol(), OrderAction::Buy, Some(Decimal::new(15, 1)))
            .with_condition(Condition::above(150.0))
            .into_order(Uuid::new_v4(), now);

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.check_count, 0);
        assert_eq!(order.created_at, now);
        assert_eq!(order.conditions.len(), 1);
        assert!(order.execution.is_none());
    }

    #[test]
    fn test_status_transitions_are_monotonic() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Executing));
        assert!(OrderStatus::Executing.can_transition_to(OrderStatus::Failed));
        assert!(!OrderStatus::Executed.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Expired.can_transition_to(OrderStatus::Executing));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Executed));
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Executing.is_terminal());
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let order = NewBookingOrder::new("u", "w", sol(), OrderAction::Notify, None)
            .with_condition(Condition::below(1.0))
            .expiring_at(now)
            .into_order(Uuid::new_v4(), now - Duration::minutes(1));

        assert!(order.is_expired_at(now));
        assert!(!order.is_expired_at(now - Duration::seconds(1)));
    }

    #[test]
    fn test_condition_wire_shape() {
        let condition: Condition = serde_json::from_value(json!({
            "condition_type": "price",
            "condition_details": { "trigger_type": "between", "price": 100.0, "upper_price": 200.0 }
        }))
        .unwrap();
        assert_eq!(condition, Condition::between(100.0, 200.0));

        let market: Condition = serde_json::from_value(json!({
            "condition_type": "market",
            "condition_details": { "volume_trigger": true, "volume_threshold": 1000000.0 }
        }))
        .unwrap();
        assert_eq!(market, Condition::Market(MarketCondition::volume_above(1_000_000.0)));
    }

    #[test]
    fn test_logic_serialization() {
        assert_eq!(serde_json::to_string(&LogicType::Or).unwrap(), "\"OR\"");
        let parsed: LogicType = serde_json::from_str("\"AND\"").unwrap();
        assert_eq!(parsed, LogicType::And);
    }
}
