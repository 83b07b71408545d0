use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::gateway::TradeResponse;
use crate::monitor::conditions::OrderEvaluation;
use crate::monitor::types::{BookingOrder, OrderId, Price, PriceTick};

/// Why an order left working memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    Executed,
    Failed,
    Cancelled,
    Expired,
    /// Explicit removal by the caller
    Removed,
    /// Store reported the order was no longer pending
    NotPending,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RemovalReason::Executed => "executed",
            RemovalReason::Failed => "failed",
            RemovalReason::Cancelled => "cancelled",
            RemovalReason::Expired => "expired",
            RemovalReason::Removed => "removed",
            RemovalReason::NotPending => "not pending",
        };
        write!(f, "{}", label)
    }
}

/// Live price snapshot forwarded to UI consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub symbol: String,
    pub address: String,
    pub price: Price,
    pub change_24h: Option<f64>,
    pub volume_24h: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl From<&PriceTick> for PriceUpdate {
    fn from(tick: &PriceTick) -> Self {
        Self {
            symbol: tick.symbol.clone(),
            address: tick.address.clone(),
            price: tick.price,
            change_24h: tick.change_24h,
            volume_24h: tick.volume_24h,
            timestamp: tick.timestamp,
        }
    }
}

/// Outbound notifications. Delivery is best effort: slow receivers may lag and
/// miss events, which never affects execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    OrderAdded {
        order: BookingOrder,
    },
    OrderRemoved {
        order_id: OrderId,
        reason: RemovalReason,
    },
    OrderExecuted {
        order: BookingOrder,
        evaluation: OrderEvaluation,
        result: TradeResponse,
    },
    PriceUpdate(PriceUpdate),
}

impl MonitorEvent {
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            MonitorEvent::OrderAdded { order } => Some(order.id),
            MonitorEvent::OrderRemoved { order_id, .. } => Some(*order_id),
            MonitorEvent::OrderExecuted { order, .. } => Some(order.id),
            MonitorEvent::PriceUpdate(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::Instrument;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_event_wire_shape() {
        let event = MonitorEvent::OrderRemoved {
            order_id: Uuid::nil(),
            reason: RemovalReason::Expired,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], json!("order_removed"));
        assert_eq!(value["reason"], json!("expired"));
        assert_eq!(event.order_id(), Some(Uuid::nil()));
    }

    #[test]
    fn test_price_update_from_tick() {
        let tick = PriceTick::new(&Instrument::new("mint", "TKN"), 1.25, Utc::now())
            .with_volume(10.0)
            .with_market_cap(99.0);
        let update = PriceUpdate::from(&tick);

        assert_eq!(update.symbol, "TKN");
        assert_eq!(update.price, 1.25);
        assert_eq!(update.volume_24h, Some(10.0));

        let event = MonitorEvent::PriceUpdate(update);
        assert_eq!(serde_json::to_value(&event).unwrap()["event"], json!("price_update"));
        assert!(event.order_id().is_none());
    }
}
