//! Core monitor module
//!
//! Condition evaluation, the condition index, per-instrument order groups and
//! the engine that ties them to price ticks, wall-clock sweeps and execution.

pub mod conditions;
pub mod engine;
pub mod error;
pub mod events;
pub mod index;
pub mod registry;
pub mod types;

// Re-export main types for convenience
pub use conditions::{ConditionResult, EvaluationContext, OrderEvaluation};
pub use engine::{MonitorEngine, MonitorHandle, MonitorStats};
pub use error::{MonitorError, MonitorResult};
pub use events::{MonitorEvent, PriceUpdate, RemovalReason};
pub use index::{ConditionIndex, IndexStats};
pub use registry::{OrderGroup, OrderGroupRegistry};
pub use types::{
    BookingOrder, Comparison, Condition, ExecutionRecord, Instrument, LogicType, MarketCondition,
    NewBookingOrder, OrderAction, OrderId, OrderStatus, Price, PriceCondition, PriceTick,
    PriceTrigger, TimeCondition, TimeMode,
};

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_module_exports() {
        let order = NewBookingOrder::new(
            "owner",
            "wallet",
            Instrument::new("mint", "TKN"),
            OrderAction::Notify,
            None,
        )
        .with_condition(Condition::above(1.0))
        .into_order(Uuid::new_v4(), chrono::Utc::now());

        let mut index = ConditionIndex::new();
        assert!(index.add(&order, chrono::Utc::now()));
        assert_eq!(index.stats().orders, 1);
    }
}
