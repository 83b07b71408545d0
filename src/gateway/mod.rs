//! Boundaries to the collaborators the monitor does not own: the durable order
//! store and the remote trade-execution endpoint.

pub mod store;
pub mod trade;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitor::types::{OrderId, OrderStatus};

pub use store::{InMemoryOrderStore, OrderStore};
pub use trade::{
    DryRunTradeExecutor, HttpTradeExecutor, PriceDirective, TradeExecutor, TradeRequest,
    TradeResponse,
};

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum GatewayError {
    /// Store could not be reached or rejected the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// No record with this id
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// Requested status change would move backwards or out of a terminal state
    #[error("Invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Trade endpoint could not be reached
    #[error("Transport error: {0}")]
    Transport(String),

    /// Trade endpoint answered with something we could not decode
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Trade endpoint did not answer in time
    #[error("Trade request timed out after {0}s")]
    Timeout(u64),
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display() {
        let id = Uuid::nil();
        assert_eq!(
            GatewayError::InvalidTransition {
                id,
                from: OrderStatus::Executed,
                to: OrderStatus::Pending,
            }
            .to_string(),
            format!("Invalid status transition for {}: executed -> pending", id)
        );
        assert_eq!(
            GatewayError::Timeout(30).to_string(),
            "Trade request timed out after 30s"
        );
    }
}
