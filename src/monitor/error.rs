use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::monitor::types::OrderId;

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum MonitorError {
    /// Order is not tracked by the engine
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Order failed validation before it could be tracked
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// Order has already left the pending state
    #[error("Order {0} is not pending")]
    NotPending(OrderId),

    /// Persistence gateway or trade endpoint failure
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The engine task has stopped and no longer accepts commands
    #[error("Monitor engine is not running")]
    EngineStopped,
}

/// Result type for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;
