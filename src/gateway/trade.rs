use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::gateway::{GatewayError, GatewayResult};
use crate::monitor::types::{OrderAction, Price};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceDirective {
    Market,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    pub wallet: String,
    pub side: OrderAction,
    pub token_address: String,
    pub token_symbol: String,
    pub amount: Decimal,
    pub price_directive: PriceDirective,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_price: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TradeResponse {
    pub fn filled(tx_hash: impl Into<String>, executed_price: Price) -> Self {
        Self {
            success: true,
            tx_hash: Some(tx_hash.into()),
            executed_price: Some(executed_price),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            tx_hash: None,
            executed_price: None,
            error: Some(error.into()),
        }
    }
}

/// Remote endpoint that performs the actual swap.
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn execute(&self, request: TradeRequest) -> GatewayResult<TradeResponse>;
}

/// Posts trade requests as JSON to a fixed URL.
pub struct HttpTradeExecutor {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpTradeExecutor {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl TradeExecutor for HttpTradeExecutor {
    async fn execute(&self, request: TradeRequest) -> GatewayResult<TradeResponse> {
        debug!(
            "Submitting {} {} {} for wallet {}",
            request.side, request.amount, request.token_symbol, request.wallet
        );

        let resp = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        interpret_response(status, &body)
    }
}

/// A non-2xx status is a rejection whatever the body claims; the body's
/// `error` is kept when it has one.
fn interpret_response(status: reqwest::StatusCode, body: &str) -> GatewayResult<TradeResponse> {
    let parsed = serde_json::from_str::<TradeResponse>(body);

    if !status.is_success() {
        warn!("Trade endpoint returned {}: {}", status, body);
        let reason = parsed
            .ok()
            .and_then(|response| response.error)
            .unwrap_or_else(|| body.to_string());
        return Ok(TradeResponse::rejected(format!("HTTP {}: {}", status, reason)));
    }

    parsed.map_err(|e| GatewayError::MalformedResponse(e.to_string()))
}

/// Logs the request and reports a fill without touching any endpoint.
/// Used when the server runs with `DRY_RUN=1`.
#[derive(Debug, Default)]
pub struct DryRunTradeExecutor;

#[async_trait]
impl TradeExecutor for DryRunTradeExecutor {
    async fn execute(&self, request: TradeRequest) -> GatewayResult<TradeResponse> {
        info!(
            "[dry-run] would {} {} {} ({}) for wallet {}",
            request.side,
            request.amount, request.token_symbol, request.token_address, request.wallet
        );
        Ok(TradeResponse {
            success: true,
            tx_hash: Some(format!("dry-run-{}", uuid::Uuid::new_v4())),
            executed_price: None,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let request = TradeRequest {
            wallet: "wallet-1".to_string(),
            side: OrderAction::Sell,
            token_address: "mint-1".to_string(),
            token_symbol: "BONK".to_string(),
            amount: Decimal::new(25, 1),
            price_directive: PriceDirective::Market,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["tokenAddress"], json!("mint-1"));
        assert_eq!(value["tokenSymbol"], json!("BONK"));
        assert_eq!(value["priceDirective"], json!("market"));
        assert_eq!(value["side"], json!("sell"));
    }

    #[test]
    fn test_response_optional_fields() {
        let parsed: TradeResponse =
            serde_json::from_value(json!({"success": false, "error": "slippage"})).unwrap();
        assert_eq!(parsed, TradeResponse::rejected("slippage"));

        let filled: TradeResponse = serde_json::from_value(
            json!({"success": true, "txHash": "sig", "executedPrice": 0.25}),
        )
        .unwrap();
        assert_eq!(filled, TradeResponse::filled("sig", 0.25));
    }

    #[test]
    fn test_error_status_is_rejected_regardless_of_body() {
        let claimed_fill = interpret_response(
            reqwest::StatusCode::BAD_GATEWAY,
            r#"{"success": true, "txHash": "sig"}"#,
        )
        .unwrap();
        assert!(!claimed_fill.success);
        assert!(claimed_fill.tx_hash.is_none());
        assert!(claimed_fill.error.unwrap().starts_with("HTTP 502"));

        let with_reason = interpret_response(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"success": false, "error": "insufficient balance"}"#,
        )
        .unwrap();
        assert_eq!(
            with_reason.error.as_deref(),
            Some("HTTP 400 Bad Request: insufficient balance")
        );

        let plain = interpret_response(reqwest::StatusCode::SERVICE_UNAVAILABLE, "down").unwrap();
        assert!(!plain.success);
        assert!(plain.error.unwrap().ends_with("down"));
    }

    #[test]
    fn test_success_status_requires_valid_body() {
        let filled = interpret_response(
            reqwest::StatusCode::OK,
            r#"{"success": true, "txHash": "sig", "executedPrice": 1.5}"#,
        )
        .unwrap();
        assert_eq!(filled, TradeResponse::filled("sig", 1.5));

        assert!(matches!(
            interpret_response(reqwest::StatusCode::OK, "<html>"),
            Err(GatewayError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_dry_run_always_fills() {
        let request = TradeRequest {
            wallet: "w".to_string(),
            side: OrderAction::Buy,
            token_address: "mint".to_string(),
            token_symbol: "TKN".to_string(),
            amount: Decimal::ONE,
            price_directive: PriceDirective::Market,
        };
        let response = DryRunTradeExecutor.execute(request).await.unwrap();
        assert!(response.success);
        assert!(response.tx_hash.unwrap().starts_with("dry-run-"));
    }
}
