use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::feed::{FeedError, FeedResult};
use crate::monitor::types::{Instrument, Price};

pub const DEXSCREENER_API_BASE: &str = "https://api.dexscreener.com";
pub const JUPITER_API_BASE: &str = "https://api.jup.ag";

/// One price observation as returned by a source, before it becomes a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub price: Price,
    pub change_24h: Option<f64>,
    pub volume_24h: Option<f64>,
    pub market_cap: Option<f64>,
}

impl PriceQuote {
    pub fn price_only(price: Price) -> Self {
        Self {
            price,
            change_24h: None,
            volume_24h: None,
            market_cap: None,
        }
    }
}

/// An external price API.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Tag recorded on ticks produced from this source.
    fn name(&self) -> &str;

    async fn fetch(&self, instrument: &Instrument) -> FeedResult<PriceQuote>;
}

fn build_client(timeout: Duration) -> FeedResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| FeedError::Http(e.to_string()))
}

async fn get_body(http: &reqwest::Client, url: &str) -> FeedResult<String> {
    let resp = http
        .get(url)
        .send()
        .await
        .map_err(|e| FeedError::Http(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(FeedError::Status(resp.status().as_u16()));
    }

    resp.text().await.map_err(|e| FeedError::Http(e.to_string()))
}

fn parse_price(raw: &str) -> FeedResult<Price> {
    raw.parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| FeedError::Decode(format!("invalid price '{}'", raw)))
}

// === DexScreener ===

#[derive(Debug, Deserialize)]
struct DexScreenerResponse {
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexPair {
    price_usd: Option<String>,
    price_change: Option<DexWindow>,
    volume: Option<DexWindow>,
    liquidity: Option<DexLiquidity>,
    market_cap: Option<f64>,
    fdv: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DexWindow {
    h24: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DexLiquidity {
    usd: Option<f64>,
}

/// Token pairs endpoint; the most liquid pair quoting a USD price wins.
pub struct DexScreenerSource {
    http: reqwest::Client,
    base_url: String,
}

impl DexScreenerSource {
    pub fn new(timeout: Duration) -> FeedResult<Self> {
        Self::with_base_url(DEXSCREENER_API_BASE, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> FeedResult<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    pub fn parse_response(body: &str, address: &str) -> FeedResult<PriceQuote> {
        let parsed: DexScreenerResponse =
            serde_json::from_str(body).map_err(|e| FeedError::Decode(e.to_string()))?;

        let best = parsed
            .pairs
            .unwrap_or_default()
            .into_iter()
            .filter(|pair| pair.price_usd.is_some())
            .max_by(|a, b| {
                let liq = |p: &DexPair| p.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
                liq(a).total_cmp(&liq(b))
            })
            .ok_or_else(|| FeedError::NotListed(address.to_string()))?;

        let price = parse_price(best.price_usd.as_deref().unwrap_or_default())?;

        Ok(PriceQuote {
            price,
            change_24h: best.price_change.and_then(|w| w.h24),
            volume_24h: best.volume.and_then(|w| w.h24),
            market_cap: best.market_cap.or(best.fdv),
        })
    }
}

#[async_trait]
impl PriceSource for DexScreenerSource {
    fn name(&self) -> &str {
        "dexscreener"
    }

    async fn fetch(&self, instrument: &Instrument) -> FeedResult<PriceQuote> {
        let url = format!(
            "{}/latest/dex/tokens/{}",
            self.base_url, instrument.address
        );
        let body = get_body(&self.http, &url).await?;
        Self::parse_response(&body, &instrument.address)
    }
}

// === Jupiter ===

#[derive(Debug, Deserialize)]
struct JupiterResponse {
    data: HashMap<String, Option<JupiterPrice>>,
}

#[derive(Debug, Deserialize)]
struct JupiterPrice {
    price: Option<String>,
}

/// Price-only fallback; carries no volume or market cap.
pub struct JupiterSource {
    http: reqwest::Client,
    base_url: String,
}

impl JupiterSource {
    pub fn new(timeout: Duration) -> FeedResult<Self> {
        Self::with_base_url(JUPITER_API_BASE, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> FeedResult<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    pub fn parse_response(body: &str, address: &str) -> FeedResult<PriceQuote> {
        let parsed: JupiterResponse =
            serde_json::from_str(body).map_err(|e| FeedError::Decode(e.to_string()))?;

        let raw = parsed
            .data
            .get(address)
            .and_then(|entry| entry.as_ref())
            .and_then(|entry| entry.price.as_deref())
            .ok_or_else(|| FeedError::NotListed(address.to_string()))?;

        Ok(PriceQuote::price_only(parse_price(raw)?))
    }
}

#[async_trait]
impl PriceSource for JupiterSource {
    fn name(&self) -> &str {
        "jupiter"
    }

    async fn fetch(&self, instrument: &Instrument) -> FeedResult<PriceQuote> {
        let url = format!("{}/price/v2?ids={}", self.base_url, instrument.address);
        let body = get_body(&self.http, &url).await?;
        Self::parse_response(&body, &instrument.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dexscreener_picks_most_liquid_pair() {
        let body = r#"{
            "pairs": [
                {"priceUsd": "0.0100", "liquidity": {"usd": 1000.0}, "volume": {"h24": 5.0}},
                {"priceUsd": "0.0123", "liquidity": {"usd": 90000.0},
                 "volume": {"h24": 250000.0}, "priceChange": {"h24": -3.5}, "fdv": 1200000.0},
                {"liquidity": {"usd": 999999.0}}
            ]
        }"#;

        let quote = DexScreenerSource::parse_response(body, "mint").unwrap();
        assert_eq!(quote.price, 0.0123);
        assert_eq!(quote.volume_24h, Some(250000.0));
        assert_eq!(quote.change_24h, Some(-3.5));
        assert_eq!(quote.market_cap, Some(1200000.0));
    }

    #[test]
    fn test_dexscreener_unlisted_token() {
        let err = DexScreenerSource::parse_response(r#"{"pairs": null}"#, "mint").unwrap_err();
        assert_eq!(err, FeedError::NotListed("mint".to_string()));
    }

    #[test]
    fn test_jupiter_price() {
        let body = r#"{"data": {"mint": {"id": "mint", "type": "derivedPrice", "price": "142.5"}}}"#;
        let quote = JupiterSource::parse_response(body, "mint").unwrap();
        assert_eq!(quote, PriceQuote::price_only(142.5));

        let missing = r#"{"data": {"mint": null}}"#;
        assert!(JupiterSource::parse_response(missing, "mint").is_err());
    }

    #[test]
    fn test_rejects_non_positive_price() {
        assert!(parse_price("0").is_err());
        assert!(parse_price("abc").is_err());
        assert_eq!(parse_price("1.5").unwrap(), 1.5);
    }
}
