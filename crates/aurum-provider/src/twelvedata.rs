//! Twelve Data REST polling variant.
//!
//! The `/price` endpoint answers a multi-symbol request with a map of
//! `symbol -> {"price": "2050.25"}`; a single-symbol request answers the
//! bare object. Per-symbol errors come back as `{"code":…,"status":
//! "error"}` entries and only skip that symbol.

use crate::error::{ProviderError, ProviderResult};
use crate::poll::PollSpec;
use async_trait::async_trait;
use aurum_core::{Asset, Provider, Tick};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

const SYMBOLS: &[(&str, Asset)] = &[
    ("XAU/USD", Asset::Gold),
    ("XAG/USD", Asset::Silver),
    ("XPT/USD", Asset::Platinum),
    ("XPD/USD", Asset::Palladium),
    ("USD/KRW", Asset::UsdKrw),
    ("USD/JPY", Asset::UsdJpy),
    ("BTC/USD", Asset::BtcUsd),
];

/// Twelve Data polling variant.
pub struct TwelveDataPoll {
    api_key: String,
    base_url: String,
    interval: Duration,
}

impl TwelveDataPoll {
    pub fn new(api_key: impl Into<String>, interval: Duration) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.twelvedata.com".to_string(),
            interval,
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn asset_for(symbol: &str) -> Option<Asset> {
        SYMBOLS
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, asset)| *asset)
    }

    fn tick_from(symbol: &str, entry: &Value) -> Option<Tick> {
        let asset = match Self::asset_for(symbol) {
            Some(asset) => asset,
            None => {
                debug!(provider = "twelve_data", %symbol, "Unknown symbol");
                return None;
            }
        };

        if entry.get("status").and_then(Value::as_str) == Some("error") {
            debug!(
                provider = "twelve_data",
                %symbol,
                message = entry.get("message").and_then(serde_json::Value::as_str).unwrap_or(""),
                "Symbol error"
            );
            return None;
        }

        // Prices arrive as strings: {"price": "2050.25000"}
        let price = entry
            .get("price")
            .and_then(Value::as_str)
            .and_then(|s| Decimal::from_str(s).ok())?;
        if price <= Decimal::ZERO {
            return None;
        }

        Some(Tick {
            provider: Provider::TwelveData,
            asset,
            price,
            bid: None,
            ask: None,
            volume: None,
            observed_at: Utc::now(),
            meta: Some(json!({ "symbol": symbol, "source": "twelvedata.com" })),
        })
    }

    /// Shared by single- and multi-symbol response shapes.
    fn parse_response(&self, body: &Value) -> Vec<Tick> {
        // API-level error for the whole request.
        if body.get("code").is_some() && body.get("status").and_then(Value::as_str) == Some("error")
        {
            warn!(
                provider = "twelve_data",
                message = body.get("message").and_then(serde_json::Value::as_str).unwrap_or(""),
                "API error"
            );
            return vec![];
        }

        if body.get("price").is_some() {
            // Single-symbol shape; the symbol is whichever one we asked for.
            let symbol = body
                .get("symbol")
                .and_then(Value::as_str)
                .unwrap_or(SYMBOLS[0].0);
            return Self::tick_from(symbol, body).into_iter().collect();
        }

        let Some(map) = body.as_object() else {
            return vec![];
        };
        map.iter()
            .filter_map(|(symbol, entry)| Self::tick_from(symbol, entry))
            .collect()
    }
}

#[async_trait]
impl PollSpec for TwelveDataPoll {
    fn provider(&self) -> Provider {
        Provider::TwelveData
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn poll(&mut self, http: &reqwest::Client) -> ProviderResult<Vec<Tick>> {
        let symbols: Vec<&str> = SYMBOLS.iter().map(|(s, _)| *s).collect();
        let response = http
            .get(format!("{}/price", self.base_url))
            .query(&[("symbol", symbols.join(",")), ("apikey", self.api_key.clone())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::UpstreamStatus {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let body: Value = response.json().await?;
        Ok(self.parse_response(&body))
    }
}
