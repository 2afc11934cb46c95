//! EODHD streaming forex/metals feed.
//!
//! Frames look like `{"s":"XAUUSD","p":2050.25,"b":2050.0,"a":2050.5,
//! "t":1706012096000}`. The feed sometimes omits `p`, in which case the
//! mid of bid/ask stands in. Status frames carry `status`/`message` keys
//! and yield no tick.

use crate::error::{ProviderError, ProviderResult};
use crate::stream::StreamSpec;
use aurum_core::{Asset, Provider, Tick};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

/// Upstream symbol <-> asset mapping.
const SYMBOLS: &[(&str, Asset)] = &[
    ("XAUUSD", Asset::Gold),
    ("XAGUSD", Asset::Silver),
    ("USDKRW", Asset::UsdKrw),
];

/// Raw quote frame. Numeric fields arrive as JSON numbers.
#[derive(Debug, Deserialize)]
struct RawQuote {
    #[serde(alias = "symbol")]
    s: Option<String>,
    #[serde(alias = "price")]
    p: Option<Decimal>,
    #[serde(alias = "bid")]
    b: Option<Decimal>,
    #[serde(alias = "ask")]
    a: Option<Decimal>,
    #[serde(alias = "volume")]
    v: Option<Decimal>,
    /// Epoch milliseconds.
    #[serde(alias = "timestamp")]
    t: Option<i64>,
}

/// EODHD WebSocket variant.
pub struct EodhdStream {
    api_key: String,
}

impl EodhdStream {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    fn asset_for(symbol: &str) -> Option<Asset> {
        SYMBOLS
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, asset)| *asset)
    }
}

impl StreamSpec for EodhdStream {
    fn provider(&self) -> Provider {
        Provider::Eodhd
    }

    fn url(&self) -> String {
        format!(
            "wss://ws.eodhistoricaldata.com/ws/forex?api_token={}",
            self.api_key
        )
    }

    fn subscribe_message(&self) -> Option<String> {
        let symbols: Vec<&str> = SYMBOLS.iter().map(|(s, _)| *s).collect();
        Some(
            json!({
                "action": "subscribe",
                "symbols": symbols.join(","),
            })
            .to_string(),
        )
    }

    fn parse(&self, raw: &str) -> ProviderResult<Vec<Tick>> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| ProviderError::Protocol(format!("invalid JSON: {e}")))?;

        // Subscription acks and status frames are not ticks.
        if value.get("status").is_some()
            || value.get("status_code").is_some()
            || value.get("message").is_some()
        {
            info!(provider = "eodhd", status = %value, "Status frame");
            return Ok(vec![]);
        }

        let quote: RawQuote = serde_json::from_value(value)
            .map_err(|e| ProviderError::Protocol(format!("unexpected frame shape: {e}")))?;

        let Some(symbol) = quote.s else {
            return Ok(vec![]);
        };
        let Some(asset) = Self::asset_for(&symbol) else {
            warn!(provider = "eodhd", %symbol, "Unknown symbol");
            return Ok(vec![]);
        };

        // The forex feed often carries only bid/ask; mid stands in for
        // the trade price.
        let price = match (quote.p, quote.b, quote.a) {
            (Some(p), _, _) => p,
            (None, Some(b), Some(a)) => (b + a) / Decimal::TWO,
            (None, Some(b), None) => b,
            (None, None, Some(a)) => a,
            (None, None, None) => {
                debug!(provider = "eodhd", %symbol, "Frame without price data");
                return Ok(vec![]);
            }
        };

        let observed_at = quote
            .t
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        Ok(vec![Tick {
            provider: Provider::Eodhd,
            asset,
            price,
            bid: quote.b,
            ask: quote.a,
            volume: quote.v,
            observed_at,
            meta: Some(json!({ "symbol": symbol })),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn spec() -> EodhdStream {
        EodhdStream::new("test-key")
    }

    #[test]
    fn parses_full_quote() {
        let ticks = spec()
            .parse(r#"{"s":"XAUUSD","p":2050.25,"b":2050.0,"a":2050.5,"t":1706012096000}"#)
            .unwrap();
        assert_eq!(ticks.len(), 1);
        let tick = &ticks[0];
        assert_eq!(tick.asset, Asset::Gold);
        assert_eq!(tick.price, dec!(2050.25));
        assert_eq!(tick.bid, Some(dec!(2050.0)));
        assert_eq!(tick.observed_at.timestamp_millis(), 1706012096000);
    }

    #[test]
    fn mid_price_from_bid_ask_when_price_missing() {
        let ticks = spec()
            .parse(r#"{"s":"XAGUSD","b":23.40,"a":23.60}"#)
            .unwrap();
        assert_eq!(ticks[0].price, dec!(23.50));
    }

    #[test]
    fn status_frame_yields_no_tick() {
        let ticks = spec()
            .parse(r#"{"status_code":200,"message":"Authorized"}"#)
            .unwrap();
        assert!(ticks.is_empty());
    }

    #[test]
    fn unknown_symbol_yields_no_tick() {
        let ticks = spec().parse(r#"{"s":"EURUSD","p":1.08}"#).unwrap();
        assert!(ticks.is_empty());
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        assert!(spec().parse("not json").is_err());
    }

    #[test]
    fn subscribe_message_lists_all_symbols() {
        let msg = spec().subscribe_message().unwrap();
        let value: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(value["action"], "subscribe");
        assert_eq!(value["symbols"], "XAUUSD,XAGUSD,USDKRW");
    }
}
