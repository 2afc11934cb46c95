//! Scraped dealer-page variant.
//!
//! The page carries spans like `<span id="xau_bid" class="up">4,902.18
//! </span>` per asset; bid/ask are extracted with regexes. Ask stands in
//! for the price (bid as fallback). A triple unchanged since the last
//! poll is not re-emitted.

use crate::error::{ProviderError, ProviderResult};
use crate::poll::PollSpec;
use async_trait::async_trait;
use aurum_core::{Asset, Provider, Tick};
use chrono::Utc;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Span id prefix -> (asset, display symbol).
const PRICE_FIELDS: &[(&str, Asset, &str)] = &[
    ("xau", Asset::Gold, "XAU/USD"),
    ("xag", Asset::Silver, "XAG/USD"),
    ("xpt", Asset::Platinum, "XPT/USD"),
    ("xpd", Asset::Palladium, "XPD/USD"),
    ("krw", Asset::UsdKrw, "USD/KRW"),
    ("jpy", Asset::JpyKrw, "JPY/KRW"),
    ("eur", Asset::EurKrw, "EUR/KRW"),
];

struct FieldMatcher {
    asset: Asset,
    display: &'static str,
    bid_re: Regex,
    ask_re: Regex,
}

/// Dealer-page scraping variant. Keeps the legacy `massive` wire name.
pub struct NaugoldPoll {
    url: String,
    interval: Duration,
    matchers: Vec<FieldMatcher>,
    /// Last emitted (price, bid, ask) per asset for change suppression.
    last: HashMap<Asset, (Decimal, Option<Decimal>, Option<Decimal>)>,
}

impl NaugoldPoll {
    pub fn new(interval: Duration) -> Self {
        Self::with_url("https://naugold.com/naugold_td", interval)
    }

    pub fn with_url(url: impl Into<String>, interval: Duration) -> Self {
        let matchers = PRICE_FIELDS
            .iter()
            .map(|&(prefix, asset, display)| FieldMatcher {
                asset,
                display,
                bid_re: Regex::new(&format!(r#"id="{prefix}_bid"[^>]*>([\d,]+\.?\d*)</span>"#))
                    .expect("static regex compiles"),
                ask_re: Regex::new(&format!(r#"id="{prefix}_ask"[^>]*>([\d,]+\.?\d*)</span>"#))
                    .expect("static regex compiles"),
            })
            .collect();
        Self {
            url: url.into(),
            interval,
            matchers,
            last: HashMap::new(),
        }
    }

    fn parse_number(text: &str) -> Option<Decimal> {
        Decimal::from_str(&text.replace(',', "")).ok()
    }

    /// Extract ticks from the page, suppressing unchanged assets.
    fn parse_page(&mut self, html: &str) -> Vec<Tick> {
        let observed_at = Utc::now();
        let mut ticks = Vec::new();

        for matcher in &self.matchers {
            let bid = matcher
                .bid_re
                .captures(html)
                .and_then(|c| Self::parse_number(&c[1]));
            let ask = matcher
                .ask_re
                .captures(html)
                .and_then(|c| Self::parse_number(&c[1]));

            let price = match (ask, bid) {
                (Some(a), _) => a,
                (None, Some(b)) => b,
                (None, None) => continue,
            };

            if self.last.get(&matcher.asset) == Some(&(price, bid, ask)) {
                continue;
            }
            self.last.insert(matcher.asset, (price, bid, ask));

            ticks.push(Tick {
                provider: Provider::Naugold,
                asset: matcher.asset,
                price,
                bid,
                ask,
                volume: None,
                observed_at,
                meta: Some(json!({ "symbol": matcher.display, "source": "naugold.com" })),
            });
        }

        ticks
    }
}

#[async_trait]
impl PollSpec for NaugoldPoll {
    fn provider(&self) -> Provider {
        Provider::Naugold
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn poll(&mut self, http: &reqwest::Client) -> ProviderResult<Vec<Tick>> {
        let response = http.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::UpstreamStatus {
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let html = response.text().await?;
        let ticks = self.parse_page(&html);
        if !ticks.is_empty() {
            debug!(provider = "massive", count = ticks.len(), "Parsed page updates");
        }
        Ok(ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn page(xau_bid: &str, xau_ask: &str) -> String {
        format!(
            r#"<div><span id="xau_bid" class="dn">{xau_bid}</span>
               <span id="xau_ask" class="up">{xau_ask}</span>
               <span id="krw_bid">1,427.00</span>
               <span id="krw_ask">1,428.50</span></div>"#
        )
    }

    #[test]
    fn extracts_bid_ask_and_uses_ask_as_price() {
        let mut spec = NaugoldPoll::new(Duration::from_secs(3));
        let ticks = spec.parse_page(&page("4,900.10", "4,902.18"));
        assert_eq!(ticks.len(), 2);

        let gold = ticks.iter().find(|t| t.asset == Asset::Gold).unwrap();
        assert_eq!(gold.price, dec!(4902.18));
        assert_eq!(gold.bid, Some(dec!(4900.10)));
        assert_eq!(gold.provider, Provider::Naugold);

        let krw = ticks.iter().find(|t| t.asset == Asset::UsdKrw).unwrap();
        assert_eq!(krw.price, dec!(1428.50));
    }

    #[test]
    fn unchanged_values_are_suppressed() {
        let mut spec = NaugoldPoll::new(Duration::from_secs(3));
        let html = page("4,900.10", "4,902.18");
        assert_eq!(spec.parse_page(&html).len(), 2);
        assert!(spec.parse_page(&html).is_empty());

        // A changed ask re-emits only that asset.
        let ticks = spec.parse_page(&page("4,900.10", "4,903.00"));
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].asset, Asset::Gold);
    }

    #[test]
    fn bid_stands_in_when_ask_missing() {
        let mut spec = NaugoldPoll::new(Duration::from_secs(3));
        let ticks = spec.parse_page(r#"<span id="xag_bid">23.40</span>"#);
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].price, dec!(23.40));
        assert_eq!(ticks[0].ask, None);
    }

    #[test]
    fn empty_page_yields_nothing() {
        let mut spec = NaugoldPoll::new(Duration::from_secs(3));
        assert!(spec.parse_page("<html></html>").is_empty());
    }
}
