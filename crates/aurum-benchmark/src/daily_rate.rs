//! Daily USD/KRW first-announced rate scheduler.
//!
//! The rate is published once per Korean business morning (around 09:00
//! KST). The scheduler polls from the window start until it gets a value,
//! then sleeps through to the next day's window. On weekends and holidays
//! it fetches the most recent business day's rate instead.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, FixedOffset, NaiveDate, Timelike, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use aurum_core::{kst, MarketCalendar};

use crate::error::{BenchmarkError, BenchmarkResult};
use crate::record::BenchmarkState;

/// Upstream that reports the first-announced rate for a business date.
#[async_trait]
pub trait RateSource: Send + Sync + 'static {
    async fn fetch(
        &self,
        client: &reqwest::Client,
        business_date: NaiveDate,
    ) -> BenchmarkResult<Decimal>;
}

/// Seoul Money Brokerage Services quote page. The endpoint returns a
/// query-string-shaped body (`...&USD=1,427.00&...`) meant for an old Flash
/// widget, so parsing is a single regex.
pub struct SmbsSource {
    base_url: String,
}

static USD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"USD=([\d,]+\.?\d*)").expect("static pattern"));

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

impl SmbsSource {
    pub fn new() -> Self {
        Self {
            base_url: "http://smbs.biz/Flash/TodayExRate_flash.jsp".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub(crate) fn parse_body(body: &str) -> BenchmarkResult<Decimal> {
        let Some(captures) = USD_RE.captures(body) else {
            return Err(BenchmarkError::ValueNotFound("USD"));
        };
        let raw = captures[1].replace(',', "");
        let rate = Decimal::from_str(&raw)?;
        if rate <= Decimal::ZERO {
            return Err(BenchmarkError::Payload(format!("non-positive rate: {rate}")));
        }
        Ok(rate)
    }
}

impl Default for SmbsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateSource for SmbsSource {
    async fn fetch(
        &self,
        client: &reqwest::Client,
        business_date: NaiveDate,
    ) -> BenchmarkResult<Decimal> {
        let agent = USER_AGENTS[rand::thread_rng().gen_range(0..USER_AGENTS.len())];
        let response = client
            .get(&self.base_url)
            .query(&[("tr_date", business_date.to_string())])
            .header("User-Agent", agent)
            .header("Accept", "text/html, */*")
            .header("Accept-Language", "ko-KR,ko;q=0.9,en-US;q=0.8")
            .header("Referer", "http://smbs.biz/ExRate/TodayExRate.jsp")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BenchmarkError::UpstreamStatus {
                status: status.as_u16(),
                body: String::new(),
            });
        }
        // Body is EUC-KR but the rate figures are plain ASCII, so a lossy
        // read is enough for the regex.
        let body = response.text().await?;
        Self::parse_body(&body)
    }
}

#[derive(Debug, Clone)]
pub struct DailyRateConfig {
    /// KST hour from which the rate is polled.
    pub window_start_hour: u32,
    pub poll_interval: Duration,
    /// Uniform jitter applied on top of `poll_interval`.
    pub max_jitter: Duration,
    /// Retry spacing for fetches outside business days.
    pub failure_retry: Duration,
    pub sleep_check: Duration,
}

impl Default for DailyRateConfig {
    fn default() -> Self {
        Self {
            window_start_hour: 8,
            poll_interval: Duration::from_secs(1800),
            max_jitter: Duration::from_secs(60),
            failure_retry: Duration::from_secs(3600),
            sleep_check: Duration::from_secs(60),
        }
    }
}

/// What the loop should do next, given the KST clock and fetch history.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RatePlan {
    Fetch {
        target: NaiveDate,
        business_day: bool,
    },
    Sleep(Duration),
}

pub(crate) fn plan(
    now_kst: DateTime<FixedOffset>,
    fetched_for: Option<NaiveDate>,
    calendar: &MarketCalendar,
    window_start_hour: u32,
) -> RatePlan {
    const FALLBACK: Duration = Duration::from_secs(3600);
    let today = now_kst.date_naive();

    if fetched_for == Some(today) {
        // Done for the day; wake at tomorrow's window start.
        let next = today
            .checked_add_days(Days::new(1))
            .and_then(|d| d.and_hms_opt(window_start_hour, 0, 0))
            .and_then(|dt| dt.and_local_timezone(kst()).single());
        let wait = next
            .map(|next| (next - now_kst).to_std().unwrap_or(FALLBACK))
            .unwrap_or(FALLBACK);
        return RatePlan::Sleep(wait);
    }

    if !calendar.is_business_day(today) {
        return RatePlan::Fetch {
            target: calendar.last_business_day(today),
            business_day: false,
        };
    }

    if now_kst.hour() < window_start_hour {
        let wait = today
            .and_hms_opt(window_start_hour, 0, 0)
            .and_then(|dt| dt.and_local_timezone(kst()).single())
            .map(|start| (start - now_kst).to_std().unwrap_or(FALLBACK))
            .unwrap_or(FALLBACK);
        return RatePlan::Sleep(wait);
    }

    RatePlan::Fetch {
        target: today,
        business_day: true,
    }
}

pub struct DailyRateScheduler<S: RateSource> {
    source: S,
    config: DailyRateConfig,
    calendar: MarketCalendar,
    state: Arc<BenchmarkState>,
    client: reqwest::Client,
    fetched_for: Option<NaiveDate>,
    shutdown: CancellationToken,
}

impl<S: RateSource> DailyRateScheduler<S> {
    pub fn new(
        source: S,
        config: DailyRateConfig,
        calendar: MarketCalendar,
        state: Arc<BenchmarkState>,
        shutdown: CancellationToken,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            source,
            config,
            calendar,
            state,
            client,
            fetched_for: None,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!("daily rate scheduler started");

        // Startup fetch works on any day; on weekends it resolves to the
        // last business day's rate.
        let today = Utc::now().with_timezone(&kst()).date_naive();
        let target = self.calendar.last_business_day(today);
        if self.fetch_once(target).await {
            self.fetched_for = Some(today);
        }

        while !self.shutdown.is_cancelled() {
            let now_kst = Utc::now().with_timezone(&kst());
            match plan(
                now_kst,
                self.fetched_for,
                &self.calendar,
                self.config.window_start_hour,
            ) {
                RatePlan::Sleep(wait) => {
                    if self.sleep_cancellable(wait).await {
                        break;
                    }
                }
                RatePlan::Fetch {
                    target,
                    business_day,
                } => {
                    if self.fetch_once(target).await {
                        self.fetched_for = Some(now_kst.date_naive());
                        continue;
                    }
                    // Previous value, if any, stays in place on failure.
                    let wait = if business_day {
                        self.config.poll_interval + self.jitter()
                    } else {
                        self.config.failure_retry
                    };
                    if self.sleep_cancellable(wait).await {
                        break;
                    }
                }
            }
        }
        info!("daily rate scheduler stopped");
    }

    async fn fetch_once(&mut self, target: NaiveDate) -> bool {
        match self.source.fetch(&self.client, target).await {
            Ok(rate) => {
                info!(%rate, business_date = %target, "daily rate fetched");
                self.state.set_daily_rate(rate, target, Utc::now());
                true
            }
            Err(e) => {
                if matches!(e, BenchmarkError::Http(_)) {
                    error!(business_date = %target, error = %e, "daily rate request failed");
                } else {
                    warn!(business_date = %target, error = %e, "daily rate unavailable");
                }
                false
            }
        }
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.config.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }

    async fn sleep_cancellable(&self, total: Duration) -> bool {
        let mut remaining = total;
        while !remaining.is_zero() {
            let step = remaining.min(self.config.sleep_check);
            tokio::select! {
                _ = self.shutdown.cancelled() => return true,
                _ = tokio::time::sleep(step) => {}
            }
            remaining = remaining.saturating_sub(step);
        }
        self.shutdown.is_cancelled()
    }
}
