//! LBMA fixing scheduler.
//!
//! One upstream call returns every fixing for the London business day, so
//! the scheduler's job is mostly *not* calling: it fetches once per business
//! date, uses the second daily slot only as a backup, and retries a failed
//! slot a bounded number of times.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Timelike, Utc};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use aurum_core::MarketCalendar;

use crate::error::{BenchmarkError, BenchmarkResult};
use crate::record::BenchmarkState;
use crate::slots::{next_slot, target_date_for_slot};

/// Upstream that reports fixing values keyed by field name
/// (`gold_am`, `silver`, ...).
#[async_trait]
pub trait FixingSource: Send + Sync + 'static {
    async fn fetch(&self, client: &reqwest::Client) -> BenchmarkResult<BTreeMap<String, Decimal>>;

    /// Number of fields a complete response carries. Zero means unknown, in
    /// which case any successful fetch counts as complete.
    fn field_count(&self) -> usize {
        0
    }
}

/// Metals.dev `/v1/metal/authority` endpoint for the LBMA authority.
pub struct MetalsDevSource {
    api_key: String,
    base_url: String,
}

/// Upstream response key -> field name stored in the record.
const RATE_MAP: &[(&str, &str)] = &[
    ("lbma_gold_am", "gold_am"),
    ("lbma_gold_pm", "gold_pm"),
    ("lbma_silver", "silver"),
    ("lbma_platinum_am", "platinum_am"),
    ("lbma_platinum_pm", "platinum_pm"),
    ("lbma_palladium_am", "palladium_am"),
    ("lbma_palladium_pm", "palladium_pm"),
];

impl MetalsDevSource {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.metals.dev/v1/metal/authority".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl FixingSource for MetalsDevSource {
    async fn fetch(&self, client: &reqwest::Client) -> BenchmarkResult<BTreeMap<String, Decimal>> {
        let response = client
            .get(&self.base_url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("authority", "lbma"),
                ("currency", "USD"),
                ("unit", "toz"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BenchmarkError::UpstreamStatus {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let payload: serde_json::Value = response.json().await?;
        if payload.get("status").and_then(|s| s.as_str()) != Some("success") {
            return Err(BenchmarkError::Payload(format!(
                "upstream status field: {:?}",
                payload.get("status")
            )));
        }
        let Some(rates) = payload.get("rates").and_then(|r| r.as_object()) else {
            return Err(BenchmarkError::ValueNotFound("rates"));
        };

        let mut fields = BTreeMap::new();
        for (upstream_key, field) in RATE_MAP {
            if let Some(value) = rates.get(*upstream_key) {
                if let Some(decimal) = json_decimal(value) {
                    fields.insert((*field).to_string(), decimal);
                }
            }
        }
        if fields.is_empty() {
            return Err(BenchmarkError::Payload("no usable rates in response".into()));
        }
        Ok(fields)
    }

    fn field_count(&self) -> usize {
        RATE_MAP.len()
    }
}

fn json_decimal(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => n.to_string().parse().ok(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct FixingConfig {
    /// Daily fetch slots as (UTC hour, minute).
    pub slots: Vec<(u32, u32)>,
    /// Slot hours before this target the previous day's data.
    pub cutover_hour: u32,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Granularity of long sleeps, so shutdown is honored promptly.
    pub sleep_check: Duration,
    /// Wait before re-planning when no slot is found in the scan horizon.
    pub fallback_wait: Duration,
    /// Whether a response missing some fields still satisfies the date.
    pub partial_satisfies: bool,
    /// Satisfied dates older than this many days are forgotten.
    pub satisfied_retention_days: u64,
}

impl Default for FixingConfig {
    fn default() -> Self {
        Self {
            slots: vec![(0, 30), (16, 30)],
            cutover_hour: 8,
            max_retries: 2,
            retry_delay: Duration::from_secs(1800),
            sleep_check: Duration::from_secs(60),
            fallback_wait: Duration::from_secs(3600),
            partial_satisfies: true,
            satisfied_retention_days: 5,
        }
    }
}

pub struct FixingScheduler<S: FixingSource> {
    source: S,
    config: FixingConfig,
    calendar: MarketCalendar,
    state: Arc<BenchmarkState>,
    client: reqwest::Client,
    satisfied: HashSet<NaiveDate>,
    last_slot: Option<DateTime<Utc>>,
    shutdown: CancellationToken,
}

impl<S: FixingSource> FixingScheduler<S> {
    pub fn new(
        source: S,
        config: FixingConfig,
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
            satisfied: HashSet::new(),
            last_slot: None,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!("fixing scheduler started");

        // Immediate fetch so a restart has data without waiting for a slot.
        // It only warms the cache: the date is not marked satisfied, so the
        // day's scheduled slots still fire and pick up fixings published
        // after this point.
        let now = Utc::now();
        let startup_target = self.calendar.last_business_day(target_date_for_slot(
            now.date_naive(),
            now.hour(),
            self.config.cutover_hour,
        ));
        if let Err(e) = self.fetch_once(startup_target, false).await {
            error!(error = %e, "startup fixing fetch failed");
        }
        self.prune_satisfied(Utc::now().date_naive());

        while !self.shutdown.is_cancelled() {
            let now = Utc::now();
            let plan = next_slot(
                now,
                self.last_slot,
                &self.satisfied,
                &self.calendar,
                &self.config.slots,
                self.config.cutover_hour,
            );
            let Some(plan) = plan else {
                debug!("no fetchable slot in scan horizon, re-planning later");
                if self.sleep_cancellable(self.config.fallback_wait).await {
                    break;
                }
                continue;
            };

            let wait = (plan.at - now).to_std().unwrap_or(Duration::ZERO);
            info!(slot = %plan.at, target_date = %plan.target_date, "next fixing fetch scheduled");
            if self.sleep_cancellable(wait).await {
                break;
            }

            self.fetch_with_retries(plan.target_date).await;
            self.last_slot = Some(Utc::now());
            self.prune_satisfied(Utc::now().date_naive());
        }
        info!("fixing scheduler stopped");
    }

    async fn fetch_with_retries(&mut self, target_date: NaiveDate) {
        for attempt in 0..=self.config.max_retries {
            if self.shutdown.is_cancelled() {
                return;
            }
            match self.fetch_once(target_date, true).await {
                Ok(satisfied) => {
                    if satisfied {
                        return;
                    }
                    // Partial data with partial_satisfies off: keep the
                    // fields, let the backup slot try again.
                    warn!(%target_date, "fixing response incomplete, date not satisfied");
                    return;
                }
                Err(e) => {
                    warn!(%target_date, attempt = attempt + 1, error = %e, "fixing fetch failed");
                }
            }
            if attempt < self.config.max_retries {
                if self.sleep_cancellable(self.config.retry_delay).await {
                    return;
                }
            }
        }
    }

    /// One fetch attempt. `Ok(true)` means the response would satisfy the
    /// target date; the date is recorded as satisfied only when
    /// `mark_satisfied` is set (scheduled slots, never the startup warm-up).
    async fn fetch_once(
        &mut self,
        target_date: NaiveDate,
        mark_satisfied: bool,
    ) -> BenchmarkResult<bool> {
        let fields = self.source.fetch(&self.client).await?;
        let complete = self.source.field_count() == 0 || fields.len() >= self.source.field_count();
        info!(%target_date, fields = fields.len(), complete, "fixing data fetched");
        self.state.merge_fixing(target_date, fields, Utc::now());
        if complete || self.config.partial_satisfies {
            if mark_satisfied {
                self.satisfied.insert(target_date);
            }
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn prune_satisfied(&mut self, today: NaiveDate) {
        let Some(cutoff) = today.checked_sub_days(Days::new(self.config.satisfied_retention_days))
        else {
            return;
        };
        self.satisfied.retain(|d| *d >= cutoff);
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

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    struct ScriptedSource {
        responses: Mutex<Vec<BenchmarkResult<BTreeMap<String, Decimal>>>>,
        calls: std::sync::atomic::AtomicUsize,
        expected_fields: usize,
    }

    impl ScriptedSource {
        fn new(responses: Vec<BenchmarkResult<BTreeMap<String, Decimal>>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: std::sync::atomic::AtomicUsize::new(0),
                expected_fields: 2,
            }
        }
    }

    #[async_trait]
    impl FixingSource for &'static ScriptedSource {
        async fn fetch(
            &self,
            _client: &reqwest::Client,
        ) -> BenchmarkResult<BTreeMap<String, Decimal>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                Err(BenchmarkError::Payload("script exhausted".into()))
            } else {
                responses.remove(0)
            }
        }

        fn field_count(&self) -> usize {
            self.expected_fields
        }
    }

    fn fields(pairs: &[(&str, Decimal)]) -> BTreeMap<String, Decimal> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), *v))
            .collect()
    }

    fn scheduler(
        source: &'static ScriptedSource,
        config: FixingConfig,
    ) -> FixingScheduler<&'static ScriptedSource> {
        FixingScheduler::new(
            source,
            config,
            MarketCalendar::uk(),
            Arc::new(BenchmarkState::new()),
            CancellationToken::new(),
        )
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failure() {
        let source: &'static ScriptedSource = Box::leak(Box::new(ScriptedSource::new(vec![
            Err(BenchmarkError::Payload("flaky".into())),
            Ok(fields(&[("gold_am", dec!(2050.10)), ("gold_pm", dec!(2052.35))])),
        ])));
        let mut sched = scheduler(
            source,
            FixingConfig {
                retry_delay: Duration::from_millis(5),
                ..FixingConfig::default()
            },
        );

        sched.fetch_with_retries(date(2025, 6, 2)).await;

        assert_eq!(source.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert!(sched.satisfied.contains(&date(2025, 6, 2)));
        let record = sched.state.fixing().unwrap();
        assert_eq!(record.fields["gold_pm"], dec!(2052.35));
    }

    #[tokio::test]
    async fn partial_response_satisfies_by_default() {
        let source: &'static ScriptedSource = Box::leak(Box::new(ScriptedSource::new(vec![
            Ok(fields(&[("gold_am", dec!(2050))])),
        ])));
        let mut sched = scheduler(source, FixingConfig::default());

        sched.fetch_with_retries(date(2025, 6, 2)).await;
        assert!(sched.satisfied.contains(&date(2025, 6, 2)));
    }

    #[tokio::test]
    async fn partial_response_leaves_date_open_when_configured() {
        let source: &'static ScriptedSource = Box::leak(Box::new(ScriptedSource::new(vec![
            Ok(fields(&[("gold_am", dec!(2050))])),
        ])));
        let mut sched = scheduler(
            source,
            FixingConfig {
                partial_satisfies: false,
                ..FixingConfig::default()
            },
        );

        sched.fetch_with_retries(date(2025, 6, 2)).await;

        // Fields are cached for readers but the backup slot will still fire.
        assert!(!sched.satisfied.contains(&date(2025, 6, 2)));
        assert!(sched.state.fixing().is_some());
    }

    #[tokio::test]
    async fn exhausted_retries_give_up() {
        let source: &'static ScriptedSource = Box::leak(Box::new(ScriptedSource::new(vec![
            Err(BenchmarkError::Payload("down".into())),
            Err(BenchmarkError::Payload("down".into())),
            Err(BenchmarkError::Payload("down".into())),
        ])));
        let mut sched = scheduler(
            source,
            FixingConfig {
                max_retries: 2,
                retry_delay: Duration::from_millis(1),
                ..FixingConfig::default()
            },
        );

        sched.fetch_with_retries(date(2025, 6, 2)).await;
        assert_eq!(source.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert!(!sched.satisfied.contains(&date(2025, 6, 2)));
    }

    #[tokio::test]
    async fn startup_fetch_does_not_consume_the_days_slots() {
        use chrono::TimeZone;

        let source: &'static ScriptedSource = Box::leak(Box::new(ScriptedSource::new(vec![
            Ok(fields(&[("gold_am", dec!(2050.10)), ("gold_pm", dec!(2052.35))])),
        ])));
        let mut sched = scheduler(source, FixingConfig::default());
        let monday = date(2025, 6, 2);

        // Startup warm-up at 10:00 UTC, before the afternoon fixing exists.
        assert!(sched.fetch_once(monday, false).await.unwrap());
        assert!(sched.state.fixing().is_some());
        assert!(!sched.satisfied.contains(&monday));

        // The day's 16:30 slot must still be scheduled for the same date.
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
        let plan = next_slot(
            now,
            None,
            &sched.satisfied,
            &sched.calendar,
            &sched.config.slots,
            sched.config.cutover_hour,
        )
        .unwrap();
        assert_eq!(plan.target_date, monday);
        assert_eq!(plan.at, Utc.with_ymd_and_hms(2025, 6, 2, 16, 30, 0).unwrap());
    }

    #[tokio::test]
    async fn satisfied_set_is_pruned() {
        let source: &'static ScriptedSource =
            Box::leak(Box::new(ScriptedSource::new(vec![])));
        let mut sched = scheduler(source, FixingConfig::default());
        sched.satisfied.insert(date(2025, 5, 20));
        sched.satisfied.insert(date(2025, 6, 1));
        sched.satisfied.insert(date(2025, 6, 2));

        sched.prune_satisfied(date(2025, 6, 2));

        assert!(!sched.satisfied.contains(&date(2025, 5, 20)));
        assert!(sched.satisfied.contains(&date(2025, 6, 1)));
        assert!(sched.satisfied.contains(&date(2025, 6, 2)));
    }
}
