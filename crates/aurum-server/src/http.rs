//! HTTP surface: the SSE stream plus read-only status and query endpoints.

use std::collections::HashMap;
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{debug, error};

use aurum_benchmark::{BenchmarkRecord, BenchmarkState, DailyRate};
use aurum_broadcast::{sse, Hub};
use aurum_core::{Asset, Provider};
use aurum_persistence::ReferencePrices;
use aurum_provider::{ConnectionHealth, ProviderStatus};
use aurum_reference::ReferenceService;

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    hub: Arc<Hub>,
    reference: Arc<ReferenceService>,
    benchmarks: Arc<BenchmarkState>,
    providers: Vec<(Provider, Arc<ConnectionHealth>)>,
}

impl AppState {
    pub fn new(
        hub: Arc<Hub>,
        reference: Arc<ReferenceService>,
        benchmarks: Arc<BenchmarkState>,
        providers: Vec<(Provider, Arc<ConnectionHealth>)>,
    ) -> Self {
        Self {
            hub,
            reference,
            benchmarks,
            providers,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/stream", get(stream_handler))
        .route("/api/status", get(status_handler))
        .route("/api/statistics/{asset}", get(statistics_handler))
        .route("/api/reference", get(reference_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// SSE price stream. The subscription unregisters itself when the client
/// disconnects and the response stream is dropped.
async fn stream_handler(State(state): State<AppState>) -> impl IntoResponse {
    let subscription = state.hub.subscribe();
    debug!(subscriber = %subscription.id(), "SSE stream opened");

    let connected =
        futures_util::stream::once(async { Ok::<_, Infallible>(sse::CONNECTED_FRAME.to_string()) });
    let events = futures_util::stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.next_event().await;
        Some((Ok::<_, Infallible>(sse::frame(&event)), subscription))
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(connected.chain(events)),
    )
}

#[derive(Serialize)]
struct StatusResponse {
    providers: Vec<ProviderStatus>,
    subscribers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    fixing: Option<BenchmarkRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    daily_rate: Option<DailyRate>,
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let providers = state
        .providers
        .iter()
        .map(|(provider, health)| health.status(*provider))
        .collect();
    Json(StatusResponse {
        providers,
        subscribers: state.hub.subscriber_count(),
        fixing: state.benchmarks.fixing(),
        daily_rate: state.benchmarks.daily_rate(),
    })
}

async fn statistics_handler(
    State(state): State<AppState>,
    Path(asset): Path<String>,
) -> Response {
    let Ok(asset) = Asset::from_str(&asset) else {
        return (StatusCode::BAD_REQUEST, format!("unknown asset: {asset}")).into_response();
    };
    match state.reference.statistics(asset).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            error!(%asset, error = %e, "Statistics query failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "query failed").into_response()
        }
    }
}

#[derive(Deserialize)]
struct ReferenceParams {
    /// Comma-separated asset names; defaults to metals plus usd_krw.
    assets: Option<String>,
}

async fn reference_handler(
    State(state): State<AppState>,
    Query(params): Query<ReferenceParams>,
) -> Response {
    let assets = match parse_assets(params.assets.as_deref()) {
        Ok(assets) => assets,
        Err(bad) => {
            return (StatusCode::BAD_REQUEST, format!("unknown asset: {bad}")).into_response();
        }
    };
    match state.reference.reference_prices(&assets).await {
        Ok(result) => {
            let by_name: HashMap<String, ReferencePrices> = result
                .into_iter()
                .map(|(asset, prices)| (asset.to_string(), prices))
                .collect();
            Json(by_name).into_response()
        }
        Err(e) => {
            error!(error = %e, "Reference query failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "query failed").into_response()
        }
    }
}

fn parse_assets(raw: Option<&str>) -> Result<Vec<Asset>, String> {
    match raw {
        None => Ok(vec![
            Asset::Gold,
            Asset::Silver,
            Asset::Platinum,
            Asset::Palladium,
            Asset::UsdKrw,
        ]),
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Asset::from_str(s).map_err(|_| s.to_string()))
            .collect(),
    }
}

async fn metrics_handler() -> Response {
    match aurum_telemetry::metrics::export() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Metrics export failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "export failed").into_response()
        }
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_asset_list_covers_metals_and_krw() {
        let assets = parse_assets(None).unwrap();
        assert_eq!(assets.len(), 5);
        assert!(assets.contains(&Asset::UsdKrw));
    }

    #[test]
    fn csv_assets_parse_and_reject_unknown() {
        let assets = parse_assets(Some("gold, silver")).unwrap();
        assert_eq!(assets, vec![Asset::Gold, Asset::Silver]);
        assert_eq!(parse_assets(Some("gold,copper")).unwrap_err(), "copper");
    }
}
