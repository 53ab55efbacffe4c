//! Prometheus instrumentation.
//!
//! Metrics are process-wide singletons registered against the default
//! registry at first use; hot paths only touch counter increments and timer
//! observations.

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, CounterVec, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    TextEncoder,
};
use std::time::Instant;

lazy_static! {
    /// Trades executed, partitioned by side.
    pub static ref TRADES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "atmx_trades_total",
        "Total number of trades executed",
        &["side"]
    )
    .expect("register atmx_trades_total");

    /// Trade execution latency in seconds.
    pub static ref TRADE_LATENCY: HistogramVec = register_histogram_vec!(
        "atmx_trade_latency_seconds",
        "Trade execution latency in seconds",
        &["side"]
    )
    .expect("register atmx_trade_latency_seconds");

    /// Number of currently open markets.
    pub static ref ACTIVE_MARKETS: IntGauge =
        register_int_gauge!("atmx_active_markets", "Number of currently open markets")
            .expect("register atmx_active_markets");

    /// Connected live-update subscribers.
    pub static ref WEBSOCKET_CLIENTS: IntGauge = register_int_gauge!(
        "atmx_websocket_clients",
        "Number of connected WebSocket clients"
    )
    .expect("register atmx_websocket_clients");

    /// HTTP requests by method, path, and status.
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "atmx_http_requests_total",
        "Total HTTP requests",
        &["method", "path", "status"]
    )
    .expect("register atmx_http_requests_total");

    /// HTTP request duration by method and path.
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "atmx_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("register atmx_http_request_duration_seconds");

    /// Trades rejected by the position limiter.
    pub static ref POSITION_LIMIT_REJECTIONS: IntCounter = register_int_counter!(
        "atmx_position_limit_rejections_total",
        "Trades rejected by position limiter"
    )
    .expect("register atmx_position_limit_rejections_total");

    /// Cumulative trade volume in shares per market.
    pub static ref MARKET_VOLUME: CounterVec = register_counter_vec!(
        "atmx_market_volume_total",
        "Cumulative trade volume in shares",
        &["market_id", "side"]
    )
    .expect("register atmx_market_volume_total");
}

/// Prometheus text exposition for GET /metrics.
pub async fn handler() -> String {
    let encoder = TextEncoder::new();
    encoder
        .encode_to_string(&prometheus::gather())
        .unwrap_or_default()
}

/// Axum middleware recording request counts and durations. Uses the matched
/// route pattern as the path label to keep cardinality bounded.
pub async fn track_requests(request: Request<Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let start = Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed().as_secs_f64();

    let status = response.status().as_u16().to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path])
        .observe(duration);

    response
}
