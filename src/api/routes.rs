//! HTTP routes and handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware as axum_mw;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

use crate::api::ws;
use crate::error::EngineError;
use crate::metrics;
use crate::middleware::{cors, logging};
use crate::models::{LedgerEntry, Market};
use crate::trade::{
    CreateMarketRequest, Portfolio, PriceFeedHub, PriceQuote, TradeRequest, TradeResponse,
    TradeService,
};

/// Total per-request time budget.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TradeService>,
    pub hub: Arc<PriceFeedHub>,
}

/// Build the full application router.
pub fn router(service: Arc<TradeService>, hub: Arc<PriceFeedHub>) -> Router {
    let state = AppState { service, hub };

    let api_v1 = Router::new()
        .route("/ws", get(ws::websocket_handler))
        .route("/markets", get(list_markets).post(create_market))
        .route("/markets/:market_id", get(get_market))
        .route("/markets/:market_id/price", get(get_price))
        .route("/markets/:market_id/history", get(market_history))
        .route("/trade", post(execute_trade))
        .route("/portfolio/:user_id", get(get_portfolio));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::handler))
        .nest("/api/v1", api_v1)
        // route_layer so the matched route pattern (not the raw path) is the
        // metrics label; raw paths would blow up label cardinality.
        .route_layer(axum_mw::from_fn(metrics::track_requests))
        .layer(axum_mw::from_fn(logging::request_logging))
        .layer(axum_mw::from_fn(cors::permissive_cors))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}

// --- Handlers ---

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "service": "market-engine"}))
}

#[derive(Deserialize)]
struct MarketsQuery {
    h3_cell: Option<String>,
}

async fn list_markets(
    State(state): State<AppState>,
    Query(params): Query<MarketsQuery>,
) -> Result<Json<Vec<Market>>, ApiError> {
    let markets = state.service.list_markets(params.h3_cell.as_deref()).await?;
    Ok(Json(markets))
}

async fn create_market(
    State(state): State<AppState>,
    payload: Result<Json<CreateMarketRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Market>), ApiError> {
    let Json(req) = payload.map_err(bad_body)?;
    let market = state.service.create_market(&req).await?;
    Ok((StatusCode::CREATED, Json(market)))
}

async fn get_market(
    State(state): State<AppState>,
    Path(market_id): Path<String>,
) -> Result<Json<Market>, ApiError> {
    Ok(Json(state.service.get_market(&market_id).await?))
}

async fn get_price(
    State(state): State<AppState>,
    Path(market_id): Path<String>,
) -> Result<Json<PriceQuote>, ApiError> {
    Ok(Json(state.service.get_price(&market_id).await?))
}

async fn market_history(
    State(state): State<AppState>,
    Path(market_id): Path<String>,
) -> Result<Json<Vec<LedgerEntry>>, ApiError> {
    Ok(Json(state.service.market_history(&market_id).await?))
}

async fn execute_trade(
    State(state): State<AppState>,
    payload: Result<Json<TradeRequest>, JsonRejection>,
) -> Result<Json<TradeResponse>, ApiError> {
    let Json(req) = payload.map_err(bad_body)?;
    Ok(Json(state.service.execute_trade(&req).await?))
}

fn bad_body(_: JsonRejection) -> ApiError {
    ApiError(EngineError::BadRequest("invalid request body".to_string()))
}

async fn get_portfolio(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Portfolio>, ApiError> {
    Ok(Json(state.service.portfolio(&user_id).await?))
}

// --- Error mapping ---

/// Wrapper translating engine errors into HTTP responses.
#[derive(Debug)]
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use EngineError::*;

        let (status, message) = match &self.0 {
            InvalidTicker(_) | UnsupportedType(_) | InvalidLiquidity | InvalidForecast(_)
            | BadRequest(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            PriceBoundExceeded | PerCellLimitExceeded | CorrelatedLimitExceeded | Conflict(_) => {
                (StatusCode::CONFLICT, self.0.to_string())
            }
            Internal(cause) => {
                // Raw causes are logged (inside the request span, so the
                // request id rides along) but never sent to clients.
                tracing::error!(error = %cause, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({"error": message}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses_match_contract() {
        let cases: Vec<(EngineError, StatusCode)> = vec![
            (
                EngineError::InvalidTicker("X".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                EngineError::BadRequest("user_id is required".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                EngineError::NotFound("market m1".into()),
                StatusCode::NOT_FOUND,
            ),
            (EngineError::PriceBoundExceeded, StatusCode::CONFLICT),
            (EngineError::PerCellLimitExceeded, StatusCode::CONFLICT),
            (
                EngineError::Conflict("market is not open for trading".into()),
                StatusCode::CONFLICT,
            ),
            (
                EngineError::Internal("db down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
