//! Market operations: creation, trade execution, and portfolio queries.
//!
//! Trade execution is serialized by a single process-wide mutex so the
//! read-market → compute → write-state → append-entry sequence is atomic per
//! process; that is what keeps LMSR pricing path-independent under
//! concurrency. Horizontal scaling would replace this with per-market
//! advisory locks or optimistic concurrency in the durable store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::contract;
use crate::correlation::PositionLimiter;
use crate::error::EngineError;
use crate::lmsr::MarketMaker;
use crate::metrics;
use crate::models::{LedgerEntry, Market, MarketStatus, Position, Side};
use crate::store::Store;
use crate::trade::hub::{PriceFeedHub, PriceUpdate};

/// Default liquidity when market creation omits `b` or sends a non-positive
/// value.
const DEFAULT_B: Decimal = dec!(100);

// --- Request/response types ---

/// JSON body for POST /api/v1/markets.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMarketRequest {
    pub contract_id: String,
    /// Liquidity parameter; omitted or <= 0 means the default of 100.
    #[serde(default)]
    pub b: Decimal,
}

/// JSON body for POST /api/v1/trade.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeRequest {
    pub user_id: String,
    pub contract_id: String,
    /// "YES" or "NO"; anything else is rejected.
    pub side: String,
    /// Signed: positive = buy, negative = sell.
    pub quantity: Decimal,
}

/// JSON body returned from POST /api/v1/trade.
#[derive(Debug, Clone, Serialize)]
pub struct TradeResponse {
    pub trade_id: String,
    pub user_id: String,
    pub contract_id: String,
    pub side: Side,
    pub quantity: Decimal,
    pub fill_price: Decimal,
    pub cost: Decimal,
    pub position: PositionSummary,
}

/// Position snapshot included in trade responses.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PositionSummary {
    pub yes_qty: Decimal,
    pub no_qty: Decimal,
    pub cost_basis: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Current prices for GET /api/v1/markets/{id}/price.
#[derive(Debug, Clone, Serialize)]
pub struct PriceQuote {
    pub yes: Decimal,
    pub no: Decimal,
}

/// Aggregated holdings for GET /api/v1/portfolio/{user_id}.
#[derive(Debug, Clone, Serialize)]
pub struct Portfolio {
    pub user_id: String,
    pub positions: Vec<Position>,
    pub total_pnl: Decimal,
    /// Sum of |net_qty| across positions.
    pub total_exposure: Decimal,
    /// Percentage of the margin limit in use.
    pub margin_utilization: Decimal,
    pub exposure_by_cell: HashMap<String, Decimal>,
}

/// Orchestrates the trade pipeline and market/portfolio queries.
pub struct TradeService {
    store: Arc<dyn Store>,
    limiter: PositionLimiter,
    margin_limit: Decimal,
    hub: Option<Arc<PriceFeedHub>>,
    write_lock: Mutex<()>,
}

impl TradeService {
    pub fn new(store: Arc<dyn Store>, limiter: PositionLimiter, margin_limit: Decimal) -> Self {
        Self {
            store,
            limiter,
            margin_limit,
            hub: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Attach the live broadcast hub.
    pub fn with_hub(mut self, hub: Arc<PriceFeedHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Validate the ticker, default the liquidity parameter, and persist a
    /// fresh market at 50/50 pricing.
    pub async fn create_market(&self, req: &CreateMarketRequest) -> Result<Market, EngineError> {
        let parsed = contract::parse_ticker(&req.contract_id)?;

        let b = if req.b <= Decimal::ZERO { DEFAULT_B } else { req.b };
        // Reject configurations the pricer could never serve.
        MarketMaker::new(b)?;

        let market = Market {
            id: Uuid::new_v4().to_string(),
            contract_id: req.contract_id.clone(),
            h3_cell_id: parsed.h3_cell_id,
            q_yes: Decimal::ZERO,
            q_no: Decimal::ZERO,
            b,
            price_yes: dec!(0.5),
            price_no: dec!(0.5),
            status: MarketStatus::Open,
            created_at: Utc::now(),
        };

        self.store.create_market(&market).await?;
        metrics::ACTIVE_MARKETS.inc();

        info!(
            id = %market.id,
            contract = %market.contract_id,
            h3_cell = %market.h3_cell_id,
            b = %b,
            "market created"
        );
        Ok(market)
    }

    pub async fn get_market(&self, id: &str) -> Result<Market, EngineError> {
        self.store.get_market(id).await
    }

    pub async fn get_price(&self, id: &str) -> Result<PriceQuote, EngineError> {
        let market = self.store.get_market(id).await?;
        Ok(PriceQuote {
            yes: market.price_yes,
            no: market.price_no,
        })
    }

    pub async fn list_markets(&self, h3_cell: Option<&str>) -> Result<Vec<Market>, EngineError> {
        let markets = self.store.list_markets().await?;
        Ok(match h3_cell {
            Some(cell) => markets
                .into_iter()
                .filter(|m| m.h3_cell_id == cell)
                .collect(),
            None => markets,
        })
    }

    pub async fn market_history(&self, id: &str) -> Result<Vec<LedgerEntry>, EngineError> {
        self.store.ledger_entries_by_market(id).await
    }

    /// Execute a trade against the LMSR and return the fill and updated
    /// position. Every attempt, successful or not, leaves a structured log
    /// record.
    pub async fn execute_trade(&self, req: &TradeRequest) -> Result<TradeResponse, EngineError> {
        let started = Instant::now();
        match self.execute_trade_inner(req, started).await {
            Ok(response) => Ok(response),
            Err(err) => {
                warn!(
                    user = %req.user_id,
                    contract = %req.contract_id,
                    side = %req.side,
                    qty = %req.quantity,
                    error = %err,
                    "trade rejected"
                );
                Err(err)
            }
        }
    }

    async fn execute_trade_inner(
        &self,
        req: &TradeRequest,
        started: Instant,
    ) -> Result<TradeResponse, EngineError> {
        if req.user_id.is_empty() {
            return Err(EngineError::BadRequest("user_id is required".to_string()));
        }
        let side = Side::parse(&req.side)
            .ok_or_else(|| EngineError::BadRequest("side must be YES or NO".to_string()))?;
        if req.quantity.is_zero() {
            return Err(EngineError::BadRequest(
                "quantity must be non-zero".to_string(),
            ));
        }

        // Serialize trade execution.
        let _guard = self.write_lock.lock().await;

        let market = self.store.get_market_by_contract(&req.contract_id).await?;
        if market.status != MarketStatus::Open {
            return Err(EngineError::Conflict(
                "market is not open for trading".to_string(),
            ));
        }

        let maker = MarketMaker::new(market.b).map_err(|_| {
            EngineError::Internal(format!("market {} has invalid liquidity", market.id))
        })?;

        // Position limits: YES increases cell exposure, NO decreases it.
        let exposure_delta = match side {
            Side::Yes => req.quantity,
            Side::No => -req.quantity,
        };
        let exposures = self.store.user_cell_exposures(&req.user_id).await?;
        if let Err(err) = self
            .limiter
            .check_limit(&market.h3_cell_id, exposure_delta, &exposures)
        {
            metrics::POSITION_LIMIT_REJECTIONS.inc();
            return Err(err);
        }

        // Price-bound validation, then cost and fill at the current state.
        let (cost, fill_price, new_q_yes, new_q_no) = match side {
            Side::Yes => {
                maker.validate_trade(market.q_yes, market.q_no, req.quantity)?;
                (
                    maker.trade_cost(market.q_yes, market.q_no, req.quantity),
                    maker.fill_price(market.q_yes, market.q_no, req.quantity),
                    market.q_yes + req.quantity,
                    market.q_no,
                )
            }
            Side::No => {
                maker.validate_trade_no(market.q_yes, market.q_no, req.quantity)?;
                (
                    maker.trade_cost_no(market.q_yes, market.q_no, req.quantity),
                    // Quantities swap for the NO side.
                    maker.fill_price(market.q_no, market.q_yes, req.quantity),
                    market.q_yes,
                    market.q_no + req.quantity,
                )
            }
        };

        let new_price_yes = maker.price(new_q_yes, new_q_no);
        let new_price_no = maker.price_no(new_q_yes, new_q_no);

        // State first, then the ledger entry: a crash in between leaves
        // slightly inflated market quantities but never a phantom position,
        // because positions derive from the ledger alone.
        self.store
            .update_market_state(&market.id, new_q_yes, new_q_no, new_price_yes, new_price_no)
            .await?;

        let entry = LedgerEntry {
            id: Uuid::new_v4().to_string(),
            user_id: req.user_id.clone(),
            market_id: market.id.clone(),
            contract_id: req.contract_id.clone(),
            side,
            quantity: req.quantity,
            price: fill_price,
            cost,
            timestamp: Utc::now(),
        };
        self.store.insert_ledger_entry(&entry).await?;

        let positions = self.store.user_positions(&req.user_id).await?;
        let position = positions
            .iter()
            .find(|p| p.market_id == market.id)
            .map(|p| PositionSummary {
                yes_qty: p.yes_qty,
                no_qty: p.no_qty,
                cost_basis: p.cost_basis,
                unrealized_pnl: p.unrealized_pnl,
            })
            .unwrap_or_default();

        metrics::TRADES_TOTAL.with_label_values(&[side.as_str()]).inc();
        metrics::MARKET_VOLUME
            .with_label_values(&[&market.id, side.as_str()])
            .inc_by(req.quantity.abs().to_f64().unwrap_or(0.0));
        metrics::TRADE_LATENCY
            .with_label_values(&[side.as_str()])
            .observe(started.elapsed().as_secs_f64());

        info!(
            trade_id = %entry.id,
            user = %req.user_id,
            contract = %req.contract_id,
            side = side.as_str(),
            qty = %req.quantity,
            cost = %cost,
            fill_price = %fill_price,
            new_price_yes = %new_price_yes,
            "trade executed"
        );

        if let Some(hub) = &self.hub {
            hub.broadcast(&PriceUpdate {
                event: PriceUpdate::TRADE_EXECUTED,
                market_id: market.id.clone(),
                contract_id: req.contract_id.clone(),
                h3_cell_id: market.h3_cell_id.clone(),
                price_yes: new_price_yes.to_string(),
                price_no: new_price_no.to_string(),
                side: side.as_str().to_string(),
                quantity: req.quantity.to_string(),
            });
        }

        Ok(TradeResponse {
            trade_id: entry.id,
            user_id: req.user_id.clone(),
            contract_id: req.contract_id.clone(),
            side,
            quantity: req.quantity,
            fill_price,
            cost,
            position,
        })
    }

    /// P&L, exposure per cell, and margin utilization for one user.
    pub async fn portfolio(&self, user_id: &str) -> Result<Portfolio, EngineError> {
        let positions = self.store.user_positions(user_id).await?;

        let mut total_pnl = Decimal::ZERO;
        let mut total_exposure = Decimal::ZERO;
        let mut total_margin = Decimal::ZERO;
        let mut exposure_by_cell: HashMap<String, Decimal> = HashMap::new();

        for p in &positions {
            total_pnl += p.unrealized_pnl;
            total_exposure += p.net_qty.abs();

            if !p.h3_cell_id.is_empty() {
                *exposure_by_cell
                    .entry(p.h3_cell_id.clone())
                    .or_insert(Decimal::ZERO) += p.net_qty;
            }

            // Worst-case loss per position for a $1-payout binary contract:
            // max(costBasis - yesQty, costBasis - noQty), floored at zero.
            let max_loss = (p.cost_basis - p.yes_qty).max(p.cost_basis - p.no_qty);
            if max_loss > Decimal::ZERO {
                total_margin += max_loss;
            }
        }

        let margin_utilization = if self.margin_limit > Decimal::ZERO {
            (total_margin / self.margin_limit * dec!(100))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        } else {
            Decimal::ZERO
        };

        Ok(Portfolio {
            user_id: user_id.to_string(),
            positions,
            total_pnl,
            total_exposure,
            margin_utilization,
            exposure_by_cell,
        })
    }
}
