//! In-memory store for tests and local development. No persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::EngineError;
use crate::models::{LedgerEntry, Market, Position, Side};
use crate::store::{CellExposures, Store};

#[derive(Default)]
struct Inner {
    markets: HashMap<String, Market>,
    ledger: Vec<LedgerEntry>,
}

/// Reference `Store` implementation over a readers-writer lock. Reads hand
/// out clones; aggregation queries run in a single pass under one read-lock
/// acquisition, never re-entering through the public methods.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate ledger entries into positions. Caller holds the read lock.
    fn aggregate_positions(inner: &Inner, user_id: &str) -> Vec<Position> {
        struct Agg {
            contract_id: String,
            yes_qty: Decimal,
            no_qty: Decimal,
            cost_basis: Decimal,
        }

        let mut agg: HashMap<String, Agg> = HashMap::new();
        for entry in inner.ledger.iter().filter(|e| e.user_id == user_id) {
            let a = agg.entry(entry.market_id.clone()).or_insert_with(|| Agg {
                contract_id: entry.contract_id.clone(),
                yes_qty: Decimal::ZERO,
                no_qty: Decimal::ZERO,
                cost_basis: Decimal::ZERO,
            });
            match entry.side {
                Side::Yes => a.yes_qty += entry.quantity,
                Side::No => a.no_qty += entry.quantity,
            }
            a.cost_basis += entry.cost;
        }

        agg.into_iter()
            .map(|(market_id, a)| {
                let (price_yes, h3_cell_id) = match inner.markets.get(&market_id) {
                    Some(m) => (m.price_yes, m.h3_cell_id.clone()),
                    None => (dec!(0.5), String::new()),
                };
                let price_no = Decimal::ONE - price_yes;

                let net_qty = a.yes_qty - a.no_qty;
                let current_value = price_yes * a.yes_qty + price_no * a.no_qty;

                Position {
                    user_id: user_id.to_string(),
                    market_id,
                    contract_id: a.contract_id,
                    h3_cell_id,
                    yes_qty: a.yes_qty,
                    no_qty: a.no_qty,
                    net_qty,
                    cost_basis: a.cost_basis,
                    current_value,
                    unrealized_pnl: current_value - a.cost_basis,
                }
            })
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_market(&self, market: &Market) -> Result<(), EngineError> {
        let mut inner = self.inner.write();
        if inner
            .markets
            .values()
            .any(|m| m.contract_id == market.contract_id)
        {
            return Err(EngineError::Conflict(format!(
                "market for contract {} already exists",
                market.contract_id
            )));
        }
        inner.markets.insert(market.id.clone(), market.clone());
        Ok(())
    }

    async fn get_market(&self, id: &str) -> Result<Market, EngineError> {
        self.inner
            .read()
            .markets
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("market {id}")))
    }

    async fn get_market_by_contract(&self, contract_id: &str) -> Result<Market, EngineError> {
        self.inner
            .read()
            .markets
            .values()
            .find(|m| m.contract_id == contract_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("market for contract {contract_id}")))
    }

    async fn list_markets(&self) -> Result<Vec<Market>, EngineError> {
        Ok(self.inner.read().markets.values().cloned().collect())
    }

    async fn update_market_state(
        &self,
        id: &str,
        q_yes: Decimal,
        q_no: Decimal,
        price_yes: Decimal,
        price_no: Decimal,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.write();
        let market = inner
            .markets
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("market {id}")))?;
        market.q_yes = q_yes;
        market.q_no = q_no;
        market.price_yes = price_yes;
        market.price_no = price_no;
        Ok(())
    }

    async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), EngineError> {
        self.inner.write().ledger.push(entry.clone());
        Ok(())
    }

    async fn ledger_entries_by_market(
        &self,
        market_id: &str,
    ) -> Result<Vec<LedgerEntry>, EngineError> {
        Ok(self
            .inner
            .read()
            .ledger
            .iter()
            .filter(|e| e.market_id == market_id)
            .cloned()
            .collect())
    }

    async fn ledger_entries_by_user(&self, user_id: &str) -> Result<Vec<LedgerEntry>, EngineError> {
        Ok(self
            .inner
            .read()
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn user_positions(&self, user_id: &str) -> Result<Vec<Position>, EngineError> {
        let inner = self.inner.read();
        Ok(Self::aggregate_positions(&inner, user_id))
    }

    async fn user_cell_exposures(&self, user_id: &str) -> Result<CellExposures, EngineError> {
        let inner = self.inner.read();
        let mut exposures = CellExposures::new();
        for position in Self::aggregate_positions(&inner, user_id) {
            if !position.h3_cell_id.is_empty() {
                *exposures.entry(position.h3_cell_id).or_insert(Decimal::ZERO) +=
                    position.net_qty;
            }
        }
        Ok(exposures)
    }
}
