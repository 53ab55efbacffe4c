//! Persistence interface for the market engine.
//!
//! PostgreSQL is the source of truth, Redis provides a read-through cache
//! layer, and the in-memory store backs tests and local development. All
//! three sit behind the same trait so the trade service composes them
//! freely.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::models::{LedgerEntry, Market, Position};

mod cache;
mod memory;
mod postgres;

pub use cache::CachedStore;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Net directional exposure per H3 cell, YES counted positive.
pub type CellExposures = HashMap<String, Decimal>;

#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a new market. Rejects a duplicate contract id with `Conflict`.
    async fn create_market(&self, market: &Market) -> Result<(), EngineError>;

    /// Retrieve a market by its id.
    async fn get_market(&self, id: &str) -> Result<Market, EngineError>;

    /// Retrieve a market by its contract ticker.
    async fn get_market_by_contract(&self, contract_id: &str) -> Result<Market, EngineError>;

    /// All markets.
    async fn list_markets(&self) -> Result<Vec<Market>, EngineError>;

    /// Update quantities and prices after a trade. The four fields change
    /// together; nothing else does.
    async fn update_market_state(
        &self,
        id: &str,
        q_yes: Decimal,
        q_no: Decimal,
        price_yes: Decimal,
        price_no: Decimal,
    ) -> Result<(), EngineError>;

    /// Append an immutable trade record. The ledger is append-only: no store
    /// operation updates or deletes entries.
    async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), EngineError>;

    /// All trades for a market, oldest first.
    async fn ledger_entries_by_market(&self, market_id: &str)
        -> Result<Vec<LedgerEntry>, EngineError>;

    /// All trades for a user, oldest first.
    async fn ledger_entries_by_user(&self, user_id: &str) -> Result<Vec<LedgerEntry>, EngineError>;

    /// Aggregate positions reconstructed from the ledger, marked to the
    /// market's current price.
    async fn user_positions(&self, user_id: &str) -> Result<Vec<Position>, EngineError>;

    /// Net directional exposure per H3 cell for a user.
    async fn user_cell_exposures(&self, user_id: &str) -> Result<CellExposures, EngineError>;
}
