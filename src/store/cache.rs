//! Redis read-through cache over a primary store.
//!
//! Writes go to the primary first, then invalidate (or refresh) the affected
//! cache keys; reads check Redis and fall back to the primary on a miss. A
//! cache failure must never fail the request: read errors degrade to misses,
//! invalidation errors are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::models::{LedgerEntry, Market, Position};
use crate::store::{CellExposures, Store};

/// Read-through cache wrapper.
pub struct CachedStore {
    primary: Arc<dyn Store>,
    conn: redis::aio::ConnectionManager,
    ttl_secs: u64,
}

impl CachedStore {
    /// Connect to Redis and wrap `primary`.
    pub async fn connect(
        primary: Arc<dyn Store>,
        redis_url: &str,
        ttl: Duration,
    ) -> Result<Self, EngineError> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| EngineError::Internal(format!("invalid redis url: {err}")))?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|err| EngineError::Internal(format!("redis connection failed: {err}")))?;
        Ok(Self {
            primary,
            conn,
            ttl_secs: ttl.as_secs().max(1),
        })
    }

    async fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(err) => {
                debug!(key, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    async fn cache_put<T: Serialize>(&self, key: &str, value: &T) {
        let Ok(raw) = serde_json::to_string(value) else {
            return;
        };
        self.cache_put_raw(key, raw).await;
    }

    async fn cache_put_raw(&self, key: &str, raw: String) {
        let mut conn = self.conn.clone();
        if let Err(err) = conn.set_ex::<_, _, ()>(key, raw, self.ttl_secs).await {
            debug!(key, error = %err, "cache write failed");
        }
    }

    async fn cache_delete(&self, key: &str) {
        let mut conn = self.conn.clone();
        if let Err(err) = conn.del::<_, ()>(key).await {
            warn!(key, error = %err, "cache invalidation failed");
        }
    }
}

fn market_key(id: &str) -> String {
    format!("market:{id}")
}

fn contract_key(contract_id: &str) -> String {
    format!("contract:{contract_id}")
}

fn positions_key(user_id: &str) -> String {
    format!("positions:{user_id}")
}

#[async_trait]
impl Store for CachedStore {
    // --- Writes: primary first, then invalidate/refresh ---

    async fn create_market(&self, market: &Market) -> Result<(), EngineError> {
        self.primary.create_market(market).await?;
        self.cache_put(&market_key(&market.id), market).await;
        Ok(())
    }

    async fn update_market_state(
        &self,
        id: &str,
        q_yes: Decimal,
        q_no: Decimal,
        price_yes: Decimal,
        price_no: Decimal,
    ) -> Result<(), EngineError> {
        self.primary
            .update_market_state(id, q_yes, q_no, price_yes, price_no)
            .await?;
        // Next read re-populates.
        self.cache_delete(&market_key(id)).await;
        Ok(())
    }

    async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), EngineError> {
        self.primary.insert_ledger_entry(entry).await?;
        self.cache_delete(&positions_key(&entry.user_id)).await;
        Ok(())
    }

    // --- Reads: cache first ---

    async fn get_market(&self, id: &str) -> Result<Market, EngineError> {
        if let Some(market) = self.cache_get::<Market>(&market_key(id)).await {
            return Ok(market);
        }
        let market = self.primary.get_market(id).await?;
        self.cache_put(&market_key(id), &market).await;
        Ok(market)
    }

    async fn get_market_by_contract(&self, contract_id: &str) -> Result<Market, EngineError> {
        if let Some(market_id) = self.cache_get::<String>(&contract_key(contract_id)).await {
            return self.get_market(&market_id).await;
        }
        let market = self.primary.get_market_by_contract(contract_id).await?;
        self.cache_put(&market_key(&market.id), &market).await;
        self.cache_put(&contract_key(contract_id), &market.id).await;
        Ok(market)
    }

    async fn user_positions(&self, user_id: &str) -> Result<Vec<Position>, EngineError> {
        let key = positions_key(user_id);
        if let Some(positions) = self.cache_get::<Vec<Position>>(&key).await {
            return Ok(positions);
        }
        let positions = self.primary.user_positions(user_id).await?;
        self.cache_put(&key, &positions).await;
        Ok(positions)
    }

    // --- Passthrough (not cached) ---

    async fn list_markets(&self) -> Result<Vec<Market>, EngineError> {
        self.primary.list_markets().await
    }

    async fn ledger_entries_by_market(
        &self,
        market_id: &str,
    ) -> Result<Vec<LedgerEntry>, EngineError> {
        self.primary.ledger_entries_by_market(market_id).await
    }

    async fn ledger_entries_by_user(&self, user_id: &str) -> Result<Vec<LedgerEntry>, EngineError> {
        self.primary.ledger_entries_by_user(user_id).await
    }

    async fn user_cell_exposures(&self, user_id: &str) -> Result<CellExposures, EngineError> {
        self.primary.user_cell_exposures(user_id).await
    }
}
