//! PostgreSQL-backed store — the source of truth.
//!
//! All monetary values live in NUMERIC columns for exact decimal precision.
//! The ledger is append-only; beyond the application never issuing UPDATE or
//! DELETE on `ledger_entries`, deployments revoke those privileges from the
//! runtime role so immutability holds at the database level.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::error::EngineError;
use crate::models::{LedgerEntry, Market, MarketStatus, Position, Side};
use crate::store::{CellExposures, Store};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS markets (
    id          TEXT PRIMARY KEY,
    contract_id TEXT NOT NULL UNIQUE,
    h3_cell_id  TEXT NOT NULL,
    q_yes       NUMERIC NOT NULL DEFAULT 0,
    q_no        NUMERIC NOT NULL DEFAULT 0,
    b           NUMERIC NOT NULL,
    price_yes   NUMERIC NOT NULL DEFAULT 0.5,
    price_no    NUMERIC NOT NULL DEFAULT 0.5,
    status      TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'settled')),
    created_at  TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_markets_contract_id ON markets (contract_id);
CREATE INDEX IF NOT EXISTS idx_markets_h3_cell_id ON markets (h3_cell_id);

CREATE TABLE IF NOT EXISTS ledger_entries (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    market_id   TEXT NOT NULL REFERENCES markets (id),
    contract_id TEXT NOT NULL,
    side        TEXT NOT NULL CHECK (side IN ('YES', 'NO')),
    quantity    NUMERIC NOT NULL,
    price       NUMERIC NOT NULL,
    cost        NUMERIC NOT NULL,
    timestamp   TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ledger_user_id ON ledger_entries (user_id);
CREATE INDEX IF NOT EXISTS idx_ledger_market_id ON ledger_entries (market_id);
CREATE INDEX IF NOT EXISTS idx_ledger_user_market ON ledger_entries (user_id, market_id);
CREATE INDEX IF NOT EXISTS idx_ledger_timestamp ON ledger_entries (timestamp);
"#;

const MARKET_COLUMNS: &str =
    "id, contract_id, h3_cell_id, q_yes, q_no, b, price_yes, price_no, status, created_at";

/// `Store` implementation over a PostgreSQL pool.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, EngineError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn init(&self) -> Result<(), EngineError> {
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn market_from_row(row: &PgRow) -> Result<Market, EngineError> {
    let status_str: String = row.try_get("status")?;
    let status = MarketStatus::parse(&status_str)
        .ok_or_else(|| EngineError::Internal(format!("unknown market status: {status_str}")))?;

    Ok(Market {
        id: row.try_get("id")?,
        contract_id: row.try_get("contract_id")?,
        h3_cell_id: row.try_get("h3_cell_id")?,
        q_yes: row.try_get("q_yes")?,
        q_no: row.try_get("q_no")?,
        b: row.try_get("b")?,
        price_yes: row.try_get("price_yes")?,
        price_no: row.try_get("price_no")?,
        status,
        created_at: row.try_get("created_at")?,
    })
}

fn ledger_entry_from_row(row: &PgRow) -> Result<LedgerEntry, EngineError> {
    let side_str: String = row.try_get("side")?;
    let side = Side::parse(&side_str)
        .ok_or_else(|| EngineError::Internal(format!("unknown ledger side: {side_str}")))?;

    Ok(LedgerEntry {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        market_id: row.try_get("market_id")?,
        contract_id: row.try_get("contract_id")?,
        side,
        quantity: row.try_get("quantity")?,
        price: row.try_get("price")?,
        cost: row.try_get("cost")?,
        timestamp: row.try_get("timestamp")?,
    })
}

#[async_trait]
impl Store for PostgresStore {
    async fn create_market(&self, market: &Market) -> Result<(), EngineError> {
        let result = sqlx::query(
            "INSERT INTO markets \
             (id, contract_id, h3_cell_id, q_yes, q_no, b, price_yes, price_no, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&market.id)
        .bind(&market.contract_id)
        .bind(&market.h3_cell_id)
        .bind(market.q_yes)
        .bind(market.q_no)
        .bind(market.b)
        .bind(market.price_yes)
        .bind(market.price_no)
        .bind(market.status.as_str())
        .bind(market.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(EngineError::Conflict(format!(
                    "market for contract {} already exists",
                    market.contract_id
                )))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_market(&self, id: &str) -> Result<Market, EngineError> {
        let row = sqlx::query(&format!("SELECT {MARKET_COLUMNS} FROM markets WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("market {id}")))?;
        market_from_row(&row)
    }

    async fn get_market_by_contract(&self, contract_id: &str) -> Result<Market, EngineError> {
        let row = sqlx::query(&format!(
            "SELECT {MARKET_COLUMNS} FROM markets WHERE contract_id = $1"
        ))
        .bind(contract_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("market for contract {contract_id}")))?;
        market_from_row(&row)
    }

    async fn list_markets(&self) -> Result<Vec<Market>, EngineError> {
        let rows = sqlx::query(&format!(
            "SELECT {MARKET_COLUMNS} FROM markets ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(market_from_row).collect()
    }

    async fn update_market_state(
        &self,
        id: &str,
        q_yes: Decimal,
        q_no: Decimal,
        price_yes: Decimal,
        price_no: Decimal,
    ) -> Result<(), EngineError> {
        let result = sqlx::query(
            "UPDATE markets \
             SET q_yes = $2, q_no = $3, price_yes = $4, price_no = $5 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(q_yes)
        .bind(q_no)
        .bind(price_yes)
        .bind(price_no)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!("market {id}")));
        }
        Ok(())
    }

    async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO ledger_entries \
             (id, user_id, market_id, contract_id, side, quantity, price, cost, timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.market_id)
        .bind(&entry.contract_id)
        .bind(entry.side.as_str())
        .bind(entry.quantity)
        .bind(entry.price)
        .bind(entry.cost)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ledger_entries_by_market(
        &self,
        market_id: &str,
    ) -> Result<Vec<LedgerEntry>, EngineError> {
        let rows = sqlx::query(
            "SELECT id, user_id, market_id, contract_id, side, quantity, price, cost, timestamp \
             FROM ledger_entries WHERE market_id = $1 ORDER BY timestamp",
        )
        .bind(market_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(ledger_entry_from_row).collect()
    }

    async fn ledger_entries_by_user(&self, user_id: &str) -> Result<Vec<LedgerEntry>, EngineError> {
        let rows = sqlx::query(
            "SELECT id, user_id, market_id, contract_id, side, quantity, price, cost, timestamp \
             FROM ledger_entries WHERE user_id = $1 ORDER BY timestamp",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(ledger_entry_from_row).collect()
    }

    async fn user_positions(&self, user_id: &str) -> Result<Vec<Position>, EngineError> {
        // One grouped aggregate over the ledger joined to markets; the
        // mark-to-market uses the market's stored current price.
        let rows = sqlx::query(
            "SELECT \
                le.market_id, \
                m.contract_id, \
                m.h3_cell_id, \
                COALESCE(SUM(CASE WHEN le.side = 'YES' THEN le.quantity ELSE 0 END), 0) AS yes_qty, \
                COALESCE(SUM(CASE WHEN le.side = 'NO'  THEN le.quantity ELSE 0 END), 0) AS no_qty, \
                COALESCE(SUM(le.cost), 0) AS cost_basis, \
                m.price_yes \
             FROM ledger_entries le \
             JOIN markets m ON m.id = le.market_id \
             WHERE le.user_id = $1 \
             GROUP BY le.market_id, m.contract_id, m.h3_cell_id, m.price_yes",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let yes_qty: Decimal = row.try_get("yes_qty")?;
                let no_qty: Decimal = row.try_get("no_qty")?;
                let cost_basis: Decimal = row.try_get("cost_basis")?;
                let price_yes: Decimal = row.try_get("price_yes")?;
                let price_no = Decimal::ONE - price_yes;

                let net_qty = yes_qty - no_qty;
                let current_value = price_yes * yes_qty + price_no * no_qty;

                Ok(Position {
                    user_id: user_id.to_string(),
                    market_id: row.try_get("market_id")?,
                    contract_id: row.try_get("contract_id")?,
                    h3_cell_id: row.try_get("h3_cell_id")?,
                    yes_qty,
                    no_qty,
                    net_qty,
                    cost_basis,
                    current_value,
                    unrealized_pnl: current_value - cost_basis,
                })
            })
            .collect()
    }

    async fn user_cell_exposures(&self, user_id: &str) -> Result<CellExposures, EngineError> {
        let rows = sqlx::query(
            "SELECT m.h3_cell_id, \
                COALESCE(SUM(CASE WHEN le.side = 'YES' THEN le.quantity \
                                  WHEN le.side = 'NO'  THEN -le.quantity \
                                  ELSE 0 END), 0) AS net_exposure \
             FROM ledger_entries le \
             JOIN markets m ON m.id = le.market_id \
             WHERE le.user_id = $1 \
             GROUP BY m.h3_cell_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut exposures = CellExposures::new();
        for row in rows {
            let cell_id: String = row.try_get("h3_cell_id")?;
            let net: Decimal = row.try_get("net_exposure")?;
            exposures.insert(cell_id, net);
        }
        Ok(exposures)
    }
}
