//! Engine-wide error type.
//!
//! Domain failures carry their own variant so the HTTP layer can map them to
//! status codes without string matching. Store backends fold their driver
//! errors into `Internal`; the raw cause is logged, never returned to clients.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid ticker format: {0} (expected ATMX-{{h3cell}}-{{type}}-{{threshold}}-{{YYYYMMDD}})")]
    InvalidTicker(String),

    #[error("unsupported contract type: {0}")]
    UnsupportedType(String),

    #[error("liquidity parameter b must be positive")]
    InvalidLiquidity,

    #[error("invalid forecast inputs: {0}")]
    InvalidForecast(&'static str),

    #[error("trade would push price beyond allowed bounds")]
    PriceBoundExceeded,

    #[error("per-cell position limit exceeded")]
    PerCellLimitExceeded,

    #[error("correlated exposure limit exceeded")]
    CorrelatedLimitExceeded,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}
