//! Environment-driven configuration.

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Application configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port.
    pub port: u16,
    /// PostgreSQL connection string; `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Redis connection string; only used together with a durable store.
    pub redis_url: Option<String>,
    /// Maximum absolute net exposure in a single H3 cell.
    pub max_per_cell: Decimal,
    /// Maximum aggregate absolute exposure across a correlated cell group.
    pub max_correlated: Decimal,
    /// H3 index prefix length used for correlation grouping.
    pub correlation_prefix_len: usize,
    /// Margin limit used for portfolio utilization reporting.
    pub margin_limit: Decimal,
    /// Cache entry TTL in seconds.
    pub cache_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|s| !s.is_empty());

        let redis_url = std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty());

        let max_per_cell = parse_decimal("MAX_PER_CELL", dec!(1000));
        let max_correlated = parse_decimal("MAX_CORRELATED", dec!(5000));

        // Prefix length 5 corresponds to a hurricane-scale correlation radius
        // for resolution-7 cells.
        let correlation_prefix_len = std::env::var("CORRELATION_PREFIX_LEN")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&v| v >= 1)
            .unwrap_or(5);

        let margin_limit = parse_decimal("MARGIN_LIMIT", dec!(10000));

        let cache_ttl_secs = std::env::var("CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(30);

        Ok(Self {
            port,
            database_url,
            redis_url,
            max_per_cell,
            max_correlated,
            correlation_prefix_len,
            margin_limit,
            cache_ttl_secs,
        })
    }
}

fn parse_decimal(var: &str, default: Decimal) -> Decimal {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<Decimal>().ok())
        .unwrap_or(default)
}
