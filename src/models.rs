//! Core domain types shared across the market engine.
//!
//! All monetary and quantity fields are `rust_decimal::Decimal` — never f64.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade direction for a binary outcome share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "YES")]
    Yes,
    #[serde(rename = "NO")]
    No,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "YES",
            Side::No => "NO",
        }
    }

    /// Parse a wire-format side string. Anything but "YES"/"NO" is rejected.
    pub fn parse(s: &str) -> Option<Side> {
        match s {
            "YES" => Some(Side::Yes),
            "NO" => Some(Side::No),
            _ => None,
        }
    }
}

/// Market lifecycle state. Settlement is driven by an external oracle; the
/// engine only refuses trades once a market is no longer `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Open,
    Settled,
}

impl MarketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::Open => "open",
            MarketStatus::Settled => "settled",
        }
    }

    pub fn parse(s: &str) -> Option<MarketStatus> {
        match s {
            "open" => Some(MarketStatus::Open),
            "settled" => Some(MarketStatus::Settled),
            _ => None,
        }
    }
}

/// State of one binary prediction market tied to one weather contract on one
/// H3 cell. Prices are a pure function of (q_yes, q_no, b); they are stored
/// so reads never have to re-price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub contract_id: String,
    pub h3_cell_id: String,
    pub q_yes: Decimal,
    pub q_no: Decimal,
    /// LMSR liquidity parameter.
    pub b: Decimal,
    pub price_yes: Decimal,
    pub price_no: Decimal,
    pub status: MarketStatus,
    pub created_at: DateTime<Utc>,
}

/// Immutable record of one trade execution. Once appended these are never
/// modified or deleted; user positions are reconstructed from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub market_id: String,
    pub contract_id: String,
    pub side: Side,
    /// Signed: positive = buy, negative = sell.
    pub quantity: Decimal,
    /// Average fill price.
    pub price: Decimal,
    /// Total cost, signed: positive = paid, negative = received.
    pub cost: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A trader's aggregate holdings in one market, derived from the ledger at
/// query time. Never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub user_id: String,
    pub market_id: String,
    pub contract_id: String,
    pub h3_cell_id: String,
    pub yes_qty: Decimal,
    pub no_qty: Decimal,
    /// yes_qty - no_qty.
    pub net_qty: Decimal,
    /// Net cash outflow.
    pub cost_basis: Decimal,
    /// Mark-to-market at current prices.
    pub current_value: Decimal,
    pub unrealized_pnl: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_round_trips_wire_format() {
        assert_eq!(Side::parse("YES"), Some(Side::Yes));
        assert_eq!(Side::parse("NO"), Some(Side::No));
        assert_eq!(Side::parse("MAYBE"), None);
        assert_eq!(Side::parse("yes"), None);
        assert_eq!(Side::Yes.as_str(), "YES");
    }

    #[test]
    fn status_round_trips_wire_format() {
        assert_eq!(MarketStatus::parse("open"), Some(MarketStatus::Open));
        assert_eq!(MarketStatus::parse("settled"), Some(MarketStatus::Settled));
        assert_eq!(MarketStatus::parse("closed"), None);
    }
}
