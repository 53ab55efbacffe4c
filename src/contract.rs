//! Weather derivative contract tickers and forecast-derived liquidity.
//!
//! Ticker format: `ATMX-{h3CellID}-{type}-{threshold}-{YYYYMMDD}`,
//! e.g. `ATMX-872a1070b-PRECIP-25MM-20250815`.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

lazy_static! {
    static ref TICKER_RE: Regex =
        Regex::new(r"^ATMX-([0-9a-f]+)-([A-Z]+)-([0-9]+[A-Z]*)-(\d{8})$")
            .expect("ticker regex is valid");
}

/// Supported weather observable types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContractType {
    Precip,
    Temp,
    Wind,
    Snow,
}

impl ContractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Precip => "PRECIP",
            ContractType::Temp => "TEMP",
            ContractType::Wind => "WIND",
            ContractType::Snow => "SNOW",
        }
    }

    fn parse(s: &str) -> Option<ContractType> {
        match s {
            "PRECIP" => Some(ContractType::Precip),
            "TEMP" => Some(ContractType::Temp),
            "WIND" => Some(ContractType::Wind),
            "SNOW" => Some(ContractType::Snow),
            _ => None,
        }
    }
}

/// A parsed weather derivative contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub ticker: String,
    pub h3_cell_id: String,
    #[serde(rename = "type")]
    pub contract_type: ContractType,
    pub threshold: String,
    /// Contract expiry at UTC midnight.
    pub expiry_date: DateTime<Utc>,
}

/// Parse and validate a contract ticker string.
pub fn parse_ticker(ticker: &str) -> Result<Contract, EngineError> {
    let captures = TICKER_RE
        .captures(ticker)
        .ok_or_else(|| EngineError::InvalidTicker(ticker.to_string()))?;

    let h3_cell_id = captures[1].to_string();
    let type_str = &captures[2];
    let threshold = captures[3].to_string();
    let date_str = &captures[4];

    let contract_type = ContractType::parse(type_str)
        .ok_or_else(|| EngineError::UnsupportedType(type_str.to_string()))?;

    // %Y%m%d rejects impossible calendar dates (e.g. 20250230).
    let date = NaiveDate::parse_from_str(date_str, "%Y%m%d")
        .map_err(|_| EngineError::InvalidTicker(ticker.to_string()))?;
    let expiry_date = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));

    Ok(Contract {
        ticker: ticker.to_string(),
        h3_cell_id,
        contract_type,
        threshold,
        expiry_date,
    })
}

/// Probabilistic forecast percentiles published by ensemble products
/// (NDFD GRIB2, weather.gov gridpoints, HREF).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastPercentiles {
    pub percentile_10: Decimal,
    pub percentile_25: Decimal,
    /// Median.
    pub percentile_50: Decimal,
    pub percentile_75: Decimal,
    pub percentile_90: Decimal,
}

/// Derive the LMSR `b` parameter from forecast uncertainty.
///
/// Uses the interquartile range relative to the median, scaled by
/// `base_volume`. A dry-conditions forecast (median <= 0) falls back to the
/// absolute IQR; a degenerate IQR falls back to the minimum. Always >= 10,
/// rounded to two decimal places.
pub fn derive_liquidity(forecast: &ForecastPercentiles, base_volume: Decimal) -> Decimal {
    let min_b = dec!(10);
    let iqr = forecast.percentile_75 - forecast.percentile_25;
    let median = forecast.percentile_50;

    if iqr <= Decimal::ZERO {
        return min_b;
    }

    let b = if median <= Decimal::ZERO {
        base_volume * iqr
    } else {
        base_volume * iqr / median
    };

    b.max(min_b)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_ticker() {
        let c = parse_ticker("ATMX-872a1070b-PRECIP-25MM-20250815").unwrap();
        assert_eq!(c.h3_cell_id, "872a1070b");
        assert_eq!(c.contract_type, ContractType::Precip);
        assert_eq!(c.threshold, "25MM");
        assert_eq!(c.expiry_date.to_rfc3339(), "2025-08-15T00:00:00+00:00");
    }

    #[test]
    fn parses_all_contract_types() {
        for (ticker, expected) in [
            ("ATMX-872a1070b-PRECIP-25MM-20250815", ContractType::Precip),
            ("ATMX-872a1070b-TEMP-95F-20250815", ContractType::Temp),
            ("ATMX-872a1070b-WIND-50KT-20250815", ContractType::Wind),
            ("ATMX-872a1070b-SNOW-6IN-20250815", ContractType::Snow),
        ] {
            assert_eq!(parse_ticker(ticker).unwrap().contract_type, expected);
        }
    }

    #[test]
    fn rejects_wrong_prefix() {
        assert!(matches!(
            parse_ticker("BTC-872a1070b-PRECIP-25MM-20250815"),
            Err(EngineError::InvalidTicker(_))
        ));
    }

    #[test]
    fn rejects_non_hex_cell() {
        assert!(matches!(
            parse_ticker("ATMX-ZZZZ-PRECIP-25MM-20250815"),
            Err(EngineError::InvalidTicker(_))
        ));
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(matches!(
            parse_ticker("ATMX-872a1070b-HAIL-25MM-20250815"),
            Err(EngineError::UnsupportedType(_))
        ));
    }

    #[test]
    fn rejects_bad_dates() {
        // Not a date at all (fails the regex).
        assert!(matches!(
            parse_ticker("ATMX-872a1070b-PRECIP-25MM-notadate"),
            Err(EngineError::InvalidTicker(_))
        ));
        // Eight digits but not a calendar date.
        assert!(matches!(
            parse_ticker("ATMX-872a1070b-PRECIP-25MM-20250230"),
            Err(EngineError::InvalidTicker(_))
        ));
    }

    #[test]
    fn rejects_empty_and_partial_tickers() {
        for bad in ["", "ATMX", "ATMX-872a1070b-PRECIP-25MM", "ATMX-872a1070b"] {
            assert!(parse_ticker(bad).is_err(), "{bad:?} should not parse");
        }
    }

    fn percentiles(p25: Decimal, p50: Decimal, p75: Decimal) -> ForecastPercentiles {
        ForecastPercentiles {
            percentile_10: p25 - dec!(5),
            percentile_25: p25,
            percentile_50: p50,
            percentile_75: p75,
            percentile_90: p75 + dec!(5),
        }
    }

    #[test]
    fn wider_uncertainty_yields_more_liquidity() {
        let wide = derive_liquidity(&percentiles(dec!(10), dec!(25), dec!(40)), dec!(100));
        let narrow = derive_liquidity(&percentiles(dec!(20), dec!(25), dec!(30)), dec!(100));
        assert!(wide > narrow);
        assert!(wide >= dec!(10) && narrow >= dec!(10));
    }

    #[test]
    fn dry_conditions_use_absolute_iqr() {
        let b = derive_liquidity(&percentiles(dec!(0), dec!(0), dec!(2)), dec!(100));
        assert_eq!(b, dec!(200));
    }

    #[test]
    fn degenerate_iqr_floors_at_minimum() {
        assert_eq!(
            derive_liquidity(&percentiles(dec!(25), dec!(25), dec!(25)), dec!(100)),
            dec!(10)
        );
        assert_eq!(
            derive_liquidity(&percentiles(dec!(24), dec!(25), dec!(26)), dec!(1)),
            dec!(10)
        );
    }
}
