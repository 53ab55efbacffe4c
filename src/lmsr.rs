//! Logarithmic Market Scoring Rule (LMSR) market maker for binary outcome
//! markets.
//!
//! The LMSR (Hanson, 2003) provides bounded maker loss (b * ln 2 for binary
//! markets), continuous pricing, and a path-independent cost function.
//!
//! This is the only module that touches floating point: quantities come in as
//! `Decimal`, are converted once for the transcendental math, and results are
//! rounded back to `PRICE_SCALE` decimal places before leaving. The
//! log-sum-exp trick keeps `exp(q/b)` from overflowing for realistic trade
//! sizes.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::error::EngineError;

/// Lowest allowed price (probability floor). Prevents degenerate markets
/// where shares become worthless.
pub const MIN_PRICE: Decimal = dec!(0.001);

/// Highest allowed price (probability ceiling).
pub const MAX_PRICE: Decimal = dec!(0.999);

/// Decimal places for price/cost rounding.
pub const PRICE_SCALE: u32 = 8;

/// Minimum liquidity parameter enforced by the forecast-derived constructor.
const MIN_B: Decimal = dec!(10);

/// Stateless LMSR cost function over a fixed liquidity parameter `b`.
/// Market quantities are passed as arguments, not stored.
#[derive(Debug, Clone)]
pub struct MarketMaker {
    b: Decimal,
}

impl MarketMaker {
    /// Create a market maker with liquidity parameter `b`. Higher `b` means
    /// more liquidity and lower price impact per trade.
    pub fn new(b: Decimal) -> Result<Self, EngineError> {
        if b <= Decimal::ZERO {
            return Err(EngineError::InvalidLiquidity);
        }
        Ok(Self { b })
    }

    /// Derive `b` from probabilistic forecast confidence intervals.
    ///
    /// The interquartile range (IQR = P75 - P25) measures forecast
    /// uncertainty: wider IQR means a more uncertain forecast, which gets a
    /// higher `b` to encourage price discovery. Formula:
    /// `b = base_volume * IQR / median`, floored at 10.
    pub fn from_forecast_confidence(
        percentile_25: Decimal,
        percentile_75: Decimal,
        median: Decimal,
        base_volume: Decimal,
    ) -> Result<Self, EngineError> {
        if median <= Decimal::ZERO {
            return Err(EngineError::InvalidForecast("median must be positive"));
        }
        let iqr = percentile_75 - percentile_25;
        if iqr <= Decimal::ZERO {
            return Err(EngineError::InvalidForecast(
                "75th percentile must exceed 25th percentile",
            ));
        }

        let b = (base_volume * iqr / median).max(MIN_B);
        Ok(Self { b })
    }

    /// The liquidity parameter.
    pub fn b(&self) -> Decimal {
        self.b
    }

    fn b_f64(&self) -> f64 {
        // b > 0 is guaranteed by the constructors.
        self.b.to_f64().unwrap_or(1.0)
    }

    /// LMSR cost function `C(q) = b * ln(exp(q_yes/b) + exp(q_no/b))`,
    /// computed via log-sum-exp for numerical stability.
    pub fn cost(&self, q_yes: Decimal, q_no: Decimal) -> Decimal {
        let b = self.b_f64();
        let lse = log_sum_exp(&[to_f64(q_yes) / b, to_f64(q_no) / b]);
        round_price(from_f64(b * lse))
    }

    /// Instantaneous YES price (probability):
    /// `p = exp(q_yes/b) / (exp(q_yes/b) + exp(q_no/b))`, the softmax with
    /// max-subtraction, clamped to `[MIN_PRICE, MAX_PRICE]`.
    pub fn price(&self, q_yes: Decimal, q_no: Decimal) -> Decimal {
        let price = round_price(from_f64(self.price_f64(q_yes, q_no)));
        price.clamp(MIN_PRICE, MAX_PRICE)
    }

    /// Instantaneous NO price: `1 - price(q_yes, q_no)`.
    pub fn price_no(&self, q_yes: Decimal, q_no: Decimal) -> Decimal {
        Decimal::ONE - self.price(q_yes, q_no)
    }

    fn price_f64(&self, q_yes: Decimal, q_no: Decimal) -> f64 {
        let b = self.b_f64();
        let y_over_b = to_f64(q_yes) / b;
        let n_over_b = to_f64(q_no) / b;
        let max_val = y_over_b.max(n_over_b);

        let exp_yes = (y_over_b - max_val).exp();
        let exp_no = (n_over_b - max_val).exp();
        exp_yes / (exp_yes + exp_no)
    }

    /// Cost to change the YES quantity by `delta_yes` shares:
    /// `C(q_yes + delta, q_no) - C(q_yes, q_no)`. Positive delta = buy
    /// (positive cost), negative delta = sell (negative cost = payout).
    pub fn trade_cost(&self, q_yes: Decimal, q_no: Decimal, delta_yes: Decimal) -> Decimal {
        self.cost(q_yes + delta_yes, q_no) - self.cost(q_yes, q_no)
    }

    /// Cost to change the NO quantity by `delta_no` shares, via the symmetry
    /// `C(a, b) = C(b, a)`.
    pub fn trade_cost_no(&self, q_yes: Decimal, q_no: Decimal, delta_no: Decimal) -> Decimal {
        self.trade_cost(q_no, q_yes, delta_no)
    }

    /// Average execution price per share: `trade_cost / delta`, or the
    /// current price for a zero delta. Positive for both buys and sells.
    pub fn fill_price(&self, q_first: Decimal, q_second: Decimal, delta: Decimal) -> Decimal {
        if delta.is_zero() {
            return self.price(q_first, q_second);
        }
        round_price(self.trade_cost(q_first, q_second, delta) / delta)
    }

    /// Reject a YES-side trade whose resulting price falls outside bounds.
    pub fn validate_trade(
        &self,
        q_yes: Decimal,
        q_no: Decimal,
        delta_yes: Decimal,
    ) -> Result<(), EngineError> {
        self.validate_price_after(q_yes + delta_yes, q_no)
    }

    /// Reject a NO-side trade whose resulting price falls outside bounds.
    pub fn validate_trade_no(
        &self,
        q_yes: Decimal,
        q_no: Decimal,
        delta_no: Decimal,
    ) -> Result<(), EngineError> {
        self.validate_price_after(q_yes, q_no + delta_no)
    }

    fn validate_price_after(&self, new_q_yes: Decimal, new_q_no: Decimal) -> Result<(), EngineError> {
        let price = self.price_f64(new_q_yes, new_q_no);
        let min = MIN_PRICE.to_f64().unwrap_or(0.001);
        let max = MAX_PRICE.to_f64().unwrap_or(0.999);
        if price < min || price > max {
            return Err(EngineError::PriceBoundExceeded);
        }
        Ok(())
    }

    /// Maximum possible market-maker loss: `b * ln 2` for binary markets.
    pub fn max_loss(&self) -> Decimal {
        round_price(from_f64(self.b_f64() * std::f64::consts::LN_2))
    }
}

/// `ln(sum(exp(x_i)))` with the max-subtraction trick. Without it, `exp(x)`
/// overflows f64 for x > ~709; after subtraction every exponent is <= 0.
fn log_sum_exp(xs: &[f64]) -> f64 {
    let Some(&first) = xs.first() else {
        return f64::NEG_INFINITY;
    };
    let max_val = xs.iter().skip(1).fold(first, |m, &x| m.max(x));
    if max_val == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = xs.iter().map(|&x| (x - max_val).exp()).sum();
    max_val + sum.ln()
}

fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

fn from_f64(x: f64) -> Decimal {
    Decimal::from_f64(x).unwrap_or(Decimal::ZERO)
}

fn round_price(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(f: f64) -> Decimal {
        Decimal::from_f64(f).unwrap()
    }

    fn mm(b: f64) -> MarketMaker {
        MarketMaker::new(d(b)).unwrap()
    }

    #[test]
    fn new_rejects_non_positive_b() {
        assert!(matches!(
            MarketMaker::new(Decimal::ZERO),
            Err(EngineError::InvalidLiquidity)
        ));
        assert!(matches!(
            MarketMaker::new(d(-50.0)),
            Err(EngineError::InvalidLiquidity)
        ));
        assert_eq!(mm(100.0).b(), d(100.0));
    }

    #[test]
    fn price_initially_fifty_fifty() {
        assert_eq!(mm(100.0).price(Decimal::ZERO, Decimal::ZERO), dec!(0.5));
        assert_eq!(mm(100.0).price_no(Decimal::ZERO, Decimal::ZERO), dec!(0.5));
    }

    #[test]
    fn buying_moves_price_the_right_way() {
        let m = mm(100.0);
        let before = m.price(Decimal::ZERO, Decimal::ZERO);
        assert!(m.price(d(10.0), Decimal::ZERO) > before);
        assert!(m.price(Decimal::ZERO, d(10.0)) < before);
    }

    #[test]
    fn prices_sum_to_one() {
        let m = mm(100.0);
        let tolerance = dec!(0.0000001);
        for (qy, qn) in [
            (0.0, 0.0),
            (10.0, 0.0),
            (0.0, 10.0),
            (30.0, 10.0),
            (100.0, 200.0),
            (500.0, 100.0),
            (-50.0, 30.0),
        ] {
            let sum = m.price(d(qy), d(qn)) + m.price_no(d(qy), d(qn));
            assert!(
                (sum - Decimal::ONE).abs() <= tolerance,
                "prices should sum to 1 at q=({qy},{qn}), got {sum}"
            );
        }
    }

    #[test]
    fn trade_cost_signs() {
        let m = mm(100.0);
        assert!(m.trade_cost(Decimal::ZERO, Decimal::ZERO, d(10.0)) > Decimal::ZERO);
        assert!(m.trade_cost(d(10.0), Decimal::ZERO, d(-10.0)) < Decimal::ZERO);
    }

    #[test]
    fn no_side_cost_matches_symmetry_at_origin() {
        let m = mm(100.0);
        let cost_yes = m.trade_cost(Decimal::ZERO, Decimal::ZERO, d(10.0));
        let cost_no = m.trade_cost_no(Decimal::ZERO, Decimal::ZERO, d(10.0));
        assert_eq!(cost_yes, cost_no);
    }

    #[test]
    fn cost_is_path_independent() {
        let m = mm(100.0);
        let sequential = m.trade_cost(Decimal::ZERO, Decimal::ZERO, d(10.0))
            + m.trade_cost(d(10.0), Decimal::ZERO, d(5.0));
        let direct = m.trade_cost(Decimal::ZERO, Decimal::ZERO, d(15.0));
        assert!((sequential - direct).abs() <= dec!(0.0000001));
    }

    #[test]
    fn cost_is_convex() {
        let m = mm(100.0);
        let first = m.trade_cost(Decimal::ZERO, Decimal::ZERO, d(10.0));
        let second = m.trade_cost(d(10.0), Decimal::ZERO, d(10.0));
        assert!(second > first, "second batch should cost more: {first} vs {second}");
    }

    #[test]
    fn maker_loss_is_bounded() {
        let m = mm(100.0);
        // A trader buys 10000 YES and the event happens: payout 10000, the
        // maker collected C(10000,0) - C(0,0).
        let trader_paid = m.cost(d(10000.0), Decimal::ZERO) - m.cost(Decimal::ZERO, Decimal::ZERO);
        let maker_loss = d(10000.0) - trader_paid;
        assert!(maker_loss <= m.max_loss());
    }

    #[test]
    fn extreme_quantities_stay_in_bounds() {
        let m = mm(100.0);
        for (qy, qn) in [
            (100_000.0, 0.0),
            (0.0, 100_000.0),
            (100_000.0, 100_000.0),
            (100_000.0, 50_000.0),
            (-100_000.0, 0.0),
            (0.0, -100_000.0),
            (-100_000.0, -100_000.0),
            (1e15, 0.0),
        ] {
            let price = m.price(d(qy), d(qn));
            assert!(price >= MIN_PRICE && price <= MAX_PRICE, "q=({qy},{qn}) -> {price}");
        }
    }

    #[test]
    fn price_clamps_to_bounds() {
        let m = mm(100.0);
        assert_eq!(m.price(d(100_000.0), Decimal::ZERO), MAX_PRICE);
        assert_eq!(m.price(Decimal::ZERO, d(100_000.0)), MIN_PRICE);
    }

    #[test]
    fn validate_trade_rejects_beyond_bounds() {
        let m = mm(100.0);
        assert!(matches!(
            m.validate_trade(Decimal::ZERO, Decimal::ZERO, d(100_000.0)),
            Err(EngineError::PriceBoundExceeded)
        ));
        assert!(matches!(
            m.validate_trade(Decimal::ZERO, Decimal::ZERO, d(-100_000.0)),
            Err(EngineError::PriceBoundExceeded)
        ));
        assert!(matches!(
            m.validate_trade_no(Decimal::ZERO, Decimal::ZERO, d(100_000.0)),
            Err(EngineError::PriceBoundExceeded)
        ));
        assert!(m.validate_trade(Decimal::ZERO, Decimal::ZERO, d(10.0)).is_ok());
    }

    #[test]
    fn fill_price_small_trade_near_half() {
        let m = mm(100.0);
        let fill = m.fill_price(Decimal::ZERO, Decimal::ZERO, d(0.001));
        assert!((fill - dec!(0.5)).abs() <= dec!(0.01));
    }

    #[test]
    fn fill_price_zero_delta_is_current_price() {
        let m = mm(100.0);
        assert_eq!(m.fill_price(Decimal::ZERO, Decimal::ZERO, Decimal::ZERO), dec!(0.5));
    }

    #[test]
    fn fill_price_positive_for_buy_and_sell() {
        let m = mm(100.0);
        assert!(m.fill_price(Decimal::ZERO, Decimal::ZERO, d(10.0)) > Decimal::ZERO);
        assert!(m.fill_price(d(10.0), Decimal::ZERO, d(-10.0)) > Decimal::ZERO);
    }

    #[test]
    fn moderate_buy_fill_price_in_expected_band() {
        // Seed scenario: b=100, buy 50 YES from the origin.
        let m = mm(100.0);
        let fill = m.fill_price(Decimal::ZERO, Decimal::ZERO, d(50.0));
        assert!(fill > dec!(0.5) && fill < dec!(0.65), "fill={fill}");
        assert!(m.price(d(50.0), Decimal::ZERO) > dec!(0.5));
    }

    #[test]
    fn forecast_confidence_wider_interval_higher_b() {
        let wide = MarketMaker::from_forecast_confidence(d(10.0), d(40.0), d(25.0), d(100.0)).unwrap();
        let narrow =
            MarketMaker::from_forecast_confidence(d(20.0), d(30.0), d(25.0), d(100.0)).unwrap();
        assert!(wide.b() > narrow.b());
        assert!(wide.b() >= dec!(10) && narrow.b() >= dec!(10));
    }

    #[test]
    fn forecast_confidence_rejects_bad_inputs() {
        assert!(MarketMaker::from_forecast_confidence(d(10.0), d(40.0), Decimal::ZERO, d(100.0))
            .is_err());
        assert!(
            MarketMaker::from_forecast_confidence(d(40.0), d(10.0), d(25.0), d(100.0)).is_err()
        );
    }

    #[test]
    fn forecast_confidence_enforces_minimum_b() {
        let m = MarketMaker::from_forecast_confidence(d(24.0), d(26.0), d(25.0), d(1.0)).unwrap();
        assert!(m.b() >= dec!(10));
    }

    #[test]
    fn log_sum_exp_does_not_overflow() {
        let result = log_sum_exp(&[1000.0, 1001.0]);
        assert!(result.is_finite());
        assert!(result > 1000.0 && result < 1002.0);
    }

    #[test]
    fn log_sum_exp_edge_cases() {
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
        assert!((log_sum_exp(&[5.0]) - 5.0).abs() < 1e-10);
        assert!((log_sum_exp(&[3.0, 3.0]) - (3.0 + 2f64.ln())).abs() < 1e-10);
    }
}
