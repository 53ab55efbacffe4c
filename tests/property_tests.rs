//! Property-based tests for the pricing and risk invariants.
//!
//! These verify the LMSR contract (complementary prices, clamping, path
//! independence, convexity, bounded maker loss, overflow safety) and the
//! limiter's threshold behavior under random inputs.

use std::collections::HashMap;

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use market_engine::correlation::PositionLimiter;
use market_engine::error::EngineError;
use market_engine::lmsr::{MarketMaker, MAX_PRICE, MIN_PRICE};

// Quantities with two fractional digits, up to ±5,000 shares.
fn quantity() -> impl Strategy<Value = Decimal> {
    (-500_000i64..=500_000i64).prop_map(|x| Decimal::new(x, 2))
}

// Strictly positive buy sizes, 0.01 to 1,000 shares.
fn buy_size() -> impl Strategy<Value = Decimal> {
    (1i64..=100_000i64).prop_map(|x| Decimal::new(x, 2))
}

fn liquidity() -> impl Strategy<Value = Decimal> {
    (10u32..=10_000u32).prop_map(Decimal::from)
}

proptest! {
    /// YES and NO prices are complementary after clamping.
    #[test]
    fn prices_are_complementary(
        q_yes in quantity(),
        q_no in quantity(),
        b in liquidity(),
    ) {
        let maker = MarketMaker::new(b).unwrap();
        let sum = maker.price(q_yes, q_no) + maker.price_no(q_yes, q_no);
        prop_assert!((sum - Decimal::ONE).abs() <= dec!(0.0000001));
    }

    /// Prices never leave the clamp band, whatever the quantities.
    #[test]
    fn prices_stay_clamped(
        q_yes in quantity(),
        q_no in quantity(),
        b in liquidity(),
    ) {
        let maker = MarketMaker::new(b).unwrap();
        let price = maker.price(q_yes, q_no);
        prop_assert!(price >= MIN_PRICE && price <= MAX_PRICE);
    }

    /// Splitting a buy into two legs costs the same as one bulk trade.
    #[test]
    fn cost_is_path_independent(
        d1 in buy_size(),
        d2 in buy_size(),
    ) {
        let maker = MarketMaker::new(dec!(100)).unwrap();
        let sequential = maker.trade_cost(Decimal::ZERO, Decimal::ZERO, d1)
            + maker.trade_cost(d1, Decimal::ZERO, d2);
        let direct = maker.trade_cost(Decimal::ZERO, Decimal::ZERO, d1 + d2);
        prop_assert!(
            (sequential - direct).abs() < dec!(0.0000001),
            "sequential={} direct={}", sequential, direct
        );
    }

    /// A second batch of the same size always costs strictly more.
    #[test]
    fn cost_is_convex(delta in 1i64..=1_000i64) {
        let maker = MarketMaker::new(dec!(100)).unwrap();
        let delta = Decimal::from(delta);
        let first = maker.trade_cost(Decimal::ZERO, Decimal::ZERO, delta);
        let second = maker.trade_cost(delta, Decimal::ZERO, delta);
        prop_assert!(second > first);
    }

    /// Maker loss after any single YES accumulation never exceeds b*ln(2).
    #[test]
    fn maker_loss_is_bounded(
        payout in 1i64..=100_000i64,
        b in liquidity(),
    ) {
        let maker = MarketMaker::new(b).unwrap();
        let q = Decimal::from(payout);
        let trader_paid = maker.cost(q, Decimal::ZERO) - maker.cost(Decimal::ZERO, Decimal::ZERO);
        let maker_loss = q - trader_paid;
        prop_assert!(maker_loss <= maker.max_loss() + dec!(0.000001));
    }

    /// Quantities far past the f64 exp() overflow threshold stay finite.
    #[test]
    fn pricing_survives_overflow_scale_quantities(scale in 1i64..=1_000_000i64) {
        let maker = MarketMaker::new(dec!(100)).unwrap();
        let huge = Decimal::from(scale) * dec!(1000000000);
        let price = maker.price(huge, Decimal::ZERO);
        prop_assert!(price >= MIN_PRICE && price <= MAX_PRICE);
        let price = maker.price(Decimal::ZERO, huge);
        prop_assert!(price >= MIN_PRICE && price <= MAX_PRICE);
    }

    /// The per-cell threshold is exact: above rejects, at-or-below passes
    /// (with the correlated cap out of the way).
    #[test]
    fn per_cell_limit_is_a_strict_threshold(
        existing in 0i64..=1_000i64,
        delta in 1i64..=1_000i64,
    ) {
        let max_per_cell = dec!(1000);
        let limiter = PositionLimiter::new(max_per_cell, dec!(1000000), 5);
        let mut exposures = HashMap::new();
        exposures.insert("872a1070b".to_string(), Decimal::from(existing));

        let result = limiter.check_limit("872a1070b", Decimal::from(delta), &exposures);
        let new_in_cell = Decimal::from(existing + delta);
        if new_in_cell > max_per_cell {
            prop_assert!(matches!(result, Err(EngineError::PerCellLimitExceeded)));
        } else {
            prop_assert!(result.is_ok());
        }
    }

    /// Exposure sign never matters: limits apply to absolute values.
    #[test]
    fn limiter_is_sign_symmetric(
        existing in -1_000i64..=1_000i64,
        delta in -1_000i64..=1_000i64,
    ) {
        let limiter = PositionLimiter::new(dec!(1000), dec!(1000000), 5);
        let mut pos = HashMap::new();
        pos.insert("872a1070b".to_string(), Decimal::from(existing));
        let mut neg = HashMap::new();
        neg.insert("872a1070b".to_string(), Decimal::from(-existing));

        let forward = limiter.check_limit("872a1070b", Decimal::from(delta), &pos);
        let mirrored = limiter.check_limit("872a1070b", Decimal::from(-delta), &neg);
        prop_assert_eq!(forward.is_ok(), mirrored.is_ok());
    }
}
