//! Position limits with geographic-correlation awareness.
//!
//! When a hurricane path spans twenty hexagons, a user buying YES on all of
//! them holds correlated risk. H3 indices encode spatial hierarchy in their
//! leading hex digits, so cells sharing a prefix tend to be geographically
//! close; the limiter caps both single-cell exposure and the aggregate over
//! a prefix group.
//!
//! For resolution-7 cells (9-char index) the prefix length controls the
//! correlation radius: 7 covers close neighbors, 6 a moderate area, 5 a
//! hurricane-scale region.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::error::EngineError;

/// Enforces per-cell and correlated-group exposure caps.
#[derive(Debug, Clone)]
pub struct PositionLimiter {
    /// Maximum absolute net position in any single cell.
    max_per_cell: Decimal,
    /// Maximum aggregate absolute exposure across cells sharing a prefix.
    max_correlated: Decimal,
    /// Leading hex characters that must match for cells to count as
    /// correlated. Always at least 1.
    prefix_len: usize,
}

impl PositionLimiter {
    pub fn new(max_per_cell: Decimal, max_correlated: Decimal, prefix_len: usize) -> Self {
        Self {
            max_per_cell,
            max_correlated,
            prefix_len: prefix_len.max(1),
        }
    }

    /// Validate whether a trade respects position limits.
    ///
    /// `exposure_delta` is the signed exposure change (+ for YES, − for NO);
    /// `existing_exposures` maps cell id → current net exposure for the user,
    /// missing cells counting as zero. Exposure exactly at a limit passes;
    /// strictly beyond it fails. The per-cell check is reported first.
    pub fn check_limit(
        &self,
        target_cell: &str,
        exposure_delta: Decimal,
        existing_exposures: &HashMap<String, Decimal>,
    ) -> Result<(), EngineError> {
        let current_in_cell = existing_exposures
            .get(target_cell)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let new_position = current_in_cell + exposure_delta;

        if new_position.abs() > self.max_per_cell {
            return Err(EngineError::PerCellLimitExceeded);
        }

        let target_prefix = cell_prefix(target_cell, self.prefix_len);
        let mut total_correlated = new_position.abs();

        for (cell_id, exposure) in existing_exposures {
            if cell_id == target_cell {
                // Already counted through new_position.
                continue;
            }
            if cell_prefix(cell_id, self.prefix_len) == target_prefix {
                total_correlated += exposure.abs();
            }
        }

        if total_correlated > self.max_correlated {
            return Err(EngineError::CorrelatedLimitExceeded);
        }

        Ok(())
    }
}

/// First `len` characters of a cell id; the whole id when shorter.
fn cell_prefix(cell_id: &str, len: usize) -> &str {
    cell_id.get(..len).unwrap_or(cell_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limiter() -> PositionLimiter {
        PositionLimiter::new(dec!(1000), dec!(5000), 5)
    }

    fn exposures(entries: &[(&str, Decimal)]) -> HashMap<String, Decimal> {
        entries
            .iter()
            .map(|(cell, exp)| (cell.to_string(), *exp))
            .collect()
    }

    #[test]
    fn per_cell_limit_rejects_overflow() {
        let existing = exposures(&[("872a1070b", dec!(950))]);
        assert!(matches!(
            limiter().check_limit("872a1070b", dec!(100), &existing),
            Err(EngineError::PerCellLimitExceeded)
        ));
    }

    #[test]
    fn per_cell_limit_allows_exactly_at_limit() {
        let existing = exposures(&[("872a1070b", dec!(950))]);
        assert!(limiter().check_limit("872a1070b", dec!(50), &existing).is_ok());
    }

    #[test]
    fn correlated_cells_share_the_group_budget() {
        // Same "872a1" prefix: the 950 in the sibling cell counts toward the
        // correlated total (1000), still within 5000.
        let existing = exposures(&[("872a1070b", dec!(950))]);
        assert!(limiter().check_limit("872a1070c", dec!(50), &existing).is_ok());
    }

    #[test]
    fn hurricane_path_exposure_is_capped() {
        // Fifteen cells at 200 each along one prefix = 3000 aggregate; any
        // further exposure in that region must be refused.
        let limiter = PositionLimiter::new(dec!(500), dec!(3000), 5);
        let mut existing = HashMap::new();
        for i in 0..15 {
            existing.insert(format!("872a1{i:04x}"), dec!(200));
        }
        assert!(matches!(
            limiter.check_limit("872a1ffff", dec!(100), &existing),
            Err(EngineError::CorrelatedLimitExceeded)
        ));
    }

    #[test]
    fn uncorrelated_prefix_is_independent() {
        let existing = exposures(&[("872a1070b", dec!(950)), ("873bb070b", dec!(950))]);
        // "99999" shares no prefix with either; only its own delta counts.
        assert!(limiter().check_limit("99999070b", dec!(1000), &existing).is_ok());
    }

    #[test]
    fn negative_exposure_counts_in_absolute_value() {
        let existing = exposures(&[("872a1070b", dec!(-950))]);
        assert!(matches!(
            limiter().check_limit("872a1070b", dec!(-100), &existing),
            Err(EngineError::PerCellLimitExceeded)
        ));
        // Buying back toward flat is always fine.
        assert!(limiter().check_limit("872a1070b", dec!(100), &existing).is_ok());
    }

    #[test]
    fn per_cell_violation_reported_before_correlated() {
        let limiter = PositionLimiter::new(dec!(100), dec!(100), 5);
        let existing = exposures(&[("872a1070b", dec!(100)), ("872a1070c", dec!(100))]);
        // Both limits are violated; the per-cell error wins.
        assert!(matches!(
            limiter.check_limit("872a1070b", dec!(50), &existing),
            Err(EngineError::PerCellLimitExceeded)
        ));
    }

    #[test]
    fn short_cell_ids_use_whole_id_as_prefix() {
        let limiter = PositionLimiter::new(dec!(1000), dec!(1500), 5);
        let existing = exposures(&[("87a", dec!(900))]);
        assert!(limiter.check_limit("87a", dec!(100), &existing).is_ok());
        assert!(matches!(
            limiter.check_limit("87a", dec!(200), &existing),
            Err(EngineError::PerCellLimitExceeded)
        ));
    }

    #[test]
    fn prefix_len_is_floored_at_one() {
        let limiter = PositionLimiter::new(dec!(1000), dec!(1000), 0);
        let existing = exposures(&[("8aaaa", dec!(600))]);
        // prefix_len clamps to 1, so "8bbbb" correlates with "8aaaa".
        assert!(matches!(
            limiter.check_limit("8bbbb", dec!(500), &existing),
            Err(EngineError::CorrelatedLimitExceeded)
        ));
    }
}
