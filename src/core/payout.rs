//! Payout arithmetic in integer minor units
//!
//! Percentages arrive as `f64` percent values and are converted once to
//! micro-percent (1% = 1_000_000). All amount math then runs in `i128`, so
//! `pool * micros` cannot overflow for any `i64` pool.

use serde::{Deserialize, Serialize};

use crate::error::{PayoutError, PayoutResult};

/// Micro-percent in 1%
pub const MICROS_PER_PERCENT: u64 = 1_000_000;

/// Micro-percent in 100%
pub const FULL_PERCENT_MICROS: u64 = 100 * MICROS_PER_PERCENT;

/// Largest distance from a whole micro-percent still read as float noise
const MICROS_TOLERANCE: f64 = 1e-3;

/// Calculated and final amount of one winner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutAmounts {
    pub calculated: i64,
    pub final_amount: i64,
}

/// Convert a percent value in `[0, 100]` with at most six decimal places to
/// micro-percent. Finer values are rejected rather than rounded.
pub fn percentage_to_micros(percentage: f64) -> PayoutResult<u64> {
    if !percentage.is_finite() || !(0.0..=100.0).contains(&percentage) {
        return Err(PayoutError::InvalidPercentage(percentage));
    }
    let scaled = percentage * MICROS_PER_PERCENT as f64;
    let micros = scaled.round();
    if (scaled - micros).abs() > MICROS_TOLERANCE {
        return Err(PayoutError::InvalidPercentage(percentage));
    }
    Ok(micros as u64)
}

/// `round_half_up(value * micros / 100_000_000)` for non-negative `value`
pub fn apply_percentage(value: i64, micros: u64) -> i64 {
    let full = FULL_PERCENT_MICROS as i128;
    let scaled = value as i128 * micros as i128 + full / 2;
    // micros <= FULL_PERCENT_MICROS keeps the quotient within value
    (scaled / full) as i64
}

/// `round_half_up(tier_pool_size * payout_percentage / 100)`
pub fn payout_calculated(tier_pool_size: i64, payout_percentage: f64) -> PayoutResult<i64> {
    if tier_pool_size < 0 {
        return Err(PayoutError::InvalidAmount {
            field: "tier_pool_size".into(),
            value: tier_pool_size,
        });
    }
    let micros = percentage_to_micros(payout_percentage)?;
    Ok(apply_percentage(tier_pool_size, micros))
}

/// Reject negative overrides
pub fn validate_override(payout_override: Option<i64>) -> PayoutResult<()> {
    match payout_override {
        Some(amount) if amount < 0 => Err(PayoutError::InvalidAmount {
            field: "payout_override".into(),
            value: amount,
        }),
        _ => Ok(()),
    }
}

/// The override wins over the formula whenever it is set
pub fn resolve_payout(
    tier_pool_size: i64,
    payout_percentage: f64,
    payout_override: Option<i64>,
) -> PayoutResult<PayoutAmounts> {
    validate_override(payout_override)?;
    let calculated = payout_calculated(tier_pool_size, payout_percentage)?;
    Ok(PayoutAmounts {
        calculated,
        final_amount: payout_override.unwrap_or(calculated),
    })
}

/// Sum of amounts in `i128`. A total outside `i64` is `InvalidAmount`.
pub fn checked_total<I>(field: &str, amounts: I) -> PayoutResult<i64>
where
    I: IntoIterator<Item = i64>,
{
    let total: i128 = amounts.into_iter().map(i128::from).sum();
    i64::try_from(total).map_err(|_| PayoutError::InvalidAmount {
        field: field.to_string(),
        value: if total > 0 { i64::MAX } else { i64::MIN },
    })
}

/// Reward pool of a cycle: the configured share of collected fees, raised to
/// the minimum guarantee when one is set
pub fn reward_pool(
    membership_fee: i64,
    paying_members: u64,
    reward_pool_percentage: f64,
    minimum_pool_guarantee: Option<i64>,
) -> PayoutResult<i64> {
    if membership_fee < 0 {
        return Err(PayoutError::InvalidAmount {
            field: "membership_fee".into(),
            value: membership_fee,
        });
    }
    let micros = percentage_to_micros(reward_pool_percentage)?;
    let collected = (membership_fee as i128 * paying_members as i128)
        .min(i64::MAX as i128) as i64;
    let pool = apply_percentage(collected, micros);
    Ok(pool.max(minimum_pool_guarantee.unwrap_or(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    #[test]
    fn test_half_of_pool() {
        assert_eq!(payout_calculated(825_000, 50.0).unwrap(), 412_500);
    }

    #[test]
    fn test_override_replaces_calculated() {
        let amounts = resolve_payout(825_000, 50.0, Some(500_000)).unwrap();
        assert_eq!(amounts.calculated, 412_500);
        assert_eq!(amounts.final_amount, 500_000);
    }

    #[test]
    fn test_rounds_half_up() {
        // 1001 * 0.5% = 5.005 -> 5, 1100 * 0.5% = 5.5 -> 6
        assert_eq!(payout_calculated(1_001, 0.5).unwrap(), 5);
        assert_eq!(payout_calculated(1_100, 0.5).unwrap(), 6);
        assert_eq!(payout_calculated(3, 50.0).unwrap(), 2);
    }

    #[test]
    fn test_keeps_sub_basis_point_precision() {
        // 1_000_000 * 12.345% = 123_450 exactly
        assert_eq!(payout_calculated(1_000_000, 12.345).unwrap(), 123_450);
        assert_eq!(payout_calculated(100_000_000, 0.000001).unwrap(), 1);
        assert_eq!(percentage_to_micros(12.345).unwrap(), 12_345_000);
        assert_eq!(reward_pool(1_000, 1_000, 12.345, None).unwrap(), 123_450);
    }

    #[test]
    fn test_rejects_percentages_finer_than_micros() {
        for pct in [33.333_333_3, 0.000_000_4, 12.345_678_9] {
            let err = payout_calculated(1_000, pct).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPercentage);
        }
    }

    #[test]
    fn test_rejects_out_of_range_percentages() {
        for pct in [-0.01, 100.01, f64::NAN, f64::INFINITY] {
            let err = payout_calculated(1_000, pct).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPercentage);
        }
        assert_eq!(payout_calculated(1_000, 100.0).unwrap(), 1_000);
        assert_eq!(payout_calculated(1_000, 0.0).unwrap(), 0);
    }

    #[test]
    fn test_rejects_negative_amounts() {
        assert_eq!(
            payout_calculated(-1, 10.0).unwrap_err().kind(),
            ErrorKind::InvalidAmount
        );
        assert_eq!(
            resolve_payout(100, 10.0, Some(-5)).unwrap_err().kind(),
            ErrorKind::InvalidAmount
        );
    }

    #[test]
    fn test_checked_total_rejects_overflow() {
        assert_eq!(checked_total("total", [1, 2, 3]).unwrap(), 6);
        assert_eq!(checked_total("total", [i64::MAX, 1, -1]).unwrap(), i64::MAX);

        let err = checked_total("total_amount", [i64::MAX, 1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAmount);
        assert!(err.to_string().contains("total_amount"));
    }

    #[test]
    fn test_reward_pool_respects_guarantee() {
        // 100 members * 25.00 at 40% = 1000.00
        assert_eq!(reward_pool(2_500, 100, 40.0, None).unwrap(), 100_000);
        assert_eq!(
            reward_pool(2_500, 100, 40.0, Some(150_000)).unwrap(),
            150_000
        );
    }

    proptest! {
        #[test]
        fn prop_final_is_override_or_calculated(
            pool in 0i64..=1_000_000_000_000,
            micros in 0u64..=FULL_PERCENT_MICROS,
            override_amount in proptest::option::of(0i64..=1_000_000_000),
        ) {
            let pct = micros as f64 / MICROS_PER_PERCENT as f64;
            let first = resolve_payout(pool, pct, override_amount).unwrap();
            let second = resolve_payout(pool, pct, override_amount).unwrap();
            prop_assert_eq!(first, second);
            prop_assert_eq!(first.final_amount, override_amount.unwrap_or(first.calculated));
            prop_assert!(first.calculated >= 0);
            prop_assert!(first.calculated <= pool);
        }

        #[test]
        fn prop_calculated_is_monotonic_in_pool(
            pool in 0i64..=1_000_000_000,
            extra in 0i64..=1_000_000,
            micros in 0u64..=FULL_PERCENT_MICROS,
        ) {
            let pct = micros as f64 / MICROS_PER_PERCENT as f64;
            let low = payout_calculated(pool, pct).unwrap();
            let high = payout_calculated(pool + extra, pct).unwrap();
            prop_assert!(low <= high);
        }
    }
}
