//! Rule evaluators: pure functions from an amount (or tier) to a
//! percentage or point value under one program snapshot.
//!
//! A missing or disabled configuration document evaluates to 0 (feature off);
//! nothing here returns an error.

use rewards_core::loyalty::MembershipTier;
use rewards_core::program::{ProgramSnapshot, RateTier};
use rewards_core::types::Amount;

/// First tier whose range contains `amount`, in configured order.
fn first_matching_percent(tiers: &[RateTier], amount: Amount) -> f64 {
    tiers
        .iter()
        .find(|t| t.matches(amount))
        .map(|t| t.percent)
        .unwrap_or(0.0)
}

/// `amount × percent / 100`, rounded to the nearest whole unit.
pub fn apply_percent(amount: Amount, percent: f64) -> Amount {
    (amount as f64 * percent / 100.0).round() as Amount
}

/// Hello Discount percentage for a single first-shipment amount.
pub fn hello_discount_percent(program: &ProgramSnapshot, amount: Amount) -> f64 {
    match &program.hello_discount {
        Some(config) if config.enabled => first_matching_percent(&config.tiers, amount),
        _ => 0.0,
    }
}

/// Active Cashback percentage for a first-window spending total.
pub fn active_cashback_percent(program: &ProgramSnapshot, window_total: Amount) -> f64 {
    match &program.cashback {
        Some(rules) if rules.enabled => first_matching_percent(&rules.tiers, window_total),
        _ => 0.0,
    }
}

/// Cashback owed on a first-window spending total.
pub fn cashback_amount(program: &ProgramSnapshot, window_total: Amount) -> Amount {
    apply_percent(window_total, active_cashback_percent(program, window_total))
}

/// Tier earned by a spending amount: platinum range first, then gold,
/// otherwise silver.
pub fn tier_from_spending(program: &ProgramSnapshot, amount: Amount) -> MembershipTier {
    let Some(tiers) = &program.tiers else {
        return MembershipTier::Silver;
    };
    if tiers.platinum.contains(amount) {
        MembershipTier::Platinum
    } else if tiers.gold.contains(amount) {
        MembershipTier::Gold
    } else {
        MembershipTier::Silver
    }
}

/// Fixed Welcome Bonus for a tier.
pub fn welcome_bonus_points(program: &ProgramSnapshot, tier: MembershipTier) -> i64 {
    match &program.points {
        Some(points) if points.enabled => points.welcome_bonus.get(tier),
        _ => 0,
    }
}

/// Points for one transaction at a tier. Floored twice: once converting the
/// amount to base points, once after applying the tier multiplier.
pub fn transaction_points(program: &ProgramSnapshot, amount: Amount, tier: MembershipTier) -> i64 {
    let Some(points) = &program.points else {
        return 0;
    };
    if !points.enabled || points.base_amount_per_point <= 0 {
        return 0;
    }
    let base_points = amount.div_euclid(points.base_amount_per_point);
    (base_points as f64 * points.multipliers.get(tier)).floor() as i64
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rewards_core::program::{
        CashbackRules, HelloDiscountConfig, MembershipTiersConfig, PointsConfig, SpendingRange,
        TierTable,
    };

    /// Program used across the crate's tests.
    pub(crate) fn test_program() -> ProgramSnapshot {
        ProgramSnapshot {
            hello_discount: Some(HelloDiscountConfig {
                enabled: true,
                tiers: vec![
                    RateTier { min: 0, max: Some(499_999), percent: 5.0 },
                    RateTier { min: 500_000, max: None, percent: 10.0 },
                ],
            }),
            cashback: Some(CashbackRules {
                enabled: true,
                tiers: vec![
                    RateTier { min: 20_000_000, max: None, percent: 3.0 },
                    RateTier { min: 5_000_000, max: Some(19_999_999), percent: 2.0 },
                    RateTier { min: 1_000_000, max: Some(4_999_999), percent: 1.0 },
                ],
            }),
            points: Some(PointsConfig {
                enabled: true,
                base_amount_per_point: 10_000,
                multipliers: TierTable { silver: 1.0, gold: 1.25, platinum: 1.5 },
                welcome_bonus: TierTable { silver: 100, gold: 250, platinum: 500 },
            }),
            tiers: Some(MembershipTiersConfig {
                silver: None,
                gold: SpendingRange { min: 5_000_000, max: Some(14_999_999) },
                platinum: SpendingRange { min: 15_000_000, max: None },
            }),
            loaded_at: None,
        }
    }

    #[test]
    fn test_hello_discount_first_match() {
        let program = test_program();
        assert_eq!(hello_discount_percent(&program, 100_000), 5.0);
        assert_eq!(hello_discount_percent(&program, 499_999), 5.0);
        assert_eq!(hello_discount_percent(&program, 500_000), 10.0);
        assert_eq!(hello_discount_percent(&program, -1), 0.0);
    }

    #[test]
    fn test_disabled_or_missing_config_is_zero() {
        let mut program = test_program();
        if let Some(config) = program.hello_discount.as_mut() {
            config.enabled = false;
        }
        assert_eq!(hello_discount_percent(&program, 100_000), 0.0);

        let empty = ProgramSnapshot::default();
        assert_eq!(active_cashback_percent(&empty, 50_000_000), 0.0);
        assert_eq!(welcome_bonus_points(&empty, MembershipTier::Platinum), 0);
        assert_eq!(transaction_points(&empty, 1_000_000, MembershipTier::Gold), 0);
        assert_eq!(tier_from_spending(&empty, 50_000_000), MembershipTier::Silver);
    }

    #[test]
    fn test_cashback_threshold_lower_bound_inclusive() {
        let program = test_program();
        assert_eq!(active_cashback_percent(&program, 20_000_000), 3.0);
        assert_eq!(active_cashback_percent(&program, 19_999_999), 2.0);
        assert_eq!(active_cashback_percent(&program, 999_999), 0.0);
    }

    #[test]
    fn test_cashback_amount_rounds_to_nearest() {
        let program = test_program();
        // 1% of 2_000_050 = 20_000.5 → 20_001
        assert_eq!(cashback_amount(&program, 2_000_050), 20_001);
        assert_eq!(cashback_amount(&program, 2_000_000), 20_000);
        assert_eq!(cashback_amount(&program, 500), 0);
    }

    #[test]
    fn test_tier_from_spending_lookup_order() {
        let program = test_program();
        assert_eq!(tier_from_spending(&program, 0), MembershipTier::Silver);
        assert_eq!(tier_from_spending(&program, 4_999_999), MembershipTier::Silver);
        assert_eq!(tier_from_spending(&program, 5_000_000), MembershipTier::Gold);
        assert_eq!(tier_from_spending(&program, 14_999_999), MembershipTier::Gold);
        assert_eq!(tier_from_spending(&program, 15_000_000), MembershipTier::Platinum);
    }

    #[test]
    fn test_platinum_checked_before_gold() {
        let mut program = test_program();
        // Overlapping ranges: platinum wins.
        if let Some(tiers) = program.tiers.as_mut() {
            tiers.gold = SpendingRange { min: 0, max: None };
        }
        assert_eq!(tier_from_spending(&program, 20_000_000), MembershipTier::Platinum);
        assert_eq!(tier_from_spending(&program, 10), MembershipTier::Gold);
    }

    #[test]
    fn test_welcome_bonus_by_tier() {
        let program = test_program();
        assert_eq!(welcome_bonus_points(&program, MembershipTier::Silver), 100);
        assert_eq!(welcome_bonus_points(&program, MembershipTier::Platinum), 500);
    }

    #[test]
    fn test_points_double_floor() {
        let program = test_program();
        // floor(105_000 / 10_000) = 10; 10 × 1.25 = 12.5 → 12
        assert_eq!(transaction_points(&program, 105_000, MembershipTier::Gold), 12);
        assert_eq!(transaction_points(&program, 105_000, MembershipTier::Silver), 10);
        assert_eq!(transaction_points(&program, 9_999, MembershipTier::Platinum), 0);
        // floor(33) × 1.5 = 49.5 → 49
        assert_eq!(transaction_points(&program, 339_999, MembershipTier::Platinum), 49);
    }

    #[test]
    fn test_points_non_positive_base_amount() {
        let mut program = test_program();
        if let Some(points) = program.points.as_mut() {
            points.base_amount_per_point = 0;
        }
        assert_eq!(transaction_points(&program, 1_000_000, MembershipTier::Gold), 0);
    }
}
