//! Social Security claiming-age adjustment relative to full retirement age.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use super::types::round_cents;

pub const FULL_RETIREMENT_AGE: u32 = 67;
pub const EARLIEST_CLAIMING_AGE: u32 = 62;
pub const LATEST_CREDIT_AGE: u32 = 70;

const EARLY_TIER_MONTHS: u32 = 36;
/// 5/9 of 1 % per month for the first 36 months early.
const EARLY_TIER_1_NUMERATOR: Decimal = dec!(5);
const EARLY_TIER_1_DENOMINATOR: Decimal = dec!(900);
/// 5/12 of 1 % per month beyond 36 months early.
const EARLY_TIER_2_NUMERATOR: Decimal = dec!(5);
const EARLY_TIER_2_DENOMINATOR: Decimal = dec!(1200);
/// 8 % per year of delay, credited monthly.
const DELAYED_CREDIT_NUMERATOR: Decimal = dec!(8);
const DELAYED_CREDIT_DENOMINATOR: Decimal = dec!(1200);
pub const MAX_EARLY_REDUCTION: Decimal = dec!(0.30);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialSecurityClaim {
    pub claiming_age_months: u32,
    pub full_retirement_age_months: u32,
    pub full_benefit: Decimal,
}

impl SocialSecurityClaim {
    pub fn at_ages(claiming_age: u32, full_retirement_age: u32, full_benefit: Decimal) -> Self {
        Self {
            claiming_age_months: claiming_age * 12,
            full_retirement_age_months: full_retirement_age * 12,
            full_benefit,
        }
    }

    pub fn adjustment_factor(&self) -> Decimal {
        claiming_adjustment_factor(self.claiming_age_months, self.full_retirement_age_months)
    }

    pub fn adjusted_benefit(&self) -> Decimal {
        round_cents(self.full_benefit * self.adjustment_factor())
    }
}

/// Multiplier on the full benefit for claiming at `claiming_age_months`.
///
/// Claims before 62 are treated as 62 and claims after 70 as 70.
pub fn claiming_adjustment_factor(
    claiming_age_months: u32,
    full_retirement_age_months: u32,
) -> Decimal {
    let claim = claiming_age_months.clamp(EARLIEST_CLAIMING_AGE * 12, LATEST_CREDIT_AGE * 12);
    let fra = full_retirement_age_months;

    if claim < fra {
        let months_early = fra - claim;
        let tier_1 = Decimal::from(months_early.min(EARLY_TIER_MONTHS));
        let tier_2 = Decimal::from(months_early.saturating_sub(EARLY_TIER_MONTHS));
        let reduction = tier_1 * EARLY_TIER_1_NUMERATOR / EARLY_TIER_1_DENOMINATOR
            + tier_2 * EARLY_TIER_2_NUMERATOR / EARLY_TIER_2_DENOMINATOR;
        Decimal::ONE - reduction.min(MAX_EARLY_REDUCTION)
    } else if claim > fra {
        let months_late = Decimal::from(claim - fra);
        Decimal::ONE + months_late * DELAYED_CREDIT_NUMERATOR / DELAYED_CREDIT_DENOMINATOR
    } else {
        Decimal::ONE
    }
}

/// Adjusted benefit (same period as `full_benefit`) for a whole-year claim.
pub fn adjust_social_security(
    claiming_age: u32,
    full_retirement_age: u32,
    full_benefit: Decimal,
) -> Decimal {
    SocialSecurityClaim::at_ages(claiming_age, full_retirement_age, full_benefit).adjusted_benefit()
}

/// SSA full retirement age in months for a birth year.
pub fn full_retirement_age_months(birth_year: u32) -> u32 {
    match birth_year {
        0..=1937 => 65 * 12,
        1938..=1942 => 65 * 12 + (birth_year - 1937) * 2,
        1943..=1954 => 66 * 12,
        1955..=1959 => 66 * 12 + (birth_year - 1954) * 2,
        _ => 67 * 12,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    #[test]
    fn claiming_at_full_retirement_age_is_unadjusted() {
        assert_eq!(claiming_adjustment_factor(67 * 12, 67 * 12), Decimal::ONE);
        assert_eq!(adjust_social_security(67, 67, dec!(2000)), dec!(2000));
    }

    #[test]
    fn claiming_at_62_with_fra_67_loses_thirty_percent() {
        assert_eq!(claiming_adjustment_factor(62 * 12, 67 * 12), dec!(0.70));
        assert_eq!(adjust_social_security(62, 67, dec!(2000)), dec!(1400));
    }

    #[test]
    fn early_claim_uses_two_tier_monthly_rate() {
        // 36 months early: 20 % reduction.
        assert_eq!(claiming_adjustment_factor(64 * 12, 67 * 12), dec!(0.80));
        // 48 months early: 20 % + 12 × 5/12 % = 25 %.
        assert_eq!(claiming_adjustment_factor(63 * 12, 67 * 12), dec!(0.75));
    }

    #[test]
    fn delayed_credit_caps_at_70() {
        assert_eq!(claiming_adjustment_factor(70 * 12, 67 * 12), dec!(1.24));
        assert_eq!(claiming_adjustment_factor(72 * 12, 67 * 12), dec!(1.24));
        assert_eq!(adjust_social_security(70, 67, dec!(2000)), dec!(2480));
    }

    #[test]
    fn claims_before_62_are_treated_as_62() {
        assert_eq!(
            claiming_adjustment_factor(60 * 12, 67 * 12),
            claiming_adjustment_factor(62 * 12, 67 * 12)
        );
    }

    #[test]
    fn full_retirement_age_schedule() {
        assert_eq!(full_retirement_age_months(1950), 66 * 12);
        assert_eq!(full_retirement_age_months(1957), 66 * 12 + 6);
        assert_eq!(full_retirement_age_months(1960), 67 * 12);
        assert_eq!(full_retirement_age_months(1975), 67 * 12);
    }

    #[test]
    fn reference_monotonic_ordering() {
        let benefit = dec!(1800);
        let early = adjust_social_security(62, 67, benefit);
        let full = adjust_social_security(67, 67, benefit);
        let late = adjust_social_security(70, 67, benefit);
        assert!(early < full && full < late);
    }

    proptest! {
        #[test]
        fn prop_adjustment_is_monotonic_in_claiming_month(
            claim in (62u32 * 12)..(70 * 12),
            fra_birth_year in 1943u32..1965,
        ) {
            let fra = full_retirement_age_months(fra_birth_year);
            let here = claiming_adjustment_factor(claim, fra);
            let next = claiming_adjustment_factor(claim + 1, fra);
            prop_assert!(here < next);
            prop_assert!(here >= Decimal::ONE - MAX_EARLY_REDUCTION);
            if claim < fra {
                prop_assert!(here < Decimal::ONE);
            } else if claim > fra {
                prop_assert!(here > Decimal::ONE);
            }
        }
    }
}
