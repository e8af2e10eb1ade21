use rust_decimal::Decimal;
use serde::Serialize;

use super::types::round_cents;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColaProjection {
    pub per_year_increase: Vec<Decimal>,
    pub total_increase: Decimal,
    pub final_amount: Decimal,
}

/// Running COLA state for a retiree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColaState {
    pub base_amount: Decimal,
    pub rate: Decimal,
    pub cumulative_increase: Decimal,
}

impl ColaState {
    pub fn new(rate: Decimal, base_amount: Decimal) -> Self {
        Self {
            base_amount,
            rate,
            cumulative_increase: Decimal::ZERO,
        }
    }

    /// Grants one year's increase on `current_amount` and returns it.
    pub fn step(&mut self, current_amount: Decimal) -> Decimal {
        let eligible = current_amount.min(self.base_amount).max(Decimal::ZERO);
        let increase = round_cents(self.rate.max(Decimal::ZERO) * eligible);
        self.cumulative_increase += increase;
        increase
    }
}

/// Compounds the capped-base COLA over `years_in_retirement` years.
///
/// Each year's increase is `rate × min(running amount, base)`, where the running
/// amount already includes prior increases. Year 0 carries no adjustment.
pub fn apply_cola(
    pension_before_cola: Decimal,
    years_in_retirement: u32,
    rate: Decimal,
    base_amount: Decimal,
) -> ColaProjection {
    let mut state = ColaState::new(rate, base_amount);
    let mut running = pension_before_cola;
    let mut per_year_increase = Vec::with_capacity(years_in_retirement as usize);
    for _ in 0..years_in_retirement {
        let increase = state.step(running);
        running += increase;
        per_year_increase.push(increase);
    }

    ColaProjection {
        per_year_increase,
        total_increase: state.cumulative_increase,
        final_amount: running,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};
    use rust_decimal_macros::dec;

    #[test]
    fn retirement_start_year_has_no_adjustment() {
        let projection = apply_cola(dec!(50000), 0, dec!(0.03), dec!(13000));
        assert!(projection.per_year_increase.is_empty());
        assert_eq!(projection.total_increase, Decimal::ZERO);
        assert_eq!(projection.final_amount, dec!(50000));
    }

    #[test]
    fn large_pension_gets_flat_ceiling_increase() {
        let projection = apply_cola(dec!(76000), 3, dec!(0.03), dec!(13000));
        assert_eq!(projection.per_year_increase, vec![dec!(390), dec!(390), dec!(390)]);
        assert_eq!(projection.total_increase, dec!(1170));
        assert_eq!(projection.final_amount, dec!(77170));
    }

    #[test]
    fn small_pension_compounds_on_running_amount() {
        let projection = apply_cola(dec!(10000), 3, dec!(0.03), dec!(13000));
        assert_eq!(
            projection.per_year_increase,
            vec![dec!(300), dec!(309), dec!(318.27)]
        );
        assert_eq!(projection.final_amount, dec!(10927.27));
    }

    #[test]
    fn compounding_stops_at_the_base_ceiling() {
        let projection = apply_cola(dec!(12800), 2, dec!(0.03), dec!(13000));
        assert_eq!(projection.per_year_increase, vec![dec!(384), dec!(390)]);
    }

    proptest! {
        #[test]
        fn prop_single_year_increase_never_exceeds_390(
            pension in 0u32..400_000,
            years in 0u32..40,
        ) {
            let projection = apply_cola(Decimal::from(pension), years, dec!(0.03), dec!(13000));
            prop_assert_eq!(projection.per_year_increase.len(), years as usize);
            for increase in &projection.per_year_increase {
                prop_assert!(*increase <= dec!(390));
                prop_assert!(*increase >= Decimal::ZERO);
            }
            prop_assert_eq!(
                projection.final_amount,
                Decimal::from(pension) + projection.total_increase
            );
        }
    }
}
