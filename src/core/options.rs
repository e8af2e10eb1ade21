//! Survivorship option adjustments (Options A, B and C).

use std::collections::BTreeMap;
use std::sync::OnceLock;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::types::{OptionAdjustmentResult, PensionOption, round_cents};

/// Option C survivors receive exactly two thirds of the member allowance.
const SURVIVOR_NUMERATOR: Decimal = dec!(2);
const SURVIVOR_DENOMINATOR: Decimal = dec!(3);

/// Used when no usable beneficiary age is available.
pub const OPTION_C_GENERAL_FACTOR: Decimal = dec!(0.90);

/// Reference-calculator Option B factor (flat 1 % reduction).
pub const OPTION_B_REFERENCE_FACTOR: Decimal = dec!(0.99);

const MAX_BENEFICIARY_AGE: f64 = 120.0;

/// Option C factors keyed by (member age, beneficiary age).
const OPTION_C_PAIR_FACTORS: &[((u32, u32), Decimal)] = &[
    ((55, 51), dec!(0.9135)),
    ((55, 53), dec!(0.9235)),
    ((55, 55), dec!(0.9335)),
    ((55, 57), dec!(0.9435)),
    ((56, 52), dec!(0.9105)),
    ((56, 54), dec!(0.9205)),
    ((56, 56), dec!(0.9305)),
    ((56, 58), dec!(0.9405)),
    ((57, 53), dec!(0.9075)),
    ((57, 55), dec!(0.9175)),
    ((57, 57), dec!(0.9275)),
    ((57, 59), dec!(0.9375)),
    ((58, 54), dec!(0.9045)),
    ((58, 56), dec!(0.9145)),
    ((58, 58), dec!(0.9245)),
    ((58, 60), dec!(0.9345)),
    ((59, 55), dec!(0.9015)),
    ((59, 57), dec!(0.9115)),
    ((59, 59), dec!(0.9215)),
    ((59, 61), dec!(0.9315)),
    ((60, 56), dec!(0.8985)),
    ((60, 58), dec!(0.9085)),
    ((60, 60), dec!(0.9185)),
    ((60, 62), dec!(0.9285)),
    ((61, 57), dec!(0.8955)),
    ((61, 59), dec!(0.9055)),
    ((61, 61), dec!(0.9155)),
    ((61, 63), dec!(0.9255)),
    ((62, 58), dec!(0.8925)),
    ((62, 60), dec!(0.9025)),
    ((62, 62), dec!(0.9125)),
    ((62, 64), dec!(0.9225)),
    ((63, 59), dec!(0.8895)),
    ((63, 61), dec!(0.8995)),
    ((63, 63), dec!(0.9095)),
    ((63, 65), dec!(0.9195)),
    ((64, 60), dec!(0.8865)),
    ((64, 62), dec!(0.8965)),
    ((64, 64), dec!(0.9065)),
    ((64, 66), dec!(0.9165)),
    ((65, 61), dec!(0.8835)),
    ((65, 63), dec!(0.8935)),
    ((65, 65), dec!(0.9035)),
    ((65, 67), dec!(0.9135)),
];

/// Same-age Option C factors by member age, used when the exact pair is absent.
const OPTION_C_MEMBER_FACTORS: &[(u32, Decimal)] = &[
    (50, dec!(0.9485)),
    (52, dec!(0.9425)),
    (54, dec!(0.9365)),
    (56, dec!(0.9305)),
    (58, dec!(0.9245)),
    (60, dec!(0.9185)),
    (62, dec!(0.9125)),
    (64, dec!(0.9065)),
    (66, dec!(0.9005)),
    (68, dec!(0.8945)),
    (70, dec!(0.8885)),
];

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct AgePair {
    pub member_age: u32,
    pub beneficiary_age: u32,
}

impl AgePair {
    pub fn rounded(member_age: f64, beneficiary_age: f64) -> Self {
        Self {
            member_age: round_age(member_age),
            beneficiary_age: round_age(beneficiary_age),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OptionBSchedule {
    /// ≤50: 1 %, ≤60: 3 %, otherwise 5 %.
    AgeBanded,
    /// Flat factor used by the reference calculator.
    Flat(Decimal),
}

#[derive(Debug, Clone)]
pub struct OptionCTable {
    pairs: BTreeMap<AgePair, Decimal>,
    by_member_age: BTreeMap<u32, Decimal>,
    general_factor: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionCLookup {
    Exact(Decimal),
    NearestMemberAge { tabulated_age: u32, factor: Decimal },
    General(Decimal),
}

impl OptionCLookup {
    pub fn factor(self) -> Decimal {
        match self {
            OptionCLookup::Exact(factor)
            | OptionCLookup::NearestMemberAge { factor, .. }
            | OptionCLookup::General(factor) => factor,
        }
    }
}

impl OptionCTable {
    pub fn new(
        pairs: &[((u32, u32), Decimal)],
        by_member_age: &[(u32, Decimal)],
        general_factor: Decimal,
    ) -> Self {
        Self {
            pairs: pairs
                .iter()
                .map(|&((member_age, beneficiary_age), factor)| {
                    (
                        AgePair {
                            member_age,
                            beneficiary_age,
                        },
                        factor,
                    )
                })
                .collect(),
            by_member_age: by_member_age.iter().copied().collect(),
            general_factor,
        }
    }

    pub fn msrb() -> Self {
        Self::new(
            OPTION_C_PAIR_FACTORS,
            OPTION_C_MEMBER_FACTORS,
            OPTION_C_GENERAL_FACTOR,
        )
    }

    pub fn lookup(&self, member_age: f64, beneficiary_age: Option<f64>) -> OptionCLookup {
        let Some(beneficiary_age) = beneficiary_age.filter(|age| usable_age(*age)) else {
            return OptionCLookup::General(self.general_factor);
        };
        let key = AgePair::rounded(member_age, beneficiary_age);
        if let Some(factor) = self.pairs.get(&key) {
            return OptionCLookup::Exact(*factor);
        }
        match self.nearest_member_age(key.member_age) {
            Some((tabulated_age, factor)) => OptionCLookup::NearestMemberAge {
                tabulated_age,
                factor,
            },
            None => OptionCLookup::General(self.general_factor),
        }
    }

    /// Closest tabulated member age; equidistant ages resolve to the lower one.
    fn nearest_member_age(&self, member_age: u32) -> Option<(u32, Decimal)> {
        // BTreeMap iterates ascending, and min_by_key keeps the first minimum.
        self.by_member_age
            .iter()
            .min_by_key(|(age, _)| age.abs_diff(member_age))
            .map(|(age, factor)| (*age, *factor))
    }
}

impl Default for OptionCTable {
    fn default() -> Self {
        Self::msrb()
    }
}

fn msrb_option_c_table() -> &'static OptionCTable {
    static TABLE: OnceLock<OptionCTable> = OnceLock::new();
    TABLE.get_or_init(OptionCTable::msrb)
}

#[derive(Debug, Clone, Copy)]
pub struct OptionAdjuster<'a> {
    option_b: OptionBSchedule,
    option_c: &'a OptionCTable,
}

impl<'a> OptionAdjuster<'a> {
    pub fn new(option_b: OptionBSchedule, option_c: &'a OptionCTable) -> Self {
        Self { option_b, option_c }
    }

    pub fn adjust(
        &self,
        base_pension: Decimal,
        option: PensionOption,
        member_age: f64,
        beneficiary_age: Option<f64>,
    ) -> OptionAdjustmentResult {
        match option {
            PensionOption::A => OptionAdjustmentResult {
                member_pension: base_pension,
                survivor_pension: Decimal::ZERO,
                description: "Option A: full allowance, no survivor benefit".to_string(),
                warning: None,
            },
            PensionOption::B => {
                let factor = match self.option_b {
                    OptionBSchedule::AgeBanded => option_b_banded_factor(member_age),
                    OptionBSchedule::Flat(factor) => factor,
                };
                OptionAdjustmentResult {
                    member_pension: round_cents(base_pension * factor),
                    survivor_pension: Decimal::ZERO,
                    description: format!(
                        "Option B: annuity-protection allowance reduced {}%, no survivor benefit",
                        percent(Decimal::ONE - factor)
                    ),
                    warning: None,
                }
            }
            PensionOption::C => {
                let lookup = self.option_c.lookup(member_age, beneficiary_age);
                let member_pension = round_cents(base_pension * lookup.factor());
                let survivor_pension = member_pension * SURVIVOR_NUMERATOR / SURVIVOR_DENOMINATOR;
                let warning = match lookup {
                    OptionCLookup::Exact(_) => None,
                    OptionCLookup::NearestMemberAge { tabulated_age, .. } => Some(format!(
                        "No Option C factor for member age {} with beneficiary age {}; \
                         using the factor for member age {tabulated_age}",
                        round_age(member_age),
                        beneficiary_age.map(round_age).unwrap_or_default()
                    )),
                    OptionCLookup::General(_) => Some(
                        "Beneficiary age missing or invalid; Option C uses a general \
                         approximation factor"
                            .to_string(),
                    ),
                };
                OptionAdjustmentResult {
                    member_pension,
                    survivor_pension,
                    description: format!(
                        "Option C: joint and survivor allowance reduced {}%, survivor receives 66.67%",
                        percent(Decimal::ONE - lookup.factor())
                    ),
                    warning,
                }
            }
        }
    }
}

/// Strategy-level option adjustment with the age-banded Option B schedule.
pub fn adjust_for_option(
    base_pension: Decimal,
    option: PensionOption,
    member_age: f64,
    beneficiary_age: Option<f64>,
) -> OptionAdjustmentResult {
    OptionAdjuster::new(OptionBSchedule::AgeBanded, msrb_option_c_table()).adjust(
        base_pension,
        option,
        member_age,
        beneficiary_age,
    )
}

/// Option adjustment as the published reference calculator applies it.
pub fn adjust_for_option_reference(
    base_pension: Decimal,
    option: PensionOption,
    member_age: f64,
    beneficiary_age: Option<f64>,
) -> OptionAdjustmentResult {
    OptionAdjuster::new(
        OptionBSchedule::Flat(OPTION_B_REFERENCE_FACTOR),
        msrb_option_c_table(),
    )
    .adjust(base_pension, option, member_age, beneficiary_age)
}

pub fn option_b_banded_factor(member_age: f64) -> Decimal {
    if member_age <= 50.0 {
        dec!(0.99)
    } else if member_age <= 60.0 {
        dec!(0.97)
    } else {
        dec!(0.95)
    }
}

fn usable_age(age: f64) -> bool {
    age.is_finite() && age > 0.0 && age <= MAX_BENEFICIARY_AGE
}

fn round_age(age: f64) -> u32 {
    if age.is_finite() && age > 0.0 {
        age.round() as u32
    } else {
        0
    }
}

fn percent(fraction: Decimal) -> Decimal {
    (fraction * dec!(100)).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};
    use rust_decimal::prelude::ToPrimitive;

    #[test]
    fn option_a_passes_through() {
        let result = adjust_for_option(dec!(76000), PensionOption::A, 59.0, Some(57.0));
        assert_eq!(result.member_pension, dec!(76000));
        assert_eq!(result.survivor_pension, Decimal::ZERO);
        assert!(result.warning.is_none());
    }

    #[test]
    fn option_b_bands_by_member_age() {
        let at = |age: f64| {
            adjust_for_option(dec!(10000), PensionOption::B, age, None).member_pension
        };
        assert_eq!(at(50.0), dec!(9900));
        assert_eq!(at(55.0), dec!(9700));
        assert_eq!(at(60.0), dec!(9700));
        assert_eq!(at(61.0), dec!(9500));
        assert_eq!(
            adjust_for_option(dec!(10000), PensionOption::B, 61.0, None).survivor_pension,
            Decimal::ZERO
        );
    }

    #[test]
    fn reference_option_b_is_flat_one_percent() {
        let result = adjust_for_option_reference(dec!(76000), PensionOption::B, 59.0, None);
        assert_eq!(result.member_pension, dec!(75240));
        assert!(result.description.contains("1%"));
    }

    #[test]
    fn option_c_reference_pair() {
        let result = adjust_for_option(dec!(76000), PensionOption::C, 59.0, Some(57.0));
        assert_eq!(result.member_pension, dec!(69274.00));
        assert_eq!(round_cents(result.survivor_pension), dec!(46182.67));
        assert!(result.warning.is_none());
    }

    #[test]
    fn option_c_rounds_fractional_ages_into_the_key() {
        let result = adjust_for_option(dec!(76000), PensionOption::C, 58.6, Some(57.4));
        assert_eq!(result.member_pension, dec!(69274.00));
    }

    #[test]
    fn option_c_missing_pair_falls_back_to_nearest_member_age() {
        let result = adjust_for_option(dec!(10000), PensionOption::C, 69.0, Some(40.0));
        // 69 is equidistant from 68 and 70; the lower age wins.
        assert_eq!(result.member_pension, dec!(8945));
        let warning = result.warning.expect("fallback warns");
        assert!(warning.contains("member age 68"));
    }

    #[test]
    fn option_c_without_beneficiary_age_uses_general_factor() {
        for beneficiary in [None, Some(f64::NAN), Some(-3.0), Some(250.0)] {
            let result = adjust_for_option(dec!(10000), PensionOption::C, 60.0, beneficiary);
            assert_eq!(result.member_pension, dec!(9000));
            assert!(result.warning.is_some());
        }
    }

    #[test]
    fn nearest_member_age_tie_prefers_lower_age() {
        let table = OptionCTable::new(&[], &[(60, dec!(0.91)), (62, dec!(0.90))], dec!(0.85));
        assert_eq!(
            table.lookup(61.0, Some(61.0)),
            OptionCLookup::NearestMemberAge {
                tabulated_age: 60,
                factor: dec!(0.91)
            }
        );
    }

    #[test]
    fn pair_table_has_no_duplicate_keys() {
        let table = OptionCTable::msrb();
        assert_eq!(table.pairs.len(), OPTION_C_PAIR_FACTORS.len());
    }

    proptest! {
        #[test]
        fn prop_option_c_survivor_is_two_thirds(
            base in 1u32..250_000,
            member_age in 45u32..75,
            beneficiary_age in proptest::option::of(30u32..90),
        ) {
            let result = adjust_for_option(
                Decimal::from(base),
                PensionOption::C,
                member_age as f64,
                beneficiary_age.map(f64::from),
            );
            let ratio = (result.survivor_pension / result.member_pension).to_f64().unwrap_or(0.0);
            prop_assert!((ratio - 2.0 / 3.0).abs() <= 1e-9);
            prop_assert!(result.member_pension <= Decimal::from(base));
        }
    }
}
