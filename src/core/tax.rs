//! Federal and state income tax estimate on retirement income (2024 tables).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::types::round_cents;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingStatus {
    #[serde(alias = "single")]
    Single,
    #[serde(alias = "marriedFilingJointly", alias = "married")]
    MarriedFilingJointly,
    #[serde(alias = "headOfHousehold")]
    HeadOfHousehold,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum StateOfResidence {
    #[serde(rename = "MA", alias = "massachusetts")]
    Massachusetts,
    #[serde(rename = "NH", alias = "new_hampshire")]
    NewHampshire,
    #[serde(rename = "FL", alias = "florida")]
    Florida,
}

#[derive(Debug, Clone, Copy)]
struct Bracket {
    upper: Option<Decimal>,
    rate: Decimal,
}

const fn bracket(upper: Decimal, rate: Decimal) -> Bracket {
    Bracket {
        upper: Some(upper),
        rate,
    }
}

const fn top_bracket(rate: Decimal) -> Bracket {
    Bracket { upper: None, rate }
}

const SINGLE_BRACKETS: &[Bracket] = &[
    bracket(dec!(11600), dec!(0.10)),
    bracket(dec!(47150), dec!(0.12)),
    bracket(dec!(100525), dec!(0.22)),
    bracket(dec!(191950), dec!(0.24)),
    bracket(dec!(243725), dec!(0.32)),
    bracket(dec!(609350), dec!(0.35)),
    top_bracket(dec!(0.37)),
];

const JOINT_BRACKETS: &[Bracket] = &[
    bracket(dec!(23200), dec!(0.10)),
    bracket(dec!(94300), dec!(0.12)),
    bracket(dec!(201050), dec!(0.22)),
    bracket(dec!(383900), dec!(0.24)),
    bracket(dec!(487450), dec!(0.32)),
    bracket(dec!(731200), dec!(0.35)),
    top_bracket(dec!(0.37)),
];

const HEAD_OF_HOUSEHOLD_BRACKETS: &[Bracket] = &[
    bracket(dec!(16550), dec!(0.10)),
    bracket(dec!(63100), dec!(0.12)),
    bracket(dec!(100500), dec!(0.22)),
    bracket(dec!(191950), dec!(0.24)),
    bracket(dec!(243700), dec!(0.32)),
    bracket(dec!(609350), dec!(0.35)),
    top_bracket(dec!(0.37)),
];

const SENIOR_AGE: u32 = 65;
const IRMAA_LOOKBACK_AGE: u32 = 63;

struct FilingRules {
    brackets: &'static [Bracket],
    standard_deduction: Decimal,
    senior_additional_deduction: Decimal,
    ss_first_threshold: Decimal,
    ss_second_threshold: Decimal,
    irmaa_threshold: Decimal,
}

fn filing_rules(status: FilingStatus) -> FilingRules {
    match status {
        FilingStatus::Single => FilingRules {
            brackets: SINGLE_BRACKETS,
            standard_deduction: dec!(14600),
            senior_additional_deduction: dec!(1950),
            ss_first_threshold: dec!(25000),
            ss_second_threshold: dec!(34000),
            irmaa_threshold: dec!(103000),
        },
        FilingStatus::MarriedFilingJointly => FilingRules {
            brackets: JOINT_BRACKETS,
            standard_deduction: dec!(29200),
            senior_additional_deduction: dec!(1550),
            ss_first_threshold: dec!(32000),
            ss_second_threshold: dec!(44000),
            irmaa_threshold: dec!(206000),
        },
        FilingStatus::HeadOfHousehold => FilingRules {
            brackets: HEAD_OF_HOUSEHOLD_BRACKETS,
            standard_deduction: dec!(21900),
            senior_additional_deduction: dec!(1950),
            ss_first_threshold: dec!(25000),
            ss_second_threshold: dec!(34000),
            irmaa_threshold: dec!(103000),
        },
    }
}

struct StateRules {
    rate: Decimal,
    exemption: Decimal,
    senior_exemption: Decimal,
}

fn state_rules(state: StateOfResidence, status: FilingStatus) -> StateRules {
    match state {
        StateOfResidence::Massachusetts => StateRules {
            rate: dec!(0.05),
            exemption: match status {
                FilingStatus::Single => dec!(4400),
                FilingStatus::MarriedFilingJointly => dec!(8800),
                FilingStatus::HeadOfHousehold => dec!(6800),
            },
            senior_exemption: dec!(700),
        },
        StateOfResidence::NewHampshire | StateOfResidence::Florida => StateRules {
            rate: Decimal::ZERO,
            exemption: Decimal::ZERO,
            senior_exemption: Decimal::ZERO,
        },
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxInput {
    pub pension_income: Decimal,
    pub social_security_income: Decimal,
    pub other_income: Decimal,
    pub filing_status: FilingStatus,
    pub age: u32,
    pub state: StateOfResidence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxResult {
    pub gross_income: Decimal,
    pub provisional_income: Decimal,
    pub social_security_taxable_fraction: Decimal,
    pub social_security_taxable_portion: Decimal,
    pub federal_deduction: Decimal,
    pub federal_taxable_income: Decimal,
    pub federal_tax: Decimal,
    pub state_taxable_income: Decimal,
    pub state_tax: Decimal,
    pub total_tax: Decimal,
    pub net_income: Decimal,
    pub effective_rate: Decimal,
    pub marginal_rate: Decimal,
    pub suggestions: Vec<String>,
}

/// Fraction of Social Security subject to federal tax: 0, 50 or 85 %.
pub fn social_security_taxable_fraction(
    provisional_income: Decimal,
    filing_status: FilingStatus,
) -> Decimal {
    let rules = filing_rules(filing_status);
    if provisional_income <= rules.ss_first_threshold {
        Decimal::ZERO
    } else if provisional_income <= rules.ss_second_threshold {
        dec!(0.50)
    } else {
        dec!(0.85)
    }
}

/// Progressive tax on `taxable_income`, with the rate applied to the last dollar.
fn bracket_tax(taxable_income: Decimal, brackets: &[Bracket]) -> (Decimal, Decimal) {
    if taxable_income <= Decimal::ZERO {
        return (Decimal::ZERO, Decimal::ZERO);
    }

    let mut tax = Decimal::ZERO;
    let mut marginal = Decimal::ZERO;
    let mut lower = Decimal::ZERO;
    for b in brackets {
        let portion = match b.upper {
            Some(upper) => taxable_income.min(upper) - lower,
            None => taxable_income - lower,
        };
        if portion <= Decimal::ZERO {
            break;
        }
        tax += portion * b.rate;
        marginal = b.rate;
        match b.upper {
            Some(upper) if taxable_income > upper => lower = upper,
            _ => break,
        }
    }
    (tax, marginal)
}

fn twelve_percent_ceiling(brackets: &[Bracket]) -> Option<Decimal> {
    brackets
        .iter()
        .find(|b| b.rate == dec!(0.12))
        .and_then(|b| b.upper)
}

pub fn estimate_taxes(input: &TaxInput) -> TaxResult {
    let pension = input.pension_income.max(Decimal::ZERO);
    let social_security = input.social_security_income.max(Decimal::ZERO);
    let other = input.other_income;
    let rules = filing_rules(input.filing_status);
    let senior = input.age >= SENIOR_AGE;

    let gross_income = pension + social_security + other;
    let provisional_income = pension + other + social_security * dec!(0.5);
    let ss_fraction = social_security_taxable_fraction(provisional_income, input.filing_status);
    let ss_taxable = round_cents(social_security * ss_fraction);

    let federal_deduction = rules.standard_deduction
        + if senior {
            rules.senior_additional_deduction
        } else {
            Decimal::ZERO
        };
    let federal_taxable_income =
        (pension + other + ss_taxable - federal_deduction).max(Decimal::ZERO);
    let (federal_tax, federal_marginal) = bracket_tax(federal_taxable_income, rules.brackets);
    let federal_tax = round_cents(federal_tax);

    let state = state_rules(input.state, input.filing_status);
    let state_exemption = state.exemption
        + if senior {
            state.senior_exemption
        } else {
            Decimal::ZERO
        };
    let state_taxable_income = (pension + other - state_exemption).max(Decimal::ZERO);
    let state_tax = round_cents(state_taxable_income * state.rate);
    let state_marginal = if state_taxable_income > Decimal::ZERO {
        state.rate
    } else {
        Decimal::ZERO
    };

    let total_tax = federal_tax + state_tax;
    let effective_rate = if gross_income > Decimal::ZERO {
        (total_tax / gross_income).round_dp(4)
    } else {
        Decimal::ZERO
    };

    let mut suggestions = Vec::new();
    if let Some(ceiling) = twelve_percent_ceiling(rules.brackets) {
        if federal_taxable_income < ceiling {
            suggestions.push(format!(
                "Taxable income is ${} below the top of the 12% bracket; \
                 consider Roth conversions to fill it",
                round_cents(ceiling - federal_taxable_income).normalize()
            ));
        }
    }
    if social_security > Decimal::ZERO && ss_fraction < dec!(0.85) {
        let next_tier = if ss_fraction.is_zero() {
            rules.ss_first_threshold
        } else {
            rules.ss_second_threshold
        };
        suggestions.push(format!(
            "Provisional income is ${} below the next Social Security taxation tier",
            round_cents(next_tier - provisional_income).normalize()
        ));
    }
    let magi = pension + other + ss_taxable;
    if input.age >= IRMAA_LOOKBACK_AGE && magi > rules.irmaa_threshold {
        suggestions.push(format!(
            "Income of ${} exceeds the IRMAA threshold of ${}; \
             Medicare premiums may carry a surcharge",
            round_cents(magi).normalize(),
            rules.irmaa_threshold.normalize()
        ));
    }

    TaxResult {
        gross_income,
        provisional_income,
        social_security_taxable_fraction: ss_fraction,
        social_security_taxable_portion: ss_taxable,
        federal_deduction,
        federal_taxable_income,
        federal_tax,
        state_taxable_income,
        state_tax,
        total_tax,
        net_income: gross_income - total_tax,
        effective_rate,
        marginal_rate: federal_marginal + state_marginal,
        suggestions,
    }
}
