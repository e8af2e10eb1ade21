use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// MSRB membership group.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Group {
    #[serde(rename = "GROUP_1", alias = "group1", alias = "1")]
    Group1,
    #[serde(rename = "GROUP_2", alias = "group2", alias = "2")]
    Group2,
    #[serde(rename = "GROUP_3", alias = "group3", alias = "3")]
    Group3,
    #[serde(rename = "GROUP_4", alias = "group4", alias = "4")]
    Group4,
}

impl Group {
    pub fn label(self) -> &'static str {
        match self {
            Group::Group1 => "Group 1",
            Group::Group2 => "Group 2",
            Group::Group3 => "Group 3",
            Group::Group4 => "Group 4",
        }
    }
}

/// Whether membership began before or on/after the April 2, 2012 cutoff.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum HireEra {
    #[serde(rename = "before_2012", alias = "before2012", alias = "pre-2012")]
    Before2012,
    #[serde(rename = "after_2012", alias = "after2012", alias = "post-2012")]
    After2012,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum PensionOption {
    #[serde(alias = "a")]
    A,
    #[serde(alias = "b")]
    B,
    #[serde(alias = "c")]
    C,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityResult {
    pub eligible: bool,
    pub reason: String,
}

/// One pension calculation request. Ages are whole years at retirement.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PensionCalculationInput {
    pub average_salary: Decimal,
    pub age: u32,
    pub years_of_service: Decimal,
    pub group: Group,
    pub hire_era: HireEra,
    pub option: PensionOption,
    pub beneficiary_age: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionAdjustmentResult {
    pub member_pension: Decimal,
    pub survivor_pension: Decimal,
    pub description: String,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PensionBenefit {
    pub eligibility: EligibilityResult,
    pub benefit_factor: Decimal,
    pub base_pension_before_cap: Decimal,
    pub base_pension_after_cap: Decimal,
    pub capped_at_80_percent: bool,
    pub option: OptionAdjustmentResult,
    pub annual_pension: Decimal,
    pub monthly_pension: Decimal,
    pub monthly_survivor_pension: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PensionOutcome {
    Ineligible(EligibilityResult),
    Eligible(Box<PensionBenefit>),
}

impl PensionOutcome {
    pub fn benefit(&self) -> Option<&PensionBenefit> {
        match self {
            PensionOutcome::Eligible(benefit) => Some(benefit),
            PensionOutcome::Ineligible(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColaAssumptions {
    pub enabled: bool,
    pub rate: Decimal,
    pub base_amount: Decimal,
}

impl Default for ColaAssumptions {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: dec!(0.03),
            base_amount: dec!(13000),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionParams {
    pub current_age: u32,
    pub planned_retirement_age: u32,
    pub current_years_of_service: Decimal,
    pub average_salary: Decimal,
    pub group: Group,
    pub hire_era: HireEra,
    pub option: PensionOption,
    pub beneficiary_age: Option<f64>,
    pub cola: ColaAssumptions,
    /// Monthly Social Security benefit at full retirement age (PIA).
    pub social_security_monthly_benefit: Decimal,
    pub social_security_claiming_age: u32,
    pub projection_end_age: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionYear {
    pub age: u32,
    pub years_of_service: Decimal,
    pub benefit_factor: Decimal,
    pub base_pension_before_cap: Decimal,
    pub base_pension_after_cap: Decimal,
    pub capped_at_80_percent: bool,
    pub pension_with_option: Decimal,
    pub cola_adjustment: Decimal,
    pub total_pension_annual: Decimal,
    pub social_security_annual: Decimal,
    pub combined_total_annual: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSummary {
    pub start_age: u32,
    pub end_age: u32,
    pub years: usize,
    pub first_year_pension: Decimal,
    pub final_year_pension: Decimal,
    pub first_year_combined: Decimal,
    pub final_year_combined: Decimal,
    pub peak_combined_annual: Decimal,
    pub total_pension: Decimal,
    pub total_social_security: Decimal,
    pub total_combined: Decimal,
    pub average_combined_annual: Decimal,
    pub capped_years: usize,
}

pub(crate) fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub(crate) fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
