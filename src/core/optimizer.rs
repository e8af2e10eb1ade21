use std::ops::RangeInclusive;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cola::ColaState;
use super::eligibility::check_eligibility;
use super::engine::CappedBase;
use super::error::{CalcError, Result};
use super::factors::{group_minimum_age, msrb_table};
use super::monte_carlo::{
    DEFAULT_PATHS, EconomicAssumptions, MonteCarloConfig, MonteCarloResult, run_monte_carlo,
};
use super::options::adjust_for_option;
use super::social_security::{
    EARLIEST_CLAIMING_AGE, FULL_RETIREMENT_AGE, LATEST_CREDIT_AGE, adjust_social_security,
};
use super::solver::{BenefitStream, BreakEvenConfig, BreakEvenResult, solve_break_even};
use super::types::{ColaAssumptions, Group, HireEra, PensionOption, round_cents, to_f64};
use super::validation::validate_optimization_input;

const MONTHS_PER_YEAR: Decimal = dec!(12);
const LIFETIME_WEIGHT: f64 = 0.5;
const INCOME_WEIGHT: f64 = 0.3;
const EARLINESS_WEIGHT: f64 = 0.1;
const INCOME_GOAL_BONUS: f64 = 0.1;
const MAX_ALTERNATIVES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonteCarloSettings {
    pub paths: u32,
    pub seed: u64,
    pub annual_healthcare_cost: f64,
    pub savings_balance: f64,
    pub economics: EconomicAssumptions,
}

impl Default for MonteCarloSettings {
    fn default() -> Self {
        Self {
            paths: DEFAULT_PATHS,
            seed: 42,
            annual_healthcare_cost: 0.0,
            savings_balance: 0.0,
            economics: EconomicAssumptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationInput {
    pub current_age: u32,
    pub current_years_of_service: Decimal,
    pub average_salary: Decimal,
    pub group: Group,
    pub hire_era: HireEra,
    pub option: PensionOption,
    pub beneficiary_age: Option<f64>,
    /// Monthly Social Security benefit at full retirement age.
    pub social_security_monthly_benefit: Decimal,
    pub life_expectancy: u32,
    pub monthly_income_goal: Decimal,
    pub max_pension_claiming_age: u32,
    pub cola: ColaAssumptions,
    pub include_break_even: bool,
    pub monte_carlo: Option<MonteCarloSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationScenario {
    pub pension_claiming_age: u32,
    pub ss_claiming_age: u32,
    pub monthly_pension: Decimal,
    pub monthly_social_security: Decimal,
    pub monthly_income: Decimal,
    pub lifetime_benefits: Decimal,
    pub meets_income_goal: bool,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeStrategy {
    pub scenario: OptimizationScenario,
    pub monthly_income_delta: Decimal,
    pub lifetime_benefits_delta: Decimal,
    /// Positive when the alternative starts the pension earlier than the recommendation.
    pub earlier_access_years: i64,
    pub tradeoff: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub recommended: OptimizationScenario,
    pub alternatives: Vec<AlternativeStrategy>,
    pub ranked_scenarios: Vec<OptimizationScenario>,
    pub scenarios_evaluated: usize,
    pub break_even: Option<BreakEvenResult>,
    pub monte_carlo: Option<MonteCarloResult>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    pension_claiming_age: u32,
    ss_claiming_age: u32,
    annual_pension: Decimal,
    monthly_social_security: Decimal,
    lifetime_benefits: Decimal,
}

impl Candidate {
    fn monthly_pension(&self) -> Decimal {
        round_cents(self.annual_pension / MONTHS_PER_YEAR)
    }

    fn monthly_income(&self) -> Decimal {
        self.monthly_pension() + self.monthly_social_security
    }
}

/// Ranks pension and Social Security claiming-age pairs. Monte Carlo, when
/// requested, is seeded from the settings' seed.
pub fn optimize_claiming_strategy(input: &OptimizationInput) -> Result<OptimizationResult> {
    let seed = input.monte_carlo.as_ref().map(|mc| mc.seed).unwrap_or_default();
    optimize_claiming_strategy_with_rng(input, &mut ChaCha8Rng::seed_from_u64(seed))
}

pub fn optimize_claiming_strategy_with_rng<R: RngCore>(
    input: &OptimizationInput,
    rng: &mut R,
) -> Result<OptimizationResult> {
    validate_optimization_input(input).into_result()?;

    let mut warnings = Vec::new();
    let candidates = enumerate_candidates(input, &mut warnings);
    if candidates.is_empty() {
        return Err(CalcError::NoScenarios(format!(
            "no eligible pension claiming age between {} and {}",
            input.current_age.max(group_minimum_age(input.group, input.hire_era)),
            input
                .max_pension_claiming_age
                .min(input.life_expectancy.saturating_sub(1))
        )));
    }

    let mut ranked = score_candidates(input, &candidates);
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.pension_claiming_age.cmp(&b.pension_claiming_age))
            .then(a.ss_claiming_age.cmp(&b.ss_claiming_age))
    });

    let recommended = ranked[0].clone();
    let alternatives = ranked
        .iter()
        .skip(1)
        .take(MAX_ALTERNATIVES)
        .map(|alt| describe_alternative(&recommended, alt))
        .collect();

    let break_even = if input.include_break_even {
        social_security_break_even(input, &recommended)?
    } else {
        None
    };
    let monte_carlo = match &input.monte_carlo {
        Some(settings) => Some(simulate_recommended(input, settings, &recommended, rng)?),
        None => None,
    };

    debug!(
        scenarios = ranked.len(),
        pension_age = recommended.pension_claiming_age,
        ss_age = recommended.ss_claiming_age,
        score = recommended.score,
        "claiming strategy optimized"
    );

    Ok(OptimizationResult {
        scenarios_evaluated: ranked.len(),
        recommended,
        alternatives,
        ranked_scenarios: ranked,
        break_even,
        monte_carlo,
        warnings,
    })
}

fn enumerate_candidates(input: &OptimizationInput, warnings: &mut Vec<String>) -> Vec<Candidate> {
    let first_pension_age = input.current_age.max(group_minimum_age(input.group, input.hire_era));
    // Claiming at or after life expectancy pays nothing.
    let last_pension_age = input
        .max_pension_claiming_age
        .min(input.life_expectancy.saturating_sub(1));
    let ss_ages = social_security_claiming_ages(input.current_age);
    let table = msrb_table();

    let mut candidates = Vec::new();
    for pension_age in first_pension_age..=last_pension_age {
        let years_of_service =
            input.current_years_of_service + Decimal::from(pension_age - input.current_age);
        if !check_eligibility(pension_age, years_of_service, input.group, input.hire_era).eligible {
            continue;
        }
        let factor = table.factor(pension_age, input.group, input.hire_era, years_of_service);
        if factor.is_zero() {
            continue;
        }

        let base = CappedBase::compute(input.average_salary, years_of_service, factor);
        let adjusted = adjust_for_option(
            base.after_cap,
            input.option,
            f64::from(pension_age),
            input.beneficiary_age,
        );
        if let Some(warning) = adjusted.warning {
            if !warnings.contains(&warning) {
                warnings.push(warning);
            }
        }
        let pension_years = input.life_expectancy.saturating_sub(pension_age);
        let lifetime_pension = lifetime_pension(adjusted.member_pension, pension_years, input.cola);

        for ss_age in ss_ages.clone() {
            let monthly_social_security = adjust_social_security(
                ss_age,
                FULL_RETIREMENT_AGE,
                input.social_security_monthly_benefit,
            );
            let ss_years = input.life_expectancy.saturating_sub(ss_age);
            let lifetime_ss = monthly_social_security * MONTHS_PER_YEAR * Decimal::from(ss_years);
            candidates.push(Candidate {
                pension_claiming_age: pension_age,
                ss_claiming_age: ss_age,
                annual_pension: adjusted.member_pension,
                monthly_social_security,
                lifetime_benefits: lifetime_pension + lifetime_ss,
            });
        }
    }
    candidates
}

/// Members already past 70 can only claim now, at the full delayed credit.
fn social_security_claiming_ages(current_age: u32) -> RangeInclusive<u32> {
    if current_age > LATEST_CREDIT_AGE {
        current_age..=current_age
    } else {
        current_age.max(EARLIEST_CLAIMING_AGE)..=LATEST_CREDIT_AGE
    }
}

fn lifetime_pension(annual: Decimal, years: u32, cola: ColaAssumptions) -> Decimal {
    let mut state = ColaState::new(cola.rate, cola.base_amount);
    let mut running = annual;
    let mut total = Decimal::ZERO;
    for year in 0..years {
        if cola.enabled && year > 0 {
            running += state.step(running);
        }
        total += running;
    }
    total
}

fn score_candidates(
    input: &OptimizationInput,
    candidates: &[Candidate],
) -> Vec<OptimizationScenario> {
    let max_lifetime = candidates
        .iter()
        .map(|c| to_f64(c.lifetime_benefits))
        .fold(0.0_f64, f64::max);
    let max_monthly = candidates
        .iter()
        .map(|c| to_f64(c.monthly_income()))
        .fold(0.0_f64, f64::max);
    let early_span = f64::from(FULL_RETIREMENT_AGE - EARLIEST_CLAIMING_AGE);

    candidates
        .iter()
        .map(|c| {
            let monthly_income = c.monthly_income();
            let meets_income_goal = input.monthly_income_goal > Decimal::ZERO
                && monthly_income >= input.monthly_income_goal;
            let earliness =
                f64::from(FULL_RETIREMENT_AGE.saturating_sub(c.ss_claiming_age)) / early_span;
            let score = 100.0
                * (LIFETIME_WEIGHT * ratio(to_f64(c.lifetime_benefits), max_lifetime)
                    + INCOME_WEIGHT * ratio(to_f64(monthly_income), max_monthly)
                    - EARLINESS_WEIGHT * earliness
                    + if meets_income_goal { INCOME_GOAL_BONUS } else { 0.0 });

            OptimizationScenario {
                pension_claiming_age: c.pension_claiming_age,
                ss_claiming_age: c.ss_claiming_age,
                monthly_pension: c.monthly_pension(),
                monthly_social_security: c.monthly_social_security,
                monthly_income,
                lifetime_benefits: c.lifetime_benefits,
                meets_income_goal,
                score,
            }
        })
        .collect()
}

fn ratio(value: f64, max: f64) -> f64 {
    if max > 0.0 { value / max } else { 0.0 }
}

fn describe_alternative(
    recommended: &OptimizationScenario,
    alt: &OptimizationScenario,
) -> AlternativeStrategy {
    let monthly_income_delta = alt.monthly_income - recommended.monthly_income;
    let lifetime_benefits_delta = alt.lifetime_benefits - recommended.lifetime_benefits;
    let earlier_access_years =
        i64::from(recommended.pension_claiming_age) - i64::from(alt.pension_claiming_age);

    let access = match earlier_access_years {
        0 => format!("Same pension start at {}", alt.pension_claiming_age),
        n if n > 0 => format!("Pension starts {n} year(s) earlier at {}", alt.pension_claiming_age),
        n => format!("Pension starts {} year(s) later at {}", -n, alt.pension_claiming_age),
    };
    let tradeoff = format!(
        "{access}, Social Security at {}: {} ${}/month, {} ${} lifetime",
        alt.ss_claiming_age,
        if monthly_income_delta >= Decimal::ZERO { "+" } else { "-" },
        monthly_income_delta.abs(),
        if lifetime_benefits_delta >= Decimal::ZERO { "+" } else { "-" },
        lifetime_benefits_delta.abs(),
    );

    AlternativeStrategy {
        scenario: alt.clone(),
        monthly_income_delta,
        lifetime_benefits_delta,
        earlier_access_years,
        tradeoff,
    }
}

/// Break-even between the earliest available Social Security claim and a later one.
fn social_security_break_even(
    input: &OptimizationInput,
    recommended: &OptimizationScenario,
) -> Result<Option<BreakEvenResult>> {
    let early_age = input.current_age.max(EARLIEST_CLAIMING_AGE);
    let later_age = if recommended.ss_claiming_age > early_age {
        recommended.ss_claiming_age
    } else {
        LATEST_CREDIT_AGE
    };
    if later_age <= early_age || input.life_expectancy <= later_age {
        return Ok(None);
    }

    let annual_at = |age: u32| {
        to_f64(adjust_social_security(
            age,
            FULL_RETIREMENT_AGE,
            input.social_security_monthly_benefit,
        )) * 12.0
    };
    let config = BreakEvenConfig {
        assumed_lifespan: f64::from(input.life_expectancy),
        ..BreakEvenConfig::default()
    };
    solve_break_even(
        BenefitStream::level(early_age, annual_at(early_age)),
        BenefitStream::level(later_age, annual_at(later_age)),
        config,
    )
    .map(Some)
}

fn simulate_recommended<R: RngCore>(
    input: &OptimizationInput,
    settings: &MonteCarloSettings,
    recommended: &OptimizationScenario,
    rng: &mut R,
) -> Result<MonteCarloResult> {
    let config = MonteCarloConfig {
        paths: settings.paths,
        years: input
            .life_expectancy
            .saturating_sub(recommended.pension_claiming_age)
            .max(1),
        annual_pension: to_f64(recommended.monthly_pension * MONTHS_PER_YEAR),
        pension_cola_rate: if input.cola.enabled { to_f64(input.cola.rate) } else { 0.0 },
        pension_cola_base: to_f64(input.cola.base_amount),
        annual_social_security: to_f64(recommended.monthly_social_security * MONTHS_PER_YEAR),
        social_security_start_year: recommended
            .ss_claiming_age
            .saturating_sub(recommended.pension_claiming_age),
        annual_healthcare_cost: settings.annual_healthcare_cost,
        savings_balance: settings.savings_balance,
        income_goal: to_f64(input.monthly_income_goal * MONTHS_PER_YEAR),
        economics: settings.economics,
        ..MonteCarloConfig::default()
    };
    run_monte_carlo(&config, rng)
}
