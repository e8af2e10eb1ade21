use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, trace};

use super::cola::apply_cola;
use super::eligibility::check_eligibility;
use super::error::Result;
use super::factors::{BenefitFactorTable, MAX_BENEFIT_FACTOR, group_minimum_age, msrb_table};
use super::options::{adjust_for_option, adjust_for_option_reference};
use super::social_security::{FULL_RETIREMENT_AGE, adjust_social_security};
use super::types::{
    EligibilityResult, PensionBenefit, PensionCalculationInput, PensionOutcome, ProjectionParams,
    ProjectionSummary, ProjectionYear, round_cents,
};
use super::validation::{validate_pension_input, validate_projection_params};

/// Fraction of average salary the base allowance may not exceed.
pub const MAX_PENSION_FRACTION: Decimal = dec!(0.80);
const MONTHS_PER_YEAR: Decimal = dec!(12);
/// A capped projection with COLA on keeps running until this many years remain.
const STABLE_TAIL_YEARS: u32 = 5;

/// Single-retirement benefit at the input's age and service.
pub fn calculate_pension(input: &PensionCalculationInput) -> Result<PensionOutcome> {
    validate_pension_input(input).into_result()?;

    let eligibility = check_eligibility(
        input.age,
        input.years_of_service,
        input.group,
        input.hire_era,
    );
    if !eligibility.eligible {
        return Ok(PensionOutcome::Ineligible(eligibility));
    }

    let benefit_factor = msrb_table().factor(
        input.age,
        input.group,
        input.hire_era,
        input.years_of_service,
    );
    if benefit_factor.is_zero() {
        return Ok(PensionOutcome::Ineligible(EligibilityResult {
            eligible: false,
            reason: format!(
                "No benefit factor is published for age {} in {}",
                input.age,
                input.group.label()
            ),
        }));
    }

    let capped = CappedBase::compute(input.average_salary, input.years_of_service, benefit_factor);
    let option = adjust_for_option_reference(
        capped.after_cap,
        input.option,
        f64::from(input.age),
        input.beneficiary_age,
    );
    let annual_pension = option.member_pension;

    Ok(PensionOutcome::Eligible(Box::new(PensionBenefit {
        eligibility,
        benefit_factor,
        base_pension_before_cap: capped.before_cap,
        base_pension_after_cap: capped.after_cap,
        capped_at_80_percent: capped.capped,
        monthly_pension: round_cents(annual_pension / MONTHS_PER_YEAR),
        monthly_survivor_pension: round_cents(option.survivor_pension / MONTHS_PER_YEAR),
        annual_pension,
        option,
    })))
}

/// Validates `params`, then projects.
pub fn try_project_retirement_benefits(params: &ProjectionParams) -> Result<Vec<ProjectionYear>> {
    validate_projection_params(params).into_result()?;
    Ok(project_retirement_benefits(params))
}

/// Year-by-year pension and Social Security income from retirement to the end age.
pub fn project_retirement_benefits(params: &ProjectionParams) -> Vec<ProjectionYear> {
    ProjectionGenerator::new(params, msrb_table()).run()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionPhase {
    /// No row emitted yet.
    BeforeEligible,
    Accruing,
    /// Last row was capped at 80 % with the maximum factor.
    CappedStable,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CappedBase {
    pub(crate) before_cap: Decimal,
    pub(crate) after_cap: Decimal,
    pub(crate) capped: bool,
}

impl CappedBase {
    pub(crate) fn compute(salary: Decimal, years_of_service: Decimal, factor: Decimal) -> Self {
        let before_cap = round_cents(salary * years_of_service * factor);
        let cap = salary * MAX_PENSION_FRACTION;
        if before_cap > cap {
            Self {
                before_cap,
                after_cap: cap,
                capped: true,
            }
        } else {
            Self {
                before_cap,
                after_cap: before_cap,
                capped: false,
            }
        }
    }
}

pub struct ProjectionGenerator<'a> {
    params: &'a ProjectionParams,
    table: &'a BenefitFactorTable,
}

impl<'a> ProjectionGenerator<'a> {
    pub fn new(params: &'a ProjectionParams, table: &'a BenefitFactorTable) -> Self {
        Self { params, table }
    }

    pub fn start_age(&self) -> u32 {
        self.params
            .planned_retirement_age
            .max(group_minimum_age(self.params.group, self.params.hire_era))
    }

    /// Service is frozen at the first projected year.
    pub fn years_of_service(&self) -> Decimal {
        let start = self.start_age();
        self.params.current_years_of_service
            + Decimal::from(start.saturating_sub(self.params.current_age))
    }

    pub fn run(&self) -> Vec<ProjectionYear> {
        let p = self.params;
        let start_age = self.start_age();
        let years_of_service = self.years_of_service();
        let social_security_annual = adjust_social_security(
            p.social_security_claiming_age,
            FULL_RETIREMENT_AGE,
            p.social_security_monthly_benefit,
        ) * MONTHS_PER_YEAR;

        let mut phase = ProjectionPhase::BeforeEligible;
        let mut rows = Vec::new();
        for age in start_age..=p.projection_end_age {
            let eligibility = check_eligibility(age, years_of_service, p.group, p.hire_era);
            if !eligibility.eligible {
                trace!(age, reason = %eligibility.reason, "skipping ineligible projection year");
                continue;
            }
            let factor = self.table.factor(age, p.group, p.hire_era, years_of_service);
            if factor.is_zero() {
                trace!(age, "skipping projection year with no published factor");
                continue;
            }

            let row = self.project_year(age, years_of_service, factor, social_security_annual);
            phase = next_phase(&row);
            rows.push(row);

            if should_terminate(phase, p.cola.enabled, age, p.projection_end_age) {
                debug!(age, "projection reached a stable capped benefit");
                break;
            }
        }

        debug!(
            start_age,
            rows = rows.len(),
            final_phase = ?phase,
            "retirement projection complete"
        );
        rows
    }

    fn project_year(
        &self,
        age: u32,
        years_of_service: Decimal,
        benefit_factor: Decimal,
        social_security_annual: Decimal,
    ) -> ProjectionYear {
        let p = self.params;
        let base = CappedBase::compute(p.average_salary, years_of_service, benefit_factor);
        let pension_with_option = adjust_for_option(
            base.after_cap,
            p.option,
            f64::from(age),
            p.beneficiary_age,
        )
        .member_pension;

        let cola_adjustment = if p.cola.enabled && age > p.planned_retirement_age {
            apply_cola(
                pension_with_option,
                age - p.planned_retirement_age,
                p.cola.rate,
                p.cola.base_amount,
            )
            .total_increase
        } else {
            Decimal::ZERO
        };
        let total_pension_annual = pension_with_option + cola_adjustment;
        let social_security_annual = if age >= p.social_security_claiming_age {
            social_security_annual
        } else {
            Decimal::ZERO
        };

        ProjectionYear {
            age,
            years_of_service,
            benefit_factor,
            base_pension_before_cap: base.before_cap,
            base_pension_after_cap: base.after_cap,
            capped_at_80_percent: base.capped,
            pension_with_option,
            cola_adjustment,
            total_pension_annual,
            social_security_annual,
            combined_total_annual: total_pension_annual + social_security_annual,
        }
    }
}

fn next_phase(row: &ProjectionYear) -> ProjectionPhase {
    if row.capped_at_80_percent && row.benefit_factor >= MAX_BENEFIT_FACTOR {
        ProjectionPhase::CappedStable
    } else {
        ProjectionPhase::Accruing
    }
}

/// Stops once the base can no longer grow and either COLA is off or the tail is short.
pub fn should_terminate(
    phase: ProjectionPhase,
    cola_enabled: bool,
    age: u32,
    end_age: u32,
) -> bool {
    phase == ProjectionPhase::CappedStable
        && (!cola_enabled || end_age.saturating_sub(age) < STABLE_TAIL_YEARS)
}

pub fn summarize_projection(years: &[ProjectionYear]) -> Option<ProjectionSummary> {
    let first = years.first()?;
    let last = years.last()?;

    let total_pension: Decimal = years.iter().map(|y| y.total_pension_annual).sum();
    let total_social_security: Decimal = years.iter().map(|y| y.social_security_annual).sum();
    let total_combined: Decimal = years.iter().map(|y| y.combined_total_annual).sum();
    let peak_combined_annual = years
        .iter()
        .map(|y| y.combined_total_annual)
        .max()
        .unwrap_or(Decimal::ZERO);

    Some(ProjectionSummary {
        start_age: first.age,
        end_age: last.age,
        years: years.len(),
        first_year_pension: first.total_pension_annual,
        final_year_pension: last.total_pension_annual,
        first_year_combined: first.combined_total_annual,
        final_year_combined: last.combined_total_annual,
        peak_combined_annual,
        total_pension,
        total_social_security,
        total_combined,
        average_combined_annual: round_cents(total_combined / Decimal::from(years.len())),
        capped_years: years.iter().filter(|y| y.capped_at_80_percent).count(),
    })
}
