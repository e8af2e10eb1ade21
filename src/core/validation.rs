use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use super::error::ValidationErrors;
use super::social_security::{EARLIEST_CLAIMING_AGE, LATEST_CREDIT_AGE};
use super::optimizer::OptimizationInput;
use super::types::{PensionCalculationInput, ProjectionParams};

const MIN_AGE: u32 = 18;
const MAX_AGE: u32 = 100;
const MAX_PROJECTION_AGE: u32 = 120;
const MAX_SERVICE_YEARS: Decimal = dec!(60);
const MAX_COLA_RATE: Decimal = dec!(0.10);
pub const MAX_MONTE_CARLO_PATHS: u32 = 100_000;

pub fn validate_pension_input(input: &PensionCalculationInput) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    check_salary(&mut errors, input.average_salary);
    check_age(&mut errors, "age", input.age);
    check_service(&mut errors, input.years_of_service, input.age);
    errors
}

pub fn validate_projection_params(params: &ProjectionParams) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    check_salary(&mut errors, params.average_salary);
    check_age(&mut errors, "currentAge", params.current_age);
    check_age(&mut errors, "plannedRetirementAge", params.planned_retirement_age);
    check_service(&mut errors, params.current_years_of_service, params.current_age);

    if params.projection_end_age <= params.planned_retirement_age {
        errors.push("projectionEndAge must be greater than plannedRetirementAge");
    }
    if params.projection_end_age > MAX_PROJECTION_AGE {
        errors.push(format!("projectionEndAge must be <= {MAX_PROJECTION_AGE}"));
    }
    if !(EARLIEST_CLAIMING_AGE..=LATEST_CREDIT_AGE).contains(&params.social_security_claiming_age) {
        errors.push(format!(
            "socialSecurityClaimingAge must be between {EARLIEST_CLAIMING_AGE} and {LATEST_CREDIT_AGE}"
        ));
    }
    if params.social_security_monthly_benefit < Decimal::ZERO {
        errors.push("socialSecurityMonthlyBenefit must be >= 0");
    }
    if params.cola.rate < Decimal::ZERO || params.cola.rate > MAX_COLA_RATE {
        errors.push("colaRate must be between 0 and 10 percent");
    }
    if params.cola.base_amount < Decimal::ZERO {
        errors.push("colaBase must be >= 0");
    }
    errors
}

pub fn validate_optimization_input(input: &OptimizationInput) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    check_salary(&mut errors, input.average_salary);
    check_age(&mut errors, "currentAge", input.current_age);
    check_service(&mut errors, input.current_years_of_service, input.current_age);

    if input.max_pension_claiming_age < input.current_age {
        errors.push("maxPensionClaimingAge must be >= currentAge");
    } else if input.max_pension_claiming_age > MAX_AGE {
        errors.push(format!("maxPensionClaimingAge must be <= {MAX_AGE}"));
    }
    if input.life_expectancy <= input.current_age || input.life_expectancy > MAX_PROJECTION_AGE {
        errors.push(format!(
            "lifeExpectancy must be greater than currentAge and <= {MAX_PROJECTION_AGE}"
        ));
    }
    if input.social_security_monthly_benefit < Decimal::ZERO {
        errors.push("socialSecurityMonthlyBenefit must be >= 0");
    }
    if input.monthly_income_goal < Decimal::ZERO {
        errors.push("monthlyIncomeGoal must be >= 0");
    }
    if let Some(settings) = &input.monte_carlo {
        if settings.paths == 0 || settings.paths > MAX_MONTE_CARLO_PATHS {
            errors.push(format!(
                "monteCarlo.paths must be between 1 and {MAX_MONTE_CARLO_PATHS}"
            ));
        }
    }
    errors
}

fn check_salary(errors: &mut ValidationErrors, salary: Decimal) {
    if salary <= Decimal::ZERO {
        errors.push("averageSalary must be > 0");
    }
}

fn check_age(errors: &mut ValidationErrors, field: &str, age: u32) {
    if !(MIN_AGE..=MAX_AGE).contains(&age) {
        errors.push(format!("{field} must be between {MIN_AGE} and {MAX_AGE}"));
    }
}

fn check_service(errors: &mut ValidationErrors, years_of_service: Decimal, age: u32) {
    if years_of_service < Decimal::ZERO || years_of_service > MAX_SERVICE_YEARS {
        errors.push(format!("yearsOfService must be between 0 and {MAX_SERVICE_YEARS}"));
    } else if years_of_service > Decimal::from(age.saturating_sub(MIN_AGE - 2)) {
        errors.push("yearsOfService cannot exceed working years since age 16");
    }
}

/// Caller-owned memo of validation outcomes, keyed by the serialized input.
///
/// Inserting into a full cache clears it first.
#[derive(Debug)]
pub struct ValidationCache {
    entries: HashMap<String, ValidationErrors>,
    max_entries: usize,
}

impl ValidationCache {
    pub const DEFAULT_MAX_ENTRIES: usize = 256;

    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn validate<T, F>(&mut self, value: &T, validate: F) -> ValidationErrors
    where
        T: Serialize,
        F: FnOnce(&T) -> ValidationErrors,
    {
        let Ok(key) = serde_json::to_string(value) else {
            return validate(value);
        };
        if let Some(hit) = self.entries.get(&key) {
            return hit.clone();
        }

        let outcome = validate(value);
        if self.entries.len() >= self.max_entries {
            self.entries.clear();
        }
        self.entries.insert(key, outcome.clone());
        outcome
    }
}

impl Default for ValidationCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ENTRIES)
    }
}
