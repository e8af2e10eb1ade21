mod batch;
mod cola;
mod eligibility;
mod engine;
mod error;
mod factors;
mod monte_carlo;
mod optimizer;
mod options;
mod social_security;
mod solver;
mod tax;
mod types;
mod validation;

pub use batch::{
    BatchOutcome, ComparisonEntry, DEFAULT_BATCH_WINDOW, ScenarioComparison, ScenarioRequest,
    ScenarioResult, ScenarioStatus, compare_scenarios, run_scenario_batch,
};
pub use cola::{ColaProjection, ColaState, apply_cola};
pub use eligibility::check_eligibility;
pub use engine::{
    MAX_PENSION_FRACTION, ProjectionGenerator, ProjectionPhase, calculate_pension,
    project_retirement_benefits, should_terminate, summarize_projection,
    try_project_retirement_benefits,
};
pub use error::{CalcError, Result, ValidationErrors};
pub use factors::{
    BenefitFactorTable, FactorSchedule, LookupMode, MAX_BENEFIT_FACTOR, calculate_benefit_factor,
    group_minimum_age, msrb_table,
};
pub use monte_carlo::{
    DEFAULT_PATHS, EconomicAssumptions, MonteCarloConfig, MonteCarloResult, PERFORMANCE_BUDGET,
    PercentileDistribution, RiskMetrics, run_monte_carlo, run_monte_carlo_cancellable,
};
pub use optimizer::{
    AlternativeStrategy, MonteCarloSettings, OptimizationInput, OptimizationResult,
    OptimizationScenario, optimize_claiming_strategy, optimize_claiming_strategy_with_rng,
};
pub use options::{
    AgePair, OPTION_B_REFERENCE_FACTOR, OPTION_C_GENERAL_FACTOR, OptionAdjuster, OptionBSchedule,
    OptionCLookup, OptionCTable, adjust_for_option, adjust_for_option_reference,
    option_b_banded_factor,
};
pub use social_security::{
    EARLIEST_CLAIMING_AGE, FULL_RETIREMENT_AGE, LATEST_CREDIT_AGE, SocialSecurityClaim,
    adjust_social_security, claiming_adjustment_factor, full_retirement_age_months,
};
pub use solver::{
    BenefitStream, BreakEvenConfig, BreakEvenIteration, BreakEvenResult, solve_break_even,
};
pub use tax::{FilingStatus, StateOfResidence, TaxInput, TaxResult, estimate_taxes};
pub use types::{
    ColaAssumptions, EligibilityResult, Group, HireEra, OptionAdjustmentResult, PensionBenefit,
    PensionCalculationInput, PensionOption, PensionOutcome, ProjectionParams, ProjectionSummary,
    ProjectionYear,
};
pub use validation::{
    MAX_MONTE_CARLO_PATHS, ValidationCache, validate_optimization_input, validate_pension_input,
    validate_projection_params,
};
