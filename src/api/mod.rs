use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tracing::{Level, error, info};

use crate::core::{
    BatchOutcome, CalcError, ColaAssumptions, DEFAULT_BATCH_WINDOW, DEFAULT_PATHS,
    EligibilityResult, FULL_RETIREMENT_AGE, FilingStatus, Group, HireEra, MAX_MONTE_CARLO_PATHS,
    MonteCarloSettings,
    OptimizationInput, OptimizationResult, PensionCalculationInput, PensionOption, PensionOutcome,
    ProjectionParams, ProjectionSummary, ProjectionYear, ScenarioComparison, ScenarioRequest,
    StateOfResidence, TaxInput, TaxResult, ValidationCache, calculate_pension, check_eligibility,
    compare_scenarios, estimate_taxes, optimize_claiming_strategy, project_retirement_benefits,
    run_scenario_batch, summarize_projection, try_project_retirement_benefits,
    validate_projection_params,
};

const PERCENT: Decimal = dec!(100);

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliGroup {
    #[value(alias = "1")]
    Group1,
    #[value(alias = "2")]
    Group2,
    #[value(alias = "3")]
    Group3,
    #[value(alias = "4")]
    Group4,
}

impl From<CliGroup> for Group {
    fn from(value: CliGroup) -> Self {
        match value {
            CliGroup::Group1 => Group::Group1,
            CliGroup::Group2 => Group::Group2,
            CliGroup::Group3 => Group::Group3,
            CliGroup::Group4 => Group::Group4,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliHireEra {
    #[value(alias = "before_2012")]
    Before2012,
    #[value(alias = "after_2012")]
    After2012,
}

impl From<CliHireEra> for HireEra {
    fn from(value: CliHireEra) -> Self {
        match value {
            CliHireEra::Before2012 => HireEra::Before2012,
            CliHireEra::After2012 => HireEra::After2012,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliPensionOption {
    A,
    B,
    C,
}

impl From<CliPensionOption> for PensionOption {
    fn from(value: CliPensionOption) -> Self {
        match value {
            CliPensionOption::A => PensionOption::A,
            CliPensionOption::B => PensionOption::B,
            CliPensionOption::C => PensionOption::C,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliFilingStatus {
    Single,
    #[value(alias = "married")]
    MarriedFilingJointly,
    HeadOfHousehold,
}

impl From<CliFilingStatus> for FilingStatus {
    fn from(value: CliFilingStatus) -> Self {
        match value {
            CliFilingStatus::Single => FilingStatus::Single,
            CliFilingStatus::MarriedFilingJointly => FilingStatus::MarriedFilingJointly,
            CliFilingStatus::HeadOfHousehold => FilingStatus::HeadOfHousehold,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliState {
    Ma,
    Nh,
    Fl,
}

impl From<CliState> for StateOfResidence {
    fn from(value: CliState) -> Self {
        match value {
            CliState::Ma => StateOfResidence::Massachusetts,
            CliState::Nh => StateOfResidence::NewHampshire,
            CliState::Fl => StateOfResidence::Florida,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "mass-pension",
    about = "Massachusetts public-employee pension calculator, projector and claiming optimizer"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub log_json: bool,
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the JSON API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Pension at a single retirement age
    Calculate(MemberArgs),
    /// Year-by-year pension and Social Security income
    Project(ProjectArgs),
    /// Federal and state tax on retirement income
    Taxes(TaxArgs),
    /// Rank pension and Social Security claiming ages
    Optimize(OptimizeArgs),
}

#[derive(Debug, Clone, Args)]
pub struct MemberArgs {
    #[arg(long, help = "Highest three-year (or five-year) average salary")]
    average_salary: Decimal,
    #[arg(long, help = "Age at retirement, or current age for projections")]
    age: u32,
    #[arg(long, help = "Creditable years of service, or current service for projections")]
    years_of_service: Decimal,
    #[arg(long, value_enum, default_value_t = CliGroup::Group1)]
    group: CliGroup,
    #[arg(long, value_enum, default_value_t = CliHireEra::Before2012)]
    hire_era: CliHireEra,
    #[arg(long, value_enum, default_value_t = CliPensionOption::A)]
    option: CliPensionOption,
    #[arg(long, help = "Beneficiary age, used by Option C")]
    beneficiary_age: Option<f64>,
}

#[derive(Debug, Clone, Args)]
pub struct ColaArgs {
    #[arg(long, help = "Disable the annual cost-of-living adjustment")]
    no_cola: bool,
    #[arg(long, default_value_t = dec!(3), help = "COLA rate in percent")]
    cola_rate: Decimal,
    #[arg(long, default_value_t = dec!(13000), help = "Pension amount the COLA applies to")]
    cola_base: Decimal,
}

#[derive(Debug, Clone, Args)]
pub struct ProjectArgs {
    #[command(flatten)]
    member: MemberArgs,
    #[arg(long)]
    planned_retirement_age: u32,
    #[arg(long, default_value_t = 90)]
    projection_end_age: u32,
    /// Monthly Social Security at full retirement age
    #[arg(long, default_value_t = Decimal::ZERO)]
    social_security_monthly_benefit: Decimal,
    #[arg(long, default_value_t = FULL_RETIREMENT_AGE)]
    social_security_claiming_age: u32,
    #[command(flatten)]
    cola: ColaArgs,
}

#[derive(Debug, Clone, Args)]
pub struct TaxArgs {
    #[arg(long)]
    pension_income: Decimal,
    #[arg(long, default_value_t = Decimal::ZERO)]
    social_security_income: Decimal,
    #[arg(long, default_value_t = Decimal::ZERO)]
    other_income: Decimal,
    #[arg(long, value_enum, default_value_t = CliFilingStatus::Single)]
    filing_status: CliFilingStatus,
    #[arg(long)]
    age: u32,
    #[arg(long, value_enum, default_value_t = CliState::Ma)]
    state: CliState,
}

#[derive(Debug, Clone, Args)]
pub struct OptimizeArgs {
    #[command(flatten)]
    member: MemberArgs,
    /// Monthly Social Security at full retirement age
    #[arg(long, default_value_t = Decimal::ZERO)]
    social_security_monthly_benefit: Decimal,
    #[arg(long, default_value_t = 85)]
    life_expectancy: u32,
    #[arg(long, default_value_t = Decimal::ZERO)]
    monthly_income_goal: Decimal,
    #[arg(long, default_value_t = 70)]
    max_pension_claiming_age: u32,
    #[command(flatten)]
    cola: ColaArgs,
    #[arg(long, help = "Include a Social Security break-even analysis")]
    break_even: bool,
    #[arg(long, help = "Run a Monte Carlo simulation on the recommended strategy")]
    monte_carlo: bool,
    #[arg(long, default_value_t = DEFAULT_PATHS)]
    paths: u32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value_t = 0.0, help = "Annual healthcare cost in today's dollars")]
    healthcare_cost: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectionResponse {
    years: Vec<ProjectionYear>,
    summary: Option<ProjectionSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenariosResponse {
    batch: BatchOutcome,
    comparison: Option<ScenarioComparison>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<String>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    details: Vec<String>,
}

impl From<String> for ApiError {
    fn from(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
            details: Vec::new(),
        }
    }
}

impl From<CalcError> for ApiError {
    fn from(err: CalcError) -> Self {
        let details = match &err {
            CalcError::Validation(errors) => errors.messages().to_vec(),
            _ => Vec::new(),
        };
        Self {
            status: StatusCode::BAD_REQUEST,
            message: err.to_string(),
            details,
        }
    }
}

fn build_pension_input(args: MemberArgs) -> Result<PensionCalculationInput, String> {
    if let Some(age) = args.beneficiary_age {
        if !age.is_finite() {
            return Err("--beneficiary-age must be a number".to_string());
        }
    }
    Ok(PensionCalculationInput {
        average_salary: args.average_salary,
        age: args.age,
        years_of_service: args.years_of_service,
        group: args.group.into(),
        hire_era: args.hire_era.into(),
        option: args.option.into(),
        beneficiary_age: args.beneficiary_age,
    })
}

fn build_cola(args: &ColaArgs) -> Result<ColaAssumptions, String> {
    if args.cola_rate < Decimal::ZERO || args.cola_rate > dec!(10) {
        return Err("--cola-rate must be between 0 and 10".to_string());
    }
    if args.cola_base < Decimal::ZERO {
        return Err("--cola-base must be >= 0".to_string());
    }
    Ok(ColaAssumptions {
        enabled: !args.no_cola,
        rate: args.cola_rate / PERCENT,
        base_amount: args.cola_base,
    })
}

fn build_projection_params(args: ProjectArgs) -> Result<ProjectionParams, String> {
    if args.planned_retirement_age < args.member.age {
        return Err("--planned-retirement-age must be >= --age".to_string());
    }
    if args.projection_end_age <= args.planned_retirement_age {
        return Err("--projection-end-age must be > --planned-retirement-age".to_string());
    }
    let cola = build_cola(&args.cola)?;
    let member = build_pension_input(args.member)?;

    Ok(ProjectionParams {
        current_age: member.age,
        planned_retirement_age: args.planned_retirement_age,
        current_years_of_service: member.years_of_service,
        average_salary: member.average_salary,
        group: member.group,
        hire_era: member.hire_era,
        option: member.option,
        beneficiary_age: member.beneficiary_age,
        cola,
        social_security_monthly_benefit: args.social_security_monthly_benefit,
        social_security_claiming_age: args.social_security_claiming_age,
        projection_end_age: args.projection_end_age,
    })
}

fn build_tax_input(args: TaxArgs) -> Result<TaxInput, String> {
    let incomes = [
        ("--pension-income", args.pension_income),
        ("--social-security-income", args.social_security_income),
        ("--other-income", args.other_income),
    ];
    for (flag, amount) in incomes {
        if amount < Decimal::ZERO {
            return Err(format!("{flag} must be >= 0"));
        }
    }
    Ok(TaxInput {
        pension_income: args.pension_income,
        social_security_income: args.social_security_income,
        other_income: args.other_income,
        filing_status: args.filing_status.into(),
        age: args.age,
        state: args.state.into(),
    })
}

fn build_optimization_input(args: OptimizeArgs) -> Result<OptimizationInput, String> {
    if args.monte_carlo && !(1..=MAX_MONTE_CARLO_PATHS).contains(&args.paths) {
        return Err(format!("--paths must be between 1 and {MAX_MONTE_CARLO_PATHS}"));
    }
    if !args.healthcare_cost.is_finite() || args.healthcare_cost < 0.0 {
        return Err("--healthcare-cost must be >= 0".to_string());
    }
    let cola = build_cola(&args.cola)?;
    let member = build_pension_input(args.member)?;
    let monte_carlo = args.monte_carlo.then(|| MonteCarloSettings {
        paths: args.paths,
        seed: args.seed,
        annual_healthcare_cost: args.healthcare_cost,
        ..MonteCarloSettings::default()
    });

    Ok(OptimizationInput {
        current_age: member.age,
        current_years_of_service: member.years_of_service,
        average_salary: member.average_salary,
        group: member.group,
        hire_era: member.hire_era,
        option: member.option,
        beneficiary_age: member.beneficiary_age,
        social_security_monthly_benefit: args.social_security_monthly_benefit,
        life_expectancy: args.life_expectancy,
        monthly_income_goal: args.monthly_income_goal,
        max_pension_claiming_age: args.max_pension_claiming_age,
        cola,
        include_break_even: args.break_even,
        monte_carlo,
    })
}

/// Runs a one-shot subcommand and returns its JSON report.
pub fn execute(command: Command) -> Result<serde_json::Value, String> {
    match command {
        Command::Serve { .. } => Err("`serve` runs the HTTP API and has no report".to_string()),
        Command::Calculate(args) => {
            let input = build_pension_input(args)?;
            to_json(&calculate_pension(&input).map_err(|e| e.to_string())?)
        }
        Command::Project(args) => {
            let params = build_projection_params(args)?;
            let years = try_project_retirement_benefits(&params).map_err(|e| e.to_string())?;
            to_json(&ProjectionResponse {
                summary: summarize_projection(&years),
                years,
            })
        }
        Command::Taxes(args) => to_json(&estimate_taxes(&build_tax_input(args)?)),
        Command::Optimize(args) => {
            let input = build_optimization_input(args)?;
            to_json(&optimize_claiming_strategy(&input).map_err(|e| e.to_string())?)
        }
    }
}

fn to_json<T: Serialize>(body: &T) -> Result<serde_json::Value, String> {
    serde_json::to_value(body).map_err(|e| format!("failed to encode report: {e}"))
}

/// Entry point for the binary after tracing is initialised.
pub async fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Serve { port } => run_http_server(port)
            .await
            .map_err(|e| format!("Server error: {e}")),
        command => {
            let report = execute(command)?;
            let text = serde_json::to_string_pretty(&report)
                .map_err(|e| format!("failed to encode report: {e}"))?;
            println!("{text}");
            Ok(())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct MemberPayload {
    average_salary: Option<Decimal>,
    age: Option<u32>,
    years_of_service: Option<Decimal>,
    group: Option<Group>,
    hire_era: Option<HireEra>,
    option: Option<PensionOption>,
    beneficiary_age: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ColaPayload {
    cola_enabled: Option<bool>,
    /// Percent, as on the command line.
    cola_rate: Option<Decimal>,
    cola_base: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectionPayload {
    #[serde(flatten)]
    member: MemberPayload,
    planned_retirement_age: Option<u32>,
    projection_end_age: Option<u32>,
    social_security_monthly_benefit: Option<Decimal>,
    social_security_claiming_age: Option<u32>,
    #[serde(flatten)]
    cola: ColaPayload,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TaxPayload {
    pension_income: Option<Decimal>,
    social_security_income: Option<Decimal>,
    other_income: Option<Decimal>,
    filing_status: Option<FilingStatus>,
    age: Option<u32>,
    state: Option<StateOfResidence>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OptimizePayload {
    #[serde(flatten)]
    member: MemberPayload,
    social_security_monthly_benefit: Option<Decimal>,
    life_expectancy: Option<u32>,
    monthly_income_goal: Option<Decimal>,
    max_pension_claiming_age: Option<u32>,
    #[serde(flatten)]
    cola: ColaPayload,
    include_break_even: Option<bool>,
    monte_carlo: Option<MonteCarloSettings>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ScenarioPayload {
    id: Option<String>,
    #[serde(flatten)]
    projection: ProjectionPayload,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ScenariosPayload {
    scenarios: Vec<ScenarioPayload>,
    window: Option<usize>,
}

fn default_member_args() -> MemberArgs {
    MemberArgs {
        average_salary: dec!(80000),
        age: 60,
        years_of_service: dec!(25),
        group: CliGroup::Group1,
        hire_era: CliHireEra::Before2012,
        option: CliPensionOption::A,
        beneficiary_age: None,
    }
}

fn default_cola_args() -> ColaArgs {
    ColaArgs {
        no_cola: false,
        cola_rate: dec!(3),
        cola_base: dec!(13000),
    }
}

fn overlay_member(args: &mut MemberArgs, payload: MemberPayload) -> PayloadEnums {
    if let Some(v) = payload.average_salary {
        args.average_salary = v;
    }
    if let Some(v) = payload.age {
        args.age = v;
    }
    if let Some(v) = payload.years_of_service {
        args.years_of_service = v;
    }
    if payload.beneficiary_age.is_some() {
        args.beneficiary_age = payload.beneficiary_age;
    }
    PayloadEnums {
        group: payload.group,
        hire_era: payload.hire_era,
        option: payload.option,
    }
}

fn overlay_cola(args: &mut ColaArgs, payload: ColaPayload) {
    if let Some(v) = payload.cola_enabled {
        args.no_cola = !v;
    }
    if let Some(v) = payload.cola_rate {
        args.cola_rate = v;
    }
    if let Some(v) = payload.cola_base {
        args.cola_base = v;
    }
}

/// Enum fields arrive in their API spelling and bypass the clap enums.
#[derive(Debug, Default, Clone, Copy)]
struct PayloadEnums {
    group: Option<Group>,
    hire_era: Option<HireEra>,
    option: Option<PensionOption>,
}

impl PayloadEnums {
    fn apply_to_input(self, input: &mut PensionCalculationInput) {
        if let Some(v) = self.group {
            input.group = v;
        }
        if let Some(v) = self.hire_era {
            input.hire_era = v;
        }
        if let Some(v) = self.option {
            input.option = v;
        }
    }

    fn apply_to_params(self, params: &mut ProjectionParams) {
        if let Some(v) = self.group {
            params.group = v;
        }
        if let Some(v) = self.hire_era {
            params.hire_era = v;
        }
        if let Some(v) = self.option {
            params.option = v;
        }
    }
}

fn pension_input_from_payload(payload: MemberPayload) -> Result<PensionCalculationInput, String> {
    let mut args = default_member_args();
    let enums = overlay_member(&mut args, payload);
    let mut input = build_pension_input(args)?;
    enums.apply_to_input(&mut input);
    Ok(input)
}

fn projection_params_from_payload(payload: ProjectionPayload) -> Result<ProjectionParams, String> {
    let mut args = ProjectArgs {
        member: default_member_args(),
        planned_retirement_age: 0,
        projection_end_age: 90,
        social_security_monthly_benefit: Decimal::ZERO,
        social_security_claiming_age: FULL_RETIREMENT_AGE,
        cola: default_cola_args(),
    };
    let enums = overlay_member(&mut args.member, payload.member);
    args.planned_retirement_age = payload.planned_retirement_age.unwrap_or(args.member.age);
    if let Some(v) = payload.projection_end_age {
        args.projection_end_age = v;
    }
    if let Some(v) = payload.social_security_monthly_benefit {
        args.social_security_monthly_benefit = v;
    }
    if let Some(v) = payload.social_security_claiming_age {
        args.social_security_claiming_age = v;
    }
    overlay_cola(&mut args.cola, payload.cola);

    let mut params = build_projection_params(args)?;
    enums.apply_to_params(&mut params);
    Ok(params)
}

fn tax_input_from_payload(payload: TaxPayload) -> Result<TaxInput, String> {
    let Some(pension_income) = payload.pension_income else {
        return Err("pensionIncome is required".to_string());
    };
    let Some(age) = payload.age else {
        return Err("age is required".to_string());
    };
    let mut input = build_tax_input(TaxArgs {
        pension_income,
        social_security_income: payload.social_security_income.unwrap_or_default(),
        other_income: payload.other_income.unwrap_or_default(),
        filing_status: CliFilingStatus::Single,
        age,
        state: CliState::Ma,
    })?;
    if let Some(v) = payload.filing_status {
        input.filing_status = v;
    }
    if let Some(v) = payload.state {
        input.state = v;
    }
    Ok(input)
}

fn optimization_input_from_payload(payload: OptimizePayload) -> Result<OptimizationInput, String> {
    let mut args = OptimizeArgs {
        member: default_member_args(),
        social_security_monthly_benefit: Decimal::ZERO,
        life_expectancy: 85,
        monthly_income_goal: Decimal::ZERO,
        max_pension_claiming_age: 70,
        cola: default_cola_args(),
        break_even: false,
        monte_carlo: false,
        paths: DEFAULT_PATHS,
        seed: 42,
        healthcare_cost: 0.0,
    };
    let enums = overlay_member(&mut args.member, payload.member);
    if let Some(v) = payload.social_security_monthly_benefit {
        args.social_security_monthly_benefit = v;
    }
    if let Some(v) = payload.life_expectancy {
        args.life_expectancy = v;
    }
    if let Some(v) = payload.monthly_income_goal {
        args.monthly_income_goal = v;
    }
    if let Some(v) = payload.max_pension_claiming_age {
        args.max_pension_claiming_age = v;
    }
    if let Some(v) = payload.include_break_even {
        args.break_even = v;
    }
    overlay_cola(&mut args.cola, payload.cola);

    let mut input = build_optimization_input(args)?;
    if let Some(v) = enums.group {
        input.group = v;
    }
    if let Some(v) = enums.hire_era {
        input.hire_era = v;
    }
    if let Some(v) = enums.option {
        input.option = v;
    }
    input.monte_carlo = payload.monte_carlo;
    Ok(input)
}

fn pension_response(payload: MemberPayload) -> Result<PensionOutcome, ApiError> {
    let input = pension_input_from_payload(payload)?;
    Ok(calculate_pension(&input)?)
}

fn eligibility_response(payload: MemberPayload) -> Result<EligibilityResult, ApiError> {
    let input = pension_input_from_payload(payload)?;
    Ok(check_eligibility(
        input.age,
        input.years_of_service,
        input.group,
        input.hire_era,
    ))
}

fn projection_response(
    payload: ProjectionPayload,
    cache: &Mutex<ValidationCache>,
) -> Result<ProjectionResponse, ApiError> {
    let params = projection_params_from_payload(payload)?;
    let errors = {
        let mut cache = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.validate(&params, validate_projection_params)
    };
    errors.into_result()?;

    let years = project_retirement_benefits(&params);
    Ok(ProjectionResponse {
        summary: summarize_projection(&years),
        years,
    })
}

fn taxes_response(payload: TaxPayload) -> Result<TaxResult, ApiError> {
    Ok(estimate_taxes(&tax_input_from_payload(payload)?))
}

fn optimize_response(payload: OptimizePayload) -> Result<OptimizationResult, ApiError> {
    let input = optimization_input_from_payload(payload)?;
    Ok(optimize_claiming_strategy(&input)?)
}

fn scenarios_response(payload: ScenariosPayload) -> Result<ScenariosResponse, ApiError> {
    if payload.scenarios.is_empty() {
        return Err(ApiError::from("scenarios must not be empty".to_string()));
    }
    let requests = payload
        .scenarios
        .into_iter()
        .enumerate()
        .map(|(idx, scenario)| {
            let id = scenario.id.unwrap_or_else(|| format!("scenario-{}", idx + 1));
            projection_params_from_payload(scenario.projection)
                .map(|params| ScenarioRequest { id: id.clone(), params })
                .map_err(|e| format!("{id}: {e}"))
        })
        .collect::<Result<Vec<_>, String>>()?;

    let window = payload.window.unwrap_or(DEFAULT_BATCH_WINDOW);
    let batch = run_scenario_batch(&requests, window, &AtomicBool::new(false));
    let comparison = (batch.results.len() >= 2).then(|| compare_scenarios(&batch.results));
    Ok(ScenariosResponse { batch, comparison })
}

#[derive(Clone, Default)]
struct AppState {
    validation_cache: Arc<Mutex<ValidationCache>>,
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router();

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "pension API listening");

    axum::serve(listener, app).await
}

fn router() -> Router {
    Router::new()
        .route("/api/pension", post(pension_handler))
        .route(
            "/api/eligibility",
            get(eligibility_get_handler).post(eligibility_post_handler),
        )
        .route("/api/projection", post(projection_handler))
        .route("/api/taxes", post(taxes_handler))
        .route("/api/optimize", post(optimize_handler))
        .route("/api/scenarios", post(scenarios_handler))
        .fallback(not_found_handler)
        .with_state(AppState::default())
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found", Vec::new())
}

async fn pension_handler(Json(payload): Json<MemberPayload>) -> Response {
    respond(pension_response(payload))
}

async fn eligibility_get_handler(Query(payload): Query<MemberPayload>) -> Response {
    respond(eligibility_response(payload))
}

async fn eligibility_post_handler(Json(payload): Json<MemberPayload>) -> Response {
    respond(eligibility_response(payload))
}

async fn projection_handler(
    State(state): State<AppState>,
    Json(payload): Json<ProjectionPayload>,
) -> Response {
    let cache = state.validation_cache.clone();
    run_blocking(move || projection_response(payload, &cache)).await
}

async fn taxes_handler(Json(payload): Json<TaxPayload>) -> Response {
    respond(taxes_response(payload))
}

async fn optimize_handler(Json(payload): Json<OptimizePayload>) -> Response {
    run_blocking(move || optimize_response(payload)).await
}

async fn scenarios_handler(Json(payload): Json<ScenariosPayload>) -> Response {
    run_blocking(move || scenarios_response(payload)).await
}

async fn run_blocking<T, F>(work: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => respond(result),
        Err(join_error) => {
            error!(error = %join_error, "calculation task failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "calculation failed",
                Vec::new(),
            )
        }
    }
}

fn respond<T: Serialize>(result: Result<T, ApiError>) -> Response {
    match result {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(err) => error_response(err.status, &err.message, err.details),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str, details: Vec<String>) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
            details,
        },
    )
}

#[cfg(test)]
fn from_json<T: serde::de::DeserializeOwned>(json: &str) -> Result<T, String> {
    serde_json::from_str::<T>(json).map_err(|e| format!("Invalid API JSON payload: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    fn sample_member() -> MemberArgs {
        MemberArgs {
            average_salary: dec!(95000),
            age: 59,
            years_of_service: dec!(34),
            group: CliGroup::Group2,
            hire_era: CliHireEra::Before2012,
            option: CliPensionOption::A,
            beneficiary_age: None,
        }
    }

    fn sample_project_args() -> ProjectArgs {
        ProjectArgs {
            member: MemberArgs {
                age: 55,
                years_of_service: dec!(25),
                ..sample_member()
            },
            planned_retirement_age: 58,
            projection_end_age: 85,
            social_security_monthly_benefit: dec!(1500),
            social_security_claiming_age: 67,
            cola: default_cola_args(),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[test]
    fn cli_parses_calculate_subcommand() {
        let cli = Cli::try_parse_from([
            "mass-pension",
            "calculate",
            "--average-salary",
            "95000",
            "--age",
            "59",
            "--years-of-service",
            "34",
            "--group",
            "group2",
            "--option",
            "c",
            "--beneficiary-age",
            "57",
        ])
        .expect("valid command line");
        let Command::Calculate(args) = cli.command else {
            panic!("expected calculate");
        };
        let input = build_pension_input(args).expect("valid input");
        assert_eq!(input.group, Group::Group2);
        assert_eq!(input.option, PensionOption::C);
        assert_eq!(input.beneficiary_age, Some(57.0));
        assert_eq!(cli.log_level, LogLevel::Info);
    }

    #[test]
    fn cola_rate_is_converted_from_percent() {
        let params = build_projection_params(sample_project_args()).expect("valid params");
        assert_eq!(params.cola.rate, dec!(0.03));
        assert_eq!(params.cola.base_amount, dec!(13000));
        assert!(params.cola.enabled);
    }

    #[test]
    fn build_projection_params_rejects_retirement_before_current_age() {
        let mut args = sample_project_args();
        args.planned_retirement_age = 50;
        let err = build_projection_params(args).expect_err("must reject");
        assert!(err.contains("--planned-retirement-age"));
    }

    #[test]
    fn build_cola_rejects_out_of_range_rate() {
        let mut args = default_cola_args();
        args.cola_rate = dec!(12);
        let err = build_cola(&args).expect_err("must reject");
        assert!(err.contains("--cola-rate"));
    }

    #[test]
    fn execute_calculate_reports_reference_pension() {
        let report = execute(Command::Calculate(sample_member())).expect("report");
        assert_eq!(report["status"], "eligible");
        assert_eq!(report["annualPension"].as_f64(), Some(76000.0));
        assert_eq!(report["cappedAt80Percent"], true);
    }

    #[test]
    fn execute_serve_has_no_report() {
        assert!(execute(Command::Serve { port: 0 }).is_err());
    }

    #[test]
    fn pension_payload_overlays_defaults() {
        let payload: MemberPayload = from_json(
            r#"{"averageSalary":95000,"age":59,"yearsOfService":34,"group":"GROUP_2","option":"B"}"#,
        )
        .expect("valid json");
        let input = pension_input_from_payload(payload).expect("valid input");
        assert_eq!(input.group, Group::Group2);
        assert_eq!(input.hire_era, HireEra::Before2012);
        assert_eq!(input.option, PensionOption::B);

        let outcome = calculate_pension(&input).expect("eligible");
        assert_eq!(outcome.benefit().expect("benefit").annual_pension, dec!(75240));
    }

    #[test]
    fn projection_payload_defaults_planned_age_to_member_age() {
        let payload: ProjectionPayload =
            from_json(r#"{"age":62,"yearsOfService":30,"colaEnabled":false,"colaRate":2}"#)
                .expect("valid json");
        let params = projection_params_from_payload(payload).expect("valid params");
        assert_eq!(params.planned_retirement_age, 62);
        assert!(!params.cola.enabled);
        assert_eq!(params.cola.rate, dec!(0.02));
    }

    #[test]
    fn tax_payload_requires_pension_income() {
        let payload: TaxPayload = from_json(r#"{"age":66}"#).expect("valid json");
        let err = tax_input_from_payload(payload).expect_err("must reject");
        assert!(err.contains("pensionIncome"));
    }

    #[test]
    fn tax_payload_accepts_api_enum_spelling() {
        let payload: TaxPayload = from_json(
            r#"{"pensionIncome":60000,"age":66,"filingStatus":"married_filing_jointly","state":"NH"}"#,
        )
        .expect("valid json");
        let input = tax_input_from_payload(payload).expect("valid input");
        assert_eq!(input.filing_status, FilingStatus::MarriedFilingJointly);
        assert_eq!(input.state, StateOfResidence::NewHampshire);
    }

    #[test]
    fn validation_errors_map_to_bad_request_with_details() {
        let cache = Mutex::new(ValidationCache::default());
        let payload: ProjectionPayload =
            from_json(r#"{"age":55,"plannedRetirementAge":60,"socialSecurityClaimingAge":75}"#)
                .expect("valid json");
        let err = projection_response(payload, &cache).expect_err("must reject");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(
            err.details
                .iter()
                .any(|d| d.contains("socialSecurityClaimingAge"))
        );
    }

    #[test]
    fn oversized_optimization_request_is_rejected() {
        let payload: OptimizePayload = from_json(
            r#"{"age":58,"yearsOfService":28,"maxPensionClaimingAge":4294967295,
                "monteCarlo":{"paths":4294967295}}"#,
        )
        .expect("valid json");
        let err = optimize_response(payload).expect_err("must reject");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.details.len(), 2);
        assert!(err.details.iter().any(|d| d.contains("maxPensionClaimingAge")));
        assert!(err.details.iter().any(|d| d.contains("monteCarlo.paths")));
    }

    #[test]
    fn scenarios_response_compares_completed_batch() {
        let payload: ScenariosPayload = from_json(
            r#"{"scenarios":[
                {"id":"early","age":55,"yearsOfService":25,"plannedRetirementAge":58},
                {"id":"late","age":55,"yearsOfService":25,"plannedRetirementAge":63},
                {"age":55,"yearsOfService":25,"plannedRetirementAge":60,"averageSalary":0}
            ]}"#,
        )
        .expect("valid json");
        let response = scenarios_response(payload).expect("batch runs");
        assert_eq!(response.batch.results.len(), 3);
        assert_eq!(response.batch.failed, 1);
        assert_eq!(response.batch.results[2].id, "scenario-3");
        assert_eq!(response.comparison.expect("comparison").entries.len(), 3);
    }

    #[tokio::test]
    async fn pension_handler_returns_json_with_no_store() {
        let payload: MemberPayload = from_json(
            r#"{"averageSalary":95000,"age":59,"yearsOfService":34,"group":"GROUP_2"}"#,
        )
        .expect("valid json");
        let response = pension_handler(Json(payload)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).expect("header"),
            "no-store"
        );
        let body = body_json(response).await;
        assert_eq!(body["annualPension"].as_f64(), Some(76000.0));
    }

    #[tokio::test]
    async fn ineligible_member_reports_reason() {
        let payload: MemberPayload =
            from_json(r#"{"age":50,"yearsOfService":12}"#).expect("valid json");
        let response = pension_handler(Json(payload)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ineligible");
        assert_eq!(body["eligible"], false);
    }

    #[tokio::test]
    async fn invalid_member_is_bad_request_with_details() {
        let payload: MemberPayload =
            from_json(r#"{"averageSalary":0,"age":60}"#).expect("valid json");
        let response = pension_handler(Json(payload)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["details"][0].as_str().expect("detail").contains("averageSalary"));
    }

    #[tokio::test]
    async fn eligibility_query_uses_api_enum_spelling() {
        let payload: MemberPayload = serde_json::from_value(serde_json::json!({
            "age": 52,
            "yearsOfService": 12,
            "hireEra": "after_2012",
            "group": "GROUP_4",
        }))
        .expect("valid payload");
        let response = eligibility_get_handler(Query(payload)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["eligible"], true);
    }

    #[tokio::test]
    async fn optimize_handler_runs_on_blocking_pool() {
        let payload: OptimizePayload = from_json(
            r#"{"age":58,"yearsOfService":28,"socialSecurityMonthlyBenefit":2000,
                "maxPensionClaimingAge":62,"monthlyIncomeGoal":5000}"#,
        )
        .expect("valid json");
        let response = optimize_handler(Json(payload)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["recommended"]["score"].as_f64().is_some());
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let response = not_found_handler().await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Not found");
    }
}
