//! Stochastic retirement-income simulation.
//!
//! Each path draws a mean-reverting inflation series and a market return
//! correlated with it, grows the pension by its capped-base COLA and Social
//! Security by realised inflation, charges healthcare costs that inflate faster
//! than prices, and discounts net income back to today. Paths are independent,
//! so they run as a rayon map-reduce with one ChaCha generator per path.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{CalcError, Result};

pub const DEFAULT_PATHS: u32 = 10_000;
pub const PERFORMANCE_BUDGET: Duration = Duration::from_secs(2);
const EXPECTED_SHORTFALL_TAIL: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EconomicAssumptions {
    pub inflation_mean: f64,
    /// AR(1) persistence of inflation deviations from the mean.
    pub inflation_persistence: f64,
    pub inflation_volatility: f64,
    pub market_return_mean: f64,
    pub market_return_volatility: f64,
    pub inflation_market_correlation: f64,
    /// Healthcare cost growth above general inflation.
    pub healthcare_inflation_premium: f64,
    pub discount_rate: f64,
}

impl Default for EconomicAssumptions {
    fn default() -> Self {
        Self {
            inflation_mean: 0.025,
            inflation_persistence: 0.6,
            inflation_volatility: 0.01,
            market_return_mean: 0.06,
            market_return_volatility: 0.12,
            inflation_market_correlation: -0.2,
            healthcare_inflation_premium: 0.03,
            discount_rate: 0.03,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonteCarloConfig {
    pub paths: u32,
    pub years: u32,
    pub annual_pension: f64,
    pub pension_cola_rate: f64,
    pub pension_cola_base: f64,
    /// Benefit in today's dollars; indexed to inflation from year 0.
    pub annual_social_security: f64,
    /// Simulation year in which Social Security payments begin.
    pub social_security_start_year: u32,
    pub annual_healthcare_cost: f64,
    pub savings_balance: f64,
    pub savings_withdrawal_rate: f64,
    /// Real annual net income a path must sustain every year to count as a success.
    pub income_goal: f64,
    pub economics: EconomicAssumptions,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            paths: DEFAULT_PATHS,
            years: 25,
            annual_pension: 0.0,
            pension_cola_rate: 0.03,
            pension_cola_base: 13_000.0,
            annual_social_security: 0.0,
            social_security_start_year: 0,
            annual_healthcare_cost: 0.0,
            savings_balance: 0.0,
            savings_withdrawal_rate: 0.04,
            income_goal: 0.0,
            economics: EconomicAssumptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileDistribution {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    pub mean_outcome: f64,
    pub volatility: f64,
    /// Mean of the worst 5 % of present-value outcomes.
    pub expected_shortfall: f64,
    pub sharpe_ratio: f64,
    pub average_shortfall_years: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloResult {
    pub paths_requested: u32,
    pub paths_completed: u32,
    pub cancelled: bool,
    pub percentiles: PercentileDistribution,
    pub worst_case: f64,
    pub median_outcome: f64,
    pub best_case: f64,
    /// Share of paths, 0 to 100, that met the income goal every year.
    pub success_rate: f64,
    pub risk_metrics: RiskMetrics,
    pub elapsed_ms: u64,
    pub within_budget: bool,
}

#[derive(Debug, Clone, Copy)]
struct PathOutcome {
    present_value: f64,
    shortfall_years: u32,
}

impl PathOutcome {
    fn succeeded(self) -> bool {
        self.shortfall_years == 0
    }
}

/// Runs the simulation with per-path seeds drawn from `rng`.
pub fn run_monte_carlo<R: RngCore>(
    config: &MonteCarloConfig,
    rng: &mut R,
) -> Result<MonteCarloResult> {
    let cancel = AtomicBool::new(false);
    run_monte_carlo_cancellable(config, rng, &cancel)
}

/// Like [`run_monte_carlo`], but stops generating paths once `cancel` is set.
/// Paths already simulated are still aggregated.
pub fn run_monte_carlo_cancellable<R: RngCore>(
    config: &MonteCarloConfig,
    rng: &mut R,
    cancel: &AtomicBool,
) -> Result<MonteCarloResult> {
    validate_config(config)?;
    let base_seed = rng.next_u64();
    let started = Instant::now();

    let outcomes: Vec<PathOutcome> = (0..config.paths)
        .into_par_iter()
        .filter_map(|path_id| {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            let path_rng = ChaCha8Rng::seed_from_u64(derive_seed(base_seed, path_id));
            let mut sampler = NormalSampler::new(path_rng);
            Some(simulate_path(config, &mut sampler))
        })
        .collect();

    let mut result = aggregate(config, outcomes);
    result.cancelled = result.paths_completed < config.paths;
    let elapsed = started.elapsed();
    result.elapsed_ms = elapsed.as_millis() as u64;
    result.within_budget = elapsed <= PERFORMANCE_BUDGET;
    if !result.within_budget {
        warn!(
            elapsed_ms = result.elapsed_ms,
            budget_ms = PERFORMANCE_BUDGET.as_millis() as u64,
            paths = result.paths_completed,
            "monte carlo simulation exceeded its interactive budget"
        );
    } else {
        debug!(
            elapsed_ms = result.elapsed_ms,
            paths = result.paths_completed,
            success_rate = result.success_rate,
            "monte carlo simulation complete"
        );
    }
    Ok(result)
}

fn simulate_path<R: RngCore>(
    config: &MonteCarloConfig,
    sampler: &mut NormalSampler<R>,
) -> PathOutcome {
    let econ = &config.economics;
    let orth = (1.0 - econ.inflation_market_correlation.powi(2)).max(0.0).sqrt();

    let mut inflation = econ.inflation_mean;
    let mut price_level = 1.0;
    let mut pension = config.annual_pension.max(0.0);
    let mut social_security = config.annual_social_security.max(0.0);
    let mut healthcare = config.annual_healthcare_cost.max(0.0);
    let mut savings = config.savings_balance.max(0.0);
    let mut discount = 1.0;
    let mut present_value = 0.0;
    let mut shortfall_years = 0;

    for year in 0..config.years {
        let z_inflation = sampler.standard_normal();
        let z_market = sampler.standard_normal();
        inflation = (econ.inflation_mean
            + econ.inflation_persistence * (inflation - econ.inflation_mean)
            + econ.inflation_volatility * z_inflation)
            .clamp(-0.03, 0.20);
        let market_return = (econ.market_return_mean
            + econ.market_return_volatility
                * (econ.inflation_market_correlation * z_inflation + orth * z_market))
            .clamp(-0.95, 2.5);

        if year > 0 {
            pension += config.pension_cola_rate * pension.min(config.pension_cola_base);
            social_security *= 1.0 + inflation;
            healthcare *= 1.0 + inflation + econ.healthcare_inflation_premium;
        }
        price_level *= 1.0 + inflation;
        discount *= 1.0 + econ.discount_rate;

        let withdrawal = savings * config.savings_withdrawal_rate;
        savings = ((savings - withdrawal) * (1.0 + market_return)).max(0.0);

        let social_security_paid = if year >= config.social_security_start_year {
            social_security
        } else {
            0.0
        };
        let net_income = pension + social_security_paid + withdrawal - healthcare;
        if net_income / price_level < config.income_goal {
            shortfall_years += 1;
        }
        present_value += net_income / discount;
    }

    PathOutcome {
        present_value,
        shortfall_years,
    }
}

fn aggregate(config: &MonteCarloConfig, outcomes: Vec<PathOutcome>) -> MonteCarloResult {
    let completed = outcomes.len();
    let mut values: Vec<f64> = outcomes.iter().map(|o| o.present_value).collect();
    let successes = outcomes.iter().filter(|o| o.succeeded()).count();
    let shortfall_years: u64 = outcomes.iter().map(|o| u64::from(o.shortfall_years)).sum();

    let mut result = MonteCarloResult {
        paths_requested: config.paths,
        paths_completed: completed as u32,
        cancelled: false,
        percentiles: PercentileDistribution::default(),
        worst_case: 0.0,
        median_outcome: 0.0,
        best_case: 0.0,
        success_rate: 0.0,
        risk_metrics: RiskMetrics::default(),
        elapsed_ms: 0,
        within_budget: true,
    };
    if completed == 0 {
        return result;
    }

    values.sort_by(|a, b| a.total_cmp(b));
    let n = completed as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let volatility = variance.sqrt();
    let tail_len = ((n * EXPECTED_SHORTFALL_TAIL / 100.0).ceil() as usize).clamp(1, completed);
    let expected_shortfall = values[..tail_len].iter().sum::<f64>() / tail_len as f64;
    let benchmark = goal_present_value(config);
    let sharpe_ratio = if volatility > 1e-12 {
        (mean - benchmark) / volatility
    } else {
        0.0
    };

    result.percentiles = PercentileDistribution {
        p5: percentile(&values, 5.0),
        p10: percentile(&values, 10.0),
        p25: percentile(&values, 25.0),
        p50: percentile(&values, 50.0),
        p75: percentile(&values, 75.0),
        p90: percentile(&values, 90.0),
        p95: percentile(&values, 95.0),
    };
    result.worst_case = values[0];
    result.median_outcome = result.percentiles.p50;
    result.best_case = values[completed - 1];
    result.success_rate = (successes as f64 / n * 100.0).clamp(0.0, 100.0);
    result.risk_metrics = RiskMetrics {
        mean_outcome: mean,
        volatility,
        expected_shortfall,
        sharpe_ratio,
        average_shortfall_years: shortfall_years as f64 / n,
    };
    result
}

/// Present value of the income goal under mean inflation.
fn goal_present_value(config: &MonteCarloConfig) -> f64 {
    let econ = &config.economics;
    (1..=config.years)
        .map(|t| {
            let t = f64::from(t);
            config.income_goal * (1.0 + econ.inflation_mean).powf(t)
                / (1.0 + econ.discount_rate).powf(t)
        })
        .sum()
}

fn validate_config(config: &MonteCarloConfig) -> Result<()> {
    let econ = &config.economics;
    let fail = |message: &str| Err(CalcError::Config(message.to_string()));
    if config.paths == 0 {
        return fail("paths must be > 0");
    }
    if config.years == 0 {
        return fail("years must be > 0");
    }
    let amounts = [
        config.annual_pension,
        config.pension_cola_rate,
        config.pension_cola_base,
        config.annual_social_security,
        config.annual_healthcare_cost,
        config.savings_balance,
        config.savings_withdrawal_rate,
        config.income_goal,
        econ.inflation_mean,
        econ.inflation_volatility,
        econ.market_return_mean,
        econ.market_return_volatility,
        econ.healthcare_inflation_premium,
        econ.discount_rate,
    ];
    if amounts.iter().any(|v| !v.is_finite()) {
        return fail("monte carlo inputs must be finite");
    }
    if econ.inflation_volatility < 0.0 || econ.market_return_volatility < 0.0 {
        return fail("volatilities must be >= 0");
    }
    if !(0.0..1.0).contains(&econ.inflation_persistence) {
        return fail("inflation persistence must be in [0, 1)");
    }
    if !(-1.0..=1.0).contains(&econ.inflation_market_correlation) {
        return fail("inflation/market correlation must be between -1 and 1");
    }
    if !(0.0..=1.0).contains(&config.savings_withdrawal_rate) {
        return fail("savings withdrawal rate must be between 0 and 1");
    }
    if econ.discount_rate <= -1.0 {
        return fail("discount rate must be > -100%");
    }
    Ok(())
}

fn derive_seed(base_seed: u64, path_id: u32) -> u64 {
    splitmix64(base_seed ^ (u64::from(path_id) << 17) ^ u64::from(path_id))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Box-Muller standard normals over any `RngCore`, caching the second draw.
struct NormalSampler<R> {
    rng: R,
    cached_normal: Option<f64>,
}

impl<R: RngCore> NormalSampler<R> {
    fn new(rng: R) -> Self {
        Self {
            rng,
            cached_normal: None,
        }
    }

    fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        let v = self.rng.next_u64() >> 11;
        ((v as f64) + 0.5) / DENOM
    }

    fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.cached_normal.take() {
            return z;
        }

        let u1 = self.next_f64().max(1e-12);
        let u2 = self.next_f64();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;

        self.cached_normal = Some(r * theta.sin());
        r * theta.cos()
    }
}

/// Linear-interpolated percentile of already sorted values.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let w = rank - lower as f64;
        sorted[lower] * (1.0 - w) + sorted[upper] * w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn config() -> MonteCarloConfig {
        MonteCarloConfig {
            paths: 400,
            years: 25,
            annual_pension: 60_000.0,
            annual_social_security: 24_000.0,
            social_security_start_year: 5,
            annual_healthcare_cost: 6_000.0,
            savings_balance: 200_000.0,
            income_goal: 55_000.0,
            ..MonteCarloConfig::default()
        }
    }

    fn deterministic_config() -> MonteCarloConfig {
        MonteCarloConfig {
            paths: 16,
            years: 3,
            annual_pension: 10_000.0,
            pension_cola_rate: 0.0,
            economics: EconomicAssumptions {
                inflation_mean: 0.0,
                inflation_volatility: 0.0,
                market_return_volatility: 0.0,
                healthcare_inflation_premium: 0.0,
                discount_rate: 0.0,
                ..EconomicAssumptions::default()
            },
            ..MonteCarloConfig::default()
        }
    }

    #[test]
    fn same_seed_reproduces_distribution() {
        let a = run_monte_carlo(&config(), &mut ChaCha8Rng::seed_from_u64(7)).unwrap();
        let b = run_monte_carlo(&config(), &mut ChaCha8Rng::seed_from_u64(7)).unwrap();
        assert_eq!(a.percentiles, b.percentiles);
        assert_eq!(a.success_rate, b.success_rate);
        assert_eq!(a.risk_metrics, b.risk_metrics);
    }

    #[test]
    fn different_seeds_differ() {
        let a = run_monte_carlo(&config(), &mut ChaCha8Rng::seed_from_u64(7)).unwrap();
        let b = run_monte_carlo(&config(), &mut ChaCha8Rng::seed_from_u64(8)).unwrap();
        assert_ne!(a.percentiles, b.percentiles);
    }

    #[test]
    fn zero_volatility_collapses_distribution() {
        let result =
            run_monte_carlo(&deterministic_config(), &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        assert_eq!(result.paths_completed, 16);
        assert_close(result.worst_case, 30_000.0, 1e-6);
        assert_close(result.best_case, 30_000.0, 1e-6);
        assert_close(result.risk_metrics.volatility, 0.0, 1e-9);
        assert_eq!(result.risk_metrics.sharpe_ratio, 0.0);
        assert_eq!(result.success_rate, 100.0);
    }

    #[test]
    fn unreachable_goal_fails_every_path() {
        let mut cfg = deterministic_config();
        cfg.income_goal = 20_000.0;
        let result = run_monte_carlo(&cfg, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        assert_eq!(result.success_rate, 0.0);
        assert_close(result.risk_metrics.average_shortfall_years, 3.0, 1e-12);
    }

    #[test]
    fn pre_cancelled_run_returns_empty_partial_result() {
        let cancel = AtomicBool::new(true);
        let result =
            run_monte_carlo_cancellable(&config(), &mut ChaCha8Rng::seed_from_u64(3), &cancel)
                .unwrap();
        assert_eq!(result.paths_completed, 0);
        assert!(result.cancelled);
        assert_eq!(result.success_rate, 0.0);
    }

    #[test]
    fn rejects_invalid_config() {
        let mut cfg = config();
        cfg.paths = 0;
        assert!(matches!(
            run_monte_carlo(&cfg, &mut ChaCha8Rng::seed_from_u64(1)),
            Err(CalcError::Config(_))
        ));
        let mut cfg = config();
        cfg.economics.inflation_market_correlation = 1.5;
        assert!(run_monte_carlo(&cfg, &mut ChaCha8Rng::seed_from_u64(1)).is_err());
    }

    #[test]
    fn expected_shortfall_sits_in_lower_tail() {
        let result = run_monte_carlo(&config(), &mut ChaCha8Rng::seed_from_u64(11)).unwrap();
        assert!(result.risk_metrics.expected_shortfall <= result.percentiles.p5 + 1e-9);
        assert!(result.risk_metrics.expected_shortfall >= result.worst_case - 1e-9);
    }

    #[test]
    fn percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_close(percentile(&values, 50.0), 2.5, 1e-12);
        assert_close(percentile(&values, 0.0), 1.0, 1e-12);
        assert_close(percentile(&values, 100.0), 4.0, 1e-12);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn normal_sampler_is_roughly_standard() {
        let mut sampler = NormalSampler::new(ChaCha8Rng::seed_from_u64(99));
        let draws: Vec<f64> = (0..20_000).map(|_| sampler.standard_normal()).collect();
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        let var = draws.iter().map(|z| (z - mean).powi(2)).sum::<f64>() / draws.len() as f64;
        assert_close(mean, 0.0, 0.05);
        assert_close(var, 1.0, 0.05);
    }

    proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(16))]

        #[test]
        fn prop_ordering_and_success_rate_bounds(
            seed in 0u64..1_000,
            goal in 0u32..120_000,
            persistence in 0.0f64..0.95,
        ) {
            let mut cfg = config();
            cfg.paths = 64;
            cfg.income_goal = f64::from(goal);
            cfg.economics.inflation_persistence = persistence;
            let result = run_monte_carlo(&cfg, &mut ChaCha8Rng::seed_from_u64(seed)).unwrap();
            prop_assert!((0.0..=100.0).contains(&result.success_rate));
            prop_assert!(result.worst_case <= result.median_outcome);
            prop_assert!(result.median_outcome <= result.best_case);
            prop_assert!(result.percentiles.p5 <= result.percentiles.p95);
        }
    }
}
