use serde::Serialize;

use super::error::{CalcError, Result};

/// A level annual benefit that starts at `start_age` and grows at `growth_rate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenefitStream {
    pub start_age: f64,
    pub annual_amount: f64,
    pub growth_rate: f64,
}

impl BenefitStream {
    pub fn level(start_age: u32, annual_amount: f64) -> Self {
        Self {
            start_age: f64::from(start_age),
            annual_amount,
            growth_rate: 0.0,
        }
    }

    /// Benefits received from the start age up to `age`, accrued continuously.
    pub fn cumulative_at(&self, age: f64) -> f64 {
        let years = (age - self.start_age).max(0.0);
        if years == 0.0 {
            return 0.0;
        }
        let growth = self.growth_rate.max(-0.99);
        if growth.abs() < 1e-12 {
            self.annual_amount * years
        } else {
            let ln = growth.ln_1p();
            self.annual_amount * (ln * years).exp_m1() / ln
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BreakEvenConfig {
    /// Age at which the "total benefits" comparison stops.
    pub assumed_lifespan: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl Default for BreakEvenConfig {
    fn default() -> Self {
        Self {
            assumed_lifespan: 85.0,
            tolerance: 1.0 / 12.0,
            max_iterations: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakEvenIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_age: f64,
    pub cumulative_gap: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakEvenResult {
    pub early: BenefitStream,
    pub later: BenefitStream,
    pub assumed_lifespan: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub break_even_age: Option<f64>,
    pub early_total_at_lifespan: f64,
    pub later_total_at_lifespan: f64,
    pub iterations: Vec<BreakEvenIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

/// Age at which cumulative benefits of the later claim catch up with the early claim.
pub fn solve_break_even(
    early: BenefitStream,
    later: BenefitStream,
    config: BreakEvenConfig,
) -> Result<BreakEvenResult> {
    validate_config(&early, &later, config)?;

    let gap = |age: f64| early.cumulative_at(age) - later.cumulative_at(age);
    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let mut break_even_age = None;
    let mut converged = false;
    let feasible;
    let message;

    if gap(config.assumed_lifespan) > 1e-9 {
        feasible = false;
        message = "Later claim does not catch up before the assumed lifespan.".to_string();
    } else {
        let mut lo = later.start_age;
        let mut hi = config.assumed_lifespan;
        let mut it = 0;
        while it < config.max_iterations {
            it += 1;
            let mid = (lo + hi) * 0.5;
            let cumulative_gap = gap(mid);
            iterations.push(BreakEvenIteration {
                iteration: it,
                lower_bound: lo,
                upper_bound: hi,
                candidate_age: mid,
                cumulative_gap,
            });

            if cumulative_gap > 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }

            if (hi - lo).abs() <= config.tolerance {
                converged = true;
                break_even_age = Some(hi);
                break;
            }
        }
        if break_even_age.is_none() {
            break_even_age = Some(hi);
        }
        feasible = true;
        message = if converged {
            "Solved break-even age.".to_string()
        } else {
            "Reached max iterations before tolerance was met; returning best estimate."
                .to_string()
        };
    }

    Ok(BreakEvenResult {
        early,
        later,
        assumed_lifespan: config.assumed_lifespan,
        tolerance: config.tolerance,
        max_iterations: config.max_iterations,
        break_even_age,
        early_total_at_lifespan: early.cumulative_at(config.assumed_lifespan),
        later_total_at_lifespan: later.cumulative_at(config.assumed_lifespan),
        iterations,
        converged,
        feasible,
        message,
    })
}

fn validate_config(
    early: &BenefitStream,
    later: &BenefitStream,
    config: BreakEvenConfig,
) -> Result<()> {
    let fail = |message: &str| Err(CalcError::Config(message.to_string()));
    if !early.start_age.is_finite() || !later.start_age.is_finite() {
        return fail("claiming ages must be finite");
    }
    if early.start_age >= later.start_age {
        return fail("early claim must start before the later claim");
    }
    if !early.annual_amount.is_finite() || !later.annual_amount.is_finite() {
        return fail("benefit amounts must be finite");
    }
    if early.annual_amount < 0.0 || later.annual_amount < 0.0 {
        return fail("benefit amounts must be >= 0");
    }
    if !config.assumed_lifespan.is_finite() || config.assumed_lifespan <= later.start_age {
        return fail("assumed lifespan must be after the later claiming age");
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return fail("tolerance must be > 0");
    }
    if config.max_iterations == 0 {
        return fail("max_iterations must be > 0");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    #[test]
    fn level_streams_break_even_at_closed_form_age() {
        // 62: 1400/mo, 70: 2480/mo. Break-even where 16800(t-62) = 29760(t-70).
        let early = BenefitStream::level(62, 16_800.0);
        let later = BenefitStream::level(70, 29_760.0);
        let expected = (29_760.0 * 70.0 - 16_800.0 * 62.0) / (29_760.0 - 16_800.0);

        let result = solve_break_even(early, later, BreakEvenConfig::default()).unwrap();
        assert!(result.feasible);
        assert!(result.converged);
        assert_close(result.break_even_age.unwrap(), expected, 1.0 / 12.0 + 1e-9);
        assert!(result.later_total_at_lifespan > result.early_total_at_lifespan);
    }

    #[test]
    fn reports_infeasible_when_lifespan_is_too_short() {
        let early = BenefitStream::level(62, 16_800.0);
        let later = BenefitStream::level(70, 29_760.0);
        let config = BreakEvenConfig {
            assumed_lifespan: 75.0,
            ..BreakEvenConfig::default()
        };
        let result = solve_break_even(early, later, config).unwrap();
        assert!(!result.feasible);
        assert!(result.break_even_age.is_none());
        assert!(result.iterations.is_empty());
    }

    #[test]
    fn growing_stream_accrues_more_than_level() {
        let level = BenefitStream::level(67, 20_000.0);
        let growing = BenefitStream {
            growth_rate: 0.03,
            ..level
        };
        assert_close(level.cumulative_at(77.0), 200_000.0, 1e-6);
        assert!(growing.cumulative_at(77.0) > level.cumulative_at(77.0));
        assert_eq!(growing.cumulative_at(60.0), 0.0);
    }

    #[test]
    fn rejects_reversed_claims() {
        let early = BenefitStream::level(70, 29_760.0);
        let later = BenefitStream::level(62, 16_800.0);
        let err = solve_break_even(early, later, BreakEvenConfig::default()).unwrap_err();
        assert!(matches!(err, CalcError::Config(_)));
    }

    #[test]
    fn max_iterations_returns_best_estimate() {
        let early = BenefitStream::level(62, 16_800.0);
        let later = BenefitStream::level(70, 29_760.0);
        let config = BreakEvenConfig {
            max_iterations: 2,
            ..BreakEvenConfig::default()
        };
        let result = solve_break_even(early, later, config).unwrap();
        assert!(result.feasible);
        assert!(!result.converged);
        assert_eq!(result.iterations.len(), 2);
        assert!(result.break_even_age.is_some());
    }
}
