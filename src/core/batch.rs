use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use super::engine::{summarize_projection, try_project_retirement_benefits};
use super::types::{ProjectionParams, ProjectionSummary};

pub const DEFAULT_BATCH_WINDOW: usize = 4;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRequest {
    pub id: String,
    pub params: ProjectionParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub id: String,
    pub status: ScenarioStatus,
    pub summary: ProjectionSummary,
    pub error: Option<String>,
}

impl ScenarioResult {
    fn placeholder(id: &str, start_age: u32, error: String) -> Self {
        Self {
            id: id.to_string(),
            status: ScenarioStatus::Failed,
            summary: ProjectionSummary {
                start_age,
                end_age: start_age,
                years: 0,
                first_year_pension: Decimal::ZERO,
                final_year_pension: Decimal::ZERO,
                first_year_combined: Decimal::ZERO,
                final_year_combined: Decimal::ZERO,
                peak_combined_annual: Decimal::ZERO,
                total_pension: Decimal::ZERO,
                total_social_security: Decimal::ZERO,
                total_combined: Decimal::ZERO,
                average_combined_annual: Decimal::ZERO,
                capped_years: 0,
            },
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub results: Vec<ScenarioResult>,
    pub requested: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Projects every scenario, at most `window` at a time.
///
/// A scenario that fails validation, has no eligible year or panics becomes a
/// zeroed placeholder. Once `cancel` is set no further window is started.
pub fn run_scenario_batch(
    requests: &[ScenarioRequest],
    window: usize,
    cancel: &AtomicBool,
) -> BatchOutcome {
    run_windowed(requests, window, cancel, project_scenario)
}

fn run_windowed<F>(
    requests: &[ScenarioRequest],
    window: usize,
    cancel: &AtomicBool,
    project: F,
) -> BatchOutcome
where
    F: Fn(&ScenarioRequest) -> Result<ProjectionSummary, String> + Sync,
{
    let window = window.max(1);
    let mut results = Vec::with_capacity(requests.len());
    for chunk in requests.chunks(window) {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let mut done: Vec<ScenarioResult> = chunk
            .par_iter()
            .map(|request| run_isolated(request, &project))
            .collect();
        results.append(&mut done);
    }

    let failed = results
        .iter()
        .filter(|r| r.status == ScenarioStatus::Failed)
        .count();
    BatchOutcome {
        cancelled: results.len() < requests.len(),
        requested: requests.len(),
        failed,
        results,
    }
}

fn project_scenario(request: &ScenarioRequest) -> Result<ProjectionSummary, String> {
    let rows = try_project_retirement_benefits(&request.params).map_err(|err| err.to_string())?;
    summarize_projection(&rows)
        .ok_or_else(|| "no eligible retirement year in the projection window".to_string())
}

fn run_isolated<F>(request: &ScenarioRequest, project: &F) -> ScenarioResult
where
    F: Fn(&ScenarioRequest) -> Result<ProjectionSummary, String>,
{
    let outcome =
        panic::catch_unwind(AssertUnwindSafe(|| project(request))).unwrap_or_else(|payload| {
            Err(format!("scenario panicked: {}", panic_message(&*payload)))
        });

    match outcome {
        Ok(summary) => ScenarioResult {
            id: request.id.clone(),
            status: ScenarioStatus::Completed,
            summary,
            error: None,
        },
        Err(error) => {
            warn!(scenario = %request.id, %error, "scenario failed; using placeholder");
            ScenarioResult::placeholder(
                &request.id,
                request.params.planned_retirement_age,
                error,
            )
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonEntry {
    pub id: String,
    pub rank: usize,
    pub total_combined: Decimal,
    pub delta_from_best: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioComparison {
    pub best_id: String,
    pub worst_id: String,
    pub spread: Decimal,
    pub entries: Vec<ComparisonEntry>,
}

/// Ranks scenario results by lifetime combined income.
///
/// # Panics
///
/// Panics when fewer than two results are supplied.
pub fn compare_scenarios(results: &[ScenarioResult]) -> ScenarioComparison {
    assert!(
        results.len() >= 2,
        "compare_scenarios needs at least two results, got {}",
        results.len()
    );

    let mut order: Vec<&ScenarioResult> = results.iter().collect();
    order.sort_by(|a, b| b.summary.total_combined.cmp(&a.summary.total_combined));
    let best = order[0];
    let worst = order[order.len() - 1];

    let entries = order
        .iter()
        .enumerate()
        .map(|(idx, result)| ComparisonEntry {
            id: result.id.clone(),
            rank: idx + 1,
            total_combined: result.summary.total_combined,
            delta_from_best: result.summary.total_combined - best.summary.total_combined,
        })
        .collect();

    ScenarioComparison {
        best_id: best.id.clone(),
        worst_id: worst.id.clone(),
        spread: best.summary.total_combined - worst.summary.total_combined,
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ColaAssumptions, Group, HireEra, PensionOption};
    use rust_decimal_macros::dec;

    fn request(id: &str, planned: u32) -> ScenarioRequest {
        ScenarioRequest {
            id: id.to_string(),
            params: ProjectionParams {
                current_age: 55,
                planned_retirement_age: planned,
                current_years_of_service: dec!(20),
                average_salary: dec!(80000),
                group: Group::Group1,
                hire_era: HireEra::Before2012,
                option: PensionOption::A,
                beneficiary_age: None,
                cola: ColaAssumptions::default(),
                social_security_monthly_benefit: dec!(1500),
                social_security_claiming_age: 67,
                projection_end_age: 85,
            },
        }
    }

    #[test]
    fn failed_scenario_becomes_placeholder_without_aborting() {
        let mut bad = request("bad", 60);
        bad.params.average_salary = Decimal::ZERO;
        let requests = vec![request("a", 58), bad, request("c", 62)];

        let outcome = run_scenario_batch(&requests, 2, &AtomicBool::new(false));
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.failed, 1);
        assert!(!outcome.cancelled);

        let ids: Vec<&str> = outcome.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "bad", "c"]);
        let placeholder = &outcome.results[1];
        assert_eq!(placeholder.status, ScenarioStatus::Failed);
        assert_eq!(placeholder.summary.total_combined, Decimal::ZERO);
        assert!(placeholder.error.as_deref().unwrap().contains("averageSalary"));
    }

    #[test]
    fn panicking_scenario_becomes_placeholder() {
        let requests = vec![request("a", 58), request("boom", 60), request("c", 62)];
        let outcome = run_windowed(&requests, 2, &AtomicBool::new(false), |req| {
            if req.id == "boom" {
                panic!("factor table corrupted");
            }
            project_scenario(req)
        });

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.results[0].status, ScenarioStatus::Completed);
        assert_eq!(outcome.results[2].status, ScenarioStatus::Completed);
        let placeholder = &outcome.results[1];
        assert_eq!(placeholder.status, ScenarioStatus::Failed);
        assert_eq!(placeholder.summary.total_combined, Decimal::ZERO);
        assert!(
            placeholder
                .error
                .as_deref()
                .unwrap()
                .contains("factor table corrupted")
        );
    }

    #[test]
    fn cancelled_batch_keeps_nothing_new() {
        let requests = vec![request("a", 58), request("b", 60)];
        let outcome = run_scenario_batch(&requests, 4, &AtomicBool::new(true));
        assert!(outcome.results.is_empty());
        assert!(outcome.cancelled);
    }

    #[test]
    fn comparison_ranks_by_lifetime_income() {
        let requests = vec![request("early", 56), request("late", 64)];
        let outcome = run_scenario_batch(&requests, DEFAULT_BATCH_WINDOW, &AtomicBool::new(false));
        let comparison = compare_scenarios(&outcome.results);
        assert_eq!(comparison.entries.len(), 2);
        assert_eq!(comparison.entries[0].rank, 1);
        assert_eq!(comparison.entries[0].delta_from_best, Decimal::ZERO);
        assert!(comparison.spread >= Decimal::ZERO);
        assert_ne!(comparison.best_id, comparison.worst_id);
    }

    #[test]
    #[should_panic(expected = "at least two results")]
    fn comparison_of_one_result_panics() {
        let outcome = run_scenario_batch(&[request("a", 58)], 1, &AtomicBool::new(false));
        compare_scenarios(&outcome.results);
    }
}
