use tracing::{debug, info, warn};

use super::builder::{ConstraintBuilder, layout_for};
use super::error::{FailureStatus, ModelingLimitError, PlanError, SolverFailure};
use super::projector::{PlanReport, project};
use super::rmd::{RmdTable, UniformLifetimeTable};
use super::solver::{GoodLpSolver, MilpSolver};
use super::system::{BIG_M, BIG_M_MARGIN};
use super::types::{PlanOptions, PlanStatus, ScenarioModel};

/// Builds the model for `scenario`, solves it and projects the solution into
/// yearly rows. Solver failures come back verbatim; a time-limited answer is
/// returned with its status marked.
pub fn run_plan(
    scenario: &ScenarioModel,
    options: &PlanOptions,
    rmd: &dyn RmdTable,
    solver: &dyn MilpSolver,
) -> Result<PlanReport, PlanError> {
    let layout = layout_for(scenario);
    let system = ConstraintBuilder::new(scenario, &layout, options, rmd)?.build();
    debug!(
        work_years = scenario.work_years,
        plan_years = scenario.plan_years,
        block = layout.retirement_block_size(),
        "solving withdrawal plan"
    );

    let solution = solver.solve(&system, options.time_limit)?;
    if solution.values.len() != system.variables() {
        return Err(SolverFailure {
            status: FailureStatus::Other,
            message: format!(
                "solver returned {} values for {} variables",
                solution.values.len(),
                system.variables()
            ),
        }
        .into());
    }
    match solution.status {
        PlanStatus::Optimal => info!(message = %solution.message, "plan solved"),
        PlanStatus::TimeLimited => {
            warn!(message = %solution.message, "time limit reached; returning best plan found")
        }
    }

    let mut report = project(&solution, scenario, &layout);
    report.modeling_limit = nearest_big_m(&solution.values, system.integrality());
    if let Some(limit) = &report.modeling_limit {
        warn!(%limit, "solution is near the linearization bound");
    }
    Ok(report)
}

pub fn run_plan_with_defaults(
    scenario: &ScenarioModel,
    options: &PlanOptions,
) -> Result<PlanReport, PlanError> {
    run_plan(scenario, options, &UniformLifetimeTable, &GoodLpSolver)
}

/// Largest continuous magnitude within the margin of big-M, if any.
fn nearest_big_m(values: &[f64], integrality: &[bool]) -> Option<ModelingLimitError> {
    let limit = BIG_M * (1.0 - BIG_M_MARGIN);
    values
        .iter()
        .zip(integrality)
        .enumerate()
        .filter(|(_, (v, binary))| !**binary && v.abs() >= limit)
        .max_by(|(_, (a, _)), (_, (b, _))| a.abs().total_cmp(&b.abs()))
        .map(|(index, (v, _))| ModelingLimitError {
            what: format!("variable {index}"),
            value: *v,
            big_m: BIG_M,
            margin_pct: BIG_M_MARGIN * 100.0,
        })
}
