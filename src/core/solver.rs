use std::time::{Duration, Instant};

use good_lp::solvers::SolutionStatus;
use good_lp::{
    Constraint, Expression, ProblemVariables, ResolutionError, SolverModel, Variable, variable,
};
use tracing::{debug, info, warn};

use super::error::{FailureStatus, SolverFailure};
use super::system::ConstraintSystem;
use super::types::PlanStatus;

#[cfg(not(any(feature = "highs", feature = "microlp")))]
compile_error!("enable the `highs` (default) or `microlp` feature to get a MILP backend");

/// Relative slack allowed when accepting a time-limited incumbent.
const INCUMBENT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub values: Vec<f64>,
    pub status: PlanStatus,
    pub message: String,
}

/// Anything that can take a finished constraint system and return a dense
/// solution indexed like the system's variables.
pub trait MilpSolver {
    fn solve(
        &self,
        system: &ConstraintSystem,
        time_limit: Duration,
    ) -> Result<Solution, SolverFailure>;
}

/// Branch-and-bound through `good_lp`. HiGHS enforces the time limit itself
/// and hands back its incumbent when the limit is hit; the pure-Rust
/// `microlp` backend has no limit and runs to completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpSolver;

impl MilpSolver for GoodLpSolver {
    fn solve(
        &self,
        system: &ConstraintSystem,
        time_limit: Duration,
    ) -> Result<Solution, SolverFailure> {
        let started = Instant::now();
        let (values, status) = solve_with_backend(system, time_limit).map_err(failure_from)?;
        let solution = finish(system, values, status, time_limit)?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            status = ?solution.status,
            "MILP solve finished"
        );
        Ok(solution)
    }
}

/// Turns a backend answer into a [`Solution`]. A time-limited answer is only
/// kept when it actually satisfies the model.
fn finish(
    system: &ConstraintSystem,
    values: Vec<f64>,
    status: SolutionStatus,
    time_limit: Duration,
) -> Result<Solution, SolverFailure> {
    match status {
        SolutionStatus::TimeLimit => {
            if !system.is_satisfied_by(&values, INCUMBENT_TOLERANCE) {
                return Err(SolverFailure {
                    status: FailureStatus::TimeLimitWithoutIncumbent,
                    message: format!(
                        "no feasible solution within {:.1}s",
                        time_limit.as_secs_f64()
                    ),
                });
            }
            warn!(
                limit_s = time_limit.as_secs_f64(),
                "time limit reached; keeping best solution found"
            );
            Ok(Solution {
                values,
                status: PlanStatus::TimeLimited,
                message: format!(
                    "Time limit of {:.1}s reached; solution may not be optimal.",
                    time_limit.as_secs_f64()
                ),
            })
        }
        _ => Ok(Solution {
            values,
            status: PlanStatus::Optimal,
            message: "Optimization terminated successfully.".to_string(),
        }),
    }
}

struct Translated {
    vars: ProblemVariables,
    columns: Vec<Variable>,
    objective: Expression,
    constraints: Vec<Constraint>,
}

fn translate(system: &ConstraintSystem) -> Translated {
    let mut vars = ProblemVariables::new();
    let columns: Vec<Variable> = system
        .bounds()
        .iter()
        .zip(system.integrality())
        .map(|(bounds, &integer)| {
            let mut def = variable();
            if bounds.lower.is_finite() {
                def = def.min(bounds.lower);
            }
            if bounds.upper.is_finite() {
                def = def.max(bounds.upper);
            }
            if integer {
                def = def.integer();
            }
            vars.add(def)
        })
        .collect();

    let mut objective = Expression::with_capacity(system.variables());
    for (column, &c) in columns.iter().zip(system.objective()) {
        if c != 0.0 {
            objective.add_mul(c, *column);
        }
    }

    let mut constraints =
        Vec::with_capacity(system.inequalities().len() + system.equalities().len());
    for constraint in system.inequalities() {
        constraints.push(expression(&columns, constraint.row.terms()).leq(constraint.rhs));
    }
    for constraint in system.equalities() {
        constraints.push(expression(&columns, constraint.row.terms()).eq(constraint.rhs));
    }
    debug!(
        variables = system.variables(),
        inequalities = system.inequalities().len(),
        equalities = system.equalities().len(),
        "handing model to good_lp"
    );

    Translated {
        vars,
        columns,
        objective,
        constraints,
    }
}

#[cfg(feature = "highs")]
fn solve_with_backend(
    system: &ConstraintSystem,
    time_limit: Duration,
) -> Result<(Vec<f64>, SolutionStatus), ResolutionError> {
    use good_lp::solvers::highs::highs;

    let model = translate(system);
    let mut problem = model
        .vars
        .minimise(model.objective)
        .using(highs)
        .set_option("output_flag", false)
        .set_option("time_limit", time_limit.as_secs_f64());
    for constraint in model.constraints {
        problem = problem.with(constraint);
    }
    let solution = problem.solve()?;
    Ok(read_values(&model.columns, &solution))
}

#[cfg(all(feature = "microlp", not(feature = "highs")))]
fn solve_with_backend(
    system: &ConstraintSystem,
    time_limit: Duration,
) -> Result<(Vec<f64>, SolutionStatus), ResolutionError> {
    use good_lp::solvers::microlp::microlp;

    debug!(
        limit_s = time_limit.as_secs_f64(),
        "microlp backend ignores the time limit"
    );
    let model = translate(system);
    let mut problem = model.vars.minimise(model.objective).using(microlp);
    for constraint in model.constraints {
        problem = problem.with(constraint);
    }
    let solution = problem.solve()?;
    Ok(read_values(&model.columns, &solution))
}

fn read_values(
    columns: &[Variable],
    solution: &impl good_lp::Solution,
) -> (Vec<f64>, SolutionStatus) {
    let values = columns.iter().map(|&v| solution.value(v)).collect();
    (values, solution.status())
}

fn expression(columns: &[Variable], terms: &[(usize, f64)]) -> Expression {
    let mut expr = Expression::with_capacity(terms.len());
    for &(index, c) in terms {
        expr.add_mul(c, columns[index]);
    }
    expr
}

fn failure_from(error: ResolutionError) -> SolverFailure {
    let status = match error {
        ResolutionError::Infeasible => FailureStatus::Infeasible,
        ResolutionError::Unbounded => FailureStatus::Unbounded,
        _ => FailureStatus::Other,
    };
    SolverFailure {
        status,
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::system::{Bounds, Row};

    #[test]
    fn solves_small_linear_program() {
        // max x + y, x + 2y <= 4, 3x + y <= 6
        let mut system = ConstraintSystem::new(2);
        system.add_inequality(Row::new().with(0, 1.0).with(1, 2.0), 4.0);
        system.add_inequality(Row::new().with(0, 3.0).with(1, 1.0), 6.0);
        system.set_objective(0, -1.0);
        system.set_objective(1, -1.0);

        let solution = GoodLpSolver
            .solve(&system, Duration::from_secs(10))
            .expect("must solve");
        assert_eq!(solution.status, PlanStatus::Optimal);
        assert!((solution.values[0] - 1.6).abs() < 1e-6);
        assert!((solution.values[1] - 1.2).abs() < 1e-6);
    }

    #[test]
    fn respects_integrality() {
        // max x + y, 2x <= 1.5, x binary, y <= 0.25: relaxation would pick x = 0.75
        let mut system = ConstraintSystem::new(2);
        system.add_inequality(Row::new().with(0, 2.0), 1.5);
        system.set_bounds(1, Bounds { lower: 0.0, upper: 0.25 });
        system.mark_binary(0);
        system.set_objective(0, -1.0);
        system.set_objective(1, -1.0);

        let solution = GoodLpSolver
            .solve(&system, Duration::from_secs(10))
            .expect("must solve");
        assert!(solution.values[0].abs() < 1e-6);
        assert!((solution.values[1] - 0.25).abs() < 1e-6);
    }

    fn binary_knapsack() -> ConstraintSystem {
        // max x + y, x + y <= 1.5, both binary
        let mut system = ConstraintSystem::new(2);
        system.add_inequality(Row::new().with(0, 1.0).with(1, 1.0), 1.5);
        system.mark_binary(0);
        system.mark_binary(1);
        system.set_objective(0, -1.0);
        system.set_objective(1, -1.0);
        system
    }

    #[test]
    fn time_limited_feasible_incumbent_is_kept() {
        let system = binary_knapsack();
        let solution = finish(
            &system,
            vec![1.0, 0.0],
            SolutionStatus::TimeLimit,
            Duration::from_secs(2),
        )
        .expect("feasible incumbent");
        assert_eq!(solution.status, PlanStatus::TimeLimited);
        assert_eq!(solution.values, vec![1.0, 0.0]);
    }

    #[test]
    fn time_limited_infeasible_values_are_not_an_incumbent() {
        let system = binary_knapsack();
        let failure = finish(
            &system,
            vec![1.0, 1.0],
            SolutionStatus::TimeLimit,
            Duration::from_secs(2),
        )
        .expect_err("violates the knapsack row");
        assert_eq!(failure.status, FailureStatus::TimeLimitWithoutIncumbent);
        assert_eq!(failure.status.code(), 1);
    }

    #[test]
    fn optimal_status_passes_through() {
        let system = binary_knapsack();
        let solution = finish(
            &system,
            vec![0.0, 1.0],
            SolutionStatus::Optimal,
            Duration::from_secs(2),
        )
        .expect("optimal");
        assert_eq!(solution.status, PlanStatus::Optimal);
    }

    #[test]
    fn infeasible_model_reports_status_and_message() {
        let mut system = ConstraintSystem::new(1);
        system.add_inequality(Row::new().with(0, 1.0), -1.0);

        let failure = GoodLpSolver
            .solve(&system, Duration::from_secs(10))
            .expect_err("x >= 0 and x <= -1 cannot hold");
        assert_eq!(failure.status, FailureStatus::Infeasible);
        assert!(!failure.message.is_empty());
    }
}
