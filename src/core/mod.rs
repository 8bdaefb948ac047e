mod builder;
mod engine;
mod error;
#[cfg(test)]
mod fixtures;
mod layout;
mod linearize;
mod projector;
mod rmd;
mod solver;
mod system;
mod types;

pub use builder::{AffineExpr, ConstraintBuilder, layout_for};
pub use engine::{run_plan, run_plan_with_defaults};
pub use error::{FailureStatus, ModelingLimitError, PlanError, ScenarioError, SolverFailure};
pub use layout::{FlowSlots, HeadroomSlots, RetirementYear, VariableLayout};
pub use projector::{OpeningBalances, PlanReport, RetirementYearRow, WorkYearRow, project};
pub use rmd::{RmdTable, UniformLifetimeTable};
pub use solver::{GoodLpSolver, MilpSolver, Solution};
pub use system::{BIG_M, Bounds, Constraint, ConstraintSystem, Row};
pub use types::{
    BracketTable, DEFAULT_NII_RATE, DEFAULT_RMD_START_AGE, IraAccount, Objective, PlanOptions,
    PlanStatus, RothAccount, RothContribution, SavingsAccount, ScenarioModel, SeppTerms, TaxBracket,
    TaxBump, WorkPhase, YearSchedule,
};
