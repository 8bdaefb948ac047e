use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScenarioError {
    #[error("plan must cover at least one retirement year (retire age {retire_age}, end age {end_age})")]
    EmptyPlan { retire_age: u32, end_age: u32 },
    #[error("{table} bracket table is empty")]
    EmptyBrackets { table: &'static str },
    #[error("{table} bracket table must start at 0 (found {low})")]
    BracketStart { table: &'static str, low: f64 },
    #[error("{table} bracket lows must be strictly increasing (bracket {index})")]
    BracketOrder { table: &'static str, index: usize },
    #[error("{table} bracket {index} has rate {rate} outside [0, 1]")]
    BracketRate {
        table: &'static str,
        index: usize,
        rate: f64,
    },
    #[error("plan has {found} years but ages {retire_age}..{end_age} span {expected}")]
    PlanYears {
        retire_age: u32,
        end_age: u32,
        expected: usize,
        found: usize,
    },
    #[error("retire age {retire_age} is not start age {start_age} plus {work_years} work years")]
    RetireAge {
        start_age: u32,
        work_years: usize,
        retire_age: u32,
    },
    #[error("variable layout was built for {found} {what} but the scenario has {expected}")]
    LayoutMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("schedule has {found} years but the plan covers {expected}")]
    ScheduleLength { expected: usize, found: usize },
    #[error("{field} must be finite and >= 0 (found {value})")]
    Negative { field: &'static str, value: f64 },
    #[error("{field} multiplier must be > 0 (found {value})")]
    Multiplier { field: &'static str, value: f64 },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FailureStatus {
    Infeasible,
    Unbounded,
    TimeLimitWithoutIncumbent,
    Other,
}

impl FailureStatus {
    pub fn code(self) -> i32 {
        match self {
            FailureStatus::Infeasible => 2,
            FailureStatus::Unbounded => 3,
            FailureStatus::TimeLimitWithoutIncumbent => 1,
            FailureStatus::Other => 4,
        }
    }
}

impl fmt::Display for FailureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureStatus::Infeasible => "infeasible",
            FailureStatus::Unbounded => "unbounded",
            FailureStatus::TimeLimitWithoutIncumbent => "time limit reached without a solution",
            FailureStatus::Other => "solver error",
        };
        write!(f, "{label} (status {})", self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("solver failed: {status}: {message}")]
pub struct SolverFailure {
    pub status: FailureStatus,
    pub message: String,
}

/// A value reached the big-M constant, so the signed-split and min
/// linearizations can no longer be trusted.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{what} = {value:.2} is within {margin_pct}% of big-M {big_m}; result is suspect")]
pub struct ModelingLimitError {
    pub what: String,
    pub value: f64,
    pub big_m: f64,
    pub margin_pct: f64,
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid scenario: {0}")]
    Scenario(#[from] ScenarioError),
    #[error(transparent)]
    Solver(#[from] SolverFailure),
    #[error(transparent)]
    ModelingLimit(#[from] ModelingLimitError),
}
