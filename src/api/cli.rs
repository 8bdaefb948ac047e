use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use super::PlanRequest;
use super::report::{render_csv, render_text};
use crate::config::load_scenario;
use crate::core::{PlanError, run_plan_with_defaults};

#[derive(Parser, Debug)]
#[command(
    name = "fire-plan",
    about = "Retirement withdrawal planner (taxable savings + IRA + Roth) solved as a MILP"
)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Log model sizes and solver progress")]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Solve one scenario file and print the plan.
    Solve(SolveArgs),
    /// Serve the planner over HTTP.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SolveArgs {
    pub conffile: PathBuf,
    #[arg(long, help = "Fix yearly spending (today's dollars) and minimize taxes instead")]
    pub spend: Option<f64>,
    #[arg(long, help = "Final Roth balance to leave, in today's dollars")]
    pub roth: Option<f64>,
    #[arg(long, help = "Return the best answer found after this many seconds")]
    pub timelimit: Option<f64>,
    #[arg(long, help = "Print CSV instead of the table")]
    pub csv: bool,
    #[arg(
        long,
        requires = "bumpstart",
        help = "Add this many percentage points to every federal bracket"
    )]
    pub bumptax: Option<f64>,
    #[arg(long, requires = "bumptax", help = "Retirement year after which the bump applies")]
    pub bumpstart: Option<usize>,
    #[arg(long, help = "Let the model choose a SEPP annuity")]
    pub sepp: bool,
}

impl SolveArgs {
    fn request(&self) -> PlanRequest {
        PlanRequest {
            spend: self.spend,
            roth: self.roth,
            time_limit: self.timelimit,
            bump_tax: self.bumptax,
            bump_start: self.bumpstart,
            sepp: self.sepp,
        }
    }
}

pub fn run_solve(args: &SolveArgs) -> Result<String, PlanError> {
    let options = args.request().options()?;
    let scenario = load_scenario(&args.conffile)?;
    let report = run_plan_with_defaults(&scenario, &options)?;
    Ok(if args.csv {
        render_csv(&report)
    } else {
        render_text(&report)
    })
}

/// Solver failures exit with their status code; everything else with 1.
pub fn exit_code(err: &PlanError) -> i32 {
    match err {
        PlanError::Solver(failure) => failure.status.code(),
        _ => 1,
    }
}
