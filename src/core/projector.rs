use serde::Serialize;

use super::builder::{work_year_balances, work_year_distribution};
use super::error::ModelingLimitError;
use super::layout::{SEPP_AMOUNT, SPENDING_FLOOR, VariableLayout};
use super::solver::Solution;
use super::types::{PlanStatus, ScenarioModel};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkYearRow {
    pub age: u32,
    pub savings: f64,
    pub to_savings: f64,
    pub ira: f64,
    pub to_ira: f64,
    pub roth: f64,
    pub to_roth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetirementYearRow {
    pub age: u32,
    pub savings: f64,
    pub from_savings: f64,
    pub ira: f64,
    pub from_ira: f64,
    pub sepp: f64,
    pub roth: f64,
    pub from_roth: f64,
    pub ira_to_roth: f64,
    pub marginal_rate: f64,
    pub federal_tax: f64,
    pub state_tax: f64,
    pub total_tax: f64,
    pub spending: f64,
    pub extra: f64,
    pub gains_distribution: f64,
    pub income: f64,
    pub expense: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningBalances {
    pub savings: f64,
    pub savings_basis: f64,
    pub ira: f64,
    pub roth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReport {
    pub status: PlanStatus,
    pub message: String,
    pub spending_floor: f64,
    pub sepp_amount: f64,
    pub sepp_ratio: f64,
    pub opening: OpeningBalances,
    pub work_years: Vec<WorkYearRow>,
    pub retirement_years: Vec<RetirementYearRow>,
    /// Lifetime spending in today's dollars.
    pub total_spending: f64,
    /// Lifetime tax in today's dollars.
    pub total_tax: f64,
    pub final_roth: f64,
    pub modeling_limit: Option<ModelingLimitError>,
}

impl PlanReport {
    pub fn tax_share(&self) -> f64 {
        let total = self.total_spending + self.total_tax;
        if total > 0.0 {
            self.total_tax / total
        } else {
            0.0
        }
    }
}

pub fn project(
    solution: &Solution,
    scenario: &ScenarioModel,
    layout: &VariableLayout,
) -> PlanReport {
    let x = &solution.values;
    let sepp_amount = x[SEPP_AMOUNT];

    let work_years = (0..scenario.work_years)
        .map(|w| {
            let deposit = layout.work_year(w);
            let balances = work_year_balances(scenario, layout, w);
            WorkYearRow {
                age: scenario.start_age + w as u32,
                savings: balances.savings.evaluate(x),
                to_savings: x[deposit.from_savings],
                ira: balances.ira.evaluate(x),
                to_ira: x[deposit.from_ira],
                roth: balances.roth.evaluate(x),
                to_roth: x[deposit.from_roth],
            }
        })
        .collect();

    let mut retirement_years = Vec::with_capacity(scenario.plan_years);
    let mut total_spending = 0.0;
    let mut total_tax = 0.0;
    let mut prior_distribution = match scenario.work_years {
        0 => 0.0,
        w => work_year_distribution(scenario, layout, w - 1).evaluate(x),
    };

    for y in 0..scenario.plan_years {
        let year = layout.retirement_year(y);
        let scale = scenario.inflation_factor(y);
        let schedule = scenario.schedule[y];
        let sepp = if scenario.sepp.draws_in(y) {
            sepp_amount / scenario.sepp.ratio
        } else {
            0.0
        };
        let from_savings = x[year.from_savings()];
        let from_ira = x[year.from_ira()];
        let from_roth = x[year.from_roth()];
        let ira_to_roth = x[year.ira_to_roth()];
        let distribution = x[year.gains_distribution()];
        let tax = x[year.total_tax()];

        let ordinary = from_ira + ira_to_roth + sepp;
        let federal_income = ordinary - scenario.standard_deduction * scale + schedule.taxed;
        let state_income = ordinary - scenario.state_standard_deduction * scale
            + schedule.state_taxed
            + scenario.basis_fraction(y) * from_savings
            + distribution;
        let marginal_rate = scenario.federal.marginal_rate(federal_income, scale)
            + scenario.state.marginal_rate(state_income, scale);

        let extra = schedule.expense - schedule.income;
        let spending =
            from_savings + prior_distribution + from_ira + from_roth + sepp - tax - extra;
        total_spending += spending / scale;
        total_tax += tax / scale;
        prior_distribution = distribution;

        retirement_years.push(RetirementYearRow {
            age: scenario.age_at(y),
            savings: x[year.savings_balance()],
            from_savings,
            ira: x[year.ira_balance()],
            from_ira,
            sepp,
            roth: x[year.roth_balance()],
            from_roth,
            ira_to_roth,
            marginal_rate,
            federal_tax: x[year.federal_tax()],
            state_tax: x[year.state_tax()],
            total_tax: tax,
            spending,
            extra,
            gains_distribution: distribution,
            income: schedule.income,
            expense: schedule.expense,
        });
    }

    let final_roth = retirement_years
        .last()
        .map(|r| scenario.returns * (r.roth + r.ira_to_roth - r.from_roth))
        .unwrap_or(scenario.roth.balance);

    PlanReport {
        status: solution.status,
        message: solution.message.clone(),
        spending_floor: x[SPENDING_FLOOR],
        sepp_amount,
        sepp_ratio: scenario.sepp.ratio,
        opening: OpeningBalances {
            savings: scenario.savings.balance,
            savings_basis: scenario.savings.basis,
            ira: scenario.ira.balance,
            roth: scenario.roth.balance,
        },
        work_years,
        retirement_years,
        total_spending,
        total_tax,
        final_roth,
        modeling_limit: None,
    }
}
