use tracing::debug;

use super::error::{ModelingLimitError, PlanError, ScenarioError};
use super::layout::{HeadroomSlots, SEPP_AMOUNT, SPENDING_FLOOR, VariableLayout};
use super::linearize::{min_of_two, split_signed};
use super::rmd::RmdTable;
use super::system::{BIG_M, BIG_M_MARGIN, Bounds, ConstraintSystem, Row};
use super::types::{
    BracketTable, EARLY_WITHDRAWAL_AGE, EARLY_WITHDRAWAL_PENALTY, Objective, PlanOptions,
    ROTH_SEASONING_YEARS, ScenarioModel,
};

pub fn layout_for(scenario: &ScenarioModel) -> VariableLayout {
    VariableLayout::compute(
        scenario.work_years,
        scenario.plan_years,
        scenario.federal.len(),
        scenario.state.len(),
        scenario.capital_gains.len(),
    )
}

/// Linear expression plus a constant, for quantities that have no slot of
/// their own (work-year balances and distributions).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AffineExpr {
    pub row: Row,
    pub constant: f64,
}

impl AffineExpr {
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.row.evaluate(values) + self.constant
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkBalances {
    pub savings: AffineExpr,
    pub ira: AffineExpr,
    pub roth: AffineExpr,
}

/// Start-of-year balances for work year `year`: the opening balance grown to
/// that year plus every earlier deposit grown since it was made.
pub fn work_year_balances(
    scenario: &ScenarioModel,
    layout: &VariableLayout,
    year: usize,
) -> WorkBalances {
    let opening = scenario.growth(year);
    let mut balances = WorkBalances {
        savings: AffineExpr {
            row: Row::new(),
            constant: scenario.savings.balance * opening,
        },
        ira: AffineExpr {
            row: Row::new(),
            constant: scenario.ira.balance * opening,
        },
        roth: AffineExpr {
            row: Row::new(),
            constant: scenario.roth.balance * opening,
        },
    };
    for w in 0..year {
        let deposit = layout.work_year(w);
        let g = scenario.growth(year - w);
        balances.savings.row.add(deposit.from_savings, g);
        balances.ira.row.add(deposit.from_ira, g);
        balances.roth.row.add(deposit.from_roth, g);
    }
    balances
}

/// Gains distributed at the end of work year `year`, paid out of the balance
/// including that year's deposit.
pub fn work_year_distribution(
    scenario: &ScenarioModel,
    layout: &VariableLayout,
    year: usize,
) -> AffineExpr {
    let rate = scenario.returns * scenario.savings.distribution_yield;
    let savings = work_year_balances(scenario, layout, year).savings;
    let mut row = Row::new();
    for &(index, c) in savings.row.terms() {
        row.add(index, rate * c);
    }
    row.add(layout.work_year(year).from_savings, rate);
    AffineExpr {
        row,
        constant: rate * savings.constant,
    }
}

pub struct ConstraintBuilder<'a> {
    scenario: &'a ScenarioModel,
    layout: &'a VariableLayout,
    options: &'a PlanOptions,
    rmd: &'a dyn RmdTable,
    system: ConstraintSystem,
}

impl<'a> ConstraintBuilder<'a> {
    pub fn new(
        scenario: &'a ScenarioModel,
        layout: &'a VariableLayout,
        options: &'a PlanOptions,
        rmd: &'a dyn RmdTable,
    ) -> Result<Self, PlanError> {
        scenario.validate()?;
        check_layout(scenario, layout)?;
        check_linearization_constants(scenario)?;
        Ok(Self {
            scenario,
            layout,
            options,
            rmd,
            system: ConstraintSystem::new(layout.total()),
        })
    }

    pub fn build(mut self) -> ConstraintSystem {
        self.add_objective();
        self.add_sepp_toggle();
        for w in 0..self.scenario.work_years {
            self.add_work_year(w);
        }
        for y in 0..self.scenario.plan_years {
            self.add_retirement_year(y);
        }
        self.add_terminal_solvency();
        self.add_roth_target();
        self.add_roth_early_access();
        self.add_roth_seasoned_solvency();
        self.add_rmd_floors();

        debug!(
            variables = self.system.variables(),
            inequalities = self.system.inequalities().len(),
            equalities = self.system.equalities().len(),
            nonzeros = self.system.nonzeros(),
            binaries = self.system.integrality().iter().filter(|b| **b).count(),
            "built withdrawal model"
        );
        self.system
    }

    fn add_objective(&mut self) {
        match self.options.objective {
            Objective::MaximizeSpending => self.system.set_objective(SPENDING_FLOOR, -1.0),
            Objective::MinimizeTax { spending } => {
                self.system
                    .set_bounds(SPENDING_FLOOR, Bounds::fixed(spending));
                let layout = self.layout;
                for y in 0..self.scenario.plan_years {
                    self.system.set_objective(
                        layout.retirement_year(y).total_tax(),
                        1.0 / self.scenario.inflation_factor(y),
                    );
                }
            }
        }
    }

    fn add_sepp_toggle(&mut self) {
        if !self.options.sepp_enabled {
            self.system
                .add_equality(Row::new().with(SEPP_AMOUNT, 1.0), 0.0);
        }
    }

    fn add_work_year(&mut self, w: usize) {
        let s = self.scenario;
        let flows = self.layout.work_year(w);
        let indexed = s.inflation.powi(w as i32);

        let cap = if s.work.max_save_inflation {
            s.work.max_save * indexed
        } else {
            s.work.max_save
        };
        self.system.add_inequality(
            Row::new()
                .with(flows.from_savings, s.work.tax_multiplier)
                .with(flows.from_ira, 1.0)
                .with(flows.from_roth, s.work.tax_multiplier),
            cap,
        );
        self.system.add_inequality(
            Row::new().with(flows.from_ira, 1.0),
            s.ira.max_contribution * indexed,
        );
        self.system.add_inequality(
            Row::new().with(flows.from_roth, 1.0),
            s.roth.max_contribution * indexed,
        );
        self.system.set_bounds(flows.ira_to_roth, Bounds::fixed(0.0));
    }

    fn sepp_draw(&self, y: usize, row: &mut Row) {
        if self.scenario.sepp.draws_in(y) {
            row.add(SEPP_AMOUNT, 1.0 / self.scenario.sepp.ratio);
        }
    }

    /// IRA withdrawals, conversions and SEPP draws: everything taxed as
    /// ordinary income apart from the scheduled `taxed` amount.
    fn ordinary_income(&self, y: usize) -> Row {
        let year = self.layout.retirement_year(y);
        let mut row = Row::new()
            .with(year.from_ira(), 1.0)
            .with(year.ira_to_roth(), 1.0);
        self.sepp_draw(y, &mut row);
        row
    }

    fn investment_income(&self, y: usize) -> Row {
        let year = self.layout.retirement_year(y);
        Row::new()
            .with(year.from_savings(), self.scenario.basis_fraction(y))
            .with(year.gains_distribution(), 1.0)
    }

    fn add_retirement_year(&mut self, y: usize) {
        let s = self.scenario;
        let layout = self.layout;
        let year = layout.retirement_year(y);
        let scale = s.inflation_factor(y);
        let schedule = s.schedule[y];
        let ordinary = self.ordinary_income(y);
        let investment = self.investment_income(y);
        let distribution_rate = s.returns * s.savings.distribution_yield;

        // Distribution is paid from what stays invested after this year's
        // withdrawal.
        self.system.add_equality(
            Row::new()
                .with(year.gains_distribution(), 1.0)
                .with(year.savings_balance(), -distribution_rate)
                .with(year.from_savings(), distribution_rate),
            0.0,
        );

        if let Some(ceiling) = schedule.ceiling {
            let mut row = investment.clone();
            for &(i, c) in ordinary.terms() {
                row.add(i, c);
            }
            self.system.add_inequality(row, ceiling - schedule.taxed);
        }

        self.allocate_brackets(
            &s.federal,
            (year.standard_deduction(), s.standard_deduction * scale),
            |i| year.federal_bracket(i),
            ordinary.clone(),
            schedule.taxed,
            scale,
        );

        let mut state_income = ordinary.clone();
        for &(i, c) in investment.terms() {
            state_income.add(i, c);
        }
        self.allocate_brackets(
            &s.state,
            (year.state_deduction(), s.state_standard_deduction * scale),
            |i| year.state_bracket(i),
            state_income,
            schedule.state_taxed,
            scale,
        );

        // Gains stack on top of ordinary income: each bracket only has room
        // for gains where ordinary income has not already filled it.
        let mut over_deduction = ordinary.clone();
        over_deduction.add(year.standard_deduction(), -1.0);
        let mut gains_total = Row::new();
        for (idx, bracket) in s.capital_gains.brackets().iter().enumerate() {
            let headroom = year.gains_headroom(idx);
            gains_total.add(headroom.gains, 1.0);
            if bracket.is_open() {
                continue;
            }
            self.add_headroom(
                headroom,
                &over_deduction,
                bracket.low * scale - schedule.taxed,
                bracket.width() * scale,
            );
        }
        for &(i, c) in investment.terms() {
            gains_total.add(i, -c);
        }
        self.system.add_equality(gains_total, 0.0);

        let nii = year.nii();
        self.add_headroom(nii, &ordinary, -schedule.taxed, s.nii_threshold);
        let mut below_threshold = Row::new().with(nii.gains, 1.0);
        for &(i, c) in investment.terms() {
            below_threshold.add(i, -c);
        }
        self.system.add_inequality(below_threshold, 0.0);

        let mut federal = Row::new().with(year.federal_tax(), 1.0);
        if s.age_at(y) < EARLY_WITHDRAWAL_AGE {
            federal.add(year.from_ira(), -EARLY_WITHDRAWAL_PENALTY);
        }
        let bump = match self.options.tax_bump {
            Some(bump) if y > bump.after_year => bump.percent / 100.0,
            _ => 0.0,
        };
        for (idx, bracket) in s.federal.brackets().iter().enumerate() {
            federal.add(year.federal_bracket(idx), -(bracket.rate + bump));
        }
        for (idx, bracket) in s.capital_gains.brackets().iter().enumerate() {
            federal.add(year.gains_headroom(idx).gains, -bracket.rate);
        }
        // Surtax applies to investment income above what fits under the
        // threshold.
        for &(i, c) in investment.terms() {
            federal.add(i, -s.nii_rate * c);
        }
        federal.add(nii.gains, s.nii_rate);
        self.system.add_equality(federal, 0.0);

        let mut state = Row::new().with(year.state_tax(), 1.0);
        for (idx, bracket) in s.state.brackets().iter().enumerate() {
            state.add(year.state_bracket(idx), -bracket.rate);
        }
        self.system.add_equality(state, 0.0);

        self.system.add_equality(
            Row::new()
                .with(year.total_tax(), 1.0)
                .with(year.federal_tax(), -1.0)
                .with(year.state_tax(), -1.0),
            0.0,
        );

        self.add_spending_identity(y);
        self.add_balance_recurrences(y);
    }

    /// Deduction and per-bracket occupancies must add up to the taxable
    /// income; every bracket but the open top one is capped at its width.
    fn allocate_brackets(
        &mut self,
        table: &BracketTable,
        deduction: (usize, f64),
        occupancy: impl Fn(usize) -> usize,
        income: Row,
        fixed_income: f64,
        scale: f64,
    ) {
        let (deduction_slot, deduction_amount) = deduction;
        self.system
            .add_inequality(Row::new().with(deduction_slot, 1.0), deduction_amount);

        let mut total = income;
        total.add(deduction_slot, -1.0);
        for (idx, bracket) in table.brackets().iter().enumerate() {
            if !bracket.is_open() {
                self.system.add_inequality(
                    Row::new().with(occupancy(idx), 1.0),
                    bracket.width() * scale,
                );
            }
            total.add(occupancy(idx), -1.0);
        }
        self.system.add_equality(total, -fixed_income);
    }

    /// `positive - negative = consumer - threshold`, clamp at zero, cap at
    /// the bracket width, and leave the rest of the bracket for gains.
    fn add_headroom(&mut self, slots: HeadroomSlots, consumer: &Row, rhs: f64, width: f64) {
        let mut row = consumer.clone();
        row.add(slots.positive, -1.0);
        row.add(slots.negative, 1.0);
        self.system.add_equality(row, rhs);

        split_signed(&mut self.system, slots.split());

        self.system
            .add_equality(Row::new().with(slots.width, 1.0), width);
        min_of_two(&mut self.system, slots.min());

        self.system.add_inequality(
            Row::new()
                .with(slots.consumed, 1.0)
                .with(slots.gains, 1.0),
            width,
        );
    }

    fn add_spending_identity(&mut self, y: usize) {
        let s = self.scenario;
        let layout = self.layout;
        let year = layout.retirement_year(y);
        let schedule = s.schedule[y];
        let mut rhs = schedule.expense - schedule.income;

        let mut row = Row::new()
            .with(year.from_savings(), 1.0)
            .with(year.from_ira(), 1.0)
            .with(year.from_roth(), 1.0)
            .with(year.total_tax(), -1.0)
            .with(SPENDING_FLOOR, -s.inflation_factor(y));
        self.sepp_draw(y, &mut row);

        // Last year's distribution is spent this year.
        if y > 0 {
            row.add(layout.retirement_year(y - 1).gains_distribution(), 1.0);
        } else if s.work_years > 0 {
            let prior = work_year_distribution(s, layout, s.work_years - 1);
            for &(i, c) in prior.row.terms() {
                row.add(i, c);
            }
            rhs -= prior.constant;
        }
        self.system.add_equality(row, rhs);
    }

    fn add_balance_recurrences(&mut self, y: usize) {
        let s = self.scenario;
        let layout = self.layout;
        let year = layout.retirement_year(y);
        let w_total = s.work_years;
        let opening = s.growth(w_total + y);

        let mut savings = Row::new().with(year.savings_balance(), 1.0);
        let mut ira = Row::new().with(year.ira_balance(), 1.0);
        let mut roth = Row::new().with(year.roth_balance(), 1.0);
        for w in 0..w_total {
            let deposit = layout.work_year(w);
            let g = s.growth(y + w_total - w);
            savings.add(deposit.from_savings, -g);
            ira.add(deposit.from_ira, -g);
            roth.add(deposit.from_roth, -g);
        }
        for u in 0..y {
            let past = layout.retirement_year(u);
            let g = s.growth(y - u);
            savings.add(past.from_savings(), g);
            savings.add(past.gains_distribution(), s.growth(y - u - 1));
            ira.add(past.from_ira(), g);
            ira.add(past.ira_to_roth(), g);
            roth.add(past.from_roth(), g);
            roth.add(past.ira_to_roth(), -g);
        }
        self.system
            .add_equality(savings, s.savings.balance * opening);
        self.system.add_equality(ira, s.ira.balance * opening);
        self.system.add_equality(roth, s.roth.balance * opening);
    }

    fn add_terminal_solvency(&mut self) {
        let s = self.scenario;
        let layout = self.layout;
        let n = s.plan_years;
        let w_total = s.work_years;

        let mut savings = Row::new();
        let mut ira = Row::new();
        let mut roth = Row::new();
        for y in 0..n {
            let year = layout.retirement_year(y);
            let g = s.growth(n - y);
            savings.add(year.from_savings(), g);
            savings.add(year.gains_distribution(), s.growth(n - y - 1));
            ira.add(year.from_ira(), g);
            ira.add(year.ira_to_roth(), g);
            if s.sepp.draws_in(y) {
                ira.add(SEPP_AMOUNT, g / s.sepp.ratio);
            }
            roth.add(year.from_roth(), g);
            roth.add(year.ira_to_roth(), -g);
        }
        for w in 0..w_total {
            let deposit = layout.work_year(w);
            let g = s.growth(n + w_total - w);
            savings.add(deposit.from_savings, -g);
            ira.add(deposit.from_ira, -g);
            roth.add(deposit.from_roth, -g);
        }
        let horizon = s.growth(w_total + n);
        self.system
            .add_inequality(savings, s.savings.balance * horizon);
        self.system.add_inequality(ira, s.ira.balance * horizon);
        self.system.add_inequality(roth, s.roth.balance * horizon);
    }

    /// Final Roth value including the last year's growth, pinned to a target
    /// stated in today's dollars.
    fn add_roth_target(&mut self) {
        let Some(target) = self.options.roth_target else {
            return;
        };
        let s = self.scenario;
        let last = self.layout.retirement_year(s.plan_years - 1);
        let row = Row::new()
            .with(last.roth_balance(), s.returns)
            .with(last.ira_to_roth(), s.returns)
            .with(last.from_roth(), -s.returns);
        let today = s.inflation.powi((s.work_years + s.plan_years) as i32);
        self.system.add_equality(row, target * today);
    }

    /// Before 59 only seasoned money can leave the Roth: listed contributions
    /// and conversions at least five years old.
    fn add_roth_early_access(&mut self) {
        let s = self.scenario;
        let layout = self.layout;
        let w_total = s.work_years;
        let years = s
            .plan_years
            .min(EARLY_WITHDRAWAL_AGE.saturating_sub(s.retire_age) as usize);
        let seasoning = ROTH_SEASONING_YEARS as usize;

        for y in 0..years {
            let mut row = Row::new();
            for u in 0..=y {
                row.add(layout.retirement_year(u).from_roth(), 1.0);
            }
            for u in 0..(y + 1).saturating_sub(seasoning) {
                row.add(layout.retirement_year(u).ira_to_roth(), -1.0);
            }
            let aged_work_years = (w_total + y + 1).saturating_sub(seasoning).min(w_total);
            for w in 0..aged_work_years {
                row.add(layout.work_year(w).from_roth, -1.0);
            }
            self.system
                .add_inequality(row, s.seasoned_contributions(s.age_at(y)));
        }
    }

    /// From 59 on the whole Roth is reachable, but conversions still count
    /// only once seasoned, and the balance they leave must stay non-negative
    /// through the horizon.
    fn add_roth_seasoned_solvency(&mut self) {
        let s = self.scenario;
        let layout = self.layout;
        let w_total = s.work_years;
        let first = EARLY_WITHDRAWAL_AGE.saturating_sub(s.retire_age) as usize;
        let lag = ROTH_SEASONING_YEARS as usize;

        for y in first..=s.plan_years {
            let mut row = Row::new();
            for u in 0..y {
                row.add(layout.retirement_year(u).from_roth(), s.growth(y - u));
            }
            for u in 0..y.saturating_sub(lag) {
                row.add(layout.retirement_year(u).ira_to_roth(), -s.growth(y - u));
            }
            for w in 0..w_total {
                row.add(layout.work_year(w).from_roth, -s.growth(w_total + y - w));
            }
            if row.is_empty() {
                continue;
            }
            self.system
                .add_inequality(row, s.roth.balance * s.growth(w_total + y));
        }
    }

    /// `divisor(age) * from_ira >= start-of-year IRA balance`.
    fn add_rmd_floors(&mut self) {
        let s = self.scenario;
        let layout = self.layout;
        let w_total = s.work_years;
        let first = s.rmd_start_age.saturating_sub(s.retire_age) as usize;

        for y in first..s.plan_years {
            let mut row = Row::new();
            for u in 0..y {
                let past = layout.retirement_year(u);
                let g = s.growth(y - u);
                row.add(past.from_ira(), -g);
                row.add(past.ira_to_roth(), -g);
                if s.sepp.draws_in(u) {
                    row.add(SEPP_AMOUNT, -g / s.sepp.ratio);
                }
            }
            for w in 0..w_total {
                row.add(layout.work_year(w).from_ira, s.growth(w_total + y - w));
            }
            row.add(
                layout.retirement_year(y).from_ira(),
                -self.rmd.divisor(s.age_at(y)),
            );
            self.system
                .add_inequality(row, -s.ira.balance * s.growth(w_total + y));
        }
    }
}

fn check_layout(scenario: &ScenarioModel, layout: &VariableLayout) -> Result<(), ScenarioError> {
    for (what, expected, found) in [
        ("work years", scenario.work_years, layout.work_years()),
        ("plan years", scenario.plan_years, layout.plan_years()),
        ("federal brackets", scenario.federal.len(), layout.federal_bracket_count()),
        ("state brackets", scenario.state.len(), layout.state_bracket_count()),
        ("capital-gains brackets", scenario.capital_gains.len(), layout.gains_bracket_count()),
    ] {
        if expected != found {
            return Err(ScenarioError::LayoutMismatch {
                what,
                expected,
                found,
            });
        }
    }
    Ok(())
}

/// Constants that feed a signed split or min must stay clear of big-M.
fn check_linearization_constants(scenario: &ScenarioModel) -> Result<(), ModelingLimitError> {
    let limit = BIG_M * (1.0 - BIG_M_MARGIN);
    let fail = |what: String, value: f64| ModelingLimitError {
        what,
        value,
        big_m: BIG_M,
        margin_pct: BIG_M_MARGIN * 100.0,
    };

    if scenario.nii_threshold >= limit {
        return Err(fail("NII threshold".to_string(), scenario.nii_threshold));
    }
    for y in 0..scenario.plan_years {
        let scale = scenario.inflation_factor(y);
        let taxed = scenario.schedule[y].taxed;
        if taxed.abs() >= limit {
            return Err(fail(format!("taxed income in year {y}"), taxed));
        }
        for bracket in scenario.capital_gains.brackets().iter().filter(|b| !b.is_open()) {
            let high = bracket.high * scale;
            if high >= limit {
                return Err(fail(
                    format!("capital-gains bracket edge in year {y}"),
                    high,
                ));
            }
        }
    }
    Ok(())
}
