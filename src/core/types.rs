use std::time::Duration;

use serde::Serialize;

use super::error::ScenarioError;

pub const EARLY_WITHDRAWAL_AGE: u32 = 59;
pub const EARLY_WITHDRAWAL_PENALTY: f64 = 0.10;
pub const ROTH_SEASONING_YEARS: u32 = 5;
pub const DEFAULT_RMD_START_AGE: u32 = 73;
pub const DEFAULT_NII_RATE: f64 = 0.038;
pub const DEFAULT_SEPP_RATIO: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TaxBracket {
    pub rate: f64,
    pub low: f64,
    pub high: f64,
}

impl TaxBracket {
    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    pub fn is_open(&self) -> bool {
        self.high.is_infinite()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BracketTable {
    brackets: Vec<TaxBracket>,
}

impl BracketTable {
    /// Builds a table from `(low, rate)` pairs; each high is the next low and
    /// the last bracket is open-ended.
    pub fn from_rates(table: &'static str, rates: &[(f64, f64)]) -> Result<Self, ScenarioError> {
        let Some(&(first_low, _)) = rates.first() else {
            return Err(ScenarioError::EmptyBrackets { table });
        };
        if first_low != 0.0 {
            return Err(ScenarioError::BracketStart {
                table,
                low: first_low,
            });
        }

        let mut brackets = Vec::with_capacity(rates.len());
        for (index, &(low, rate)) in rates.iter().enumerate() {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ScenarioError::BracketRate { table, index, rate });
            }
            let high = match rates.get(index + 1) {
                Some(&(next_low, _)) => next_low,
                None => f64::INFINITY,
            };
            if !low.is_finite() || high <= low {
                return Err(ScenarioError::BracketOrder {
                    table,
                    index: index + 1,
                });
            }
            brackets.push(TaxBracket { rate, low, high });
        }
        Ok(Self { brackets })
    }

    pub fn flat(table: &'static str, rate: f64) -> Result<Self, ScenarioError> {
        Self::from_rates(table, &[(0.0, rate)])
    }

    pub fn brackets(&self) -> &[TaxBracket] {
        &self.brackets
    }

    pub fn len(&self) -> usize {
        self.brackets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brackets.is_empty()
    }

    /// Rate of the first bracket whose scaled high covers `income`.
    pub fn marginal_rate(&self, income: f64, scale: f64) -> f64 {
        if income <= 0.0 {
            return 0.0;
        }
        self.brackets
            .iter()
            .find(|b| income <= b.high * scale)
            .map(|b| b.rate)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavingsAccount {
    pub balance: f64,
    pub basis: f64,
    pub distribution_yield: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IraAccount {
    pub balance: f64,
    pub max_contribution: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RothContribution {
    pub age: u32,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RothAccount {
    pub balance: f64,
    pub max_contribution: f64,
    pub contributions: Vec<RothContribution>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkPhase {
    pub max_save: f64,
    pub max_save_inflation: bool,
    pub tax_multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YearSchedule {
    pub income: f64,
    pub expense: f64,
    pub taxed: f64,
    pub state_taxed: f64,
    pub ceiling: Option<f64>,
}

impl YearSchedule {
    pub fn empty() -> Self {
        Self {
            income: 0.0,
            expense: 0.0,
            taxed: 0.0,
            state_taxed: 0.0,
            ceiling: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeppTerms {
    pub ratio: f64,
    pub draw_years: usize,
}

impl SeppTerms {
    pub fn for_retire_age(retire_age: u32) -> Self {
        Self {
            ratio: DEFAULT_SEPP_RATIO,
            draw_years: (EARLY_WITHDRAWAL_AGE.saturating_sub(retire_age) as usize).max(5),
        }
    }

    pub fn draws_in(&self, year: usize) -> bool {
        year < self.draw_years
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioModel {
    pub inflation: f64,
    pub returns: f64,
    pub start_age: u32,
    pub retire_age: u32,
    pub end_age: u32,
    pub work_years: usize,
    pub plan_years: usize,
    pub federal: BracketTable,
    pub state: BracketTable,
    pub capital_gains: BracketTable,
    pub standard_deduction: f64,
    pub state_standard_deduction: f64,
    pub nii_threshold: f64,
    pub nii_rate: f64,
    pub savings: SavingsAccount,
    pub ira: IraAccount,
    pub roth: RothAccount,
    pub work: WorkPhase,
    pub schedule: Vec<YearSchedule>,
    pub rmd_start_age: u32,
    pub sepp: SeppTerms,
}

impl ScenarioModel {
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.end_age <= self.retire_age || self.plan_years == 0 {
            return Err(ScenarioError::EmptyPlan {
                retire_age: self.retire_age,
                end_age: self.end_age,
            });
        }
        if self.start_age as u64 + self.work_years as u64 != self.retire_age as u64 {
            return Err(ScenarioError::RetireAge {
                start_age: self.start_age,
                work_years: self.work_years,
                retire_age: self.retire_age,
            });
        }
        let span = (self.end_age - self.retire_age) as usize;
        if self.plan_years != span {
            return Err(ScenarioError::PlanYears {
                retire_age: self.retire_age,
                end_age: self.end_age,
                expected: span,
                found: self.plan_years,
            });
        }
        if self.schedule.len() != self.plan_years {
            return Err(ScenarioError::ScheduleLength {
                expected: self.plan_years,
                found: self.schedule.len(),
            });
        }
        for (field, value) in [("inflation", self.inflation), ("returns", self.returns)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ScenarioError::Multiplier { field, value });
            }
        }
        for (field, value) in [
            ("savings balance", self.savings.balance),
            ("savings basis", self.savings.basis),
            ("distribution yield", self.savings.distribution_yield),
            ("IRA balance", self.ira.balance),
            ("IRA max contribution", self.ira.max_contribution),
            ("Roth balance", self.roth.balance),
            ("Roth max contribution", self.roth.max_contribution),
            ("standard deduction", self.standard_deduction),
            ("state standard deduction", self.state_standard_deduction),
            ("NII threshold", self.nii_threshold),
            ("NII rate", self.nii_rate),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ScenarioError::Negative { field, value });
            }
        }
        Ok(())
    }

    /// Inflation multiplier for retirement year `year`, measured from the
    /// start of the work phase.
    pub fn inflation_factor(&self, year: usize) -> f64 {
        self.inflation.powi((year + self.work_years) as i32)
    }

    pub fn growth(&self, years: usize) -> f64 {
        self.returns.powi(years as i32)
    }

    pub fn age_at(&self, year: usize) -> u32 {
        self.retire_age + year as u32
    }

    /// Share of a savings withdrawal in retirement year `year` that counts as
    /// realized gain, under a constant-yield compounding approximation.
    pub fn basis_fraction(&self, year: usize) -> f64 {
        if self.savings.basis <= 0.0 {
            return 1.0;
        }
        if self.savings.balance <= 0.0 {
            return 0.0;
        }
        let compounded = (self.returns - self.savings.distribution_yield)
            .powi((year + self.work_years) as i32);
        (1.0 - self.savings.basis / (self.savings.balance * compounded)).max(0.0)
    }

    /// Roth contribution events old enough to withdraw at `age`.
    pub fn seasoned_contributions(&self, age: u32) -> f64 {
        self.roth
            .contributions
            .iter()
            .filter(|c| c.age + ROTH_SEASONING_YEARS <= age)
            .map(|c| c.amount)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Objective {
    MaximizeSpending,
    MinimizeTax { spending: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxBump {
    pub percent: f64,
    pub after_year: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanOptions {
    pub objective: Objective,
    pub roth_target: Option<f64>,
    pub tax_bump: Option<TaxBump>,
    pub sepp_enabled: bool,
    pub time_limit: Duration,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            objective: Objective::MaximizeSpending,
            roth_target: None,
            tax_bump: None,
            sepp_enabled: false,
            time_limit: Duration::from_secs(300),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanStatus {
    Optimal,
    TimeLimited,
}
