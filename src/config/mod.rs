use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::core::{
    BracketTable, DEFAULT_NII_RATE, DEFAULT_RMD_START_AGE, IraAccount, RothAccount,
    RothContribution, SavingsAccount, ScenarioError, ScenarioModel, SeppTerms, WorkPhase,
    YearSchedule,
};

/// Open-ended age ranges (`"70-"`) run through this age.
pub const MAX_AGE: u32 = 120;

const DEFAULT_FEDERAL_RATES: [[f64; 2]; 7] = [
    [0.0, 10.0],
    [22_000.0, 12.0],
    [89_450.0, 22.0],
    [190_750.0, 24.0],
    [364_200.0, 32.0],
    [462_500.0, 35.0],
    [693_750.0, 37.0],
];
const DEFAULT_GAINS_RATES: [[f64; 2]; 3] = [[0.0, 0.0], [89_250.0, 15.0], [553_850.0, 20.0]];
const DEFAULT_STANDARD_DEDUCTION: f64 = 27_700.0;
const DEFAULT_NII_THRESHOLD: f64 = 250_000.0;
const DEFAULT_IRA_MAX_CONTRIBUTION: f64 = 33_500.0;
const DEFAULT_ROTH_MAX_CONTRIBUTION: f64 = 14_000.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scenario: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("bad age list {0:?}")]
    BadAge(String),
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
}

#[derive(Debug, Deserialize)]
struct RawScenario {
    startage: u32,
    endage: Option<u32>,
    #[serde(default)]
    inflation: f64,
    #[serde(default = "default_returns")]
    returns: f64,
    #[serde(default)]
    taxes: RawTaxes,
    prep: Option<RawPrep>,
    #[serde(default)]
    aftertax: RawAfterTax,
    #[serde(rename = "IRA", default)]
    ira: RawIra,
    #[serde(default)]
    roth: RawRoth,
    #[serde(default)]
    expense: BTreeMap<String, RawExpense>,
    #[serde(default)]
    income: BTreeMap<String, RawIncome>,
}

fn default_returns() -> f64 {
    6.0
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawStateRate {
    Flat(f64),
    Table(Vec<[f64; 2]>),
}

#[derive(Debug, Default, Deserialize)]
struct RawTaxes {
    taxrates: Option<Vec<[f64; 2]>>,
    state_rate: Option<RawStateRate>,
    cg_taxrates: Option<Vec<[f64; 2]>>,
    stded: Option<f64>,
    state_stded: Option<f64>,
    nii: Option<f64>,
    nii_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawPrep {
    workyears: usize,
    maxsave: f64,
    #[serde(default = "default_true")]
    inflation: bool,
    #[serde(default = "default_work_tax_rate")]
    tax_rate: f64,
}

fn default_true() -> bool {
    true
}

fn default_work_tax_rate() -> f64 {
    25.0
}

#[derive(Debug, Default, Deserialize)]
struct RawAfterTax {
    #[serde(default)]
    bal: f64,
    #[serde(default)]
    basis: f64,
    #[serde(default)]
    distributions: f64,
}

#[derive(Debug, Deserialize)]
struct RawIra {
    #[serde(default)]
    bal: f64,
    #[serde(default = "default_ira_max")]
    maxcontrib: f64,
    rmd_start: Option<u32>,
}

impl Default for RawIra {
    fn default() -> Self {
        Self {
            bal: 0.0,
            maxcontrib: DEFAULT_IRA_MAX_CONTRIBUTION,
            rmd_start: None,
        }
    }
}

fn default_ira_max() -> f64 {
    DEFAULT_IRA_MAX_CONTRIBUTION
}

#[derive(Debug, Deserialize)]
struct RawRoth {
    #[serde(default)]
    bal: f64,
    #[serde(default = "default_roth_max")]
    maxcontrib: f64,
    #[serde(default)]
    contributions: Vec<(u32, f64)>,
}

impl Default for RawRoth {
    fn default() -> Self {
        Self {
            bal: 0.0,
            maxcontrib: DEFAULT_ROTH_MAX_CONTRIBUTION,
            contributions: Vec::new(),
        }
    }
}

fn default_roth_max() -> f64 {
    DEFAULT_ROTH_MAX_CONTRIBUTION
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAges {
    Single(u32),
    List(String),
}

impl RawAges {
    fn ages(&self) -> Result<Vec<u32>, ConfigError> {
        match self {
            RawAges::Single(age) if *age <= MAX_AGE => Ok(vec![*age]),
            RawAges::Single(age) => Err(ConfigError::BadAge(age.to_string())),
            RawAges::List(text) => parse_age_list(text),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawExpense {
    amount: f64,
    age: RawAges,
    #[serde(default)]
    inflation: bool,
}

#[derive(Debug, Deserialize)]
struct RawIncome {
    amount: f64,
    age: RawAges,
    #[serde(default)]
    inflation: bool,
    #[serde(default)]
    tax: bool,
    state_tax: Option<bool>,
    ceiling: Option<f64>,
}

/// Expands `"55,60-62,70-"` into the listed ages; a trailing `-` runs
/// through [`MAX_AGE`]. Ages above [`MAX_AGE`] and backwards ranges are
/// rejected.
pub fn parse_age_list(text: &str) -> Result<Vec<u32>, ConfigError> {
    let bad = || ConfigError::BadAge(text.to_string());
    let number = |s: &str| -> Result<u32, ConfigError> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        match s.parse::<u32>() {
            Ok(age) if age <= MAX_AGE => Ok(age),
            _ => Err(bad()),
        }
    };

    let mut ages = Vec::new();
    for item in text.split(',') {
        let item = item.trim();
        let (start, end) = match item.split_once('-') {
            None => {
                let age = number(item)?;
                (age, age)
            }
            Some((start, "")) => (number(start)?, MAX_AGE),
            Some((start, end)) => (number(start)?, number(end)?),
        };
        if start > end {
            return Err(bad());
        }
        ages.extend(start..=end);
    }
    Ok(ages)
}

pub fn load_scenario(path: &Path) -> Result<ScenarioModel, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_scenario(&text)
}

pub fn parse_scenario(text: &str) -> Result<ScenarioModel, ConfigError> {
    let raw: RawScenario = toml::from_str(text)?;
    let scenario = raw.into_scenario()?;
    debug!(
        retire_age = scenario.retire_age,
        plan_years = scenario.plan_years,
        work_years = scenario.work_years,
        "loaded scenario"
    );
    Ok(scenario)
}

fn percent_table(table: &'static str, rows: &[[f64; 2]]) -> Result<BracketTable, ConfigError> {
    let rates: Vec<(f64, f64)> = rows.iter().map(|&[low, pct]| (low, pct / 100.0)).collect();
    Ok(BracketTable::from_rates(table, &rates)?)
}

fn age_out_of_range(key: &str, age: u32) -> ConfigError {
    ConfigError::Invalid(format!("{key} must be at most {MAX_AGE} (found {age})"))
}

impl RawScenario {
    fn into_scenario(self) -> Result<ScenarioModel, ConfigError> {
        for (key, pct) in [("inflation", self.inflation), ("returns", self.returns)] {
            if pct <= -100.0 {
                return Err(ConfigError::Invalid(format!(
                    "{key} must be above -100 percent (found {pct})"
                )));
            }
        }
        let inflation = 1.0 + self.inflation / 100.0;
        let returns = 1.0 + self.returns / 100.0;
        let start_age = self.startage;
        let end_age = match self.endage {
            Some(age) => age,
            None => start_age
                .checked_add(5)
                .ok_or_else(|| age_out_of_range("startage", start_age))?
                .max(96),
        };
        for (key, age) in [("startage", start_age), ("endage", end_age)] {
            if age > MAX_AGE {
                return Err(age_out_of_range(key, age));
            }
        }

        let work = match &self.prep {
            Some(prep) => WorkPhase {
                max_save: prep.maxsave,
                max_save_inflation: prep.inflation,
                tax_multiplier: 1.0 + prep.tax_rate / 100.0,
            },
            None => WorkPhase {
                max_save: 0.0,
                max_save_inflation: true,
                tax_multiplier: 1.0 + default_work_tax_rate() / 100.0,
            },
        };
        let work_years = self.prep.as_ref().map_or(0, |p| p.workyears);
        let retire_age = u32::try_from(work_years)
            .ok()
            .and_then(|w| start_age.checked_add(w))
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "workyears {work_years} runs past any age (startage {start_age})"
                ))
            })?;
        if end_age <= retire_age {
            return Err(ScenarioError::EmptyPlan {
                retire_age,
                end_age,
            }
            .into());
        }
        let plan_years = (end_age - retire_age) as usize;

        let taxes = &self.taxes;
        let federal = percent_table(
            "federal",
            taxes.taxrates.as_deref().unwrap_or(&DEFAULT_FEDERAL_RATES),
        )?;
        let state = match &taxes.state_rate {
            None => BracketTable::flat("state", 0.0)?,
            Some(RawStateRate::Flat(pct)) => BracketTable::flat("state", pct / 100.0)?,
            Some(RawStateRate::Table(rows)) => percent_table("state", rows)?,
        };
        let capital_gains = percent_table(
            "capital gains",
            taxes.cg_taxrates.as_deref().unwrap_or(&DEFAULT_GAINS_RATES),
        )?;
        let standard_deduction = taxes.stded.unwrap_or(DEFAULT_STANDARD_DEDUCTION);

        let scale = |year: usize| inflation.powi((year + work_years) as i32);
        let mut schedule = vec![YearSchedule::empty(); plan_years];
        let years_of = |ages: &RawAges| -> Result<Vec<usize>, ConfigError> {
            Ok(ages
                .ages()?
                .into_iter()
                .filter(|&age| age >= retire_age && age < end_age)
                .map(|age| (age - retire_age) as usize)
                .collect())
        };

        for expense in self.expense.values() {
            for year in years_of(&expense.age)? {
                let indexed = if expense.inflation { scale(year) } else { 1.0 };
                schedule[year].expense += expense.amount * indexed;
            }
        }
        for income in self.income.values() {
            for year in years_of(&income.age)? {
                let indexed = if income.inflation { scale(year) } else { 1.0 };
                let amount = income.amount * indexed;
                let slot = &mut schedule[year];
                slot.income += amount;
                if income.tax {
                    slot.taxed += amount;
                    if income.state_tax.unwrap_or(true) {
                        slot.state_taxed += amount;
                    }
                } else if income.state_tax.unwrap_or(false) {
                    slot.state_taxed += amount;
                }
                if let Some(ceiling) = income.ceiling {
                    let ceiling = ceiling * indexed;
                    slot.ceiling = Some(slot.ceiling.map_or(ceiling, |c| c.min(ceiling)));
                }
            }
        }

        let scenario = ScenarioModel {
            inflation,
            returns,
            start_age,
            retire_age,
            end_age,
            work_years,
            plan_years,
            federal,
            state,
            capital_gains,
            standard_deduction,
            state_standard_deduction: taxes.state_stded.unwrap_or(standard_deduction),
            nii_threshold: taxes.nii.unwrap_or(DEFAULT_NII_THRESHOLD),
            nii_rate: taxes.nii_rate.map_or(DEFAULT_NII_RATE, |pct| pct / 100.0),
            savings: SavingsAccount {
                balance: self.aftertax.bal,
                basis: self.aftertax.basis,
                distribution_yield: self.aftertax.distributions / 100.0,
            },
            ira: IraAccount {
                balance: self.ira.bal,
                max_contribution: self.ira.maxcontrib,
            },
            roth: RothAccount {
                balance: self.roth.bal,
                max_contribution: self.roth.maxcontrib,
                contributions: self
                    .roth
                    .contributions
                    .iter()
                    .map(|&(age, amount)| RothContribution { age, amount })
                    .collect(),
            },
            work,
            schedule,
            rmd_start_age: self.ira.rmd_start.unwrap_or(DEFAULT_RMD_START_AGE),
            sepp: SeppTerms::for_retire_age(retire_age),
        };
        scenario.validate()?;
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS * expected.abs().max(1.0),
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn minimal_file_uses_defaults() {
        let scenario = parse_scenario("startage = 65\n[IRA]\nbal = 500000\n").expect("valid");
        assert_eq!(scenario.end_age, 96);
        assert_eq!(scenario.retire_age, 65);
        assert_eq!(scenario.plan_years, 31);
        assert_eq!(scenario.work_years, 0);
        assert_approx(scenario.returns, 1.06);
        assert_approx(scenario.inflation, 1.0);
        assert_eq!(scenario.federal.len(), 7);
        assert_approx(scenario.federal.brackets()[1].rate, 0.12);
        assert_eq!(scenario.federal.brackets()[1].low, 22_000.0);
        assert_eq!(scenario.state.len(), 1);
        assert_eq!(scenario.state.brackets()[0].rate, 0.0);
        assert_eq!(scenario.capital_gains.brackets()[2].low, 553_850.0);
        assert_eq!(scenario.standard_deduction, 27_700.0);
        assert_eq!(scenario.state_standard_deduction, 27_700.0);
        assert_eq!(scenario.nii_threshold, 250_000.0);
        assert_eq!(scenario.ira.balance, 500_000.0);
        assert_eq!(scenario.ira.max_contribution, 33_500.0);
        assert_eq!(scenario.roth.max_contribution, 14_000.0);
        assert_eq!(scenario.rmd_start_age, 73);
        assert_eq!(scenario.sepp.draw_years, 5);
    }

    #[test]
    fn end_age_defaults_to_at_least_five_years_out() {
        let scenario = parse_scenario("startage = 93\n").expect("valid");
        assert_eq!(scenario.end_age, 98);
    }

    #[test]
    fn taxes_section_overrides_tables() {
        let text = r#"
startage = 60
[taxes]
taxrates = [[0, 10], [50000, 20]]
state_rate = 5
stded = 20000
nii = 200000
"#;
        let scenario = parse_scenario(text).expect("valid");
        assert_eq!(scenario.federal.len(), 2);
        assert_approx(scenario.federal.brackets()[1].rate, 0.20);
        assert_approx(scenario.state.brackets()[0].rate, 0.05);
        assert_eq!(scenario.state_standard_deduction, 20_000.0);
        assert_eq!(scenario.nii_threshold, 200_000.0);
    }

    #[test]
    fn state_rate_accepts_bracket_table() {
        let text = "startage = 60\n[taxes]\nstate_rate = [[0, 1], [10000, 4]]\nstate_stded = 5000\n";
        let scenario = parse_scenario(text).expect("valid");
        assert_eq!(scenario.state.len(), 2);
        assert_approx(scenario.state.brackets()[1].rate, 0.04);
        assert_eq!(scenario.state_standard_deduction, 5_000.0);
    }

    #[test]
    fn prep_section_adds_work_years() {
        let text = r#"
startage = 50
endage = 90
inflation = 2.5
[prep]
workyears = 5
maxsave = 60000
inflation = false
tax_rate = 30
[aftertax]
bal = 100000
basis = 60000
distributions = 2
"#;
        let scenario = parse_scenario(text).expect("valid");
        assert_eq!(scenario.work_years, 5);
        assert_eq!(scenario.retire_age, 55);
        assert_eq!(scenario.plan_years, 35);
        assert!(!scenario.work.max_save_inflation);
        assert_approx(scenario.work.tax_multiplier, 1.30);
        assert_approx(scenario.savings.distribution_yield, 0.02);
        assert_eq!(scenario.sepp.draw_years, 5);
    }

    #[test]
    fn schedule_collects_income_and_expense_by_year() {
        let text = r#"
startage = 60
endage = 70
inflation = 10
[expense.travel]
amount = 10000
age = "60-61"
inflation = true
[expense.roof]
amount = 5000
age = 62
[income.pension]
amount = 20000
age = "65-"
tax = true
[income.gift]
amount = 3000
age = "61"
state_tax = true
"#;
        let scenario = parse_scenario(text).expect("valid");
        assert_eq!(scenario.schedule.len(), 10);
        assert_approx(scenario.schedule[0].expense, 10_000.0);
        assert_approx(scenario.schedule[1].expense, 11_000.0);
        assert_eq!(scenario.schedule[2].expense, 5_000.0);
        assert_eq!(scenario.schedule[5].income, 20_000.0);
        assert_eq!(scenario.schedule[5].taxed, 20_000.0);
        assert_eq!(scenario.schedule[5].state_taxed, 20_000.0);
        assert_eq!(scenario.schedule[9].income, 20_000.0);
        assert_eq!(scenario.schedule[1].income, 3_000.0);
        assert_eq!(scenario.schedule[1].taxed, 0.0);
        assert_eq!(scenario.schedule[1].state_taxed, 3_000.0);
        assert!(scenario.schedule.iter().all(|s| s.ceiling.is_none()));
    }

    #[test]
    fn federal_only_income_skips_state_tax() {
        let text = r#"
startage = 60
endage = 62
[income.bonds]
amount = 1000
age = "60-61"
tax = true
state_tax = false
"#;
        let scenario = parse_scenario(text).expect("valid");
        assert_eq!(scenario.schedule[0].taxed, 1_000.0);
        assert_eq!(scenario.schedule[0].state_taxed, 0.0);
    }

    #[test]
    fn ceiling_takes_smallest_indexed_value() {
        let text = r#"
startage = 60
endage = 62
inflation = 10
[income.a]
amount = 0
age = "60-61"
ceiling = 50000
[income.b]
amount = 0
age = "61"
ceiling = 40000
inflation = true
"#;
        let scenario = parse_scenario(text).expect("valid");
        assert_eq!(scenario.schedule[0].ceiling, Some(50_000.0));
        assert_approx(scenario.schedule[1].ceiling.expect("set"), 44_000.0);
    }

    #[test]
    fn roth_contributions_parse_as_age_amount_pairs() {
        let text = "startage = 60\n[roth]\nbal = 1000\ncontributions = [[55, 6000], [57, 6500]]\n";
        let scenario = parse_scenario(text).expect("valid");
        assert_eq!(scenario.roth.contributions.len(), 2);
        assert_eq!(scenario.roth.contributions[1].age, 57);
        assert_eq!(scenario.roth.contributions[1].amount, 6_500.0);
    }

    #[test]
    fn ages_outside_the_plan_are_ignored() {
        let text = "startage = 60\nendage = 62\n[expense.a]\namount = 1\nage = \"50-70\"\n";
        let scenario = parse_scenario(text).expect("valid");
        assert_eq!(scenario.schedule[0].expense, 1.0);
        assert_eq!(scenario.schedule[1].expense, 1.0);
    }

    #[test]
    fn bad_age_list_is_rejected() {
        let text = "startage = 60\n[expense.a]\namount = 1\nage = \"sixty\"\n";
        let err = parse_scenario(text).expect_err("must reject");
        assert!(matches!(err, ConfigError::BadAge(ref s) if s == "sixty"));
    }

    #[test]
    fn missing_start_age_is_a_parse_error() {
        let err = parse_scenario("endage = 90\n").expect_err("must reject");
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn unsorted_brackets_are_rejected() {
        let text = "startage = 60\n[taxes]\ntaxrates = [[0, 10], [5000, 12], [4000, 22]]\n";
        let err = parse_scenario(text).expect_err("must reject");
        assert!(matches!(err, ConfigError::Scenario(ScenarioError::BracketOrder { .. })));
    }

    #[test]
    fn empty_plan_is_rejected() {
        let text = "startage = 60\nendage = 65\n[prep]\nworkyears = 5\nmaxsave = 0\n";
        let err = parse_scenario(text).expect_err("must reject");
        assert!(matches!(err, ConfigError::Scenario(ScenarioError::EmptyPlan { .. })));
    }

    #[test]
    fn rate_at_or_below_minus_hundred_percent_is_rejected() {
        let err = parse_scenario("startage = 60\nreturns = -100\n").expect_err("must reject");
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("returns")));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load_scenario(Path::new("/nonexistent/plan.toml")).expect_err("no file");
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn age_list_forms() {
        assert_eq!(parse_age_list("65").expect("single"), vec![65]);
        assert_eq!(parse_age_list("60-62,70").expect("mixed"), vec![60, 61, 62, 70]);
        let open = parse_age_list("118-").expect("open");
        assert_eq!(open, vec![118, 119, 120]);
        assert!(parse_age_list("").is_err());
        assert!(parse_age_list("60-x").is_err());
        assert!(parse_age_list("-5").is_err());
    }

    #[test]
    fn age_lists_stay_within_max_age() {
        for text in ["0-4294967295", "60-121", "125", "121-", "70-60", "99999999999"] {
            let err = parse_age_list(text).expect_err(text);
            assert!(matches!(err, ConfigError::BadAge(ref t) if t == text));
        }
        assert_eq!(parse_age_list("120").expect("max age"), vec![MAX_AGE]);
        assert_eq!(parse_age_list("120-").expect("open at max"), vec![MAX_AGE]);
    }

    #[test]
    fn oversized_age_in_scenario_is_rejected_not_expanded() {
        let text = "startage = 60\n[expense.big]\namount = 1\nage = \"0-4294967295\"\n";
        let err = parse_scenario(text).expect_err("must reject");
        assert!(matches!(err, ConfigError::BadAge(_)));

        let text = "startage = 60\n[income.big]\namount = 1\nage = 125\n";
        let err = parse_scenario(text).expect_err("must reject");
        assert!(matches!(err, ConfigError::BadAge(_)));
    }

    #[test]
    fn huge_ages_are_invalid_instead_of_overflowing() {
        for text in [
            "startage = 4294967295\n",
            "startage = 60\nendage = 4294967295\n",
            "startage = 4294967290\nendage = 4294967295\n",
            "startage = 4294967295\n[prep]\nworkyears = 5\nmaxsave = 0\n",
        ] {
            let err = parse_scenario(text).expect_err(text);
            assert!(matches!(err, ConfigError::Invalid(_)), "{text}: {err}");
        }

        let text = "startage = 60\nendage = 90\n[prep]\nworkyears = 9223372036854775807\nmaxsave = 0\n";
        let err = parse_scenario(text).expect_err("work years overflow");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_age_range_expands_inclusively(start in 0u32..110, len in 0u32..10) {
            let end = start + len;
            let ages = parse_age_list(&format!("{start}-{end}")).expect("valid range");
            prop_assert_eq!(ages.len() as u32, len + 1);
            prop_assert_eq!(ages[0], start);
            prop_assert!(ages.windows(2).all(|w| w[1] == w[0] + 1));
        }
    }
}
