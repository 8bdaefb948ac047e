use super::types::{
    BracketTable, IraAccount, RothAccount, SavingsAccount, ScenarioModel, SeppTerms, WorkPhase,
    YearSchedule,
};

/// Retiree with a 500k IRA and nothing else, 2023 joint federal brackets, no
/// state tax, zero growth and inflation.
pub fn sample_scenario(retire_age: u32, end_age: u32) -> ScenarioModel {
    let plan_years = (end_age - retire_age) as usize;
    ScenarioModel {
        inflation: 1.0,
        returns: 1.0,
        start_age: retire_age,
        retire_age,
        end_age,
        work_years: 0,
        plan_years,
        federal: BracketTable::from_rates(
            "federal",
            &[
                (0.0, 0.10),
                (22_000.0, 0.12),
                (89_450.0, 0.22),
                (190_750.0, 0.24),
                (364_200.0, 0.32),
                (462_500.0, 0.35),
                (693_750.0, 0.37),
            ],
        )
        .unwrap(),
        state: BracketTable::flat("state", 0.0).unwrap(),
        capital_gains: BracketTable::from_rates(
            "capital gains",
            &[(0.0, 0.0), (89_250.0, 0.15), (553_850.0, 0.20)],
        )
        .unwrap(),
        standard_deduction: 27_700.0,
        state_standard_deduction: 27_700.0,
        nii_threshold: 250_000.0,
        nii_rate: 0.038,
        savings: SavingsAccount {
            balance: 0.0,
            basis: 0.0,
            distribution_yield: 0.0,
        },
        ira: IraAccount {
            balance: 500_000.0,
            max_contribution: 33_500.0,
        },
        roth: RothAccount {
            balance: 0.0,
            max_contribution: 14_000.0,
            contributions: Vec::new(),
        },
        work: WorkPhase {
            max_save: 0.0,
            max_save_inflation: true,
            tax_multiplier: 1.25,
        },
        schedule: vec![YearSchedule::empty(); plan_years],
        rmd_start_age: 73,
        sepp: SeppTerms::for_retire_age(retire_age),
    }
}

