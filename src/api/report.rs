use crate::core::{PlanReport, PlanStatus};

const THOUSANDS: f64 = 1000.0;

fn round_down_hundreds(value: f64) -> f64 {
    (value / 100.0).floor() * 100.0
}

/// Fixed-width table in thousands, one line per year, followed by lifetime
/// totals in today's dollars.
pub fn render_text(report: &PlanReport) -> String {
    let mut out = String::new();
    if report.status == PlanStatus::TimeLimited {
        out.push_str(&format!("Time limit reached: {}\n", report.message));
    }
    if let Some(limit) = &report.modeling_limit {
        out.push_str(&format!("WARNING: {limit}\n"));
    }
    out.push_str(&format!(
        "Yearly spending <= {:.0}\n",
        round_down_hundreds(report.spending_floor)
    ));
    let sepp = round_down_hundreds(report.sepp_amount);
    out.push_str(&format!(
        "SEPP amount = {:.0} {:.0}\n\n",
        sepp,
        sepp / report.sepp_ratio
    ));

    if !report.work_years.is_empty() {
        out.push_str(&format!(
            " age{}\n",
            columns(&["save", "tSAVE", "IRA", "tIRA", "Roth", "tRoth"])
        ));
        for row in &report.work_years {
            out.push_str(&format!(
                " {}:{}\n",
                row.age,
                values(&[
                    row.savings,
                    row.to_savings,
                    row.ira,
                    row.to_ira,
                    row.roth,
                    row.to_roth,
                ])
            ));
        }
    }

    out.push_str(&format!(
        " age{}\n",
        columns(&[
            "save", "fsave", "IRA", "fIRA", "SEPP", "Roth", "fRoth", "IRA2R", "rate", "tax",
            "spend", "extra", "cgd",
        ])
    ));
    for row in &report.retirement_years {
        let rate = format!(" {:5.0}", row.marginal_rate * 100.0);
        out.push_str(&format!(
            " {}:{}{}{}\n",
            row.age,
            values(&[
                row.savings,
                row.from_savings,
                row.ira,
                row.from_ira,
                row.sepp,
                row.roth,
                row.from_roth,
                row.ira_to_roth,
            ]),
            rate,
            values(&[row.total_tax, row.spending, row.extra, row.gains_distribution]),
        ));
    }

    out.push_str(&format!("\ntotal spending: {:.0}\n", report.total_spending));
    out.push_str(&format!(
        "total tax: {:.0} ({:.1}%)\n",
        report.total_tax,
        100.0 * report.tax_share()
    ));
    out
}

fn columns(names: &[&str]) -> String {
    names.iter().map(|n| format!(" {n:>5}")).collect()
}

fn values(amounts: &[f64]) -> String {
    amounts
        .iter()
        .map(|v| format!(" {:5.0}", v / THOUSANDS))
        .collect()
}

pub const CSV_HEADER: &str =
    "age,save,fsave,IRA,fIRA,Roth,fRoth,IRA2R,income,expense,cgd,fed_tax,state_tax,spend";

/// Opening balances, then a header and one row per retirement year in whole
/// dollars.
pub fn render_csv(report: &PlanReport) -> String {
    let whole = |v: f64| v.trunc() as i64;
    let mut out = String::new();
    out.push_str(&format!("spend goal,{}\n", whole(report.spending_floor)));
    out.push_str(&format!(
        "savings,{},{}\n",
        whole(report.opening.savings),
        whole(report.opening.savings_basis)
    ));
    out.push_str(&format!("ira,{}\n", whole(report.opening.ira)));
    out.push_str(&format!("roth,{}\n", whole(report.opening.roth)));
    out.push_str(CSV_HEADER);
    out.push('\n');
    for row in &report.retirement_years {
        let fields: Vec<String> = [
            row.savings,
            row.from_savings,
            row.ira,
            row.from_ira,
            row.roth,
            row.from_roth,
            row.ira_to_roth,
            row.income,
            row.expense,
            row.gains_distribution,
            row.federal_tax,
            row.state_tax,
            row.spending,
        ]
        .iter()
        .map(|&v| whole(v).to_string())
        .collect();
        out.push_str(&format!("{},{}\n", row.age, fields.join(",")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ModelingLimitError, OpeningBalances, RetirementYearRow, WorkYearRow};

    fn year(age: u32, from_ira: f64) -> RetirementYearRow {
        RetirementYearRow {
            age,
            savings: 0.0,
            from_savings: 0.0,
            ira: 500_000.0,
            from_ira,
            sepp: 0.0,
            roth: 0.0,
            from_roth: 0.0,
            ira_to_roth: 0.0,
            marginal_rate: 0.12,
            federal_tax: 2_500.0,
            state_tax: 0.0,
            total_tax: 2_500.0,
            spending: from_ira - 2_500.0,
            extra: 0.0,
            gains_distribution: 0.0,
            income: 0.0,
            expense: 0.0,
        }
    }

    fn sample_report() -> PlanReport {
        PlanReport {
            status: PlanStatus::Optimal,
            message: "Optimization terminated successfully.".to_string(),
            spending_floor: 37_549.7,
            sepp_amount: 0.0,
            sepp_ratio: 25.0,
            opening: OpeningBalances {
                savings: 10_000.0,
                savings_basis: 4_000.0,
                ira: 500_000.0,
                roth: 0.0,
            },
            work_years: Vec::new(),
            retirement_years: vec![year(65, 40_049.7), year(66, 40_049.7)],
            total_spending: 75_099.4,
            total_tax: 5_000.0,
            final_roth: 0.0,
            modeling_limit: None,
        }
    }

    #[test]
    fn text_report_rounds_floor_and_lists_years() {
        let text = render_text(&sample_report());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Yearly spending <= 37500");
        assert!(lines.iter().any(|l| l.starts_with(" age  save fsave")));
        assert!(lines.iter().any(|l| l.starts_with(" 65:")));
        assert!(lines.iter().any(|l| l.starts_with(" 66:")));
        assert!(text.contains("total spending: 75099"));
        assert!(text.contains("total tax: 5000 (6.2%)"));
        assert!(!text.contains("tSAVE"));
    }

    #[test]
    fn text_report_shows_work_years_and_warnings() {
        let mut report = sample_report();
        report.status = PlanStatus::TimeLimited;
        report.message = "stopped at 300s".to_string();
        report.work_years.push(WorkYearRow {
            age: 63,
            savings: 1_000.0,
            to_savings: 0.0,
            ira: 450_000.0,
            to_ira: 20_000.0,
            roth: 0.0,
            to_roth: 0.0,
        });
        report.modeling_limit = Some(ModelingLimitError {
            what: "variable 12".to_string(),
            value: 4_990_000.0,
            big_m: 5_000_000.0,
            margin_pct: 1.0,
        });
        let text = render_text(&report);
        assert!(text.starts_with("Time limit reached: stopped at 300s\n"));
        assert!(text.contains("WARNING: variable 12"));
        assert!(text.contains("tSAVE"));
        assert!(text.contains(" 63:"));
    }

    #[test]
    fn csv_report_has_preamble_header_and_rows() {
        let csv = render_csv(&sample_report());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "spend goal,37549");
        assert_eq!(lines[1], "savings,10000,4000");
        assert_eq!(lines[2], "ira,500000");
        assert_eq!(lines[3], "roth,0");
        assert_eq!(lines[4], CSV_HEADER);
        assert_eq!(lines.len(), 7);
        let fields: Vec<&str> = lines[5].split(',').collect();
        assert_eq!(fields.len(), CSV_HEADER.split(',').count());
        assert_eq!(fields[0], "65");
        assert_eq!(fields[4], "40049");
        assert_eq!(fields[13], "37549");
    }
}
