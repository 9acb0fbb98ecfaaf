//! Plain-text rendering of import reports and contract listings.

use subledger_core::ContractSummary;
use subledger_import::{BatchReport, GroupCheck, GroupStatus};

// ── Import ──

pub fn print_report(report: &BatchReport) {
    println!("=== Import: {} group(s) ===", report.group_count());
    println!("  {:<12} {}", "stored", report.success_count);
    println!("  {:<12} {}", "partial", report.partial_count);
    println!("  {:<12} {}", "failed", report.error_count);
    println!();

    if !report.outcomes.is_empty() {
        println!("Contracts");
        for outcome in &report.outcomes {
            println!("  {}", status_line(&outcome.status));
        }
        println!();
    }

    if !report.messages.is_empty() {
        println!("Messages");
        for message in &report.messages {
            println!("  {message}");
        }
        println!();
    }
}

fn status_line(status: &GroupStatus) -> String {
    match status {
        GroupStatus::Persisted {
            contract_id,
            total_value,
        } => format!("{:<8} {contract_id:<22} {total_value}", "ok"),
        GroupStatus::Partial { contract_id, .. } => format!("{:<8} {contract_id}", "partial"),
        GroupStatus::Failed { .. } => format!("{:<8} -", "failed"),
    }
}

// ── Check ──

pub fn print_checks(checks: &[GroupCheck]) {
    let valid = checks.iter().filter(|c| c.is_valid()).count();
    println!("=== Check: {valid}/{} group(s) valid ===", checks.len());
    println!();

    for check in checks {
        let verdict = if check.is_valid() { "valid" } else { "invalid" };
        println!("{} [{verdict}, {} line(s)]", check.key, check.lines);
        for error in &check.errors {
            println!("  error    {error}");
        }
        for warning in &check.warnings {
            println!("  dropped  {warning}");
        }
    }
}

// ── Contracts ──

pub fn print_contracts(contracts: &[ContractSummary]) {
    if contracts.is_empty() {
        println!("(no contracts)");
        return;
    }
    println!(
        "{:<22} {:<22} {:>8} {:>8}  {}",
        "contract", "parent", "project", "sub", "state"
    );
    for c in contracts {
        println!("{}", contract_row(c));
    }
    println!();
    println!("{} contract(s)", contracts.len());
}

fn contract_row(c: &ContractSummary) -> String {
    format!(
        "{:<22} {:<22} {:>8} {:>8}  {}",
        c.contract_id,
        c.parent_contract_id.as_deref().unwrap_or("-"),
        c.project_id,
        c.subcontractor_id,
        c.import_state.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use subledger_core::ImportState;

    #[test]
    fn status_lines() {
        let ok = status_line(&GroupStatus::Persisted {
            contract_id: "ID-0504-0001".into(),
            total_value: Decimal::from(5000),
        });
        assert!(ok.starts_with("ok "));
        assert!(ok.ends_with("5000"));

        let failed = status_line(&GroupStatus::Failed {
            reason: "bad".into(),
        });
        assert_eq!(failed.trim_end(), "failed   -");
    }

    #[test]
    fn contract_row_shows_missing_parent_as_dash() {
        let row = contract_row(&ContractSummary {
            contract_id: "ID-0504-0001".into(),
            parent_contract_id: None,
            project_id: 1,
            subcontractor_id: 2,
            import_state: ImportState::Pending,
        });
        assert!(row.starts_with("ID-0504-0001"));
        assert!(row.contains(" - "));
        assert!(row.ends_with("pending"));
    }
}
