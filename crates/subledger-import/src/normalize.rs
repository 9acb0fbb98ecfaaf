//! Merged-cell forward fill.
//!
//! Spreadsheets exported from merged header cells carry the contract header
//! (issue date, project, subcontractor, contract type) on the first row only.
//! Each blank header cell takes the most recent non-blank value above it;
//! line-item cells are never filled.

use subledger_core::ImportRow;

/// Forward-fill the four group-key fields and drop spacer rows.
///
/// A row is a spacer when it has neither trade nor item after filling.
/// Spacer rows still contribute their header values to later rows.
pub fn normalize(rows: Vec<ImportRow>) -> Vec<ImportRow> {
    let mut last = KeyFill::default();
    rows.into_iter()
        .filter_map(|mut row| {
            last.fill(&mut row);
            row.has_item_content().then_some(row)
        })
        .collect()
}

#[derive(Default)]
struct KeyFill {
    issue_date: String,
    project_name: String,
    subcontractor_name: String,
    contract_type_raw: String,
}

impl KeyFill {
    fn fill(&mut self, row: &mut ImportRow) {
        carry(&mut self.issue_date, &mut row.issue_date);
        carry(&mut self.project_name, &mut row.project_name);
        carry(&mut self.subcontractor_name, &mut row.subcontractor_name);
        carry(&mut self.contract_type_raw, &mut row.contract_type_raw);
    }
}

/// Remember `cell` if it has a value, otherwise overwrite it with the last one seen.
fn carry(last: &mut String, cell: &mut String) {
    if cell.trim().is_empty() {
        cell.clone_from(last);
    } else {
        last.clone_from(cell);
    }
}
