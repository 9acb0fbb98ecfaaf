//! Group- and row-level validation of contract groups.
//!
//! Validation never fails hard: problems come back as human-readable
//! strings. A group is rejected whole on any group-level problem or when no
//! row survives row-level checks; otherwise failing rows are dropped and
//! reported as warnings.

use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use subledger_core::{ContractGroup, ContractGroupKey, ImportRow, line_total};

/// Accepted issue-date layouts, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y"];

const MAX_WASTAGE: u32 = 100;

/// Contract type as declared in the import sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractType {
    Subcontract,
    Addendum,
}

impl ContractType {
    /// Case-insensitive: `subcontract` or `add`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("subcontract") {
            Some(Self::Subcontract)
        } else if raw.eq_ignore_ascii_case("add") {
            Some(Self::Addendum)
        } else {
            None
        }
    }
}

/// A row that passed row-level validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidLine {
    pub line: usize,
    pub trade: String,
    pub item: String,
    pub quantity: Option<Decimal>,
    pub rate: Option<Decimal>,
    pub wastage_percent: Option<Decimal>,
}

impl ValidLine {
    pub fn is_complete(&self) -> bool {
        self.quantity.is_some() && self.rate.is_some()
    }
}

/// A group that may proceed to identifier generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedGroup {
    pub key: ContractGroupKey,
    pub contract_type: ContractType,
    /// `None` when the sheet left the date blank.
    pub issue_date: Option<NaiveDate>,
    pub lines: Vec<ValidLine>,
    /// Raw responsibilities cell of the group's first row.
    pub responsibilities_raw: String,
    /// First non-blank parent reference in the group.
    pub parent_contract_id: Option<String>,
    /// Problems with rows that were dropped.
    pub warnings: Vec<String>,
}

/// Smallest year accepted; `%Y` alone would read `24` as year 24.
const MIN_YEAR: i32 = 1000;

/// Parse an issue date in any accepted layout. Years must have four digits.
pub fn parse_issue_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(raw, fmt)
            .ok()
            .filter(|date| date.year() >= MIN_YEAR)
    })
}

/// Validate one group. `Err` carries every problem that rejected it.
pub fn validate_group(group: &ContractGroup) -> Result<ValidatedGroup, Vec<String>> {
    let key = &group.key;
    let mut errors = Vec::new();

    if key.project_name.trim().is_empty() {
        errors.push("project name is required".to_string());
    }
    if key.subcontractor_name.trim().is_empty() {
        errors.push("subcontractor name is required".to_string());
    }
    let contract_type = if key.contract_type_raw.trim().is_empty() {
        errors.push("contract type is required".to_string());
        None
    } else {
        let parsed = ContractType::parse(&key.contract_type_raw);
        if parsed.is_none() {
            errors.push(format!(
                "contract type {:?} must be \"subcontract\" or \"ADD\"",
                key.contract_type_raw
            ));
        }
        parsed
    };
    let issue_date = if key.issue_date.trim().is_empty() {
        None
    } else {
        let parsed = parse_issue_date(&key.issue_date);
        if parsed.is_none() {
            errors.push(format!(
                "issue date {:?} is not a date (expected YYYY-MM-DD, YYYY/MM/DD, DD-MM-YYYY or DD/MM/YYYY)",
                key.issue_date
            ));
        }
        parsed
    };

    let mut lines = Vec::new();
    let mut warnings = Vec::new();
    for row in group.rows.iter().filter(|r| r.has_item_content()) {
        match validate_row(row) {
            Ok(line) => lines.push(line),
            Err(problems) => warnings.extend(problems),
        }
    }

    if lines.is_empty() {
        errors.push("no line item passed validation".to_string());
        errors.append(&mut warnings);
    } else if !group.is_viable() {
        errors.push("no complete line item (trade, item, quantity and rate)".to_string());
    } else if !lines.iter().any(ValidLine::is_complete) {
        errors.push("every complete line item failed validation".to_string());
        errors.append(&mut warnings);
    } else if group_total(&lines).is_none() {
        errors.push("contract total overflows".to_string());
    }

    let Some(contract_type) = contract_type.filter(|_| errors.is_empty()) else {
        return Err(errors);
    };

    let responsibilities_raw = group
        .rows
        .first()
        .map(|r| r.responsibilities_raw.clone())
        .unwrap_or_default();
    let parent_contract_id = group
        .rows
        .iter()
        .map(|r| r.parent_contract_id.trim())
        .find(|p| !p.is_empty())
        .map(str::to_string);

    Ok(ValidatedGroup {
        key: key.clone(),
        contract_type,
        issue_date,
        lines,
        responsibilities_raw,
        parent_contract_id,
        warnings,
    })
}

/// Validate one line-item row. `Err` lists every problem on the row.
pub fn validate_row(row: &ImportRow) -> Result<ValidLine, Vec<String>> {
    let mut problems = Vec::new();
    let at = |msg: String| format!("line {}: {msg}", row.line);

    if row.trade.trim().is_empty() {
        problems.push(at("trade is required".to_string()));
    }
    if row.item.trim().is_empty() {
        problems.push(at("item is required".to_string()));
    }

    let quantity = number(&row.quantity, "quantity", &mut problems, &at);
    let rate = number(&row.rate, "rate", &mut problems, &at);
    let wastage_raw = row.wastage_percent.trim().trim_end_matches('%');
    let wastage_percent = number(wastage_raw, "wastage", &mut problems, &at);
    if let Some(w) = wastage_percent.filter(|w| *w > Decimal::from(MAX_WASTAGE)) {
        problems.push(at(format!("wastage {w} must be between 0 and {MAX_WASTAGE}")));
    }

    if let Some((q, r)) = quantity.zip(rate).filter(|&(q, r)| line_total(q, r).is_none()) {
        problems.push(at(format!("quantity {q} × rate {r} overflows")));
    }

    if !problems.is_empty() {
        return Err(problems);
    }
    Ok(ValidLine {
        line: row.line,
        trade: row.trade.trim().to_string(),
        item: row.item.trim().to_string(),
        quantity,
        rate,
        wastage_percent,
    })
}

/// Sum of line totals with blanks as zero, or `None` on overflow.
fn group_total(lines: &[ValidLine]) -> Option<Decimal> {
    lines.iter().try_fold(Decimal::ZERO, |acc, line| {
        let total = line_total(
            line.quantity.unwrap_or(Decimal::ZERO),
            line.rate.unwrap_or(Decimal::ZERO),
        )?;
        acc.checked_add(total)
    })
}

/// Parse an optional non-negative number, recording problems.
fn number(
    raw: &str,
    field: &str,
    problems: &mut Vec<String>,
    at: &impl Fn(String) -> String,
) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match Decimal::from_str(raw) {
        Ok(v) if v.is_sign_negative() && !v.is_zero() => {
            problems.push(at(format!("{field} {raw} must not be negative")));
            None
        }
        Ok(v) => Some(v),
        Err(_) => {
            problems.push(at(format!("{field} {raw:?} is not a number")));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize, trade: &str, item: &str, qty: &str, rate: &str, wastage: &str) -> ImportRow {
        ImportRow {
            line: n,
            issue_date: "2024-01-15".into(),
            project_name: "Sample Project".into(),
            subcontractor_name: "Sample Company".into(),
            contract_type_raw: "subcontract".into(),
            trade: trade.into(),
            item: item.into(),
            quantity: qty.into(),
            rate: rate.into(),
            wastage_percent: wastage.into(),
            ..Default::default()
        }
    }

    fn group(rows: Vec<ImportRow>) -> ContractGroup {
        ContractGroup {
            key: rows[0].key(),
            rows,
        }
    }

    #[test]
    fn contract_type_is_case_insensitive() {
        assert_eq!(ContractType::parse("SubContract"), Some(ContractType::Subcontract));
        assert_eq!(ContractType::parse(" add "), Some(ContractType::Addendum));
        assert_eq!(ContractType::parse("ADD"), Some(ContractType::Addendum));
        assert_eq!(ContractType::parse("addendum"), None);
    }

    #[test]
    fn accepted_date_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15);
        for raw in ["2024-01-15", "2024/01/15", "15-01-2024", "15/01/2024"] {
            assert_eq!(parse_issue_date(raw), expected, "{raw}");
        }
        assert_eq!(parse_issue_date("2024.01.15"), None);
    }

    #[test]
    fn short_years_are_rejected() {
        for raw in ["15/01/24", "5-6-07", "24-01-15", "0999-01-01"] {
            assert_eq!(parse_issue_date(raw), None, "{raw}");
        }
        assert_eq!(parse_issue_date("5-6-2007"), NaiveDate::from_ymd_opt(2007, 6, 5));
        assert_eq!(parse_issue_date("2024-02-30"), None);
    }

    #[test]
    fn valid_group_passes() {
        let g = group(vec![line(2, "Masonry", "Brick Work", "100", "50", "5")]);
        let v = validate_group(&g).unwrap();
        assert_eq!(v.contract_type, ContractType::Subcontract);
        assert_eq!(v.issue_date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(v.lines.len(), 1);
        assert_eq!(v.lines[0].quantity, Some(Decimal::from(100)));
        assert!(v.warnings.is_empty());
    }

    #[test]
    fn bad_contract_type_rejects_whole_group() {
        let mut r = line(2, "Masonry", "Brick Work", "100", "50", "5");
        r.contract_type_raw = "lease".into();
        let errors = validate_group(&group(vec![r])).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("\"lease\""));
    }

    #[test]
    fn missing_header_fields_each_reported() {
        let mut r = line(2, "Masonry", "Brick Work", "1", "1", "");
        r.project_name.clear();
        r.subcontractor_name.clear();
        r.contract_type_raw.clear();
        let errors = validate_group(&group(vec![r])).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn unparsable_date_rejects_group() {
        let mut r = line(2, "Masonry", "Brick Work", "1", "1", "");
        r.issue_date = "next tuesday".into();
        let errors = validate_group(&group(vec![r])).unwrap_err();
        assert!(errors[0].starts_with("issue date \"next tuesday\""));
    }

    #[test]
    fn blank_date_is_allowed() {
        let mut r = line(2, "Masonry", "Brick Work", "1", "1", "");
        r.issue_date.clear();
        assert_eq!(validate_group(&group(vec![r])).unwrap().issue_date, None);
    }

    #[test]
    fn failing_rows_dropped_when_one_survives() {
        let g = group(vec![
            line(2, "Masonry", "Brick Work", "100", "50", "5"),
            line(3, "Masonry", "Plaster", "-1", "50", ""),
            line(4, "Masonry", "Grout", "1", "x", "101"),
        ]);
        let v = validate_group(&g).unwrap();
        assert_eq!(v.lines.len(), 1);
        assert_eq!(
            v.warnings,
            vec![
                "line 3: quantity -1 must not be negative",
                "line 4: rate \"x\" is not a number",
                "line 4: wastage 101 must be between 0 and 100",
            ]
        );
    }

    #[test]
    fn group_with_no_surviving_rows_rejected() {
        let g = group(vec![line(2, "", "Brick Work", "100", "50", "")]);
        let errors = validate_group(&g).unwrap_err();
        assert_eq!(errors[0], "no line item passed validation");
        assert_eq!(errors[1], "line 2: trade is required");
    }

    #[test]
    fn group_needs_a_complete_line() {
        let g = group(vec![line(2, "Masonry", "Brick Work", "", "50", "")]);
        let errors = validate_group(&g).unwrap_err();
        assert_eq!(errors, vec!["no complete line item (trade, item, quantity and rate)"]);
    }

    #[test]
    fn complete_line_that_fails_validation_rejects_group() {
        let g = group(vec![
            line(2, "Masonry", "Brick Work", "-5", "50", ""),
            line(3, "Masonry", "Plaster", "", "10", ""),
        ]);
        let errors = validate_group(&g).unwrap_err();
        assert_eq!(
            errors,
            vec![
                "every complete line item failed validation",
                "line 2: quantity -5 must not be negative",
            ]
        );
    }

    #[test]
    fn two_digit_year_rejects_group() {
        let mut r = line(2, "Masonry", "Brick Work", "1", "1", "");
        r.issue_date = "15/01/24".into();
        let errors = validate_group(&group(vec![r])).unwrap_err();
        assert!(errors[0].starts_with("issue date \"15/01/24\""));
    }

    #[test]
    fn overflowing_line_total_rejects_row() {
        let huge = "79228162514264337593543950335";
        let problems = validate_row(&line(2, "Masonry", "Brick Work", huge, "2", "")).unwrap_err();
        assert_eq!(problems, vec![format!("line 2: quantity {huge} × rate 2 overflows")]);
        assert!(validate_row(&line(2, "Masonry", "Brick Work", huge, "1", "")).is_ok());
    }

    #[test]
    fn overflowing_contract_total_rejects_group() {
        let big = "50000000000000000000000000000";
        let g = group(vec![
            line(2, "Masonry", "Brick Work", big, "1", ""),
            line(3, "Masonry", "Plaster", big, "1", ""),
        ]);
        assert_eq!(validate_group(&g).unwrap_err(), vec!["contract total overflows"]);
    }

    #[test]
    fn wastage_accepts_percent_sign_and_bounds() {
        assert!(validate_row(&line(2, "T", "I", "1", "1", "100%")).is_ok());
        assert!(validate_row(&line(2, "T", "I", "1", "1", "0")).is_ok());
        assert!(validate_row(&line(2, "T", "I", "1", "1", "-0.5")).is_err());
        assert!(validate_row(&line(2, "T", "I", "1", "1", "100.01")).is_err());
    }

    #[test]
    fn responsibilities_and_parent_taken_from_group() {
        let mut first = line(2, "Masonry", "Brick Work", "1", "1", "");
        first.contract_type_raw = "ADD".into();
        first.responsibilities_raw = "Labor".into();
        let mut second = line(3, "Masonry", "Plaster", "1", "1", "");
        second.contract_type_raw = "ADD".into();
        second.responsibilities_raw = "ignored".into();
        second.parent_contract_id = "ID-0504-0001".into();
        let v = validate_group(&group(vec![first, second])).unwrap();
        assert_eq!(v.contract_type, ContractType::Addendum);
        assert_eq!(v.responsibilities_raw, "Labor");
        assert_eq!(v.parent_contract_id.as_deref(), Some("ID-0504-0001"));
    }
}
