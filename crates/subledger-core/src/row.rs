//! Raw import rows and the contract grouping key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One line of the tabular import after positional column mapping.
///
/// Every cell is kept as the trimmed text that was read; nothing is parsed
/// until validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRow {
    /// 1-based line in the source file (the header is line 1).
    pub line: usize,
    pub issue_date: String,
    pub project_name: String,
    pub subcontractor_name: String,
    pub contract_type_raw: String,
    pub trade: String,
    pub item: String,
    pub quantity: String,
    pub rate: String,
    pub wastage_percent: String,
    pub responsibilities_raw: String,
    /// Optional explicit parent contract for addenda.
    pub parent_contract_id: String,
}

impl ImportRow {
    /// True if the row carries any line-item content.
    pub fn has_item_content(&self) -> bool {
        !self.trade.trim().is_empty() || !self.item.trim().is_empty()
    }

    /// True if trade, item, quantity and rate are all filled in.
    pub fn is_complete_line(&self) -> bool {
        [&self.trade, &self.item, &self.quantity, &self.rate]
            .iter()
            .all(|v| !v.trim().is_empty())
    }

    pub fn key(&self) -> ContractGroupKey {
        ContractGroupKey {
            issue_date: self.issue_date.clone(),
            project_name: self.project_name.clone(),
            subcontractor_name: self.subcontractor_name.clone(),
            contract_type_raw: self.contract_type_raw.clone(),
        }
    }
}

/// Rows with an identical key after normalization belong to one contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractGroupKey {
    pub issue_date: String,
    pub project_name: String,
    pub subcontractor_name: String,
    pub contract_type_raw: String,
}

impl fmt::Display for ContractGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            or_blank(&self.issue_date),
            or_blank(&self.project_name),
            or_blank(&self.subcontractor_name),
            or_blank(&self.contract_type_raw),
        )
    }
}

fn or_blank(s: &str) -> &str {
    if s.is_empty() { "<blank>" } else { s }
}

/// Rows sharing a [`ContractGroupKey`], in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractGroup {
    pub key: ContractGroupKey,
    pub rows: Vec<ImportRow>,
}

impl ContractGroup {
    /// A group is viable only if at least one row is a complete line item.
    pub fn is_viable(&self) -> bool {
        self.rows.iter().any(ImportRow::is_complete_line)
    }
}
