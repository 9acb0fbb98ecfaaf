//! Contract aggregates and the records exchanged with the datastore.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::contract_id::ContractId;

/// Datastore primary key.
pub type RecordId = i64;

/// A project resolved by name. `code` feeds the subcontract identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: RecordId,
    pub name: String,
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubcontractorRef {
    pub id: RecordId,
    pub name: String,
}

/// Decimal places kept for quantities, prices and amounts. Matches the
/// scale of the datastore's numeric columns, so stored totals still add up.
pub const AMOUNT_SCALE: u32 = 4;

/// `quantity * unit_price` at [`AMOUNT_SCALE`], or `None` on overflow.
pub fn line_total(quantity: Decimal, unit_price: Decimal) -> Option<Decimal> {
    quantity
        .round_dp(AMOUNT_SCALE)
        .checked_mul(unit_price.round_dp(AMOUNT_SCALE))
        .map(|total| total.round_dp(AMOUNT_SCALE))
}

/// Sum of line totals, or `None` on overflow.
pub fn contract_total(items: &[TradeLineItem]) -> Option<Decimal> {
    items
        .iter()
        .try_fold(Decimal::ZERO, |acc, item| acc.checked_add(item.total))
}

/// One trade/item line of a contract.
///
/// `total` is `quantity * unit_price`. Wastage is carried as metadata and
/// never contributes to the contract value. Numbers are rounded to
/// [`AMOUNT_SCALE`] on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeLineItem {
    pub trade: String,
    pub item: String,
    pub unit: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub wastage_percent: Decimal,
    pub total: Decimal,
}

impl TradeLineItem {
    /// `None` when the line total overflows.
    pub fn new(
        trade: impl Into<String>,
        item: impl Into<String>,
        unit: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
        wastage_percent: Decimal,
    ) -> Option<Self> {
        let total = line_total(quantity, unit_price)?;
        Some(Self {
            trade: trade.into(),
            item: item.into(),
            unit: unit.into(),
            quantity: quantity.round_dp(AMOUNT_SCALE),
            unit_price: unit_price.round_dp(AMOUNT_SCALE),
            wastage_percent: wastage_percent.round_dp(AMOUNT_SCALE),
            total,
        })
    }
}

/// Whether a contract stands alone or amends a parent subcontract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "contract_type", rename_all = "snake_case")]
pub enum ContractKind {
    Subcontract,
    Addendum { parent: ContractId, sequence: u32 },
}

impl ContractKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Subcontract => "subcontract",
            Self::Addendum { .. } => "addendum",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Active,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
        }
    }
}

/// Whether every dependent write of an imported aggregate landed.
///
/// Headers are written `Pending` and flipped to `Complete` once trade items
/// and responsibilities are stored. A header left `Pending` is an incomplete
/// aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    #[default]
    Pending,
    Complete,
}

impl ImportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

/// The unit of persistence: header, line items and responsibilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAggregate {
    pub contract_id: ContractId,
    pub project: ProjectRef,
    pub subcontractor: SubcontractorRef,
    pub kind: ContractKind,
    pub trade_items: Vec<TradeLineItem>,
    pub responsibilities: Vec<String>,
    pub total_value: Decimal,
    pub status: ContractStatus,
    pub date_of_issuing: NaiveDate,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub description: String,
}

impl ContractAggregate {
    pub fn parent_contract_id(&self) -> Option<&ContractId> {
        match &self.kind {
            ContractKind::Addendum { parent, .. } => Some(parent),
            ContractKind::Subcontract => None,
        }
    }

    pub fn addendum_sequence(&self) -> Option<u32> {
        match self.kind {
            ContractKind::Addendum { sequence, .. } => Some(sequence),
            ContractKind::Subcontract => None,
        }
    }

    /// Header payload, written before any dependent rows.
    pub fn header(&self) -> ContractHeader {
        ContractHeader {
            contract_id: self.contract_id.clone(),
            project_id: self.project.id,
            subcontractor_id: self.subcontractor.id,
            contract_type: self.kind.type_name().to_string(),
            parent_contract_id: self.parent_contract_id().cloned(),
            addendum_sequence: self.addendum_sequence(),
            total_value: self.total_value,
            status: self.status,
            date_of_issuing: self.date_of_issuing,
            start_date: self.start_date,
            end_date: self.end_date,
            description: self.description.clone(),
            import_state: ImportState::Pending,
        }
    }
}

/// Flat header row as the datastore stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractHeader {
    pub contract_id: ContractId,
    pub project_id: RecordId,
    pub subcontractor_id: RecordId,
    pub contract_type: String,
    pub parent_contract_id: Option<ContractId>,
    pub addendum_sequence: Option<u32>,
    pub total_value: Decimal,
    pub status: ContractStatus,
    pub date_of_issuing: NaiveDate,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub description: String,
    pub import_state: ImportState,
}

impl ContractHeader {
    pub fn summary(&self) -> ContractSummary {
        ContractSummary {
            contract_id: self.contract_id.to_string(),
            parent_contract_id: self.parent_contract_id.as_ref().map(ToString::to_string),
            project_id: self.project_id,
            subcontractor_id: self.subcontractor_id,
            import_state: self.import_state,
        }
    }
}

/// What the identifier registry needs to know about a stored contract.
///
/// Identifiers are kept as plain strings: rows entered by hand may predate
/// the identifier grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSummary {
    pub contract_id: String,
    pub parent_contract_id: Option<String>,
    pub project_id: RecordId,
    pub subcontractor_id: RecordId,
    #[serde(default)]
    pub import_state: ImportState,
}
