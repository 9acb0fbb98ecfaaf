//! Turn a validated, identified group into a contract aggregate.

use rust_decimal::Decimal;
use subledger_core::{
    ContractAggregate, ContractKind, ContractStatus, ProjectRef, SubcontractorRef, TradeLineItem,
    contract_total,
};

use crate::pipeline::BatchOptions;
use crate::registry::Minted;
use crate::validate::ValidatedGroup;

/// `None` when a line or the contract total overflows.
pub fn build_aggregate(
    group: &ValidatedGroup,
    minted: Minted,
    project: &ProjectRef,
    subcontractor: &SubcontractorRef,
    options: &BatchOptions,
) -> Option<ContractAggregate> {
    let trade_items: Vec<TradeLineItem> = group
        .lines
        .iter()
        .map(|line| {
            TradeLineItem::new(
                &line.trade,
                &line.item,
                &options.default_unit,
                line.quantity.unwrap_or(Decimal::ZERO),
                line.rate.unwrap_or(Decimal::ZERO),
                line.wastage_percent.unwrap_or(Decimal::ZERO),
            )
        })
        .collect::<Option<_>>()?;
    let total_value = contract_total(&trade_items)?;
    let date_of_issuing = group.issue_date.unwrap_or(options.run_date);
    let description = describe(&minted.kind, project, subcontractor);

    Some(ContractAggregate {
        contract_id: minted.contract_id,
        project: project.clone(),
        subcontractor: subcontractor.clone(),
        kind: minted.kind,
        trade_items,
        responsibilities: split_responsibilities(&group.responsibilities_raw),
        total_value,
        status: ContractStatus::Active,
        date_of_issuing,
        start_date: date_of_issuing,
        end_date: None,
        description,
    })
}

/// Split a comma-separated responsibilities cell.
///
/// Names are trimmed, blanks dropped, and repeats (ignoring case) keep only
/// the first spelling.
pub fn split_responsibilities(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            names.push(name.to_string());
        }
    }
    names
}

fn describe(kind: &ContractKind, project: &ProjectRef, subcontractor: &SubcontractorRef) -> String {
    match kind {
        ContractKind::Subcontract => {
            format!("Subcontract for {} with {}", project.name, subcontractor.name)
        }
        ContractKind::Addendum { parent, sequence } => format!(
            "Addendum {sequence:02} to {parent} for {} with {}",
            project.name, subcontractor.name
        ),
    }
}
