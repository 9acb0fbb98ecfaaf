//! Per-group outcomes and the batch report.

use rust_decimal::Decimal;
use serde::Serialize;
use subledger_core::ContractGroupKey;
use subledger_store::StoreError;
use thiserror::Error;

use crate::registry::IdentifierError;

/// Why a group produced no contract.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("{}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("unknown project {0:?}")]
    UnknownProject(String),

    #[error("unknown subcontractor {0:?}")]
    UnknownSubcontractor(String),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error("lookup failed: {0}")]
    Lookup(#[source] StoreError),

    #[error("could not store header for {contract_id}: {source}")]
    Header {
        contract_id: String,
        source: StoreError,
    },

    #[error("amounts of {0} overflow")]
    AmountOverflow(String),

    #[error("existing contracts could not be read: {0}")]
    Snapshot(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupStatus {
    /// Header, trade items and responsibilities all stored.
    Persisted {
        contract_id: String,
        total_value: Decimal,
    },
    /// Header stored, but at least one dependent write failed.
    Partial {
        contract_id: String,
        missing: Vec<String>,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupOutcome {
    pub key: ContractGroupKey,
    #[serde(flatten)]
    pub status: GroupStatus,
    /// Rows dropped by row-level validation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl GroupOutcome {
    pub fn failed(key: ContractGroupKey, error: &GroupError) -> Self {
        Self {
            key,
            status: GroupStatus::Failed {
                reason: error.to_string(),
            },
            warnings: Vec::new(),
        }
    }

    /// Human-readable line for the report, or `None` for a clean success.
    pub fn message(&self) -> Option<String> {
        let key = &self.key;
        match &self.status {
            GroupStatus::Persisted { contract_id, .. } if !self.warnings.is_empty() => Some(format!(
                "{key}: stored {contract_id} without {} row(s): {}",
                self.warnings.len(),
                self.warnings.join("; ")
            )),
            GroupStatus::Persisted { .. } => None,
            GroupStatus::Partial {
                contract_id,
                missing,
            } => Some(format!(
                "{key}: {contract_id} partially stored; failed: {}",
                missing.join("; ")
            )),
            GroupStatus::Failed { reason } => Some(format!("{key}: {reason}")),
        }
    }
}

/// Summary of one import batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub success_count: usize,
    pub partial_count: usize,
    pub error_count: usize,
    pub messages: Vec<String>,
    pub outcomes: Vec<GroupOutcome>,
}

impl BatchReport {
    pub fn record(&mut self, outcome: GroupOutcome) {
        match outcome.status {
            GroupStatus::Persisted { .. } => self.success_count += 1,
            GroupStatus::Partial { .. } => self.partial_count += 1,
            GroupStatus::Failed { .. } => self.error_count += 1,
        }
        self.messages.extend(outcome.message());
        self.outcomes.push(outcome);
    }

    pub fn group_count(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_clean(&self) -> bool {
        self.partial_count == 0 && self.error_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ContractGroupKey {
        ContractGroupKey {
            issue_date: String::new(),
            project_name: "Sample Project".into(),
            subcontractor_name: "Sample Company".into(),
            contract_type_raw: "subcontract".into(),
        }
    }

    #[test]
    fn counts_and_messages() {
        let mut report = BatchReport::default();
        report.record(GroupOutcome {
            key: key(),
            status: GroupStatus::Persisted {
                contract_id: "ID-0504-0001".into(),
                total_value: Decimal::from(5000),
            },
            warnings: vec![],
        });
        report.record(GroupOutcome {
            key: key(),
            status: GroupStatus::Partial {
                contract_id: "ID-0504-0002".into(),
                missing: vec!["trade items: boom".into()],
            },
            warnings: vec![],
        });
        report.record(GroupOutcome::failed(
            key(),
            &GroupError::UnknownProject("Nowhere".into()),
        ));

        assert_eq!(
            (report.success_count, report.partial_count, report.error_count),
            (1, 1, 1)
        );
        assert_eq!(report.group_count(), 3);
        assert!(!report.is_clean());
        assert_eq!(
            report.messages,
            vec![
                "(<blank>, Sample Project, Sample Company, subcontract): ID-0504-0002 partially stored; failed: trade items: boom",
                "(<blank>, Sample Project, Sample Company, subcontract): unknown project \"Nowhere\"",
            ]
        );
    }

    #[test]
    fn dropped_rows_are_reported_on_success() {
        let outcome = GroupOutcome {
            key: key(),
            status: GroupStatus::Persisted {
                contract_id: "ID-0504-0001".into(),
                total_value: Decimal::from(1),
            },
            warnings: vec!["line 3: trade is required".into()],
        };
        let msg = outcome.message().unwrap();
        assert!(msg.ends_with("stored ID-0504-0001 without 1 row(s): line 3: trade is required"));
    }

    #[test]
    fn invalid_joins_problems() {
        let err = GroupError::Invalid(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "a; b");
    }

    #[test]
    fn outcome_json_is_flat_and_tagged() {
        let outcome = GroupOutcome {
            key: key(),
            status: GroupStatus::Persisted {
                contract_id: "ID-0504-0001".into(),
                total_value: Decimal::from(5000),
            },
            warnings: vec![],
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "persisted");
        assert_eq!(json["contract_id"], "ID-0504-0001");
        assert_eq!(json["total_value"], "5000");
        assert_eq!(json["key"]["project_name"], "Sample Project");
        assert!(json.get("warnings").is_none());
    }
}
