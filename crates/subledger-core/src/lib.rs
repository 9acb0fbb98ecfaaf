pub mod contract;
pub mod contract_id;
pub mod row;

pub use contract::{
    AMOUNT_SCALE, ContractAggregate, ContractHeader, ContractKind, ContractStatus, ContractSummary,
    ImportState, ProjectRef, RecordId, SubcontractorRef, TradeLineItem, contract_total, line_total,
};
pub use contract_id::{ContractId, GrammarError, IdShape, is_project_subcontract};
pub use row::{ContractGroup, ContractGroupKey, ImportRow};
