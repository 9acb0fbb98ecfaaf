//! The operations the import pipeline needs from the contract datastore.

use async_trait::async_trait;
use subledger_core::{
    ContractHeader, ContractSummary, ImportState, ProjectRef, RecordId, SubcontractorRef,
    TradeLineItem,
};

use crate::StoreError;

/// Datastore gateway for contract imports.
///
/// Writes are deliberately fine-grained: the header, its trade items and its
/// responsibility links are separate calls with no transaction spanning them.
/// Callers own the partial-failure policy.
///
/// Name lookups are case-insensitive and ignore surrounding whitespace.
#[async_trait]
pub trait ContractGateway: Send + Sync {
    async fn find_project(&self, name: &str) -> Result<Option<ProjectRef>, StoreError>;

    async fn find_subcontractor(&self, name: &str)
    -> Result<Option<SubcontractorRef>, StoreError>;

    /// Every stored contract, in insertion order.
    async fn list_contracts(&self) -> Result<Vec<ContractSummary>, StoreError>;

    /// Stored addenda chained onto `parent`.
    async fn list_addenda(&self, parent: &str) -> Result<Vec<ContractSummary>, StoreError> {
        let contracts = self.list_contracts().await?;
        Ok(contracts
            .into_iter()
            .filter(|c| c.parent_contract_id.as_deref() == Some(parent))
            .collect())
    }

    /// Headers whose dependent writes never completed.
    async fn list_incomplete(&self) -> Result<Vec<ContractSummary>, StoreError> {
        let contracts = self.list_contracts().await?;
        Ok(contracts
            .into_iter()
            .filter(|c| c.import_state == ImportState::Pending)
            .collect())
    }

    /// Insert a contract header and return its record id.
    async fn create_contract_header(&self, header: &ContractHeader)
    -> Result<RecordId, StoreError>;

    /// Insert all trade items of one contract as a single write.
    async fn create_trade_items(
        &self,
        contract: RecordId,
        items: &[TradeLineItem],
    ) -> Result<(), StoreError>;

    /// Map responsibility names to record ids, creating unknown names.
    ///
    /// The result is deduplicated and keeps first-seen order.
    async fn resolve_responsibilities(&self, names: &[String])
    -> Result<Vec<RecordId>, StoreError>;

    /// Link responsibilities to one contract as a single write.
    async fn create_responsibility_links(
        &self,
        contract: RecordId,
        responsibility_ids: &[RecordId],
    ) -> Result<(), StoreError>;

    /// Flip a header's import state to [`ImportState::Complete`].
    async fn mark_complete(&self, contract: RecordId) -> Result<(), StoreError>;
}
