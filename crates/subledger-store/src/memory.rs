//! In-process datastore for tests and local wiring.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use subledger_core::{
    ContractHeader, ContractSummary, ImportState, ProjectRef, RecordId, SubcontractorRef,
    TradeLineItem,
};
use tracing::debug;

use crate::{ContractGateway, StoreError};

/// A stored contract with everything written against it.
#[derive(Debug, Clone)]
pub struct StoredContract {
    pub id: RecordId,
    pub summary: ContractSummary,
    /// `None` for contracts seeded directly from a summary.
    pub header: Option<ContractHeader>,
    pub trade_items: Vec<TradeLineItem>,
    pub responsibility_ids: Vec<RecordId>,
}

#[derive(Default)]
struct MemoryState {
    next_id: RecordId,
    projects: Vec<ProjectRef>,
    subcontractors: Vec<SubcontractorRef>,
    contracts: Vec<StoredContract>,
    responsibilities: Vec<(RecordId, String)>,
}

impl MemoryState {
    fn next_id(&mut self) -> RecordId {
        self.next_id += 1;
        self.next_id
    }

    fn contract_mut(&mut self, id: RecordId) -> Result<&mut StoredContract, StoreError> {
        self.contracts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StoreError::UnknownContract(id))
    }
}

/// [`ContractGateway`] backed by plain vectors behind a mutex.
///
/// Enforces the same uniqueness rule on contract identifiers as the real
/// stores so collision handling can be exercised without a database.
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_project(&self, name: &str, code: Option<&str>) -> ProjectRef {
        let mut state = self.state();
        let project = ProjectRef {
            id: state.next_id(),
            name: name.to_string(),
            code: code.map(str::to_string),
        };
        state.projects.push(project.clone());
        project
    }

    pub fn add_subcontractor(&self, name: &str) -> SubcontractorRef {
        let mut state = self.state();
        let sub = SubcontractorRef {
            id: state.next_id(),
            name: name.to_string(),
        };
        state.subcontractors.push(sub.clone());
        sub
    }

    /// Register a contract that already exists, e.g. one entered by hand.
    pub fn seed_contract(&self, summary: ContractSummary) -> RecordId {
        let mut state = self.state();
        let id = state.next_id();
        state.contracts.push(StoredContract {
            id,
            summary,
            header: None,
            trade_items: Vec::new(),
            responsibility_ids: Vec::new(),
        });
        id
    }

    /// Look up a stored contract by its identifier string.
    pub fn contract(&self, contract_id: &str) -> Option<StoredContract> {
        self.state()
            .contracts
            .iter()
            .find(|c| c.summary.contract_id == contract_id)
            .cloned()
    }

    pub fn contracts(&self) -> Vec<StoredContract> {
        self.state().contracts.clone()
    }

    pub fn responsibility_name(&self, id: RecordId) -> Option<String> {
        self.state()
            .responsibilities
            .iter()
            .find(|(rid, _)| *rid == id)
            .map(|(_, name)| name.clone())
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[async_trait]
impl ContractGateway for MemoryGateway {
    async fn find_project(&self, name: &str) -> Result<Option<ProjectRef>, StoreError> {
        Ok(self
            .state()
            .projects
            .iter()
            .find(|p| same_name(&p.name, name))
            .cloned())
    }

    async fn find_subcontractor(
        &self,
        name: &str,
    ) -> Result<Option<SubcontractorRef>, StoreError> {
        Ok(self
            .state()
            .subcontractors
            .iter()
            .find(|s| same_name(&s.name, name))
            .cloned())
    }

    async fn list_contracts(&self) -> Result<Vec<ContractSummary>, StoreError> {
        Ok(self
            .state()
            .contracts
            .iter()
            .map(|c| c.summary.clone())
            .collect())
    }

    async fn create_contract_header(
        &self,
        header: &ContractHeader,
    ) -> Result<RecordId, StoreError> {
        let mut state = self.state();
        let contract_id = header.contract_id.as_str();
        if state
            .contracts
            .iter()
            .any(|c| c.summary.contract_id == contract_id)
        {
            return Err(StoreError::DuplicateContract(contract_id.to_string()));
        }
        let id = state.next_id();
        state.contracts.push(StoredContract {
            id,
            summary: header.summary(),
            header: Some(header.clone()),
            trade_items: Vec::new(),
            responsibility_ids: Vec::new(),
        });
        debug!(id, contract_id, "stored contract header");
        Ok(id)
    }

    async fn create_trade_items(
        &self,
        contract: RecordId,
        items: &[TradeLineItem],
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state
            .contract_mut(contract)?
            .trade_items
            .extend_from_slice(items);
        Ok(())
    }

    async fn resolve_responsibilities(
        &self,
        names: &[String],
    ) -> Result<Vec<RecordId>, StoreError> {
        let mut state = self.state();
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let existing = state
                .responsibilities
                .iter()
                .find(|(_, n)| same_name(n, name))
                .map(|(id, _)| *id);
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = state.next_id();
                    state.responsibilities.push((id, name.trim().to_string()));
                    id
                }
            };
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn create_responsibility_links(
        &self,
        contract: RecordId,
        responsibility_ids: &[RecordId],
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state
            .contract_mut(contract)?
            .responsibility_ids
            .extend_from_slice(responsibility_ids);
        Ok(())
    }

    async fn mark_complete(&self, contract: RecordId) -> Result<(), StoreError> {
        let mut state = self.state();
        let stored = state.contract_mut(contract)?;
        stored.summary.import_state = ImportState::Complete;
        if let Some(header) = stored.header.as_mut() {
            header.import_state = ImportState::Complete;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use subledger_core::{ContractId, ContractStatus};

    fn header(contract_id: &str, parent: Option<&str>) -> ContractHeader {
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        ContractHeader {
            contract_id: ContractId::parse(contract_id).unwrap(),
            project_id: 1,
            subcontractor_id: 2,
            contract_type: if parent.is_some() { "addendum" } else { "subcontract" }.into(),
            parent_contract_id: parent.map(|p| ContractId::parse(p).unwrap()),
            addendum_sequence: parent.map(|_| 1),
            total_value: Decimal::from(5000),
            status: ContractStatus::Active,
            date_of_issuing: day,
            start_date: day,
            end_date: None,
            description: "test".into(),
            import_state: ImportState::Pending,
        }
    }

    #[tokio::test]
    async fn lookups_ignore_case_and_padding() {
        let store = MemoryGateway::new();
        let project = store.add_project("Sample Project", Some("0504"));
        store.add_subcontractor("Sample Company");

        let found = store.find_project("  sample project ").await.unwrap();
        assert_eq!(found, Some(project));
        assert!(store.find_subcontractor("SAMPLE COMPANY").await.unwrap().is_some());
        assert!(store.find_project("Other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_contract_id_rejected() {
        let store = MemoryGateway::new();
        store
            .create_contract_header(&header("ID-0504-0001", None))
            .await
            .unwrap();
        let err = store
            .create_contract_header(&header("ID-0504-0001", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateContract(id) if id == "ID-0504-0001"));
    }

    #[tokio::test]
    async fn addenda_and_incomplete_listing() {
        let store = MemoryGateway::new();
        let parent = store
            .create_contract_header(&header("ID-0504-0001", None))
            .await
            .unwrap();
        store
            .create_contract_header(&header("ID-0504-0001-ADD01", Some("ID-0504-0001")))
            .await
            .unwrap();
        store.mark_complete(parent).await.unwrap();

        let addenda = store.list_addenda("ID-0504-0001").await.unwrap();
        assert_eq!(addenda.len(), 1);
        assert_eq!(addenda[0].contract_id, "ID-0504-0001-ADD01");

        let incomplete = store.list_incomplete().await.unwrap();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].contract_id, "ID-0504-0001-ADD01");
    }

    #[tokio::test]
    async fn responsibilities_are_reused_and_deduplicated() {
        let store = MemoryGateway::new();
        let first = store
            .resolve_responsibilities(&["Labor".into(), "Material supply".into()])
            .await
            .unwrap();
        let second = store
            .resolve_responsibilities(&["labor".into(), "Labor".into()])
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second, vec![first[0]]);
        assert_eq!(store.responsibility_name(first[1]).as_deref(), Some("Material supply"));
    }

    #[tokio::test]
    async fn writes_against_unknown_contract_fail() {
        let store = MemoryGateway::new();
        let err = store.create_trade_items(99, &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownContract(99)));
        assert!(store.mark_complete(99).await.is_err());
    }
}
