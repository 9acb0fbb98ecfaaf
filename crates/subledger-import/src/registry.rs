//! Batch-scoped contract identifier registry.
//!
//! Holds the identifiers persisted when the batch started plus the ones
//! minted so far in this batch. A minted identifier is registered before the
//! caller persists anything, so the next group already sees it.
//!
//! Released identifiers (header write failed) stop counting towards
//! sequences and can no longer be parents, but stay reserved until the batch
//! ends so no other group is handed the same identifier.

use std::collections::HashSet;

use subledger_core::{
    ContractId, ContractKind, ContractSummary, GrammarError, ProjectRef, SubcontractorRef,
    is_project_subcontract,
};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum IdentifierError {
    #[error("project {0:?} has no project code")]
    MissingProjectCode(String),

    #[error("project code {0:?} cannot appear in a contract identifier")]
    InvalidProjectCode(String),

    #[error("parent contract {0:?} does not exist")]
    UnknownParent(String),

    #[error("parent contract {0:?} is an addendum; addenda chain onto subcontracts only")]
    ParentNotSubcontract(String),

    #[error("no subcontract found for project {project:?} and subcontractor {subcontractor:?}")]
    NoParent {
        project: String,
        subcontractor: String,
    },

    #[error("internal defect: minted identifier violates the grammar: {0}")]
    Grammar(#[source] GrammarError),
}

/// A freshly minted identifier and the contract kind it was minted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Minted {
    pub contract_id: ContractId,
    pub kind: ContractKind,
}

pub struct IdentifierRegistry {
    persisted: Vec<ContractSummary>,
    session: Vec<ContractSummary>,
    retired: HashSet<String>,
}

impl IdentifierRegistry {
    /// Start a batch from the contracts stored at batch start.
    pub fn new(persisted: Vec<ContractSummary>) -> Self {
        debug!(persisted = persisted.len(), "identifier registry opened");
        Self {
            persisted,
            session: Vec::new(),
            retired: HashSet::new(),
        }
    }

    /// True if `contract_id` is taken: persisted, minted, or released this batch.
    pub fn contains(&self, contract_id: &str) -> bool {
        self.retired.contains(contract_id) || self.live().any(|c| c.contract_id == contract_id)
    }

    /// Identifiers minted this batch and not released, in mint order.
    pub fn session_ids(&self) -> impl Iterator<Item = &str> {
        self.session.iter().map(|c| c.contract_id.as_str())
    }

    fn live(&self) -> impl Iterator<Item = &ContractSummary> {
        self.persisted.iter().chain(&self.session)
    }

    /// Mint the next subcontract identifier for `project`.
    pub fn mint_subcontract(
        &mut self,
        project: &ProjectRef,
        subcontractor: &SubcontractorRef,
    ) -> Result<Minted, IdentifierError> {
        let code = project_code(project)?;
        let taken = self
            .live()
            .filter(|c| is_project_subcontract(&c.contract_id, code))
            .count();

        let mut seq = sequence_after(taken);
        let contract_id = loop {
            let candidate = ContractId::subcontract(code, seq).map_err(defect)?;
            if !self.contains(candidate.as_str()) {
                break candidate;
            }
            debug!(%candidate, "identifier taken, trying next sequence");
            seq += 1;
        };

        self.register(&contract_id, None, project, subcontractor);
        Ok(Minted {
            contract_id,
            kind: ContractKind::Subcontract,
        })
    }

    /// Find the subcontract an addendum chains onto.
    ///
    /// An explicit reference must name a live subcontract. Without one, the
    /// most recent subcontract for the same project and subcontractor wins,
    /// preferring identifiers minted this batch over persisted ones.
    pub fn resolve_parent(
        &self,
        explicit: Option<&str>,
        project: &ProjectRef,
        subcontractor: &SubcontractorRef,
    ) -> Result<ContractId, IdentifierError> {
        if let Some(raw) = explicit {
            let raw = raw.trim();
            let parent =
                ContractId::parse(raw).map_err(|_| IdentifierError::UnknownParent(raw.to_string()))?;
            if !parent.is_subcontract() {
                return Err(IdentifierError::ParentNotSubcontract(raw.to_string()));
            }
            if !self.live().any(|c| c.contract_id == raw) {
                return Err(IdentifierError::UnknownParent(raw.to_string()));
            }
            return Ok(parent);
        }

        self.session
            .iter()
            .rev()
            .chain(self.persisted.iter().rev())
            .filter(|c| {
                c.parent_contract_id.is_none()
                    && c.project_id == project.id
                    && c.subcontractor_id == subcontractor.id
            })
            .find_map(|c| {
                ContractId::parse(&c.contract_id)
                    .ok()
                    .filter(ContractId::is_subcontract)
            })
            .ok_or_else(|| IdentifierError::NoParent {
                project: project.name.clone(),
                subcontractor: subcontractor.name.clone(),
            })
    }

    /// Mint the next addendum identifier chained onto `parent`.
    pub fn mint_addendum(
        &mut self,
        parent: &ContractId,
        project: &ProjectRef,
        subcontractor: &SubcontractorRef,
    ) -> Result<Minted, IdentifierError> {
        if !parent.is_subcontract() {
            return Err(IdentifierError::ParentNotSubcontract(parent.to_string()));
        }
        let taken = self
            .live()
            .filter(|c| c.parent_contract_id.as_deref() == Some(parent.as_str()))
            .count();

        let mut seq = sequence_after(taken);
        let contract_id = loop {
            let candidate = ContractId::addendum(parent, seq).map_err(defect)?;
            if !self.contains(candidate.as_str()) {
                break candidate;
            }
            debug!(%candidate, "identifier taken, trying next sequence");
            seq += 1;
        };

        self.register(&contract_id, Some(parent), project, subcontractor);
        Ok(Minted {
            contract_id,
            kind: ContractKind::Addendum {
                parent: parent.clone(),
                sequence: seq,
            },
        })
    }

    /// Give back an identifier whose header never reached the datastore.
    pub fn release(&mut self, contract_id: &ContractId) {
        let before = self.session.len();
        self.session.retain(|c| c.contract_id != contract_id.as_str());
        if self.session.len() != before {
            self.retired.insert(contract_id.to_string());
            debug!(%contract_id, "identifier released");
        }
    }

    fn register(
        &mut self,
        contract_id: &ContractId,
        parent: Option<&ContractId>,
        project: &ProjectRef,
        subcontractor: &SubcontractorRef,
    ) {
        debug!(%contract_id, "identifier minted");
        self.session.push(ContractSummary {
            contract_id: contract_id.to_string(),
            parent_contract_id: parent.map(ToString::to_string),
            project_id: project.id,
            subcontractor_id: subcontractor.id,
            import_state: Default::default(),
        });
    }
}

fn project_code(project: &ProjectRef) -> Result<&str, IdentifierError> {
    let code = project
        .code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| IdentifierError::MissingProjectCode(project.name.clone()))?;
    if !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(IdentifierError::InvalidProjectCode(code.to_string()));
    }
    Ok(code)
}

fn sequence_after(taken: usize) -> u32 {
    u32::try_from(taken).map_or(u32::MAX, |n| n.saturating_add(1))
}

fn defect(err: GrammarError) -> IdentifierError {
    error!(error = %err, "minted contract identifier violates the grammar");
    IdentifierError::Grammar(err)
}
