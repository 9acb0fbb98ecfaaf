//! Batch orchestration: rows in, stored aggregates and a report out.
//!
//! Groups run strictly in order. Each group sees the identifiers minted by
//! the groups before it, and the only suspension points are gateway calls,
//! each awaited before the next step starts.

use std::collections::HashMap;
use std::path::Path;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use subledger_core::{
    ContractAggregate, ContractGroup, ContractGroupKey, ImportRow, ProjectRef, RecordId,
    SubcontractorRef,
};
use subledger_store::ContractGateway;
use tracing::{error, info, warn};

use crate::build::build_aggregate;
use crate::group::group_rows;
use crate::normalize::normalize;
use crate::reader::{ReadError, read_rows};
use crate::registry::{IdentifierRegistry, Minted};
use crate::report::{BatchReport, GroupError, GroupOutcome, GroupStatus};
use crate::validate::{ContractType, ValidatedGroup, validate_group};

pub const DEFAULT_UNIT: &str = "nos";

/// Knobs that shape built aggregates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Issue date for groups whose sheet left it blank.
    pub run_date: NaiveDate,
    /// Unit recorded on every line item.
    pub default_unit: String,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            run_date: Local::now().date_naive(),
            default_unit: DEFAULT_UNIT.to_string(),
        }
    }
}

/// Read, normalize, group, validate and store every contract in `path`.
pub async fn import_file<G: ContractGateway + ?Sized>(
    gateway: &G,
    path: &Path,
    options: &BatchOptions,
) -> Result<BatchReport, ReadError> {
    let rows = read_rows(path)?;
    info!(path = %path.display(), rows = rows.len(), "importing contracts");
    Ok(import_rows(gateway, rows, options).await)
}

/// Import already-read rows as one batch. Never fails as a whole: every
/// problem lands in the report against the group it belongs to.
pub async fn import_rows<G: ContractGateway + ?Sized>(
    gateway: &G,
    rows: Vec<ImportRow>,
    options: &BatchOptions,
) -> BatchReport {
    let groups = group_rows(normalize(rows));
    let mut report = BatchReport::default();

    let persisted = match gateway.list_contracts().await {
        Ok(contracts) => contracts,
        Err(e) => {
            error!(error = %e, "cannot read existing contracts, failing batch");
            let err = GroupError::Snapshot(e.to_string());
            for group in groups {
                report.record(GroupOutcome::failed(group.key, &err));
            }
            return report;
        }
    };

    let mut batch = Batch {
        gateway,
        options,
        registry: IdentifierRegistry::new(persisted),
        projects: HashMap::new(),
        subcontractors: HashMap::new(),
    };
    for group in &groups {
        report.record(batch.import_group(group).await);
    }

    info!(
        groups = report.group_count(),
        stored = report.success_count,
        partial = report.partial_count,
        failed = report.error_count,
        "import batch finished"
    );
    report
}

/// Validation result for one group, without touching a datastore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCheck {
    pub key: ContractGroupKey,
    /// Line items that would be stored.
    pub lines: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl GroupCheck {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Normalize, group and validate `rows` only.
pub fn check_batch(rows: Vec<ImportRow>) -> Vec<GroupCheck> {
    group_rows(normalize(rows))
        .into_iter()
        .map(|group| match validate_group(&group) {
            Ok(valid) => GroupCheck {
                key: group.key,
                lines: valid.lines.len(),
                errors: Vec::new(),
                warnings: valid.warnings,
            },
            Err(errors) => GroupCheck {
                key: group.key,
                lines: 0,
                errors,
                warnings: Vec::new(),
            },
        })
        .collect()
}

/// State owned by one batch run.
struct Batch<'a, G: ?Sized> {
    gateway: &'a G,
    options: &'a BatchOptions,
    registry: IdentifierRegistry,
    projects: HashMap<String, Option<ProjectRef>>,
    subcontractors: HashMap<String, Option<SubcontractorRef>>,
}

impl<G: ContractGateway + ?Sized> Batch<'_, G> {
    async fn import_group(&mut self, group: &ContractGroup) -> GroupOutcome {
        let key = group.key.clone();
        let valid = match validate_group(group) {
            Ok(valid) => valid,
            Err(problems) => {
                let err = GroupError::Invalid(problems);
                warn!(group = %key, error = %err, "group rejected");
                return GroupOutcome::failed(key, &err);
            }
        };

        let status = match self.store_group(&valid).await {
            Ok(status) => status,
            Err(err) => {
                warn!(group = %key, error = %err, "group failed");
                return GroupOutcome::failed(key, &err);
            }
        };
        GroupOutcome {
            key,
            status,
            warnings: valid.warnings,
        }
    }

    async fn store_group(&mut self, valid: &ValidatedGroup) -> Result<GroupStatus, GroupError> {
        let project = self.project(&valid.key.project_name).await?;
        let subcontractor = self.subcontractor(&valid.key.subcontractor_name).await?;
        let minted = self.mint(valid, &project, &subcontractor)?;
        let contract_id = minted.contract_id.clone();
        let Some(aggregate) =
            build_aggregate(valid, minted, &project, &subcontractor, self.options)
        else {
            self.registry.release(&contract_id);
            return Err(GroupError::AmountOverflow(contract_id.to_string()));
        };

        let record = match self.gateway.create_contract_header(&aggregate.header()).await {
            Ok(record) => record,
            Err(source) => {
                self.registry.release(&aggregate.contract_id);
                return Err(GroupError::Header {
                    contract_id: aggregate.contract_id.to_string(),
                    source,
                });
            }
        };

        let missing = self.store_dependents(record, &aggregate).await;
        let contract_id = aggregate.contract_id.to_string();
        if missing.is_empty() {
            info!(%contract_id, total = %aggregate.total_value, "contract stored");
            Ok(GroupStatus::Persisted {
                contract_id,
                total_value: aggregate.total_value,
            })
        } else {
            warn!(%contract_id, record, ?missing, "contract partially stored");
            Ok(GroupStatus::Partial {
                contract_id,
                missing,
            })
        }
    }

    fn mint(
        &mut self,
        valid: &ValidatedGroup,
        project: &ProjectRef,
        subcontractor: &SubcontractorRef,
    ) -> Result<Minted, GroupError> {
        let minted = match valid.contract_type {
            ContractType::Subcontract => self.registry.mint_subcontract(project, subcontractor)?,
            ContractType::Addendum => {
                let parent = self.registry.resolve_parent(
                    valid.parent_contract_id.as_deref(),
                    project,
                    subcontractor,
                )?;
                self.registry.mint_addendum(&parent, project, subcontractor)?
            }
        };
        Ok(minted)
    }

    /// Write trade items and responsibilities, then flip the header to
    /// complete. Returns what failed; empty means the aggregate is whole.
    async fn store_dependents(
        &self,
        record: RecordId,
        aggregate: &ContractAggregate,
    ) -> Vec<String> {
        let mut missing = Vec::new();

        if let Err(e) = self
            .gateway
            .create_trade_items(record, &aggregate.trade_items)
            .await
        {
            missing.push(format!("trade items: {e}"));
        }

        if !aggregate.responsibilities.is_empty() {
            let linked = match self
                .gateway
                .resolve_responsibilities(&aggregate.responsibilities)
                .await
            {
                Ok(ids) => self.gateway.create_responsibility_links(record, &ids).await,
                Err(e) => Err(e),
            };
            if let Err(e) = linked {
                missing.push(format!("responsibilities: {e}"));
            }
        }

        if missing.is_empty() {
            if let Err(e) = self.gateway.mark_complete(record).await {
                missing.push(format!("completion marker: {e}"));
            }
        }
        missing
    }

    async fn project(&mut self, name: &str) -> Result<ProjectRef, GroupError> {
        let cache_key = name.trim().to_lowercase();
        let found = match self.projects.get(&cache_key) {
            Some(cached) => cached.clone(),
            None => {
                let found = self
                    .gateway
                    .find_project(name)
                    .await
                    .map_err(GroupError::Lookup)?;
                self.projects.insert(cache_key, found.clone());
                found
            }
        };
        found.ok_or_else(|| GroupError::UnknownProject(name.to_string()))
    }

    async fn subcontractor(&mut self, name: &str) -> Result<SubcontractorRef, GroupError> {
        let cache_key = name.trim().to_lowercase();
        let found = match self.subcontractors.get(&cache_key) {
            Some(cached) => cached.clone(),
            None => {
                let found = self
                    .gateway
                    .find_subcontractor(name)
                    .await
                    .map_err(GroupError::Lookup)?;
                self.subcontractors.insert(cache_key, found.clone());
                found
            }
        };
        found.ok_or_else(|| GroupError::UnknownSubcontractor(name.to_string()))
    }
}
