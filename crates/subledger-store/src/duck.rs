//! DuckDB-backed contract store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use arrow::array::{Array, Int64Array, LargeStringArray, StringArray};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use duckdb::{Connection, OptionalExt, params};
use subledger_core::{
    ContractHeader, ContractSummary, ImportState, ProjectRef, RecordId, SubcontractorRef,
    TradeLineItem,
};
use tracing::{debug, info};

use crate::{ContractGateway, StoreError};

const SCHEMA: &str = "
CREATE SEQUENCE IF NOT EXISTS record_id_seq START 1;

CREATE TABLE IF NOT EXISTS projects (
    id BIGINT PRIMARY KEY DEFAULT nextval('record_id_seq'),
    name VARCHAR NOT NULL,
    code VARCHAR
);

CREATE TABLE IF NOT EXISTS subcontractors (
    id BIGINT PRIMARY KEY DEFAULT nextval('record_id_seq'),
    name VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS subcontracts (
    id BIGINT PRIMARY KEY DEFAULT nextval('record_id_seq'),
    contract_id VARCHAR NOT NULL UNIQUE,
    project_id BIGINT NOT NULL,
    subcontractor_id BIGINT NOT NULL,
    contract_type VARCHAR NOT NULL,
    parent_contract_id VARCHAR,
    addendum_sequence INTEGER,
    total_value DECIMAL(18, 4) NOT NULL,
    status VARCHAR NOT NULL,
    date_of_issuing DATE NOT NULL,
    start_date DATE NOT NULL,
    end_date DATE,
    description VARCHAR NOT NULL,
    import_state VARCHAR NOT NULL DEFAULT 'pending'
);

CREATE TABLE IF NOT EXISTS subcontract_trade_items (
    id BIGINT PRIMARY KEY DEFAULT nextval('record_id_seq'),
    subcontract_id BIGINT NOT NULL,
    trade VARCHAR NOT NULL,
    item VARCHAR NOT NULL,
    unit VARCHAR NOT NULL,
    quantity DECIMAL(18, 4) NOT NULL,
    unit_price DECIMAL(18, 4) NOT NULL,
    wastage_percent DECIMAL(7, 4) NOT NULL,
    total DECIMAL(18, 4) NOT NULL
);

CREATE TABLE IF NOT EXISTS responsibilities (
    id BIGINT PRIMARY KEY DEFAULT nextval('record_id_seq'),
    name VARCHAR NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS subcontract_responsibilities (
    subcontract_id BIGINT NOT NULL,
    responsibility_id BIGINT NOT NULL,
    PRIMARY KEY (subcontract_id, responsibility_id)
);
";

const SUMMARY_COLUMNS: &str =
    "contract_id, parent_contract_id, project_id, subcontractor_id, import_state";

/// DuckDB store holding projects, subcontractors and imported contracts.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
/// The connection sits behind a mutex so the store can serve the async
/// gateway from any task; every call is a short synchronous round trip.
pub struct DuckGateway {
    conn: Mutex<Connection>,
}

impl DuckGateway {
    /// Open an in-memory database with the schema in place.
    pub fn open() -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open or create a persistent database at `path`, creating missing tables.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open(path)?),
        };
        store.init_schema()?;
        info!(path = %path.display(), "opened contract store");
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create any missing tables. Idempotent.
    pub fn init_schema(&self) -> Result<(), StoreError> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn insert_project(
        &self,
        name: &str,
        code: Option<&str>,
    ) -> Result<ProjectRef, StoreError> {
        let id: RecordId = self.conn().query_row(
            "INSERT INTO projects (name, code) VALUES (?, ?) RETURNING id",
            params![name, code],
            |row| row.get(0),
        )?;
        Ok(ProjectRef {
            id,
            name: name.to_string(),
            code: code.map(str::to_string),
        })
    }

    pub fn insert_subcontractor(&self, name: &str) -> Result<SubcontractorRef, StoreError> {
        let id: RecordId = self.conn().query_row(
            "INSERT INTO subcontractors (name) VALUES (?) RETURNING id",
            params![name],
            |row| row.get(0),
        )?;
        Ok(SubcontractorRef {
            id,
            name: name.to_string(),
        })
    }

    /// Number of trade items stored against one contract record.
    pub fn trade_item_count(&self, contract: RecordId) -> Result<usize, StoreError> {
        let count: i64 = self.conn().query_row(
            "SELECT count(*)::BIGINT FROM subcontract_trade_items WHERE subcontract_id = ?",
            params![contract],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Responsibility names linked to one contract record, alphabetically.
    pub fn responsibility_names(&self, contract: RecordId) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT r.name FROM subcontract_responsibilities l
             JOIN responsibilities r ON r.id = l.responsibility_id
             WHERE l.subcontract_id = ?
             ORDER BY r.name",
        )?;
        let names = stmt
            .query_map(params![contract], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Contract summaries matching a SQL WHERE clause with at most one parameter.
    fn summaries_where(
        &self,
        where_clause: &str,
        arg: Option<&str>,
    ) -> Result<Vec<ContractSummary>, StoreError> {
        let sql =
            format!("SELECT {SUMMARY_COLUMNS} FROM subcontracts WHERE {where_clause} ORDER BY id");
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let batches: Vec<RecordBatch> = match arg {
            Some(value) => stmt.query_arrow([value])?.collect(),
            None => stmt.query_arrow([])?.collect(),
        };
        summaries_from_batches(&batches)
    }
}

#[async_trait]
impl ContractGateway for DuckGateway {
    async fn find_project(&self, name: &str) -> Result<Option<ProjectRef>, StoreError> {
        let project = self
            .conn()
            .query_row(
                "SELECT id, name, code FROM projects
                 WHERE lower(trim(name)) = lower(trim(?))
                 ORDER BY id LIMIT 1",
                params![name],
                |row| {
                    Ok(ProjectRef {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        code: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(project)
    }

    async fn find_subcontractor(
        &self,
        name: &str,
    ) -> Result<Option<SubcontractorRef>, StoreError> {
        let sub = self
            .conn()
            .query_row(
                "SELECT id, name FROM subcontractors
                 WHERE lower(trim(name)) = lower(trim(?))
                 ORDER BY id LIMIT 1",
                params![name],
                |row| {
                    Ok(SubcontractorRef {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(sub)
    }

    async fn list_contracts(&self) -> Result<Vec<ContractSummary>, StoreError> {
        self.summaries_where("true", None)
    }

    async fn list_addenda(&self, parent: &str) -> Result<Vec<ContractSummary>, StoreError> {
        self.summaries_where("parent_contract_id = ?", Some(parent))
    }

    async fn list_incomplete(&self) -> Result<Vec<ContractSummary>, StoreError> {
        self.summaries_where("import_state = ?", Some(ImportState::Pending.as_str()))
    }

    async fn create_contract_header(
        &self,
        header: &ContractHeader,
    ) -> Result<RecordId, StoreError> {
        let id: RecordId = self.conn().query_row(
            "INSERT INTO subcontracts (
                contract_id, project_id, subcontractor_id, contract_type,
                parent_contract_id, addendum_sequence, total_value, status,
                date_of_issuing, start_date, end_date, description, import_state
             ) VALUES (
                ?, ?, ?, ?, ?, ?, CAST(? AS DECIMAL(18, 4)), ?,
                CAST(? AS DATE), CAST(? AS DATE), CAST(? AS DATE), ?, ?
             ) RETURNING id",
            params![
                header.contract_id.as_str(),
                header.project_id,
                header.subcontractor_id,
                header.contract_type,
                header.parent_contract_id.as_ref().map(|p| p.as_str()),
                header.addendum_sequence.map(i64::from),
                header.total_value.to_string(),
                header.status.as_str(),
                header.date_of_issuing.to_string(),
                header.start_date.to_string(),
                header.end_date.map(|d| d.to_string()),
                header.description,
                header.import_state.as_str(),
            ],
            |row| row.get(0),
        )?;
        debug!(id, contract_id = %header.contract_id, "inserted contract header");
        Ok(id)
    }

    async fn create_trade_items(
        &self,
        contract: RecordId,
        items: &[TradeLineItem],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO subcontract_trade_items (
                    subcontract_id, trade, item, unit,
                    quantity, unit_price, wastage_percent, total
                 ) VALUES (
                    ?, ?, ?, ?,
                    CAST(? AS DECIMAL(18, 4)), CAST(? AS DECIMAL(18, 4)),
                    CAST(? AS DECIMAL(7, 4)), CAST(? AS DECIMAL(18, 4))
                 )",
            )?;
            for item in items {
                stmt.execute(params![
                    contract,
                    item.trade,
                    item.item,
                    item.unit,
                    item.quantity.to_string(),
                    item.unit_price.to_string(),
                    item.wastage_percent.to_string(),
                    item.total.to_string(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn resolve_responsibilities(
        &self,
        names: &[String],
    ) -> Result<Vec<RecordId>, StoreError> {
        let conn = self.conn();
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let name = name.trim();
            let existing: Option<RecordId> = conn
                .query_row(
                    "SELECT id FROM responsibilities WHERE lower(name) = lower(?) ORDER BY id LIMIT 1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            let id = match existing {
                Some(id) => id,
                None => conn.query_row(
                    "INSERT INTO responsibilities (name) VALUES (?) RETURNING id",
                    params![name],
                    |row| row.get(0),
                )?,
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
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO subcontract_responsibilities (subcontract_id, responsibility_id)
                 VALUES (?, ?)",
            )?;
            for responsibility in responsibility_ids {
                stmt.execute(params![contract, responsibility])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn mark_complete(&self, contract: RecordId) -> Result<(), StoreError> {
        let updated = self.conn().execute(
            "UPDATE subcontracts SET import_state = ? WHERE id = ?",
            params![ImportState::Complete.as_str(), contract],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownContract(contract));
        }
        Ok(())
    }
}

// ── Arrow extraction helpers ──

fn summaries_from_batches(batches: &[RecordBatch]) -> Result<Vec<ContractSummary>, StoreError> {
    let mut out = Vec::new();
    for batch in batches {
        let contract_id = column(batch, "contract_id")?;
        let parent = column(batch, "parent_contract_id")?;
        let project = column(batch, "project_id")?;
        let subcontractor = column(batch, "subcontractor_id")?;
        let state = column(batch, "import_state")?;

        for row in 0..batch.num_rows() {
            let contract_id = get_string(contract_id, row)
                .ok_or_else(|| StoreError::Other(format!("null contract_id at row {row}")))?;
            let import_state = get_string(state, row)
                .and_then(|s| ImportState::parse(&s))
                .unwrap_or_default();
            out.push(ContractSummary {
                contract_id,
                parent_contract_id: get_string(parent, row),
                project_id: get_i64(project, row)
                    .ok_or_else(|| StoreError::Other(format!("null project_id at row {row}")))?,
                subcontractor_id: get_i64(subcontractor, row).ok_or_else(|| {
                    StoreError::Other(format!("null subcontractor_id at row {row}"))
                })?,
                import_state,
            });
        }
    }
    Ok(out)
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a dyn Array, StoreError> {
    batch
        .column_by_name(name)
        .map(|c| c.as_ref())
        .ok_or_else(|| StoreError::Other(format!("missing '{name}' column")))
}

/// Extract a string value from an Arrow array (handles Utf8 and LargeUtf8).
fn get_string(col: &dyn Array, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    col.as_any()
        .downcast_ref::<StringArray>()
        .map(|arr| arr.value(row).to_string())
        .or_else(|| {
            col.as_any()
                .downcast_ref::<LargeStringArray>()
                .map(|arr| arr.value(row).to_string())
        })
}

fn get_i64(col: &dyn Array, row: usize) -> Option<i64> {
    if col.is_null(row) {
        return None;
    }
    col.as_any()
        .downcast_ref::<Int64Array>()
        .map(|arr| arr.value(row))
}
