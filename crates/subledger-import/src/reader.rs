//! Positional CSV reader for contract import sheets.
//!
//! Columns, after a skipped header row:
//!
//! | # | column |
//! |---|---|
//! | 0 | Date of Issuing |
//! | 1 | Project Name |
//! | 2 | Subcontractor Company |
//! | 3 | Type of contract (`subcontract` / `ADD`) |
//! | 4 | Trade |
//! | 5 | Item |
//! | 6 | Quantity |
//! | 7 | Rate |
//! | 8 | Wastage % |
//! | 9 | Responsibilities (comma-separated) |
//! | 10 | Parent Contract ID (optional) |
//!
//! Short rows are accepted; missing trailing cells read as blank.

use std::io::Read;
use std::path::{Path, PathBuf};

use subledger_core::ImportRow;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("cannot open {path}: {source}")]
    Open { path: PathBuf, source: csv::Error },

    #[error("malformed record: {0}")]
    Csv(#[from] csv::Error),
}

/// Read every data row of the import file at `path`.
pub fn read_rows(path: &Path) -> Result<Vec<ImportRow>, ReadError> {
    let reader = builder()
        .from_path(path)
        .map_err(|source| ReadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    collect_rows(reader)
}

/// Read every data row from any byte source.
pub fn read_rows_from<R: Read>(source: R) -> Result<Vec<ImportRow>, ReadError> {
    collect_rows(builder().from_reader(source))
}

fn builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All);
    builder
}

fn collect_rows<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<ImportRow>, ReadError> {
    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result?;
        // Header is line 1; fall back to counting when the position is unknown.
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2);
        let cell = |i: usize| record.get(i).unwrap_or("").trim().to_string();
        rows.push(ImportRow {
            line,
            issue_date: cell(0),
            project_name: cell(1),
            subcontractor_name: cell(2),
            contract_type_raw: cell(3),
            trade: cell(4),
            item: cell(5),
            quantity: cell(6),
            rate: cell(7),
            wastage_percent: cell(8),
            responsibilities_raw: cell(9),
            parent_contract_id: cell(10),
        });
    }
    debug!(rows = rows.len(), "read import rows");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SHEET: &str = "\
Date of Issuing,Project Name,Subcontractor Company,Type of contract,Trade,Item,Quantity,Rate,Wastage %,Responsibilities
2024-01-15,Sample Project,Sample Company,subcontract,Masonry,Brick Work,100,50,5,\"Material supply, Labor\"
,,,,Masonry,Plaster,20,10
";

    #[test]
    fn maps_columns_by_position() {
        let rows = read_rows_from(SHEET.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.line, 2);
        assert_eq!(first.issue_date, "2024-01-15");
        assert_eq!(first.project_name, "Sample Project");
        assert_eq!(first.contract_type_raw, "subcontract");
        assert_eq!(first.quantity, "100");
        assert_eq!(first.responsibilities_raw, "Material supply, Labor");
        assert_eq!(first.parent_contract_id, "");
    }

    #[test]
    fn short_rows_read_as_blank() {
        let rows = read_rows_from(SHEET.as_bytes()).unwrap();
        let second = &rows[1];
        assert_eq!(second.line, 3);
        assert_eq!(second.project_name, "");
        assert_eq!(second.rate, "10");
        assert_eq!(second.wastage_percent, "");
        assert_eq!(second.responsibilities_raw, "");
    }

    #[test]
    fn explicit_parent_column_is_read() {
        let sheet = "h0,h1,h2,h3,h4,h5,h6,h7,h8,h9,h10\n\
                     2024-02-01,P,S,ADD,Masonry,Extra,1,1,0,,ID-0504-0001\n";
        let rows = read_rows_from(sheet.as_bytes()).unwrap();
        assert_eq!(rows[0].parent_contract_id, "ID-0504-0001");
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SHEET.as_bytes()).unwrap();
        let rows = read_rows(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = read_rows(Path::new("/nonexistent/import.csv")).unwrap_err();
        assert!(matches!(err, ReadError::Open { .. }));
        assert!(err.to_string().contains("/nonexistent/import.csv"));
    }
}
