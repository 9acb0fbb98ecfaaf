//! Partition normalized rows into contract groups.

use std::collections::HashMap;

use subledger_core::{ContractGroup, ContractGroupKey, ImportRow};

/// Group rows by [`ContractGroupKey`].
///
/// Groups come out in first-seen order and rows keep their input order
/// within a group, so identifier sequences are reproducible for a given file.
pub fn group_rows(rows: Vec<ImportRow>) -> Vec<ContractGroup> {
    let mut index: HashMap<ContractGroupKey, usize> = HashMap::new();
    let mut groups: Vec<ContractGroup> = Vec::new();

    for row in rows {
        let key = row.key();
        match index.get(&key) {
            Some(&i) => groups[i].rows.push(row),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(ContractGroup {
                    key,
                    rows: vec![row],
                });
            }
        }
    }
    groups
}
