//! Contract identifier grammar.
//!
//! Two grammars are produced and accepted verbatim:
//!
//! - Subcontract: `ID-{project_code}-{seq:04}`, e.g. `ID-0504-0001`
//! - Addendum: `{parent}-ADD{seq:02}`, e.g. `ID-0504-0001-ADD01`
//!
//! An addendum always chains onto a subcontract identifier, never onto
//! another addendum. Project codes are non-empty ASCII alphanumerics so the
//! `-` separators stay unambiguous.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const PREFIX: &str = "ID-";
const ADDENDUM_MARKER: &str = "-ADD";
const SUBCONTRACT_SEQ_WIDTH: usize = 4;
const ADDENDUM_SEQ_WIDTH: usize = 2;

/// Largest sequence representable in the subcontract grammar.
pub const MAX_SUBCONTRACT_SEQ: u32 = 9_999;
/// Largest sequence representable in the addendum grammar.
pub const MAX_ADDENDUM_SEQ: u32 = 99;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("invalid project code {0:?}: expected ASCII letters and digits")]
    ProjectCode(String),
    #[error("sequence {seq} does not fit in {width} digits")]
    SequenceOverflow { seq: u32, width: usize },
    #[error("{0:?} is not a contract identifier")]
    Malformed(String),
}

/// A grammar-conformant contract identifier.
///
/// Only constructed through [`ContractId::subcontract`], [`ContractId::addendum`]
/// or [`ContractId::parse`], so holding one proves the grammar holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContractId(String);

/// Structural view of a parsed identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdShape<'a> {
    Subcontract { project_code: &'a str, seq: u32 },
    Addendum { parent: &'a str, project_code: &'a str, seq: u32 },
}

impl ContractId {
    /// Format a subcontract identifier for `project_code` and `seq`.
    pub fn subcontract(project_code: &str, seq: u32) -> Result<Self, GrammarError> {
        check_project_code(project_code)?;
        if seq == 0 || seq > MAX_SUBCONTRACT_SEQ {
            return Err(GrammarError::SequenceOverflow {
                seq,
                width: SUBCONTRACT_SEQ_WIDTH,
            });
        }
        let id = format!("{PREFIX}{project_code}-{seq:04}");
        Self::parse(&id)
    }

    /// Format the `seq`-th addendum chained onto `parent`.
    pub fn addendum(parent: &ContractId, seq: u32) -> Result<Self, GrammarError> {
        if !parent.is_subcontract() {
            return Err(GrammarError::Malformed(format!(
                "{}{ADDENDUM_MARKER}{seq:02}",
                parent.0
            )));
        }
        if seq == 0 || seq > MAX_ADDENDUM_SEQ {
            return Err(GrammarError::SequenceOverflow {
                seq,
                width: ADDENDUM_SEQ_WIDTH,
            });
        }
        let id = format!("{}{ADDENDUM_MARKER}{seq:02}", parent.0);
        Self::parse(&id)
    }

    /// Accept `s` if it matches either grammar exactly.
    pub fn parse(s: &str) -> Result<Self, GrammarError> {
        match shape(s) {
            Some(_) => Ok(Self(s.to_string())),
            None => Err(GrammarError::Malformed(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn shape(&self) -> IdShape<'_> {
        // Construction guarantees the grammar, so this never falls through.
        shape(&self.0).unwrap_or(IdShape::Subcontract {
            project_code: "",
            seq: 0,
        })
    }

    pub fn is_subcontract(&self) -> bool {
        matches!(self.shape(), IdShape::Subcontract { .. })
    }

    /// The project code embedded in either grammar.
    pub fn project_code(&self) -> &str {
        match self.shape() {
            IdShape::Subcontract { project_code, .. } | IdShape::Addendum { project_code, .. } => {
                project_code
            }
        }
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContractId {
    type Error = GrammarError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContractId> for String {
    fn from(id: ContractId) -> Self {
        id.0
    }
}

/// True if `candidate` is a subcontract identifier in `project_code`.
///
/// Addenda of those subcontracts do not match.
pub fn is_project_subcontract(candidate: &str, project_code: &str) -> bool {
    matches!(
        shape(candidate),
        Some(IdShape::Subcontract { project_code: code, .. }) if code == project_code
    )
}

fn check_project_code(code: &str) -> Result<(), GrammarError> {
    if code.is_empty() || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(GrammarError::ProjectCode(code.to_string()));
    }
    Ok(())
}

fn shape(s: &str) -> Option<IdShape<'_>> {
    if let Some((project_code, seq)) = subcontract_parts(s) {
        return Some(IdShape::Subcontract { project_code, seq });
    }
    let split = s
        .len()
        .checked_sub(ADDENDUM_MARKER.len() + ADDENDUM_SEQ_WIDTH)?;
    if !s.is_char_boundary(split) {
        return None;
    }
    let (parent, suffix) = s.split_at(split);
    let seq = fixed_digits(suffix.strip_prefix(ADDENDUM_MARKER)?, ADDENDUM_SEQ_WIDTH)?;
    let (project_code, _) = subcontract_parts(parent)?;
    Some(IdShape::Addendum {
        parent,
        project_code,
        seq,
    })
}

fn subcontract_parts(s: &str) -> Option<(&str, u32)> {
    let body = s.strip_prefix(PREFIX)?;
    let (project_code, digits) = body.split_once('-')?;
    if check_project_code(project_code).is_err() {
        return None;
    }
    let seq = fixed_digits(digits, SUBCONTRACT_SEQ_WIDTH)?;
    Some((project_code, seq))
}

fn fixed_digits(s: &str, width: usize) -> Option<u32> {
    if s.len() != width || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcontract_is_zero_padded() {
        let id = ContractId::subcontract("0504", 1).unwrap();
        assert_eq!(id.as_str(), "ID-0504-0001");
        assert_eq!(
            id.shape(),
            IdShape::Subcontract {
                project_code: "0504",
                seq: 1
            }
        );
    }

    #[test]
    fn addendum_chains_onto_parent() {
        let parent = ContractId::subcontract("0504", 1).unwrap();
        let add = ContractId::addendum(&parent, 1).unwrap();
        assert_eq!(add.as_str(), "ID-0504-0001-ADD01");
        assert_eq!(add.project_code(), "0504");
        assert!(!add.is_subcontract());
    }

    #[test]
    fn addendum_of_addendum_rejected() {
        let parent = ContractId::subcontract("0504", 1).unwrap();
        let add = ContractId::addendum(&parent, 1).unwrap();
        assert!(ContractId::addendum(&add, 1).is_err());
        assert!(ContractId::parse("ID-0504-0001-ADD01-ADD01").is_err());
    }

    #[test]
    fn overflowing_sequences_fail() {
        assert_eq!(
            ContractId::subcontract("0504", 10_000),
            Err(GrammarError::SequenceOverflow { seq: 10_000, width: 4 })
        );
        let parent = ContractId::subcontract("0504", 9_999).unwrap();
        assert!(ContractId::addendum(&parent, 100).is_err());
        assert!(ContractId::addendum(&parent, 0).is_err());
    }

    #[test]
    fn bad_project_codes_fail() {
        assert!(ContractId::subcontract("", 1).is_err());
        assert!(ContractId::subcontract("05-04", 1).is_err());
        assert!(ContractId::subcontract("05 04", 1).is_err());
        assert!(ContractId::subcontract("A12", 1).is_ok());
        let add = ContractId::addendum(&ContractId::subcontract("ADD7", 3).unwrap(), 2).unwrap();
        assert_eq!(add.as_str(), "ID-ADD7-0003-ADD02");
        assert_eq!(add.project_code(), "ADD7");
    }

    #[test]
    fn parse_rejects_near_misses() {
        for bad in [
            "ID-0504-001",
            "ID-0504-00001",
            "id-0504-0001",
            "ID-0504-0001-ADD1",
            "ID-0504-0001-ADD001",
            "ID--0001",
            "ID-0504-00a1",
            "",
        ] {
            assert!(ContractId::parse(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn project_subcontract_match_excludes_addenda_and_other_projects() {
        assert!(is_project_subcontract("ID-0504-0007", "0504"));
        assert!(!is_project_subcontract("ID-0504-0007-ADD01", "0504"));
        assert!(!is_project_subcontract("ID-0505-0007", "0504"));
        assert!(!is_project_subcontract("legacy-42", "0504"));
    }

    #[test]
    fn serde_enforces_grammar() {
        let id: ContractId = serde_json::from_str("\"ID-0504-0002\"").unwrap();
        assert_eq!(id.as_str(), "ID-0504-0002");
        assert!(serde_json::from_str::<ContractId>("\"nope\"").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"ID-0504-0002\"");
    }
}
