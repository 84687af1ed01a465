use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::Serialize;

use crate::obj::ObjUnit;

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct SymbolLocation {
    pub unit: String,
    pub address: u64,
}

/// Symbol name to location, in first-seen order.
pub type SymbolTable = IndexMap<String, SymbolLocation>;

/// Flattens units into a symbol table.
///
/// When a name appears in several units, the last unit wins. The entry keeps
/// the iteration position of the first occurrence.
pub fn build_symbol_table(units: &[ObjUnit]) -> SymbolTable {
    let mut table = SymbolTable::new();
    for unit in units {
        for symbol in &unit.symbols {
            let location = SymbolLocation { unit: unit.name.clone(), address: symbol.address };
            if let Some(previous) = table.insert(symbol.name.clone(), location) {
                log::debug!(
                    "Duplicate symbol {} in {} overrides {}",
                    symbol.name,
                    unit.name,
                    previous.unit
                );
            }
        }
    }
    table
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum SymbolStatus {
    /// Present on both sides in the same unit
    Matched { delta: i64 },
    /// Present on both sides, owned by different units
    Moved { delta: i64 },
    MissingFromExpected,
    MissingFromBuild,
}

impl SymbolStatus {
    /// Build address minus expected address, if the symbol is on both sides.
    #[inline]
    pub fn delta(self) -> Option<i64> {
        match self {
            SymbolStatus::Matched { delta } | SymbolStatus::Moved { delta } => Some(delta),
            SymbolStatus::MissingFromExpected | SymbolStatus::MissingFromBuild => None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ComparisonRecord {
    pub name: String,
    pub build: Option<SymbolLocation>,
    pub expected: Option<SymbolLocation>,
    pub status: SymbolStatus,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct BssComparison {
    pub records: Vec<ComparisonRecord>,
    /// Units with at least one symbol at a different address
    pub reordered: BTreeSet<String>,
    /// Units with at least one symbol present on only one side
    pub missing: BTreeSet<String>,
}

impl BssComparison {
    #[inline]
    pub fn is_clean(&self) -> bool { self.reordered.is_empty() && self.missing.is_empty() }
}

/// Compares the build's symbol table against the expected one.
pub fn compare_symbol_tables(build: &SymbolTable, expected: &SymbolTable) -> BssComparison {
    let mut result = BssComparison::default();
    for (name, build_loc) in build {
        let status = match expected.get(name) {
            Some(expected_loc) => {
                let delta = build_loc.address.wrapping_sub(expected_loc.address) as i64;
                if delta != 0 {
                    result.reordered.insert(build_loc.unit.clone());
                }
                if build_loc.unit == expected_loc.unit {
                    SymbolStatus::Matched { delta }
                } else {
                    SymbolStatus::Moved { delta }
                }
            }
            None => {
                result.missing.insert(build_loc.unit.clone());
                SymbolStatus::MissingFromExpected
            }
        };
        result.records.push(ComparisonRecord {
            name: name.clone(),
            build: Some(build_loc.clone()),
            expected: expected.get(name).cloned(),
            status,
        });
    }
    for (name, expected_loc) in expected {
        if build.contains_key(name) {
            continue;
        }
        result.missing.insert(expected_loc.unit.clone());
        result.records.push(ComparisonRecord {
            name: name.clone(),
            build: None,
            expected: Some(expected_loc.clone()),
            status: SymbolStatus::MissingFromBuild,
        });
    }
    result
}
