use serde::Serialize;

use crate::obj::{ObjSectionKind, ObjUnit};

/// A symbol whose inferred size came out negative. Its size is left unknown.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct SizeAnomaly {
    pub unit: String,
    pub symbol: String,
    pub size: i64,
}

/// Infers symbol sizes from consecutive addresses.
///
/// Each symbol spans up to the next one, scaled to the section's unit. The
/// last symbol takes whatever remains of `declared_size`, so the sizes always
/// add up to `declared_size` exactly. Results may be negative when the
/// addresses aren't increasing or the declared size is smaller than the span.
pub fn infer_sizes(addresses: &[u64], declared_size: u64, section: ObjSectionKind) -> Vec<i64> {
    if addresses.is_empty() {
        return vec![];
    }
    let scale = section.unit_scale() as i64;
    let mut sizes = Vec::with_capacity(addresses.len());
    let mut accumulated = 0i64;
    for pair in addresses.windows(2) {
        let size = (pair[1].wrapping_sub(pair[0]) as i64) / scale;
        accumulated = accumulated.wrapping_add(size);
        sizes.push(size);
    }
    sizes.push((declared_size as i64).wrapping_sub(accumulated));
    sizes
}

/// Fills in the sizes of a unit's symbols.
pub fn apply_sizes(unit: &mut ObjUnit, section: ObjSectionKind) -> Vec<SizeAnomaly> {
    let addresses: Vec<u64> = unit.symbols.iter().map(|s| s.address).collect();
    let sizes = infer_sizes(&addresses, unit.size, section);
    let mut anomalies = vec![];
    for (symbol, size) in unit.symbols.iter_mut().zip(sizes) {
        match u64::try_from(size) {
            Ok(size) => symbol.size = Some(size),
            Err(_) => {
                log::warn!(
                    "Negative size {} for {} @ {:#010X} in {}",
                    size,
                    symbol.name,
                    symbol.address,
                    unit.name
                );
                symbol.size = None;
                anomalies.push(SizeAnomaly {
                    unit: unit.name.clone(),
                    symbol: symbol.name.clone(),
                    size,
                });
            }
        }
    }
    anomalies
}

pub fn apply_all_sizes(units: &mut [ObjUnit], section: ObjSectionKind) -> Vec<SizeAnomaly> {
    units.iter_mut().flat_map(|unit| apply_sizes(unit, section)).collect()
}

/// One row of the per-unit size report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitSummary {
    pub address: u64,
    pub name: String,
    pub symbol_count: usize,
    pub max_size: u64,
    pub total_size: u64,
    pub average_size: f64,
}

impl UnitSummary {
    pub fn new(unit: &ObjUnit) -> Self {
        let symbol_count = unit.symbols.len();
        let max_size = unit.symbols.iter().filter_map(|s| s.size).max().unwrap_or(0);
        let average_size =
            if symbol_count == 0 { 0.0 } else { unit.size as f64 / symbol_count as f64 };
        Self {
            address: unit.address,
            name: unit.name.clone(),
            symbol_count,
            max_size,
            total_size: unit.size,
            average_size,
        }
    }
}
