use indexmap::{map::Entry, IndexMap};

use crate::obj::ObjUnit;

/// Directory part of a unit name. Units at the root map to `""`.
#[inline]
pub fn unit_folder(name: &str) -> &str { name.rsplit_once('/').map_or("", |(dir, _)| dir) }

/// Merges units sharing a directory into a single unit named after it.
///
/// Folders keep first-seen order. The merged unit starts at its first member's
/// address, sums the declared sizes (saturating) and concatenates the symbol lists
/// in member order. Symbol sizes are carried over as they are.
pub fn aggregate_folders(units: Vec<ObjUnit>) -> Vec<ObjUnit> {
    let mut folders = IndexMap::<String, ObjUnit>::new();
    for unit in units {
        match folders.entry(unit_folder(&unit.name).to_string()) {
            Entry::Occupied(mut e) => {
                let size = e.get().size.checked_add(unit.size).unwrap_or_else(|| {
                    log::warn!("Size of folder {} overflows at {}", e.key(), unit.name);
                    u64::MAX
                });
                let folder = e.get_mut();
                folder.size = size;
                folder.symbols.extend(unit.symbols);
            }
            Entry::Vacant(e) => {
                let name = e.key().clone();
                e.insert(ObjUnit { name, ..unit });
            }
        }
    }
    folders.into_values().collect()
}
