//! Differ
//!
//! Compares actual against expected attribute by attribute. Provider-only
//! fields, outputs and tags are never compared. Never mutates anything.
//!
//! Semantic mode compares the declared attributes plus any attribute an
//! earlier apply declared (recorded in the managed-attributes tag) that the
//! declaration has since dropped. Structural mode compares every known
//! attribute on either side.

use crate::algorithms::tags::managed_attributes;
use crate::domain::entities::{Observed, ResourceState};
use crate::domain::value_objects::{Change, DiffMode, FieldChange};
use std::collections::BTreeSet;

/// Classify one resource.
pub fn diff(actual: &Observed, expected: Option<&ResourceState>, mode: DiffMode) -> Change {
    match (actual, expected) {
        (Observed::NotFound, None) => Change::Unchanged,
        (Observed::NotFound, Some(_)) => Change::Create,
        (Observed::Found(_), None) => Change::Delete,
        (Observed::Found(actual), Some(expected)) => {
            let fields = field_changes(actual, expected, mode);
            if fields.is_empty() {
                Change::Unchanged
            } else {
                Change::Update { fields }
            }
        }
    }
}

/// Attributes that differ, sorted by name. A change with no expected value
/// means the attribute should be cleared.
///
/// An expected value that still holds a reference always differs: its
/// dependency has not rendered yet, so the value cannot be known to match.
pub fn field_changes(
    actual: &ResourceState,
    expected: &ResourceState,
    mode: DiffMode,
) -> Vec<FieldChange> {
    let mut names: BTreeSet<&String> = expected.attributes.keys().collect();
    match mode {
        DiffMode::Structural => names.extend(actual.attributes.keys()),
        DiffMode::Semantic => {
            let managed = managed_attributes(&actual.tags);
            names.extend(actual.attributes.keys().filter(|n| managed.contains(n.as_str())));
        }
    }

    names
        .into_iter()
        .filter_map(|name| {
            let have = actual.attributes.get(name);
            let want = expected.attributes.get(name);
            let differs = match want {
                Some(w) if !w.is_resolved() => true,
                _ => have != want,
            };
            differs.then(|| FieldChange {
                field: name.clone(),
                actual: have.cloned(),
                expected: want.cloned(),
            })
        })
        .collect()
}
