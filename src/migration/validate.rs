//! Integrity checks between discovered migrations and the ledger.

use super::types::{MigrationDescriptor, MigrationError};
use std::collections::{BTreeSet, HashSet};

/// Check that the applied set is exactly a prefix of the total order.
///
/// Fails with [`MigrationError::OrphanRecord`] listing every applied
/// identifier that is no longer discovered, and with
/// [`MigrationError::OutOfOrderExecution`] for the first applied migration
/// that follows a pending one.
pub fn validate_integrity(
    sorted: &[MigrationDescriptor],
    applied: &BTreeSet<String>,
) -> Result<(), MigrationError> {
    let known: HashSet<&str> = sorted.iter().map(|d| d.identifier.as_str()).collect();

    let orphans: Vec<String> = applied
        .iter()
        .filter(|id| !known.contains(id.as_str()))
        .cloned()
        .collect();
    if !orphans.is_empty() {
        return Err(MigrationError::OrphanRecord(orphans));
    }

    let mut found_pending = false;
    for descriptor in sorted {
        let is_applied = applied.contains(&descriptor.identifier);
        if found_pending && is_applied {
            return Err(MigrationError::OutOfOrderExecution(
                descriptor.identifier.clone(),
            ));
        }
        if !is_applied {
            found_pending = true;
        }
    }

    Ok(())
}

/// The pending suffix: discovered migrations not in the ledger, in order.
pub fn pending<'a>(
    sorted: &'a [MigrationDescriptor],
    applied: &BTreeSet<String>,
) -> Vec<&'a MigrationDescriptor> {
    sorted
        .iter()
        .filter(|d| !applied.contains(&d.identifier))
        .collect()
}
