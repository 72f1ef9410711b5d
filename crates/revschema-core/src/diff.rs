//! Column change classification and primary key reconciliation.
//!
//! New columns are paired with old ones by `original_name`, never by
//! position, so reordering columns alone is not a change.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, SynthError};
use crate::snapshot::{ChangeMarker, ColumnSnapshot};

// ================================================================
// Classification
// ================================================================

/// Marks every column of `new` as added, edited, renamed or unchanged
/// relative to `old`, and appends a `Removed` entry for every old column
/// that no new column claims.
///
/// Markers already set by the caller are kept.
///
/// # Errors
///
/// Returns [`SynthError::DiffConflict`] if two new columns claim the same
/// original column, or if two resulting columns share a name.
pub fn classify(old: &[ColumnSnapshot], new: &[ColumnSnapshot]) -> Result<Vec<ColumnSnapshot>> {
    let by_name: HashMap<&str, &ColumnSnapshot> =
        old.iter().map(|c| (c.column_name.as_str(), c)).collect();
    let mut claimed: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(new.len() + old.len());

    for column in new {
        let mut column = column.clone();
        let previous = column
            .original_name
            .as_deref()
            .and_then(|name| by_name.get(name).copied());

        if let Some(previous) = previous {
            if !claimed.insert(previous.column_name.as_str()) {
                return Err(SynthError::DiffConflict {
                    column: previous.column_name.clone(),
                    reason: "claimed by more than one new column".to_string(),
                });
            }
            if column.change == ChangeMarker::Unset && column.differs_from(previous) {
                column.change = if column.column_name == previous.column_name {
                    ChangeMarker::Edited
                } else {
                    ChangeMarker::RenamedAndEdited
                };
            }
        } else if column.change == ChangeMarker::Unset {
            column.change = ChangeMarker::Added;
        }
        out.push(column);
    }

    let mut names: HashSet<&str> = HashSet::new();
    for column in out.iter().filter(|c| c.change != ChangeMarker::Removed) {
        if !names.insert(column.column_name.as_str()) {
            return Err(SynthError::DiffConflict {
                column: column.column_name.clone(),
                reason: "more than one column would carry this name".to_string(),
            });
        }
    }

    for column in old {
        if !claimed.contains(column.column_name.as_str()) {
            let mut removed = column.clone();
            removed.original_name = Some(column.column_name.clone());
            removed.change = ChangeMarker::Removed;
            out.push(removed);
        }
    }
    Ok(out)
}

/// Finds the old column a classified column was derived from.
#[must_use]
pub fn previous_of<'a>(old: &'a [ColumnSnapshot], column: &ColumnSnapshot) -> Option<&'a ColumnSnapshot> {
    let name = column.original_name.as_deref()?;
    old.iter().find(|c| c.column_name == name)
}

// ================================================================
// Primary key reconciliation
// ================================================================

/// A primary key rebuild: optionally drop the current constraint, then add
/// one over `columns` unless it is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeyChange {
    /// Whether a primary key currently exists and must be dropped.
    pub drop_existing: bool,
    /// Ordered key columns after the change.
    pub columns: Vec<String>,
}

fn key_sequence(columns: &[ColumnSnapshot]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| c.is_primary_key && c.change != ChangeMarker::Removed)
        .map(|c| c.column_name.clone())
        .collect()
}

/// Compares the ordered primary key sequences of `new` and `old`.
///
/// Returns `None` when they are equal, including when both are empty.
/// Removed columns are ignored on both sides. Reordering the same columns
/// counts as a change.
#[must_use]
pub fn primary_key_change(new: &[ColumnSnapshot], old: &[ColumnSnapshot]) -> Option<PrimaryKeyChange> {
    let new_keys = key_sequence(new);
    let old_keys = key_sequence(old);
    if new_keys == old_keys {
        return None;
    }
    Some(PrimaryKeyChange {
        drop_existing: !old_keys.is_empty(),
        columns: new_keys,
    })
}
