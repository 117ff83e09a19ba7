//! Field-level diff: compare two flattened record states.
//!
//! `old = None` means the record is being created, `new = None` that it is
//! being deleted. A field missing on one side is treated as null, so a
//! nullable column that stays null never shows up as a change.

use std::collections::{BTreeMap, BTreeSet};

use custodian_types::{FieldKind, FieldValue, Record};
use serde::{Deserialize, Serialize};

use crate::error::{DiffError, DiffResult};

/// The result of comparing two record states.
///
/// Only fields whose values differ appear in any of the three collections.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub changed_fields: BTreeSet<String>,
    /// Previous values of changed fields (absent when the field was added).
    pub old_values: BTreeMap<String, FieldValue>,
    /// New values of changed fields (absent when the field was removed).
    pub new_values: BTreeMap<String, FieldValue>,
}

impl FieldDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.changed_fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changed_fields.len()
    }

    /// Returns `true` if `field` changed.
    pub fn touches(&self, field: &str) -> bool {
        self.changed_fields.contains(field)
    }

    /// Returns `true` if `field` or any field nested under it changed
    /// (`guardian` matches `guardian.phone`).
    pub fn touches_prefix(&self, prefix: &str) -> bool {
        self.changed_fields.iter().any(|f| {
            f == prefix
                || f.strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    /// Per-field view of the diff in field order.
    pub fn changes(&self) -> impl Iterator<Item = FieldChange<'_>> {
        self.changed_fields.iter().map(|field| FieldChange {
            field,
            old: self.old_values.get(field),
            new: self.new_values.get(field),
        })
    }
}

/// A single changed field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldChange<'a> {
    pub field: &'a str,
    pub old: Option<&'a FieldValue>,
    pub new: Option<&'a FieldValue>,
}

impl FieldChange<'_> {
    pub fn is_addition(&self) -> bool {
        self.old.is_none()
    }

    pub fn is_removal(&self) -> bool {
        self.new.is_none()
    }
}

/// Compute the diff between two optional record states.
///
/// Numbers compare by exact value (`10.50 == 10.5`, `10 == 10.0`). Two
/// non-null values of different kinds under the same key fail with
/// [`DiffError::ShapeMismatch`].
pub fn diff(old: Option<&Record>, new: Option<&Record>) -> DiffResult<FieldDiff> {
    let (result, conflict) = collect(old, new);
    match conflict {
        Some(err) => Err(err),
        None => Ok(result),
    }
}

/// Like [`diff`], but a kind conflict is recorded as an ordinary change.
///
/// Used for rollback and merge, which reconcile against earlier versions
/// where a field may have legitimately changed kind through null.
pub fn diff_lenient(old: Option<&Record>, new: Option<&Record>) -> FieldDiff {
    collect(old, new).0
}

/// Walks both states once, returning the diff and the first kind conflict.
fn collect(old: Option<&Record>, new: Option<&Record>) -> (FieldDiff, Option<DiffError>) {
    let empty = Record::new();
    let old = old.unwrap_or(&empty);
    let new = new.unwrap_or(&empty);

    let mut result = FieldDiff::new();
    let mut conflict = None;
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();

    for key in keys {
        let old_val = old.get(key).filter(|v| !v.is_null());
        let new_val = new.get(key).filter(|v| !v.is_null());

        match (old_val, new_val) {
            (None, None) => {}
            (Some(a), Some(b)) => {
                if conflict.is_none() {
                    conflict = check_shape(key, a, b).err();
                }
                if !a.same_value(b) {
                    result.changed_fields.insert(key.clone());
                    result.old_values.insert(key.clone(), a.clone());
                    result.new_values.insert(key.clone(), b.clone());
                }
            }
            (Some(a), None) => {
                result.changed_fields.insert(key.clone());
                result.old_values.insert(key.clone(), a.clone());
                if new.contains_key(key) {
                    result.new_values.insert(key.clone(), FieldValue::Null);
                }
            }
            (None, Some(b)) => {
                result.changed_fields.insert(key.clone());
                if old.contains_key(key) {
                    result.old_values.insert(key.clone(), FieldValue::Null);
                }
                result.new_values.insert(key.clone(), b.clone());
            }
        }
    }

    (result, conflict)
}

fn check_shape(field: &str, old: &FieldValue, new: &FieldValue) -> DiffResult<()> {
    let (old_kind, new_kind) = (old.kind(), new.kind());
    if old_kind == new_kind {
        return Ok(());
    }
    debug_assert!(old_kind != FieldKind::Null && new_kind != FieldKind::Null);
    Err(DiffError::ShapeMismatch {
        field: field.to_string(),
        old_kind,
        new_kind,
    })
}
