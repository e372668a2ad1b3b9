//! Field-level change detection.

use crate::event::ChangeSet;
use crate::host::AuditableEntity;

/// Computes the audited changes of a written record.
///
/// For a new record every included field that is set is reported; for an
/// existing one only the included fields the host marks dirty, paired with
/// their load-time values. Relation-holding properties are stripped from
/// both maps afterwards. Returns `None` when nothing is left to audit.
pub fn compute_change<E>(
    entity: &E,
    included: &[String],
    relation_properties: &[&str],
    is_new: bool,
) -> Option<ChangeSet>
where
    E: AuditableEntity + ?Sized,
{
    let changed = entity.extract(included, !is_new);
    if changed.is_empty() {
        return None;
    }

    let changes = if is_new {
        ChangeSet::created(changed)?
    } else {
        let keys: Vec<String> = changed.keys().cloned().collect();
        let original = entity.extract_original(&keys);
        ChangeSet::updated(changed, original)?
    };

    changes.without(relation_properties.iter().copied())
}
