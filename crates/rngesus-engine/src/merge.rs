use crate::schema::{FieldValues, ForcedFields, Generative, MergedFields, PartialOutput};

/// Fold one partial snapshot into the previous record.
///
/// Forced fields keep their previous value whatever the snapshot says. Every
/// other field takes the snapshot's text, or empty when the backend has not
/// reached it yet. Identity is carried over by the record's `assemble`.
pub fn merge<R: Generative>(previous: &R, partial: &PartialOutput, forced: &ForcedFields) -> R {
    let resolved = previous.resolved_fields();
    let mut values = FieldValues::new();

    for &name in R::FIELDS {
        let source = if forced.contains(name) {
            &resolved
        } else {
            partial
        };
        values.insert(
            name.to_string(),
            source.get(name).cloned().unwrap_or_default(),
        );
    }

    previous.assemble(&MergedFields::new(values, forced))
}
