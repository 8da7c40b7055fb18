//! Field schema shared by every generated record kind.

use std::collections::{BTreeMap, BTreeSet};

use crate::program::Program;

/// Field name to current text.
pub type FieldValues = BTreeMap<String, String>;

/// One snapshot of an in-progress generation. Later snapshots of the same
/// session are supersets of earlier ones.
pub type PartialOutput = FieldValues;

/// Fields that were already resolved when the session started. Their values
/// are handed to the backend to echo, and merging never overwrites them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForcedFields(BTreeSet<String>);

impl ForcedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.0.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ForcedFields {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A record kind the engine knows how to generate.
///
/// Implementors declare their generated fields in dependency order: a field's
/// prompt may refer to any field before it, never to one after it.
pub trait Generative: Clone + Send + Sync + 'static {
    /// Read-only inputs the prompts need besides the record itself.
    type Context: Send + Sync + 'static;

    /// Short name used in logs.
    const KIND: &'static str;

    /// Generated fields, in dependency order.
    const FIELDS: &'static [&'static str];

    /// Template parameters that are never generated, only read.
    fn context_params(&self, context: &Self::Context) -> Vec<(&'static str, String)>;

    /// The current text of every generated field. Empty text means the field
    /// is still open.
    fn resolved_fields(&self) -> FieldValues;

    /// Build the next record from merged field texts. Forced fields must be
    /// taken from `self` as they are, see [`MergedFields::keep_or`].
    fn assemble(&self, merged: &MergedFields<'_>) -> Self;

    /// The conversation the backend runs to fill the fields in.
    fn program(context: &Self::Context) -> Program;
}

/// Field texts after one merge step, plus which of them were forced.
#[derive(Debug)]
pub struct MergedFields<'a> {
    values: FieldValues,
    forced: &'a ForcedFields,
}

impl<'a> MergedFields<'a> {
    pub fn new(values: FieldValues, forced: &'a ForcedFields) -> Self {
        Self { values, forced }
    }

    pub fn text(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or_default()
    }

    pub fn is_forced(&self, name: &str) -> bool {
        self.forced.contains(name)
    }

    /// The previous typed value when `name` is forced, otherwise the merged
    /// text run through `parse`.
    pub fn keep_or<T: Clone>(&self, name: &str, previous: &T, parse: impl FnOnce(&str) -> T) -> T {
        if self.is_forced(name) {
            previous.clone()
        } else {
            parse(self.text(name))
        }
    }
}

/// Strip the double quotes models like to wrap short answers in.
pub fn strip_quotes(text: &str) -> String {
    text.replace('"', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_or_prefers_previous_for_forced_fields() {
        let forced: ForcedFields = ["title"].into_iter().collect();
        let mut values = FieldValues::new();
        values.insert("title".into(), "New".into());
        values.insert("summary".into(), "Fresh".into());
        let merged = MergedFields::new(values, &forced);

        let title = merged.keep_or("title", &"Old".to_string(), str::to_string);
        let summary = merged.keep_or("summary", &"Stale".to_string(), str::to_string);
        assert_eq!(title, "Old");
        assert_eq!(summary, "Fresh");
        assert_eq!(merged.text("missing"), "");
    }

    #[test]
    fn strip_quotes_removes_all_double_quotes() {
        assert_eq!(strip_quotes("\"Ghost \"Express\""), "Ghost Express");
    }
}
