//! Builds the parameter set for the next call to the generation backend.
//!
//! Starting a fresh generation and continuing an interrupted one go through
//! the same path: whatever the record already holds is forced, the rest is
//! left open.

use crate::schema::{ForcedFields, Generative};

/// How a template parameter reaches the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Read-only input, e.g. the user's premise.
    Context(String),
    /// Already resolved; the backend must echo it instead of generating.
    Forced(String),
    /// Still to be generated.
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateParam {
    pub name: String,
    pub value: ParamValue,
}

/// Ordered template parameters: context first, then the generated fields in
/// dependency order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationRequest {
    params: Vec<TemplateParam>,
}

impl GenerationRequest {
    pub fn build<R: Generative>(record: &R, context: &R::Context) -> Self {
        let mut params: Vec<TemplateParam> = record
            .context_params(context)
            .into_iter()
            .map(|(name, value)| TemplateParam {
                name: name.to_string(),
                value: ParamValue::Context(value),
            })
            .collect();

        let resolved = record.resolved_fields();
        for &name in R::FIELDS {
            let value = match resolved.get(name) {
                Some(text) if !text.trim().is_empty() => ParamValue::Forced(text.clone()),
                _ => ParamValue::Open,
            };
            params.push(TemplateParam {
                name: name.to_string(),
                value,
            });
        }

        Self { params }
    }

    pub fn params(&self) -> &[TemplateParam] {
        &self.params
    }

    /// Value available to templates: context or forced text.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| match &p.value {
                ParamValue::Context(v) | ParamValue::Forced(v) => Some(v.as_str()),
                ParamValue::Open => None,
            })
    }

    pub fn forced_value(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| match &p.value {
                ParamValue::Forced(v) => Some(v.as_str()),
                _ => None,
            })
    }

    pub fn forced_fields(&self) -> ForcedFields {
        self.params
            .iter()
            .filter(|p| matches!(p.value, ParamValue::Forced(_)))
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn open_fields(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|p| p.value == ParamValue::Open)
            .map(|p| p.name.as_str())
    }
}
