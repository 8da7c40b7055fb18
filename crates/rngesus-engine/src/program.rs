//! Generation programs: the scripted conversation a backend runs to fill in a
//! record's fields one after another.
//!
//! Text steps are templates. `{{name}}` is replaced with the request
//! parameter or the already generated field of that name; unknown names
//! render empty.

/// Sampling options for one generated field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    System(String),
    User(String),
    /// Literal assistant turn, e.g. replayed chat history.
    Assistant(String),
    /// The model's next turn becomes the value of `field`.
    Generate {
        field: &'static str,
        sampling: Sampling,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    steps: Vec<Step>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system(mut self, text: impl Into<String>) -> Self {
        self.steps.push(Step::System(text.into()));
        self
    }

    pub fn user(mut self, text: impl Into<String>) -> Self {
        self.steps.push(Step::User(text.into()));
        self
    }

    pub fn assistant(mut self, text: impl Into<String>) -> Self {
        self.steps.push(Step::Assistant(text.into()));
        self
    }

    pub fn generate(mut self, field: &'static str, temperature: f32, max_tokens: Option<u32>) -> Self {
        self.steps.push(Step::Generate {
            field,
            sampling: Sampling {
                temperature,
                max_tokens,
            },
        });
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }

    /// Generated fields in the order the program fills them.
    pub fn fields(&self) -> Vec<&'static str> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                Step::Generate { field, .. } => Some(*field),
                _ => None,
            })
            .collect()
    }
}

/// Substitute `{{name}}` placeholders.
pub fn render<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = rest[open + 2..open + 2 + close].trim();
        out.push_str(lookup(name).unwrap_or_default());
        rest = &rest[open + 2 + close + 2..];
    }

    out.push_str(rest);
    out
}
