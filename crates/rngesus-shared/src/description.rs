//! The campaign description is stored as one text made of three sections:
//! the elevator pitch, the story hook and the mechanics.

use crate::constants::DESCRIPTION_SEPARATOR;

/// The three sections of a campaign description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptionParts {
    pub pitch: String,
    pub story: String,
    pub mechanics: String,
}

impl DescriptionParts {
    pub fn new(
        pitch: impl Into<String>,
        story: impl Into<String>,
        mechanics: impl Into<String>,
    ) -> Self {
        Self {
            pitch: pitch.into(),
            story: story.into(),
            mechanics: mechanics.into(),
        }
    }

    /// Split a stored description. Missing sections come back empty.
    pub fn split(description: &str) -> Self {
        let mut sections = description.splitn(3, DESCRIPTION_SEPARATOR);
        Self {
            pitch: sections.next().unwrap_or_default().to_string(),
            story: sections.next().unwrap_or_default().to_string(),
            mechanics: sections.next().unwrap_or_default().to_string(),
        }
    }

    /// Join the sections, stopping after the last non-empty one so that a
    /// campaign still being generated carries no dangling separators.
    pub fn assemble(&self) -> String {
        let sections = [&self.pitch, &self.story, &self.mechanics];
        let Some(last) = sections.iter().rposition(|s| !s.is_empty()) else {
            return String::new();
        };
        sections[..=last]
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(DESCRIPTION_SEPARATOR)
    }

    pub fn is_complete(&self) -> bool {
        !self.pitch.is_empty() && !self.story.is_empty() && !self.mechanics.is_empty()
    }
}
