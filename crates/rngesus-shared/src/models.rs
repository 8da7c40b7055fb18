//! Domain records exchanged between the engine, the store and the HTTP layer.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be written
//! straight onto the newline-delimited JSON stream sent to clients.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CampaignId, CharacterId, ChatMessageId};

// ---------------------------------------------------------------------------
// Campaign
// ---------------------------------------------------------------------------

/// A generated game setting together with its character options and the
/// running narrative state of the table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Campaign {
    /// Row id, absent until the first insert.
    pub id: Option<CampaignId>,
    /// The premise the user typed in.
    pub prompt: String,
    pub title: String,
    /// Pitch, story hook and mechanics joined with
    /// [`DESCRIPTION_SEPARATOR`](crate::constants::DESCRIPTION_SEPARATOR).
    pub description: String,
    /// Condensed reminder of the game, used as context for later generations.
    pub summary: String,
    pub character_classes: Vec<String>,
    pub character_types: Vec<String>,
    pub attributes: Vec<String>,
    /// The dungeon master's current plan; rewritten by chat turns.
    #[serde(default)]
    pub scenario: String,
}

impl Campaign {
    /// An empty shell carrying only the user's premise.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Whether the campaign has everything a character roll draws from.
    pub fn is_rollable(&self) -> bool {
        has_entries(&self.character_classes)
            && has_entries(&self.character_types)
            && has_entries(&self.attributes)
    }

    pub fn summary_view(&self) -> Option<CampaignSummary> {
        self.id.map(|id| CampaignSummary {
            id,
            title: self.title.clone(),
            summary: self.summary.clone(),
        })
    }
}

fn has_entries(list: &[String]) -> bool {
    list.iter().any(|item| !item.trim().is_empty())
}

/// Listing row for the campaign picker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampaignSummary {
    pub id: CampaignId,
    pub title: String,
    pub summary: String,
}

// ---------------------------------------------------------------------------
// Character
// ---------------------------------------------------------------------------

/// A player character rolled into a campaign.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Character {
    pub id: Option<CharacterId>,
    pub campaign_id: CampaignId,
    pub name: Option<String>,
    /// Drawn from the owning campaign's `character_classes`.
    pub character_class: String,
    /// Drawn from the owning campaign's `character_types`.
    pub character_type: String,
    pub backstory: String,
    /// Attribute name to score. Keys come from the campaign's attribute list;
    /// the 1..=20 range is only a convention asked of the model.
    pub attributes: BTreeMap<String, i64>,
    pub primary_goal: String,
    pub inventory: Vec<String>,
    /// Set while the character is in play at the table.
    pub activated_at: Option<DateTime<Utc>>,
}

impl Character {
    /// A blank character of the given class and type, ready to be generated.
    pub fn new(
        campaign_id: CampaignId,
        character_class: impl Into<String>,
        character_type: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            campaign_id,
            name: None,
            character_class: character_class.into(),
            character_type: character_type.into(),
            backstory: String::new(),
            attributes: BTreeMap::new(),
            primary_goal: String::new(),
            inventory: Vec::new(),
            activated_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.activated_at.is_some()
    }
}

/// Listing row for a campaign's character roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CharacterSummary {
    pub id: CharacterId,
    pub name: Option<String>,
    pub character_class: String,
    pub character_type: String,
    pub activated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Who wrote a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            other => Err(format!("unknown chat role: {other}")),
        }
    }
}

/// One line of the table conversation. Display order is insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Option<ChatMessageId>,
    pub campaign_id: CampaignId,
    pub role: ChatRole,
    pub message: String,
}

impl ChatMessage {
    pub fn user(campaign_id: CampaignId, message: impl Into<String>) -> Self {
        Self {
            id: None,
            campaign_id,
            role: ChatRole::User,
            message: message.into(),
        }
    }

    pub fn assistant(campaign_id: CampaignId, message: impl Into<String>) -> Self {
        Self {
            id: None,
            campaign_id,
            role: ChatRole::Assistant,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_campaign_is_an_empty_shell() {
        let campaign = Campaign::new("a haunted train");
        assert_eq!(campaign.prompt, "a haunted train");
        assert!(campaign.id.is_none());
        assert!(campaign.title.is_empty());
        assert!(!campaign.is_rollable());
    }

    #[test]
    fn rollable_needs_every_list() {
        let mut campaign = Campaign::new("x");
        campaign.character_classes = vec!["Conductor".into()];
        campaign.character_types = vec!["Ghost".into()];
        assert!(!campaign.is_rollable());
        campaign.attributes = vec![String::new()];
        assert!(!campaign.is_rollable());
        campaign.attributes = vec!["Dread".into()];
        assert!(campaign.is_rollable());
    }

    #[test]
    fn chat_role_uses_lowercase_tags() {
        let msg = ChatMessage::assistant(CampaignId(1), "Welcome aboard.");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!("user".parse::<ChatRole>().unwrap(), ChatRole::User);
        assert!("narrator".parse::<ChatRole>().is_err());
    }

    #[test]
    fn summary_view_requires_identity() {
        let mut campaign = Campaign::new("x");
        assert!(campaign.summary_view().is_none());
        campaign.id = Some(CampaignId(3));
        campaign.title = "Ghost Express".into();
        let summary = campaign.summary_view().unwrap();
        assert_eq!(summary.id, CampaignId(3));
        assert_eq!(summary.title, "Ghost Express");
    }
}
