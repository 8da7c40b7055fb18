use rand::seq::SliceRandom;
use rand::Rng;
use rngesus_shared::constants::{MAX_ATTRIBUTE_SCORE, MIN_ATTRIBUTE_SCORE};
use rngesus_shared::parse::{join_attribute_scores, join_list, parse_attribute_scores, parse_list};
use rngesus_shared::{Campaign, Character};

use crate::error::{EngineError, Result};
use crate::program::Program;
use crate::schema::{strip_quotes, FieldValues, Generative, MergedFields};

/// What a character's prompts need from the owning campaign.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterContext {
    /// The campaign's summary, which stands in for the full description.
    pub description: String,
    pub attributes: Vec<String>,
}

impl CharacterContext {
    pub fn from_campaign(campaign: &Campaign) -> Self {
        Self {
            description: campaign.summary.clone(),
            attributes: campaign.attributes.clone(),
        }
    }
}

/// Draw a class and a type for a new character of `campaign`.
///
/// Fails when the campaign has not been stored yet or is missing any of the
/// lists a roll draws from.
pub fn roll_character<R: Rng + ?Sized>(
    campaign: &Campaign,
    rng: &mut R,
) -> Result<(Character, CharacterContext)> {
    let campaign_id = campaign.id.ok_or(EngineError::Unpersisted("campaign"))?;

    let character_class = pick(&campaign.character_classes, rng)
        .ok_or_else(|| EngineError::IncompleteCampaign("no character classes".into()))?;
    let character_type = pick(&campaign.character_types, rng)
        .ok_or_else(|| EngineError::IncompleteCampaign("no character types".into()))?;
    if !campaign.attributes.iter().any(|a| !a.trim().is_empty()) {
        return Err(EngineError::IncompleteCampaign("no attributes".into()));
    }

    Ok((
        Character::new(campaign_id, character_class, character_type),
        CharacterContext::from_campaign(campaign),
    ))
}

fn pick<R: Rng + ?Sized>(options: &[String], rng: &mut R) -> Option<String> {
    let candidates: Vec<&String> = options.iter().filter(|o| !o.trim().is_empty()).collect();
    candidates.choose(rng).map(|s| (*s).clone())
}

const SYSTEM: &str = "You are the dungeon master of an RPG game.

This is the description of the game:
\"\"\"
{{description}}
\"\"\"

Where the rules are undefined, you must make them up. You invented this game.

Now you are the dungeon master. Make the game challenging, exciting and \
rewarding. Take advantage of the game's unique mechanics and tell a really good story.";

const INTRO: &str = "Generate me a new character. The character has the class of \
{{character_class}} and the role of {{character_type}}.

First, what's the character's name? Respond concisely with just the name. \
For example: \"Max Ernst\"";

const BACKSTORY: &str =
    "Now give the character an exciting backstory. Make me want to play this character.";

const GOAL: &str = "Concisely, in a single sentence, what's the character's primary story goal?";

const INVENTORY: &str = "Now list the inventory as a comma delimited list. Don't give me \
too many things, I need to save room for later acquisitions.
Focus on the essentials the character needs to play their role.
Respond with just the items separated by commas. For example: \"Water Bottle, Sword, Potion\"";

fn scores_prompt() -> String {
    format!(
        "Now assign attribute scores between {MIN_ATTRIBUTE_SCORE} and {MAX_ATTRIBUTE_SCORE} \
(inclusive) for all attributes: {{{{attributes}}}}.
Give the character scores high enough to have a niche on the team, but low enough to leave \
room for growth.

Respond as a comma delimited list with colons indicating each attribute's score. Use no other \
punctuation.

This is the format: \"Attribute Name: Score, Another Attribute Name: Score\"

For example:
Influence: 18, Power: 12"
    )
}

impl Generative for Character {
    type Context = CharacterContext;

    const KIND: &'static str = "character";

    const FIELDS: &'static [&'static str] = &[
        "name",
        "backstory",
        "primary_goal",
        "attribute_scores",
        "inventory",
    ];

    fn context_params(&self, context: &CharacterContext) -> Vec<(&'static str, String)> {
        vec![
            ("description", context.description.clone()),
            ("attributes", join_list(&context.attributes)),
            ("character_class", self.character_class.clone()),
            ("character_type", self.character_type.clone()),
        ]
    }

    fn resolved_fields(&self) -> FieldValues {
        let mut fields = FieldValues::new();
        fields.insert("name".into(), self.name.clone().unwrap_or_default());
        fields.insert("backstory".into(), self.backstory.clone());
        fields.insert("primary_goal".into(), self.primary_goal.clone());
        fields.insert("attribute_scores".into(), join_attribute_scores(&self.attributes));
        fields.insert("inventory".into(), join_list(&self.inventory));
        fields
    }

    fn assemble(&self, merged: &MergedFields<'_>) -> Self {
        Character {
            id: self.id,
            campaign_id: self.campaign_id,
            name: merged.keep_or("name", &self.name, parse_name),
            character_class: self.character_class.clone(),
            character_type: self.character_type.clone(),
            backstory: merged.keep_or("backstory", &self.backstory, str::to_string),
            attributes: merged.keep_or("attribute_scores", &self.attributes, parse_attribute_scores),
            primary_goal: merged.keep_or("primary_goal", &self.primary_goal, str::to_string),
            inventory: merged.keep_or("inventory", &self.inventory, parse_list),
            activated_at: self.activated_at,
        }
    }

    fn program(_context: &CharacterContext) -> Program {
        Program::new()
            .system(SYSTEM)
            .user(INTRO)
            .generate("name", 0.1, Some(20))
            .user(BACKSTORY)
            .generate("backstory", 0.9, Some(200))
            .user(GOAL)
            .generate("primary_goal", 0.9, Some(100))
            .user(scores_prompt())
            .generate("attribute_scores", 0.1, Some(50))
            .user(INVENTORY)
            .generate("inventory", 0.1, Some(100))
    }
}

fn parse_name(text: &str) -> Option<String> {
    let name = strip_quotes(text);
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}
