use rngesus_shared::parse::join_attribute_scores;
use rngesus_shared::{Campaign, CampaignId, Character, ChatMessage, ChatRole};

use crate::error::{EngineError, Result};
use crate::program::Program;
use crate::schema::{FieldValues, Generative, MergedFields};

/// One dungeon master turn: the private plan and the reply to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub campaign_id: CampaignId,
    /// The dungeon master's notes. Carried over from the campaign when it
    /// already has some.
    pub scenario: String,
    pub reply: String,
}

impl ChatTurn {
    /// An empty turn for `campaign`, reusing its current scenario.
    pub fn seed(campaign: &Campaign) -> Result<Self> {
        let campaign_id = campaign.id.ok_or(EngineError::Unpersisted("campaign"))?;
        Ok(Self {
            campaign_id,
            scenario: campaign.scenario.clone(),
            reply: String::new(),
        })
    }

    pub fn reply_message(&self) -> ChatMessage {
        ChatMessage::assistant(self.campaign_id, self.reply.clone())
    }
}

/// Everything a chat turn is conditioned on.
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub campaign: Campaign,
    /// Characters in play.
    pub characters: Vec<Character>,
    /// Earlier messages in insertion order.
    pub history: Vec<ChatMessage>,
}

impl ChatContext {
    /// Characters with an activation timestamp are in play. When nobody has
    /// been activated the whole roster plays.
    pub fn new(campaign: Campaign, roster: Vec<Character>, history: Vec<ChatMessage>) -> Self {
        let active: Vec<Character> = roster.iter().filter(|c| c.is_active()).cloned().collect();
        let characters = if active.is_empty() { roster } else { active };
        Self {
            campaign,
            characters,
            history,
        }
    }
}

const TABLE: &str = "# RPG Game

You are a dungeon master running a campaign for a table-top RPG game called \"{{title}}\".

The following is a detailed description of the game and its rules:

'''
{{description}}
'''

## Campaign

You will come up with a unique campaign for the players. There are {{character_count}} \
players. They have chosen the following characters:
";

const RULES: &str = "
Remember, as dungeon master:
- If a scene requires resolution, use the characters' attributes and die rolls to resolve it. \
Vary the size and number of dice with the situation and modify the result by the character's \
attributes. Include the math and the result of the roll in your response.
- NPCs have attributes too. Use them in any equations, but don't reveal their rolls or \
attributes to the players.
- If a situation comes up that the rules don't cover, make up a new rule. Explain it to the \
players and stay consistent with earlier rules.
- Work with the characters. A game that grows with the players' curiosity is more exciting.
- Offer leading options or clues about what the characters can do in a scene.
- Do not speak, act or narrate the feelings of the player characters. You run every \
non-player character, but the player characters above must be prompted for their actions.
- The characters act as a team but may have their own relationships. Encourage exploring \
them and include every player.
- Be consistent.";

const PREPARE: &str = "# Prepare

Before the game starts, make a short plan for the campaign.

- Be concise.
- This is never shown to the players, it is your personal notes.
- Keep the outline simple and structural.
- Curate the story for the characters above.
- Keep the story thread open so it can evolve with the players' actions.";

const OPENING: &str = "Now briefly introduce the story to the players. Set the scene and \
ask what they'd like to do.

You start as dungeon master now:";

fn characters_block(characters: &[Character]) -> String {
    characters
        .iter()
        .enumerate()
        .map(|(index, character)| {
            format!(
                "\n---\n\n## Character {}\n\n- Name: {}\n- Class: {}\n- Type: {}\n- Attributes: {}\n\n\
### Backstory:\n\n{}\n\n### Character Goal:\n\n{}\n",
                index + 1,
                character.name.as_deref().unwrap_or_default(),
                character.character_class,
                character.character_type,
                join_attribute_scores(&character.attributes),
                character.backstory,
                character.primary_goal,
            )
        })
        .collect()
}

impl Generative for ChatTurn {
    type Context = ChatContext;

    const KIND: &'static str = "chat";

    const FIELDS: &'static [&'static str] = &["scenario", "next"];

    fn context_params(&self, context: &ChatContext) -> Vec<(&'static str, String)> {
        vec![
            ("title", context.campaign.title.clone()),
            ("description", context.campaign.description.clone()),
            ("summary", context.campaign.summary.clone()),
            ("character_count", context.characters.len().to_string()),
        ]
    }

    fn resolved_fields(&self) -> FieldValues {
        let mut fields = FieldValues::new();
        fields.insert("scenario".into(), self.scenario.clone());
        fields.insert("next".into(), self.reply.clone());
        fields
    }

    fn assemble(&self, merged: &MergedFields<'_>) -> Self {
        ChatTurn {
            campaign_id: self.campaign_id,
            scenario: merged.keep_or("scenario", &self.scenario, str::to_string),
            reply: merged.keep_or("next", &self.reply, str::to_string),
        }
    }

    fn program(context: &ChatContext) -> Program {
        let table = format!(
            "{TABLE}{}{RULES}",
            characters_block(&context.characters)
        );

        let mut program = Program::new()
            .system(table)
            .system(PREPARE)
            .generate("scenario", 1.0, None)
            .system(OPENING);

        for message in &context.history {
            program = match message.role {
                ChatRole::User => program.user(message.message.clone()),
                ChatRole::Assistant => program.assistant(message.message.clone()),
            };
        }

        program.generate("next", 1.0, None)
    }
}
