use rngesus_shared::description::DescriptionParts;
use rngesus_shared::parse::{join_list, parse_list};
use rngesus_shared::Campaign;

use crate::program::Program;
use crate::schema::{strip_quotes, FieldValues, Generative, MergedFields};

const SYSTEM: &str = "You are an author of RPG games.

You love doing this and you think deeply about games. You love imagining new \
worlds to explore and inventing story intrigue. Your imagination has no limits.

You love coming up with new game mechanics. Nobody wants to play the same \
game twice, so you like to re-invent the genre.";

const PREMISE: &str = "Create a game according to this premise:

\"\"\"
{{prompt}}
\"\"\"

First, give the game an exciting title.";

const PITCH: &str = "Give us a quick elevator pitch.";

const CLASSES: &str = "Does the game have any character classes?
Respond with ONLY a comma delimited list of the character class names.
Respond with between 1 and 8 classes.
For example: \"Attorney, Designer, Janitor\"";

const TYPES: &str = "Who are the people in this story and where do they come from? \
Describe the kinds of people in the game, whatever fits the story. Think outside the box.
Respond with between 1 and 8 types.
Respond with ONLY a comma delimited list of the types.
For example: \"Human, Half-Alien, Sentient Printer\"";

const ATTRIBUTES: &str = "What are the attributes in the game? Whatever fits the story.
Respond with only a comma delimited list of attribute names.
Respond with between 1 and 8 attributes.
For example: \"Power, Influence, Magic, Luck, Flexibility\"";

const STORY: &str = "What's the hook? Tell me about the game world and the story intrigue.
Get specific: how does the story start? Give me an intriguing scene or incident.";

const MECHANICS: &str = "What are the mechanics? I want to know what makes this game different from other RPGs.

- Get specific. How do players affect the game?
- Feel free to invent rules that go beyond the standards of the genre.
- Only standard table-top tools are available: attributes, scores, dice and imagination.
- Any number of D4, D6, D8, D10, D12, D20 and D100 dice may be used.
- Give an example for each mechanic, including any dice rolls and modifiers.";

const SUMMARY: &str = "Write a reminder that can later be referred to in order to remember \
this game. No more than a paragraph. Focus on what is unique to this game: title, setting, \
story and mechanics.";

impl Generative for Campaign {
    type Context = ();

    const KIND: &'static str = "campaign";

    const FIELDS: &'static [&'static str] = &[
        "title",
        "pitch",
        "character_classes",
        "character_types",
        "attributes",
        "story",
        "mechanics",
        "summary",
    ];

    fn context_params(&self, _context: &()) -> Vec<(&'static str, String)> {
        vec![("prompt", self.prompt.clone())]
    }

    fn resolved_fields(&self) -> FieldValues {
        let parts = DescriptionParts::split(&self.description);
        let mut fields = FieldValues::new();
        fields.insert("title".into(), self.title.clone());
        fields.insert("pitch".into(), parts.pitch);
        fields.insert("character_classes".into(), join_list(&self.character_classes));
        fields.insert("character_types".into(), join_list(&self.character_types));
        fields.insert("attributes".into(), join_list(&self.attributes));
        fields.insert("story".into(), parts.story);
        fields.insert("mechanics".into(), parts.mechanics);
        fields.insert("summary".into(), self.summary.clone());
        fields
    }

    fn assemble(&self, merged: &MergedFields<'_>) -> Self {
        let previous = DescriptionParts::split(&self.description);
        let description = DescriptionParts {
            pitch: merged.keep_or("pitch", &previous.pitch, strip_quotes),
            story: merged.keep_or("story", &previous.story, str::to_string),
            mechanics: merged.keep_or("mechanics", &previous.mechanics, str::to_string),
        };

        Campaign {
            id: self.id,
            prompt: self.prompt.clone(),
            title: merged.keep_or("title", &self.title, strip_quotes),
            description: description.assemble(),
            summary: merged.keep_or("summary", &self.summary, str::to_string),
            character_classes: merged.keep_or("character_classes", &self.character_classes, parse_list),
            character_types: merged.keep_or("character_types", &self.character_types, parse_list),
            attributes: merged.keep_or("attributes", &self.attributes, parse_list),
            scenario: self.scenario.clone(),
        }
    }

    fn program(_context: &()) -> Program {
        Program::new()
            .system(SYSTEM)
            .user(PREMISE)
            .generate("title", 1.0, Some(20))
            .user(PITCH)
            .generate("pitch", 1.0, None)
            .user(CLASSES)
            .generate("character_classes", 0.3, Some(30))
            .user(TYPES)
            .generate("character_types", 0.3, Some(30))
            .user(ATTRIBUTES)
            .generate("attributes", 0.3, Some(30))
            .user(STORY)
            .generate("story", 0.9, None)
            .user(MECHANICS)
            .generate("mechanics", 0.9, None)
            .user(SUMMARY)
            .generate("summary", 0.3, None)
    }
}
