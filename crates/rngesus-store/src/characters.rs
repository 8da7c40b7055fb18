use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use rngesus_shared::{CampaignId, Character, CharacterId, CharacterSummary};

use crate::database::{json_column, to_json, Database};
use crate::error::{Result, StoreError};

const CHARACTER_COLUMNS: &str = "id, campaign_id, name, character_class, character_type, \
     backstory, attributes, primary_goal, inventory, activated_at";

impl Database {
    /// Insert or overwrite a character. The owning campaign must exist.
    ///
    /// `activated_at` is only taken on insert. An existing row keeps its own
    /// activation, which [`Database::set_character_active`] alone changes, and
    /// the returned character reflects the stored row.
    pub fn upsert_character(&self, character: &Character) -> Result<Character> {
        if !self.campaign_exists(character.campaign_id)? {
            return Err(StoreError::MissingParent("campaign"));
        }

        let attributes = to_json(&character.attributes)?;
        let inventory = to_json(&character.inventory)?;
        let activated_at = character.activated_at.map(|at| at.to_rfc3339());

        let id = match character.id {
            None => {
                self.conn().execute(
                    "INSERT INTO characters (campaign_id, name, character_class, character_type,
                         backstory, attributes, primary_goal, inventory, activated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        character.campaign_id.0,
                        character.name,
                        character.character_class,
                        character.character_type,
                        character.backstory,
                        attributes,
                        character.primary_goal,
                        inventory,
                        activated_at,
                    ],
                )?;
                CharacterId(self.conn().last_insert_rowid())
            }
            Some(id) => {
                self.conn().execute(
                    "INSERT INTO characters (id, campaign_id, name, character_class, character_type,
                         backstory, attributes, primary_goal, inventory, activated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     ON CONFLICT(id) DO UPDATE SET
                         campaign_id = excluded.campaign_id,
                         name = excluded.name,
                         character_class = excluded.character_class,
                         character_type = excluded.character_type,
                         backstory = excluded.backstory,
                         attributes = excluded.attributes,
                         primary_goal = excluded.primary_goal,
                         inventory = excluded.inventory",
                    params![
                        id.0,
                        character.campaign_id.0,
                        character.name,
                        character.character_class,
                        character.character_type,
                        character.backstory,
                        attributes,
                        character.primary_goal,
                        inventory,
                        activated_at,
                    ],
                )?;
                id
            }
        };

        self.get_character(id)?.ok_or(StoreError::NotFound)
    }

    pub fn get_character(&self, id: CharacterId) -> Result<Option<Character>> {
        let character = self
            .conn()
            .query_row(
                &format!("SELECT {CHARACTER_COLUMNS} FROM characters WHERE id = ?1"),
                params![id.0],
                row_to_character,
            )
            .optional()?;
        Ok(character)
    }

    pub fn list_characters(&self, campaign_id: CampaignId) -> Result<Vec<Character>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CHARACTER_COLUMNS} FROM characters WHERE campaign_id = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![campaign_id.0], row_to_character)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn list_character_summaries(&self, campaign_id: CampaignId) -> Result<Vec<CharacterSummary>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, character_class, character_type, activated_at
             FROM characters WHERE campaign_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![campaign_id.0], |row| {
            Ok(CharacterSummary {
                id: CharacterId(row.get(0)?),
                name: row.get(1)?,
                character_class: row.get(2)?,
                character_type: row.get(3)?,
                activated_at: timestamp_column(row, 4)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Put a character in play (`Some`) or bench it (`None`). Returns the
    /// updated character, or `None` when no such character exists.
    pub fn set_character_active(
        &self,
        id: CharacterId,
        at: Option<DateTime<Utc>>,
    ) -> Result<Option<Character>> {
        let affected = self.conn().execute(
            "UPDATE characters SET activated_at = ?2 WHERE id = ?1",
            params![id.0, at.map(|at| at.to_rfc3339())],
        )?;
        if affected == 0 {
            return Ok(None);
        }
        self.get_character(id)
    }

    pub fn delete_character(&self, id: CharacterId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM characters WHERE id = ?1", params![id.0])?;
        Ok(affected > 0)
    }

    fn campaign_exists(&self, id: CampaignId) -> Result<bool> {
        let found = self
            .conn()
            .query_row("SELECT 1 FROM campaigns WHERE id = ?1", params![id.0], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }
}

fn timestamp_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let Some(text) = row.get::<_, Option<String>>(idx)? else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_character(row: &rusqlite::Row<'_>) -> rusqlite::Result<Character> {
    Ok(Character {
        id: Some(CharacterId(row.get(0)?)),
        campaign_id: CampaignId(row.get(1)?),
        name: row.get(2)?,
        character_class: row.get(3)?,
        character_type: row.get(4)?,
        backstory: row.get(5)?,
        attributes: json_column(row, 6)?,
        primary_goal: row.get(7)?,
        inventory: json_column(row, 8)?,
        activated_at: timestamp_column(row, 9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rngesus_shared::Campaign;

    fn setup() -> (Database, CampaignId) {
        let db = Database::open_in_memory().unwrap();
        let campaign = db.upsert_campaign(&Campaign::new("a haunted train")).unwrap();
        (db, campaign.id.unwrap())
    }

    fn edith(campaign_id: CampaignId) -> Character {
        let mut character = Character::new(campaign_id, "Medium", "Ghost");
        character.name = Some("Edith Vale".into());
        character.attributes.insert("Dread".into(), 14);
        character.inventory = vec!["Lantern".into()];
        character
    }

    #[test]
    fn upsert_and_get_round_trip() {
        let (db, campaign_id) = setup();
        let stored = db.upsert_character(&edith(campaign_id)).unwrap();
        let id = stored.id.unwrap();

        let loaded = db.get_character(id).unwrap().unwrap();
        assert_eq!(loaded, stored);
        assert_eq!(loaded.attributes["Dread"], 14);

        let mut renamed = loaded.clone();
        renamed.name = None;
        assert_eq!(db.upsert_character(&renamed).unwrap().id, Some(id));
        assert!(db.get_character(id).unwrap().unwrap().name.is_none());
    }

    #[test]
    fn orphan_characters_are_rejected() {
        let (db, _) = setup();
        let result = db.upsert_character(&edith(CampaignId(77)));
        assert!(matches!(result, Err(StoreError::MissingParent("campaign"))));
    }

    #[test]
    fn activation_toggles_the_timestamp() {
        let (db, campaign_id) = setup();
        let id = db.upsert_character(&edith(campaign_id)).unwrap().id.unwrap();

        let now = Utc::now();
        let active = db.set_character_active(id, Some(now)).unwrap().unwrap();
        assert_eq!(
            active.activated_at.map(|at| at.timestamp_millis()),
            Some(now.timestamp_millis())
        );

        let summaries = db.list_character_summaries(campaign_id).unwrap();
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].activated_at.is_some());

        let benched = db.set_character_active(id, None).unwrap().unwrap();
        assert!(!benched.is_active());
        assert!(db.set_character_active(CharacterId(999), None).unwrap().is_none());
    }

    #[test]
    fn overwriting_keeps_the_stored_activation() {
        let (db, campaign_id) = setup();
        let snapshot = db.upsert_character(&edith(campaign_id)).unwrap();
        let id = snapshot.id.unwrap();

        db.set_character_active(id, Some(Utc::now())).unwrap();

        // A writer still holding the inactive copy must not bench it again.
        let mut rewritten = snapshot.clone();
        rewritten.backstory = "Missed the last train.".into();
        let stored = db.upsert_character(&rewritten).unwrap();
        assert!(stored.is_active());
        assert_eq!(stored.backstory, "Missed the last train.");

        db.set_character_active(id, None).unwrap();
        let mut activated_copy = stored.clone();
        activated_copy.activated_at = Some(Utc::now());
        assert!(!db.upsert_character(&activated_copy).unwrap().is_active());
    }

    #[test]
    fn stale_id_is_reinserted_with_its_activation() {
        let (db, campaign_id) = setup();
        let mut character = edith(campaign_id);
        character.id = Some(CharacterId(40));
        character.activated_at = Some(Utc::now());
        let stored = db.upsert_character(&character).unwrap();
        assert_eq!(stored.id, Some(CharacterId(40)));
        assert!(stored.is_active());
    }

    #[test]
    fn listing_is_scoped_to_the_campaign() {
        let (db, campaign_id) = setup();
        let other = db.upsert_campaign(&Campaign::new("other")).unwrap().id.unwrap();
        db.upsert_character(&edith(campaign_id)).unwrap();
        db.upsert_character(&edith(campaign_id)).unwrap();
        db.upsert_character(&edith(other)).unwrap();

        assert_eq!(db.list_characters(campaign_id).unwrap().len(), 2);
        assert_eq!(db.list_character_summaries(other).unwrap().len(), 1);
    }

    #[test]
    fn delete_reports_whether_a_row_went() {
        let (db, campaign_id) = setup();
        let id = db.upsert_character(&edith(campaign_id)).unwrap().id.unwrap();
        assert!(db.delete_character(id).unwrap());
        assert!(!db.delete_character(id).unwrap());
        assert!(db.get_character(id).unwrap().is_none());
    }
}
