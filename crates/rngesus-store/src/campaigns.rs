use rusqlite::{params, OptionalExtension};
use rngesus_shared::{Campaign, CampaignId, CampaignSummary};

use crate::database::{json_column, to_json, Database};
use crate::error::{Result, StoreError};

const CAMPAIGN_COLUMNS: &str = "id, prompt, title, description, summary, \
     character_classes, character_types, attributes, scenario";

impl Database {
    /// Insert `campaign` when it has no id yet, otherwise overwrite the row
    /// with its id. Returns the campaign with its id set.
    pub fn upsert_campaign(&self, campaign: &Campaign) -> Result<Campaign> {
        let classes = to_json(&campaign.character_classes)?;
        let types = to_json(&campaign.character_types)?;
        let attributes = to_json(&campaign.attributes)?;

        let id = match campaign.id {
            None => {
                self.conn().execute(
                    "INSERT INTO campaigns (prompt, title, description, summary,
                         character_classes, character_types, attributes, scenario)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        campaign.prompt,
                        campaign.title,
                        campaign.description,
                        campaign.summary,
                        classes,
                        types,
                        attributes,
                        campaign.scenario,
                    ],
                )?;
                CampaignId(self.conn().last_insert_rowid())
            }
            Some(id) => {
                self.conn().execute(
                    "INSERT INTO campaigns (id, prompt, title, description, summary,
                         character_classes, character_types, attributes, scenario)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(id) DO UPDATE SET
                         prompt = excluded.prompt,
                         title = excluded.title,
                         description = excluded.description,
                         summary = excluded.summary,
                         character_classes = excluded.character_classes,
                         character_types = excluded.character_types,
                         attributes = excluded.attributes,
                         scenario = excluded.scenario",
                    params![
                        id.0,
                        campaign.prompt,
                        campaign.title,
                        campaign.description,
                        campaign.summary,
                        classes,
                        types,
                        attributes,
                        campaign.scenario,
                    ],
                )?;
                id
            }
        };

        Ok(Campaign {
            id: Some(id),
            ..campaign.clone()
        })
    }

    pub fn get_campaign(&self, id: CampaignId) -> Result<Option<Campaign>> {
        let campaign = self
            .conn()
            .query_row(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
                params![id.0],
                row_to_campaign,
            )
            .optional()?;
        Ok(campaign)
    }

    pub fn list_campaign_summaries(&self) -> Result<Vec<CampaignSummary>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, title, summary FROM campaigns ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(CampaignSummary {
                id: CampaignId(row.get(0)?),
                title: row.get(1)?,
                summary: row.get(2)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Write back the dungeon master's plan after a chat turn.
    pub fn update_campaign_scenario(&self, id: CampaignId, scenario: &str) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE campaigns SET scenario = ?2 WHERE id = ?1",
            params![id.0, scenario],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Delete a campaign together with its characters and chat log.
    pub fn delete_campaign(&mut self, id: CampaignId) -> Result<bool> {
        let tx = self.conn_mut().transaction()?;
        tx.execute("DELETE FROM chat_messages WHERE campaign_id = ?1", params![id.0])?;
        tx.execute("DELETE FROM characters WHERE campaign_id = ?1", params![id.0])?;
        let affected = tx.execute("DELETE FROM campaigns WHERE id = ?1", params![id.0])?;
        tx.commit()?;
        Ok(affected > 0)
    }
}

fn row_to_campaign(row: &rusqlite::Row<'_>) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        id: Some(CampaignId(row.get(0)?)),
        prompt: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        summary: row.get(4)?,
        character_classes: json_column(row, 5)?,
        character_types: json_column(row, 6)?,
        attributes: json_column(row, 7)?,
        scenario: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rngesus_shared::{ChatMessage, Character};

    fn haunted_train() -> Campaign {
        let mut campaign = Campaign::new("a haunted train");
        campaign.title = "Ghost Express".into();
        campaign.character_classes = vec!["Conductor".into(), "Medium".into()];
        campaign.character_types = vec!["Ghost".into()];
        campaign.attributes = vec!["Dread".into(), "Nerve".into()];
        campaign
    }

    #[test]
    fn first_upsert_assigns_an_id_and_later_ones_keep_it() {
        let db = Database::open_in_memory().unwrap();

        let stored = db.upsert_campaign(&haunted_train()).unwrap();
        let id = stored.id.unwrap();

        let mut updated = stored.clone();
        updated.summary = "Ghosts ride the rails.".into();
        let again = db.upsert_campaign(&updated).unwrap();
        assert_eq!(again.id, Some(id));

        let loaded = db.get_campaign(id).unwrap().unwrap();
        assert_eq!(loaded, updated);
        assert_eq!(db.list_campaign_summaries().unwrap().len(), 1);
    }

    #[test]
    fn missing_campaign_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_campaign(CampaignId(42)).unwrap().is_none());
    }

    #[test]
    fn summaries_list_in_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        let first = db.upsert_campaign(&haunted_train()).unwrap();
        let mut other = Campaign::new("a sunken city");
        other.title = "Drowned Bells".into();
        db.upsert_campaign(&other).unwrap();

        let summaries = db.list_campaign_summaries().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, first.id.unwrap());
        assert_eq!(summaries[1].title, "Drowned Bells");
    }

    #[test]
    fn scenario_updates_only_the_scenario() {
        let db = Database::open_in_memory().unwrap();
        let stored = db.upsert_campaign(&haunted_train()).unwrap();
        let id = stored.id.unwrap();

        db.update_campaign_scenario(id, "Start in the dining car.").unwrap();
        let loaded = db.get_campaign(id).unwrap().unwrap();
        assert_eq!(loaded.scenario, "Start in the dining car.");
        assert_eq!(loaded.title, "Ghost Express");

        assert!(matches!(
            db.update_campaign_scenario(CampaignId(999), "x"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn delete_removes_children() {
        let mut db = Database::open_in_memory().unwrap();
        let id = db.upsert_campaign(&haunted_train()).unwrap().id.unwrap();
        db.upsert_character(&Character::new(id, "Medium", "Ghost")).unwrap();
        db.upsert_chat_message(&ChatMessage::user(id, "Hello")).unwrap();

        assert!(db.delete_campaign(id).unwrap());
        assert!(db.get_campaign(id).unwrap().is_none());
        assert!(db.list_characters(id).unwrap().is_empty());
        assert!(db.get_chat_history(id).unwrap().is_empty());
        assert!(!db.delete_campaign(id).unwrap());
    }
}
