use chrono::Utc;
use rusqlite::params;
use rngesus_shared::{CampaignId, ChatMessage, ChatMessageId, ChatRole};

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Append a message when it has no id yet, otherwise replace the text of
    /// the stored message. Only the text of an existing message changes; its
    /// role, campaign and position in the log stay as first written.
    pub fn upsert_chat_message(&self, message: &ChatMessage) -> Result<ChatMessage> {
        let id = match message.id {
            None => {
                self.conn().execute(
                    "INSERT INTO chat_messages (campaign_id, role, message, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        message.campaign_id.0,
                        message.role.as_str(),
                        message.message,
                        Utc::now().to_rfc3339(),
                    ],
                )?;
                ChatMessageId(self.conn().last_insert_rowid())
            }
            Some(id) => {
                let affected = self.conn().execute(
                    "UPDATE chat_messages SET message = ?2 WHERE id = ?1",
                    params![id.0, message.message],
                )?;
                if affected == 0 {
                    return Err(StoreError::NotFound);
                }
                id
            }
        };

        Ok(ChatMessage {
            id: Some(id),
            ..message.clone()
        })
    }

    /// The whole log of a campaign, oldest first.
    pub fn get_chat_history(&self, campaign_id: CampaignId) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, campaign_id, role, message FROM chat_messages
             WHERE campaign_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![campaign_id.0], row_to_chat_message)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

fn row_to_chat_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let role: String = row.get(2)?;
    let role: ChatRole = role.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(ChatMessage {
        id: Some(ChatMessageId(row.get(0)?)),
        campaign_id: CampaignId(row.get(1)?),
        role,
        message: row.get(3)?,
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

    #[test]
    fn history_keeps_insertion_order() {
        let (db, id) = setup();
        db.upsert_chat_message(&ChatMessage::assistant(id, "The train whistles."))
            .unwrap();
        db.upsert_chat_message(&ChatMessage::user(id, "I check my ticket."))
            .unwrap();

        let history = db.get_chat_history(id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, ChatRole::Assistant);
        assert_eq!(history[1].message, "I check my ticket.");
    }

    #[test]
    fn streaming_reply_updates_one_row() {
        let (db, id) = setup();
        let mut reply = db
            .upsert_chat_message(&ChatMessage::assistant(id, "The"))
            .unwrap();
        reply.message = "The conductor turns.".into();
        let updated = db.upsert_chat_message(&reply).unwrap();
        assert_eq!(updated.id, reply.id);

        let history = db.get_chat_history(id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "The conductor turns.");
    }

    #[test]
    fn updating_an_unknown_message_fails() {
        let (db, id) = setup();
        let mut ghost = ChatMessage::user(id, "boo");
        ghost.id = Some(ChatMessageId(404));
        assert!(matches!(
            db.upsert_chat_message(&ghost),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn messages_need_a_campaign() {
        let (db, _) = setup();
        let result = db.upsert_chat_message(&ChatMessage::user(CampaignId(99), "hi"));
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
    }
}
