//! v001 -- Initial schema creation.
//!
//! Creates `campaigns`, `characters` and `chat_messages`. List and map
//! columns hold JSON text.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Campaigns
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS campaigns (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    prompt            TEXT NOT NULL,
    title             TEXT NOT NULL DEFAULT '',
    description       TEXT NOT NULL DEFAULT '',   -- pitch \n---\n story \n---\n mechanics
    summary           TEXT NOT NULL DEFAULT '',
    character_classes TEXT NOT NULL DEFAULT '[]', -- JSON array
    character_types   TEXT NOT NULL DEFAULT '[]', -- JSON array
    attributes        TEXT NOT NULL DEFAULT '[]', -- JSON array
    scenario          TEXT NOT NULL DEFAULT ''
);

-- ----------------------------------------------------------------
-- Characters
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS characters (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    campaign_id     INTEGER NOT NULL,
    name            TEXT,
    character_class TEXT NOT NULL,
    character_type  TEXT NOT NULL,
    backstory       TEXT NOT NULL DEFAULT '',
    attributes      TEXT NOT NULL DEFAULT '{}',  -- JSON object name -> score
    primary_goal    TEXT NOT NULL DEFAULT '',
    inventory       TEXT NOT NULL DEFAULT '[]',  -- JSON array
    activated_at    TEXT,                        -- RFC-3339, NULL when benched

    FOREIGN KEY (campaign_id) REFERENCES campaigns(id)
);

CREATE INDEX IF NOT EXISTS idx_characters_campaign ON characters(campaign_id);

-- ----------------------------------------------------------------
-- Chat messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_messages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    campaign_id INTEGER NOT NULL,
    role        TEXT NOT NULL,                   -- 'user' | 'assistant'
    message     TEXT NOT NULL,
    created_at  TEXT NOT NULL,                   -- RFC-3339

    FOREIGN KEY (campaign_id) REFERENCES campaigns(id)
);

CREATE INDEX IF NOT EXISTS idx_chat_messages_campaign ON chat_messages(campaign_id, id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
