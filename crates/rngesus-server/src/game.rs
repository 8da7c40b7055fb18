//! The game service: looks records up, starts generation sessions and
//! persists every record a session emits before it reaches the client.

use std::sync::Arc;

use async_stream::try_stream;
use chrono::Utc;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use rngesus_engine::{roll_character, CharacterContext, ChatContext, ChatTurn, Orchestrator, RecordStream};
use rngesus_shared::{
    Campaign, CampaignId, CampaignSummary, Character, CharacterId, CharacterSummary, ChatMessage,
};
use rngesus_store::Database;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::campaign_locks::CampaignLocks;
use crate::error::ServerError;

/// Records on their way to the client, already stored.
pub type ApiStream<T> = BoxStream<'static, Result<T, ServerError>>;

pub struct GameService {
    db: Arc<Mutex<Database>>,
    orchestrator: Orchestrator,
    locks: CampaignLocks,
}

impl GameService {
    pub fn new(db: Database, orchestrator: Orchestrator) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            orchestrator,
            locks: CampaignLocks::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Campaigns
    // -----------------------------------------------------------------------

    pub async fn list_campaigns(&self) -> Result<Vec<CampaignSummary>, ServerError> {
        Ok(self.db.lock().await.list_campaign_summaries()?)
    }

    pub async fn get_campaign(&self, id: CampaignId) -> Result<Campaign, ServerError> {
        self.db
            .lock()
            .await
            .get_campaign(id)?
            .ok_or_else(|| ServerError::NotFound(format!("campaign {id}")))
    }

    pub async fn delete_campaign(&self, id: CampaignId) -> Result<bool, ServerError> {
        let _guard = self.locks.acquire(id).await;
        let deleted = self.db.lock().await.delete_campaign(id)?;
        info!(campaign_id = %id, deleted, "Campaign delete");
        Ok(deleted)
    }

    /// Generate a campaign from the user's premise. The first record is
    /// inserted, later ones update the same row.
    pub fn new_campaign(&self, prompt: String) -> ApiStream<Campaign> {
        info!(prompt = %prompt, "Generating new campaign");
        let records = self.orchestrator.run(Campaign::new(prompt), ());
        persisted(self.db.clone(), None, records, save_campaign(None))
    }

    /// Continue generating a stored campaign; fields it already has are kept.
    pub async fn regenerate_campaign(&self, id: CampaignId) -> Result<ApiStream<Campaign>, ServerError> {
        let guard = self.locks.acquire(id).await;
        let campaign = self.get_campaign(id).await?;
        info!(campaign_id = %id, "Regenerating campaign");
        let records = self.orchestrator.run(campaign, ());
        Ok(persisted(self.db.clone(), Some(guard), records, save_campaign(Some(id))))
    }

    // -----------------------------------------------------------------------
    // Characters
    // -----------------------------------------------------------------------

    pub async fn list_characters(&self, campaign_id: CampaignId) -> Result<Vec<CharacterSummary>, ServerError> {
        let db = self.db.lock().await;
        if db.get_campaign(campaign_id)?.is_none() {
            return Err(ServerError::NotFound(format!("campaign {campaign_id}")));
        }
        Ok(db.list_character_summaries(campaign_id)?)
    }

    pub async fn get_character(&self, id: CharacterId) -> Result<Character, ServerError> {
        self.db
            .lock()
            .await
            .get_character(id)?
            .ok_or_else(|| ServerError::NotFound(format!("character {id}")))
    }

    /// Waits for any session on the owning campaign, which would otherwise
    /// write the character back on its next emission.
    pub async fn delete_character(&self, id: CharacterId) -> Result<bool, ServerError> {
        let Some(character) = self.db.lock().await.get_character(id)? else {
            return Ok(false);
        };
        let _guard = self.locks.acquire(character.campaign_id).await;
        let deleted = self.db.lock().await.delete_character(id)?;
        info!(character_id = %id, deleted, "Character delete");
        Ok(deleted)
    }

    pub async fn set_character_active(&self, id: CharacterId, active: bool) -> Result<Character, ServerError> {
        let at = active.then(Utc::now);
        let character = self
            .db
            .lock()
            .await
            .set_character_active(id, at)?
            .ok_or_else(|| ServerError::NotFound(format!("character {id}")))?;
        debug!(character_id = %id, active, "Character activation changed");
        Ok(character)
    }

    /// Roll a new character of random class and type for a campaign.
    pub async fn roll_character(&self, campaign_id: CampaignId) -> Result<ApiStream<Character>, ServerError> {
        let guard = self.locks.acquire(campaign_id).await;
        let campaign = self.get_campaign(campaign_id).await?;
        let (seed, context) = roll_character(&campaign, &mut rand::thread_rng())?;
        info!(
            campaign_id = %campaign_id,
            class = %seed.character_class,
            character_type = %seed.character_type,
            "Rolling character"
        );
        let records = self.orchestrator.run(seed, context);
        Ok(persisted(self.db.clone(), Some(guard), records, save_character(None)))
    }

    pub async fn regenerate_character(&self, id: CharacterId) -> Result<ApiStream<Character>, ServerError> {
        let character = self.get_character(id).await?;
        let guard = self.locks.acquire(character.campaign_id).await;
        // Re-read under the lock in case a session just finished with it.
        let character = self.get_character(id).await?;
        let campaign = self.get_campaign(character.campaign_id).await?;
        info!(character_id = %id, "Regenerating character");
        let records = self
            .orchestrator
            .run(character, CharacterContext::from_campaign(&campaign));
        Ok(persisted(self.db.clone(), Some(guard), records, save_character(Some(id))))
    }

    // -----------------------------------------------------------------------
    // Chat
    // -----------------------------------------------------------------------

    pub async fn chat_history(&self, campaign_id: CampaignId) -> Result<Vec<ChatMessage>, ServerError> {
        let db = self.db.lock().await;
        if db.get_campaign(campaign_id)?.is_none() {
            return Err(ServerError::NotFound(format!("campaign {campaign_id}")));
        }
        Ok(db.get_chat_history(campaign_id)?)
    }

    /// Record the player's message (if any) and stream the dungeon master's
    /// answer. Every emitted message carries the same id.
    pub async fn chat_turn(
        &self,
        campaign_id: CampaignId,
        message: Option<String>,
    ) -> Result<ApiStream<ChatMessage>, ServerError> {
        let guard = self.locks.acquire(campaign_id).await;

        let (campaign, roster, history) = {
            let db = self.db.lock().await;
            let campaign = db
                .get_campaign(campaign_id)?
                .ok_or_else(|| ServerError::NotFound(format!("campaign {campaign_id}")))?;
            if let Some(text) = message {
                db.upsert_chat_message(&ChatMessage::user(campaign_id, text))?;
            }
            let roster = db.list_characters(campaign_id)?;
            let history = db.get_chat_history(campaign_id)?;
            (campaign, roster, history)
        };

        let seed = ChatTurn::seed(&campaign)?;
        let scenario = campaign.scenario.clone();
        let context = ChatContext::new(campaign, roster, history);
        info!(
            campaign_id = %campaign_id,
            characters = context.characters.len(),
            history = context.history.len(),
            "Starting chat turn"
        );

        let records = self.orchestrator.run(seed, context);
        Ok(persisted(self.db.clone(), Some(guard), records, save_chat_turn(scenario)))
    }
}

/// Store each record a session emits, then pass the stored version on.
///
/// `save` returns `None` for records that should not reach the client. The
/// optional campaign guard is held until the stream ends or is dropped.
fn persisted<R, T, F>(
    db: Arc<Mutex<Database>>,
    guard: Option<OwnedMutexGuard<()>>,
    records: RecordStream<R>,
    save: F,
) -> ApiStream<T>
where
    R: Send + 'static,
    T: Send + 'static,
    F: FnMut(&Database, R) -> Result<Option<T>, ServerError> + Send + 'static,
{
    persist_each(db, guard, records, save).boxed()
}

fn persist_each<R, T, F>(
    db: Arc<Mutex<Database>>,
    guard: Option<OwnedMutexGuard<()>>,
    mut records: RecordStream<R>,
    mut save: F,
) -> impl Stream<Item = Result<T, ServerError>>
where
    F: FnMut(&Database, R) -> Result<Option<T>, ServerError>,
{
    try_stream! {
        let _guard = guard;
        while let Some(record) = records.next().await {
            let record = record?;
            let stored = {
                let db = db.lock().await;
                save(&*db, record)?
            };
            if let Some(stored) = stored {
                yield stored;
            }
        }
    }
}

fn save_campaign(
    mut id: Option<CampaignId>,
) -> impl FnMut(&Database, Campaign) -> Result<Option<Campaign>, ServerError> + Send {
    move |db, mut campaign| {
        if campaign.id.is_none() {
            campaign.id = id;
        }
        let stored = db.upsert_campaign(&campaign)?;
        id = stored.id;
        Ok(Some(stored))
    }
}

fn save_character(
    mut id: Option<CharacterId>,
) -> impl FnMut(&Database, Character) -> Result<Option<Character>, ServerError> + Send {
    move |db, mut character| {
        if character.id.is_none() {
            character.id = id;
        }
        let stored = db.upsert_character(&character)?;
        id = stored.id;
        Ok(Some(stored))
    }
}

/// Writes scenario changes back to the campaign and keeps one assistant
/// message per turn, created once the reply has any text.
fn save_chat_turn(
    mut scenario: String,
) -> impl FnMut(&Database, ChatTurn) -> Result<Option<ChatMessage>, ServerError> + Send {
    let mut reply_id = None;
    move |db, turn| {
        if turn.scenario != scenario {
            db.update_campaign_scenario(turn.campaign_id, &turn.scenario)?;
            scenario = turn.scenario.clone();
        }

        if turn.reply.is_empty() && reply_id.is_none() {
            return Ok(None);
        }

        let mut message = turn.reply_message();
        message.id = reply_id;
        let stored = db.upsert_chat_message(&message)?;
        reply_id = stored.id;
        Ok(Some(stored))
    }
}
