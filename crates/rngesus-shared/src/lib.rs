//! # rngesus-shared
//!
//! Domain records shared by the generation engine, the store and the HTTP
//! server, plus the small text parsers that turn model output into typed
//! fields.

pub mod constants;
pub mod description;
pub mod models;
pub mod parse;
pub mod types;

pub use models::*;
pub use types::{CampaignId, CharacterId, ChatMessageId};
