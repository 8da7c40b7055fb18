//! # rngesus-engine
//!
//! Turns a stream of partial language-model completions into progressively
//! more complete domain records.
//!
//! One generic pipeline serves every record kind:
//! - [`request`] decides which fields the backend must fill in and which it
//!   must echo back unchanged,
//! - [`merge`] folds each partial snapshot into the previous record,
//! - [`throttle`] bounds how often intermediate records reach the caller,
//! - [`session`] drives the whole thing as a lazy, ordered stream.
//!
//! The record kinds themselves ([`campaign`], [`character`], [`chat`]) only
//! declare their fields and their generation [`program`].

pub mod backend;
pub mod campaign;
pub mod character;
pub mod chat;
pub mod error;
pub mod merge;
pub mod program;
pub mod request;
pub mod schema;
pub mod session;
pub mod throttle;

pub use backend::{BackendConfig, ChatCompletionBackend, GenerationBackend, PartialStream};
pub use character::{roll_character, CharacterContext};
pub use chat::{ChatContext, ChatTurn};
pub use error::{BackendError, EngineError};
pub use program::Program;
pub use request::GenerationRequest;
pub use schema::{FieldValues, ForcedFields, Generative, PartialOutput};
pub use session::{Orchestrator, RecordStream};
