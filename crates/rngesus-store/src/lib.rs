//! # rngesus-store
//!
//! SQLite persistence for campaigns, their characters and their chat logs.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! record in `rngesus-shared`. Lookups return `Option`: an absent row is not
//! an error.

pub mod campaigns;
pub mod characters;
pub mod chats;
pub mod database;
pub mod migrations;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
