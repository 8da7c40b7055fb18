//! Schema versioning.
//!
//! `PRAGMA user_version` records the last applied step. Opening a database
//! applies every step above it, in order, and bumps the version after each.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> rusqlite::Result<()>;

/// Append new steps at the end; the version is the position in this list.
const STEPS: &[(&str, Step)] = &[("v001_initial", v001_initial::up)];

pub const CURRENT_VERSION: u32 = STEPS.len() as u32;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let applied: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if applied >= CURRENT_VERSION {
        tracing::debug!(version = applied, "schema up to date");
        return Ok(());
    }

    for (version, (name, up)) in (1u32..).zip(STEPS).skip(applied as usize) {
        tracing::info!(version, name, "applying schema step");
        up(conn).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        conn.pragma_update(None, "user_version", version)?;
    }

    Ok(())
}
