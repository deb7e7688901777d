//! Lightroom does not let SQLite assign row ids. Every `id_local` in the
//! catalog comes from one shared counter in `Adobe_variablesTable`.

use rusqlite::Connection;

use crate::db::catalog::{self, ENTITY_ID_COUNTER};
use crate::error::{Result, TransferError};

/// Hands out ids from `Adobe_entityIDCounter`.
///
/// The counter is read and written on every call. There is exactly one writer.
#[derive(Debug, Default)]
pub struct IdAllocator {
    issued: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current counter value and persists value + 1.
    pub fn next_id(&mut self, conn: &Connection) -> Result<i64> {
        let current = catalog::variable_i64(conn, ENTITY_ID_COUNTER)?
            .filter(|id| *id >= 0)
            .ok_or(TransferError::IdCounterUnavailable)?;

        let changed = conn.execute(
            "UPDATE Adobe_variablesTable SET value = value + 1 WHERE name = ?",
            [ENTITY_ID_COUNTER],
        )?;
        if changed == 0 {
            return Err(TransferError::IdCounterUnavailable);
        }

        self.issued += 1;
        Ok(current)
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.issued
    }
}
