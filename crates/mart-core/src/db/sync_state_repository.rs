//! Watermark repository implementation

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::entity::millis_to_datetime;
use crate::error::Result;

const SINGLETON_ID: &str = "singleton";

/// Trait for the replica's sync watermark
pub trait SyncStateRepository {
    /// Upstream time of the last fully applied download, if any
    fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>>;

    /// Move the watermark forward. Never moves it backwards.
    fn advance(&self, at: DateTime<Utc>) -> Result<DateTime<Utc>>;
}

/// `SQLite` implementation of `SyncStateRepository`
pub struct SqliteSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncStateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SyncStateRepository for SqliteSyncStateRepository<'_> {
    fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>> {
        let stored: Option<Option<i64>> = self
            .conn
            .query_row(
                "SELECT last_sync_at FROM sync_state WHERE id = ?1",
                [SINGLETON_ID],
                |row| row.get(0),
            )
            .optional()?;
        let watermark = stored
            .flatten()
            .map(|ms| millis_to_datetime(0, ms))
            .transpose()?;
        Ok(watermark)
    }

    fn advance(&self, at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.conn.execute(
            "INSERT INTO sync_state (id, last_sync_at) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                 last_sync_at = MAX(COALESCE(sync_state.last_sync_at, excluded.last_sync_at), excluded.last_sync_at)",
            params![SINGLETON_ID, at.timestamp_millis()],
        )?;
        Ok(self.last_sync_at()?.unwrap_or(at))
    }
}
