//! Sync envelope carried by every syncable row.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::util::now_millis;

/// Dirty flag, tombstone and timestamps shared by all six entity kinds.
///
/// Flattened into each entity so the wire shape stays one flat object per row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMeta {
    #[serde(default)]
    pub synced: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncMeta {
    /// Envelope for a row created on this replica, dirty until uploaded.
    pub fn new_local() -> Self {
        let now = now_millis();
        Self {
            synced: false,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a local mutation and return its timestamp.
    ///
    /// `updated_at` strictly increases even when the stored value came from a
    /// replica whose clock runs ahead of ours.
    pub fn touch(&mut self) -> DateTime<Utc> {
        let now = now_millis().max(self.updated_at + Duration::milliseconds(1));
        self.synced = false;
        self.updated_at = now;
        now
    }

    /// Turn the row into a tombstone.
    pub fn tombstone(&mut self) {
        let now = self.touch();
        self.is_deleted = true;
        self.deleted_at = Some(now);
    }
}

impl Default for SyncMeta {
    fn default() -> Self {
        Self::new_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_local_rows_are_dirty() {
        let meta = SyncMeta::new_local();
        assert!(!meta.synced);
        assert!(!meta.is_deleted);
        assert_eq!(meta.created_at, meta.updated_at);
    }

    #[test]
    fn tombstone_resets_synced_flag() {
        let mut meta = SyncMeta::new_local();
        meta.synced = true;
        let before = meta.updated_at;

        meta.tombstone();

        assert!(meta.is_deleted);
        assert!(!meta.synced);
        assert_eq!(meta.deleted_at, Some(meta.updated_at));
        assert!(meta.updated_at > before);
    }

    #[test]
    fn touch_moves_past_a_future_timestamp() {
        let mut meta = SyncMeta::new_local();
        let ahead = meta.updated_at + Duration::hours(2);
        meta.updated_at = ahead;
        meta.synced = true;

        let stamped = meta.touch();

        assert_eq!(stamped, ahead + Duration::milliseconds(1));
        assert!(!meta.synced);
    }

    #[test]
    fn deserializes_with_missing_optional_fields() {
        let meta: SyncMeta = serde_json::from_str(
            r#"{"created_at":"2024-05-01T08:00:00Z","updated_at":"2024-05-01T09:00:00Z"}"#,
        )
        .unwrap();
        assert!(!meta.synced);
        assert!(!meta.is_deleted);
        assert_eq!(meta.deleted_at, None);
    }
}
