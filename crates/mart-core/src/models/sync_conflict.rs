//! Sync conflict model

use serde::{Deserialize, Serialize};

use super::EntityKind;

/// A sync write that replaced a newer copy, or was held back by a pending local edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    pub entity: EntityKind,
    /// Row involved in the conflict
    pub row_id: String,
    /// Stored row's timestamp when the conflict occurred (unix ms)
    pub local_updated_at: i64,
    /// Incoming row's timestamp (unix ms)
    pub incoming_updated_at: i64,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
    /// Resolution strategy name
    pub strategy: String,
}
