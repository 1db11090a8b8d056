//! Replica sync summary served at `/api/sync/summary`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::WorkerState;
use crate::services::DatabaseService;
use crate::state::SyncStatus;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    /// Dirty rows over all six entity kinds.
    pub queued_changes: u64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub db_path: String,
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
}

impl SyncSummary {
    pub async fn collect(store: &DatabaseService, state: WorkerState) -> Result<Self> {
        Ok(Self {
            queued_changes: store.queued_changes().await?,
            last_sync_at: store.last_sync_at().await?,
            db_path: store.db_path_display(),
            status: state.status,
            last_error: state.last_error.filter(|message| !message.is_empty()),
            last_run_at: state.last_run_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewBranch;

    #[tokio::test]
    async fn summary_counts_dirty_rows_and_omits_empty_error() {
        let store = DatabaseService::open_in_memory().unwrap();
        store
            .create_branch(NewBranch {
                name: "Cabang Dua".to_string(),
                ..NewBranch::default()
            })
            .await
            .unwrap();

        let summary = SyncSummary::collect(&store, WorkerState::default())
            .await
            .unwrap();
        let value = serde_json::to_value(&summary).unwrap();

        assert_eq!(value["queuedChanges"], 1);
        assert_eq!(value["dbPath"], ":memory:");
        assert_eq!(value["status"], "idle");
        assert!(value["lastSyncAt"].is_null());
        assert!(value.get("lastError").is_none());
    }

    #[tokio::test]
    async fn summary_carries_worker_error() {
        let store = DatabaseService::open_in_memory().unwrap();
        let state = WorkerState {
            status: SyncStatus::Offline,
            last_error: Some("upstream not configured".to_string()),
            last_run_at: None,
        };

        let value = serde_json::to_value(SyncSummary::collect(&store, state).await.unwrap()).unwrap();

        assert_eq!(value["status"], "offline");
        assert_eq!(value["lastError"], "upstream not configured");
    }
}
