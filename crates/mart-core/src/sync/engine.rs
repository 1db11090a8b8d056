//! One reconciliation cycle: upload, then download, then advance the watermark.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::{
    ensure_applied, ChangesQuery, SyncError, SyncResult, UploadBatch, UpstreamTransport,
};
use crate::services::DatabaseService;
use crate::state::SyncStatus;
use crate::util::now_millis;

/// Worker status as seen by the summary endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerState {
    pub status: SyncStatus,
    pub last_error: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Counters for one finished cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub uploaded: usize,
    pub marked_synced: usize,
    pub pruned: usize,
    pub downloaded: usize,
    pub conflicts: usize,
    pub watermark: Option<DateTime<Utc>>,
}

/// Runs sync cycles for one replica. Cycles are serialized by the worker.
pub struct SyncEngine {
    store: DatabaseService,
    upstream: Option<Arc<dyn UpstreamTransport>>,
    branch_id: String,
    state: RwLock<WorkerState>,
}

impl SyncEngine {
    pub fn new(
        store: DatabaseService,
        upstream: Option<Arc<dyn UpstreamTransport>>,
        branch_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            upstream,
            branch_id: branch_id.into(),
            state: RwLock::new(WorkerState::default()),
        }
    }

    pub const fn store(&self) -> &DatabaseService {
        &self.store
    }

    pub fn branch_id(&self) -> &str {
        &self.branch_id
    }

    pub const fn is_configured(&self) -> bool {
        self.upstream.is_some()
    }

    pub async fn snapshot(&self) -> WorkerState {
        self.state.read().await.clone()
    }

    pub(crate) async fn run_once(&self, cancel: &CancellationToken) -> SyncResult<SyncReport> {
        self.state.write().await.status = SyncStatus::Running;
        let started = Instant::now();

        let result = match &self.upstream {
            Some(upstream) => self.cycle(upstream.as_ref(), cancel).await,
            None => Err(SyncError::NotConfigured),
        };

        let mut state = self.state.write().await;
        match &result {
            Ok(report) => {
                state.status = SyncStatus::Online;
                state.last_error = None;
                state.last_run_at = Some(now_millis());
                tracing::info!(
                    branch_id = %self.branch_id,
                    uploaded = report.uploaded,
                    pruned = report.pruned,
                    downloaded = report.downloaded,
                    conflicts = report.conflicts,
                    elapsed = ?started.elapsed(),
                    "Sync cycle completed"
                );
            }
            Err(err) => {
                state.status = SyncStatus::Offline;
                state.last_error = Some(err.to_string());
                tracing::warn!(branch_id = %self.branch_id, "Sync cycle failed: {err}");
            }
        }
        result
    }

    async fn cycle(
        &self,
        upstream: &dyn UpstreamTransport,
        cancel: &CancellationToken,
    ) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();
        self.upload(upstream, cancel, &mut report).await?;
        self.download(upstream, cancel, &mut report).await?;
        Ok(report)
    }

    async fn upload(
        &self,
        upstream: &dyn UpstreamTransport,
        cancel: &CancellationToken,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let rows = self.store.collect_dirty().await?;
        if rows.is_empty() {
            tracing::debug!("No local changes to upload");
        } else {
            let batch = UploadBatch {
                branch_id: self.branch_id.clone(),
                rows,
            };
            cancellable(cancel, upstream.upload(&batch)).await?;
            report.uploaded = batch.rows.len();
            report.marked_synced = self.store.mark_uploaded(&batch.rows).await;
        }

        match self.store.prune_tombstones().await {
            Ok(pruned) => report.pruned = pruned.total(),
            Err(err) => tracing::warn!("Failed to prune tombstones: {err}"),
        }
        Ok(())
    }

    async fn download(
        &self,
        upstream: &dyn UpstreamTransport,
        cancel: &CancellationToken,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let query = ChangesQuery {
            since: self.store.last_sync_at().await?,
            branch_id: Some(self.branch_id.clone()),
        };
        let changes = cancellable(cancel, upstream.changes(&query)).await?;
        report.downloaded = changes.rows.len();

        let applied = self.store.apply_download(changes.rows).await;
        report.conflicts = applied.conflicts;
        ensure_applied(applied)?;

        if let Some(last_sync_at) = changes.last_sync_at {
            report.watermark = Some(self.store.advance_watermark(last_sync_at).await?);
        }
        Ok(())
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = SyncResult<T>>,
) -> SyncResult<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SyncError::Cancelled),
        result = call => result,
    }
}
