//! Upstream side of the protocol: batch ingest and change queries.

use super::{ensure_applied, ApplyReport, ChangeSet, ChangesQuery, SyncResult, UploadBatch};
use crate::services::DatabaseService;

/// Apply a replica's batch. Any failed row fails the request so the replica
/// re-sends the whole batch.
pub async fn ingest(store: &DatabaseService, batch: UploadBatch) -> SyncResult<ApplyReport> {
    let UploadBatch { branch_id, rows } = batch;
    let received = rows.len();
    let report = store.apply_upload(rows).await;
    tracing::info!(
        branch_id = %branch_id,
        rows = received,
        applied = report.applied,
        deleted = report.deleted,
        conflicts = report.conflicts,
        failed = report.failures.len(),
        "Ingested upload batch"
    );
    ensure_applied(report)
}

/// Everything this store received or saw change since the query's lower bound.
pub async fn changes(store: &DatabaseService, query: &ChangesQuery) -> crate::Result<ChangeSet> {
    let changes = store
        .change_set(query.since_or_epoch(), query.branch_id.as_deref())
        .await?;
    tracing::debug!(
        since = ?query.since,
        branch_id = ?query.branch_id,
        rows = changes.rows.len(),
        "Served change set"
    );
    Ok(changes)
}
