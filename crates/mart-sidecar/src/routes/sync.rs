use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use mart_core::db::PruneReport;
use mart_core::sync::{SyncReport, SyncSummary};
use mart_core::SyncConflict;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::AppState;
use crate::error::AppError;

pub async fn summary(State(state): State<AppState>) -> Result<Json<SyncSummary>, AppError> {
    let worker = state.sync.state().await;
    Ok(Json(SyncSummary::collect(&state.store, worker).await?))
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    status: &'static str,
    report: SyncReport,
}

/// Run one cycle now. A client that disconnects cancels its cycle.
pub async fn run(State(state): State<AppState>) -> Result<Json<RunResponse>, AppError> {
    let cancel = CancellationToken::new();
    let _disconnect = cancel.clone().drop_guard();

    let report = state.sync.run(cancel).await?;
    tracing::info!(
        endpoint = "sync_run",
        uploaded = report.uploaded,
        downloaded = report.downloaded,
        "On-demand sync finished"
    );
    Ok(Json(RunResponse {
        status: "ok",
        report,
    }))
}

pub async fn prune_deleted(State(state): State<AppState>) -> Result<Json<PruneReport>, AppError> {
    Ok(Json(state.store.prune_tombstones().await?))
}

#[derive(Debug, Deserialize)]
pub struct ConflictsQuery {
    limit: Option<usize>,
}

pub async fn conflicts(
    State(state): State<AppState>,
    query: Result<Query<ConflictsQuery>, QueryRejection>,
) -> Result<Json<Vec<SyncConflict>>, AppError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    Ok(Json(state.store.list_conflicts(limit).await?))
}
