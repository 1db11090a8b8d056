//! Offline-first sync between branch replicas and the upstream service.
//!
//! A cycle uploads every dirty row in one batch, marks the acknowledged rows
//! clean, prunes acknowledged tombstones, then pulls everything upstream saw
//! change since the stored watermark. Cycles are serialized by [`SyncWorker`].

pub mod apply;
mod engine;
mod protocol;
mod summary;
mod transport;
pub mod upstream;
mod worker;


use thiserror::Error;

pub use apply::{ApplyReport, RowFailure};
pub use engine::{SyncEngine, SyncReport, WorkerState};
pub use protocol::{ChangeSet, ChangesQuery, EntitySet, InvalidSince, UploadBatch};
pub use summary::SyncSummary;
pub use transport::{HttpUpstream, LocalUpstream, UpstreamTransport};
pub use worker::{SyncHandle, SyncWorker};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("upstream not configured")]
    NotConfigured,
    #[error("sync already running")]
    AlreadyRunning,
    #[error("sync cancelled")]
    Cancelled,
    #[error("sync worker is not running")]
    WorkerStopped,
    #[error("Invalid upstream configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Upstream HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Upstream API error: {0}")]
    Api(String),
    #[error("{failed} rows failed to apply (first: {first})")]
    PartialApply { failed: usize, first: String },
    #[error(transparent)]
    Store(#[from] crate::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Turn an apply report with failed rows into [`SyncError::PartialApply`].
pub(crate) fn ensure_applied(report: ApplyReport) -> SyncResult<ApplyReport> {
    if report.is_clean() {
        return Ok(report);
    }
    let first = report
        .failures
        .first()
        .map(|first| format!("{} {}: {}", first.entity, first.id, first.error))
        .unwrap_or_default();
    Err(SyncError::PartialApply {
        failed: report.failures.len(),
        first,
    })
}
