use std::time::Duration;

use mart_core::sync::{SyncReport, SyncWorker};
use tokio_util::sync::CancellationToken;

use crate::commands::common::{
    build_engine, format_sync_conflict_lines, open_store, sync_conflict_to_item, SyncConflictItem,
};
use crate::config::SidecarConfig;
use crate::error::CliError;

pub async fn run_sync(timeout_secs: Option<u64>, config: &SidecarConfig) -> Result<(), CliError> {
    let store = open_store(config)?;
    let engine = build_engine(config, store)?;
    let shutdown = CancellationToken::new();
    let (handle, worker) = SyncWorker::spawn(engine, None, shutdown.clone());

    let cancel = CancellationToken::new();
    let timer = timeout_secs.map(|secs| {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            cancel.cancel();
        })
    });

    let result = handle.run(cancel).await;
    if let Some(timer) = timer {
        timer.abort();
    }
    shutdown.cancel();
    if let Err(err) = worker.await {
        tracing::error!("Sync worker task failed: {err}");
    }

    let report = result?;
    for line in format_report_lines(&report) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    let watermark = report.watermark.map_or_else(
        || "unchanged".to_string(),
        |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    vec![
        format!(
            "Sync completed: uploaded {}, downloaded {}, pruned {}, conflicts {}",
            report.uploaded, report.downloaded, report.pruned, report.conflicts
        ),
        format!("Watermark: {watermark}"),
    ]
}

pub async fn run_sync_conflicts(
    limit: usize,
    as_json: bool,
    config: &SidecarConfig,
) -> Result<(), CliError> {
    let store = open_store(config)?;
    let conflicts = store.list_conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}
